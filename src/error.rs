//! SDK 统一错误定义
//!
//! 分类与调用方处理方式一一对应：
//! - 输入校验错误：本地发现，不做任何网络或签名交互，从不重试
//! - 余额不足：选币用尽全部 UTXO 仍达不到目标
//! - 签名器错误：用户取消或签名设备不可用，终止
//! - 网络错误：分为可重试（触发多节点切换）与终止两类
//! - 配置错误：构造阶段快速失败

use rust_decimal::Decimal;
use thiserror::Error;

/// 本地输入校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("missing required extra: {0}")]
    MissingRequiredExtra(&'static str),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("change {change} is below dust threshold {dust}")]
    DustChange { change: Decimal, dust: Decimal },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid outpoint: {0}")]
    InvalidOutpoint(String),
}

/// 外部签名器错误（均为终止错误）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("signing cancelled by user")]
    UserCancelled,

    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
}

/// 网络错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// 超时、5xx、限流、响应解析失败
    Retryable,
    /// 其余 4xx、协议层拒绝（nonce too low 等）
    Terminal,
}

/// 网络错误，携带出错节点便于日志定位
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{provider}] {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub provider: String,
    pub message: String,
}

impl NetworkError {
    pub fn retryable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NetworkErrorKind::Retryable,
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn terminal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NetworkErrorKind::Terminal,
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// 按 HTTP 状态码分类：5xx 与 429 可重试，其余终止
    pub fn from_status(provider: impl Into<String>, status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, truncate(body, 256));
        if status == 429 || (500..600).contains(&status) {
            Self::retryable(provider, message)
        } else {
            Self::terminal(provider, message)
        }
    }

    /// reqwest 错误分类：超时/连接/解码失败可重试
    pub fn from_reqwest(provider: impl Into<String>, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(provider, status.as_u16(), &err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_decode() || err.is_request() {
            Self::retryable(provider, err.to_string())
        } else {
            Self::terminal(provider, err.to_string())
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == NetworkErrorKind::Retryable
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// 面向调用方的错误类别（UI 据此给出不同处理，无需字符串匹配）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 修改输入后再试
    FixInput,
    /// 稍后重试
    TryAgain,
    /// 余额不足，建议减少金额
    InsufficientFunds,
    /// 签名被拒绝或签名设备不可用
    SignerRejected,
    /// SDK 配置错误
    Misconfigured,
}

/// SDK 统一错误
#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transaction flow cancelled")]
    Cancelled,
}

impl SdkError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::FixInput,
            Self::InsufficientFunds { .. } => ErrorCategory::InsufficientFunds,
            Self::Signer(_) | Self::Cancelled => ErrorCategory::SignerRejected,
            Self::Network(_) | Self::Storage(_) => ErrorCategory::TryAgain,
            Self::Configuration(_) => ErrorCategory::Misconfigured,
        }
    }

    /// 仅可重试的网络错误驱动多节点切换
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_retryable())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type SdkResult<T> = std::result::Result<T, SdkError>;
