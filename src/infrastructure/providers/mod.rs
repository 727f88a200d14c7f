//! 链节点接入
//!
//! 每个后端族一个 trait，节点响应在这里转换为领域类型后才交给上层。
//! 响应解析失败按可重试网络错误上报，由多节点网关切换到下一个节点。

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{NetworkError, SdkError, SdkResult};

pub mod algod;
pub mod blockbook;
pub mod evm_rpc;
pub mod solana_rpc;

pub use algod::{AlgodProvider, AlgorandAccount, AlgorandNetworkProvider, AlgorandTransactionParams};
pub use blockbook::{BlockbookProvider, UtxoNetworkProvider};
pub use evm_rpc::{EvmCallRequest, EvmJsonRpcProvider, EvmNetworkProvider, FeeHistory};
pub use solana_rpc::{SolanaNetworkProvider, SolanaRpcProvider};

/// 节点描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub base_url: String,
    /// 节点能力标签（如 "blockbook"、"archive"），用于按能力筛选
    #[serde(default)]
    pub capability_tag: String,
    /// 附加请求头（API Key 等凭据）
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ProviderDescriptor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            capability_tag: String::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.capability_tag = tag.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// 所有节点共有的能力
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    fn base_url(&self) -> &str;

    /// 广播已签名交易，返回交易哈希
    async fn submit_transaction(&self, raw: &[u8]) -> SdkResult<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP 传输
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: Vec<serde_json::Value>,
    id: u64,
}

impl<'a> JsonRpcRequest<'a> {
    pub(crate) fn new(method: &'a str, params: Vec<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        }
    }
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// JSON-RPC 错误码：节点限流
const RPC_LIMIT_EXCEEDED: i64 = -32005;

/// 单个节点的 HTTP 客户端
#[derive(Clone)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub(crate) fn new(descriptor: &ProviderDescriptor, timeout: Duration) -> SdkResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &descriptor.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SdkError::config(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SdkError::config(format!("invalid header value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SdkError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: descriptor.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SdkResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(&self.base_url, &e))?;
        let body = self.read(response).await?;
        self.parse(&body)
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> SdkResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(&self.base_url, &e))?;
        let body = self.read(response).await?;
        self.parse(&body)
    }

    /// 原始请求体，返回响应文本
    pub(crate) async fn post_raw(&self, path: &str, body: Vec<u8>, content_type: &str) -> SdkResult<String> {
        let response = self
            .client
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(&self.base_url, &e))?;
        self.read(response).await
    }

    pub(crate) async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Vec<serde_json::Value>) -> SdkResult<T> {
        let request = JsonRpcRequest::new(method, params);
        let response: JsonRpcResponse<T> = self.post_json("", &request).await?;

        if let Some(error) = response.error {
            let message = format!("{} failed: {} (code {})", method, error.message, error.code);
            return Err(if error.code == RPC_LIMIT_EXCEEDED {
                NetworkError::retryable(&self.base_url, message)
            } else {
                NetworkError::terminal(&self.base_url, message)
            }
            .into());
        }
        response
            .result
            .ok_or_else(|| NetworkError::retryable(&self.base_url, format!("{} returned no result", method)).into())
    }

    async fn read(&self, response: reqwest::Response) -> SdkResult<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NetworkError::from_reqwest(&self.base_url, &e))?;
        if !status.is_success() {
            return Err(NetworkError::from_status(&self.base_url, status.as_u16(), &body).into());
        }
        Ok(body)
    }

    fn parse<T: DeserializeOwned>(&self, body: &str) -> SdkResult<T> {
        serde_json::from_str(body)
            .map_err(|e| NetworkError::retryable(&self.base_url, format!("malformed response: {}", e)).into())
    }

    /// 响应内容不符合预期
    pub(crate) fn malformed(&self, message: impl std::fmt::Display) -> SdkError {
        NetworkError::retryable(&self.base_url, format!("malformed response: {}", message)).into()
    }
}

/// `0x` 前缀十六进制数量
pub(crate) fn parse_hex_u128(hex: &str) -> Option<u128> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    if digits.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(digits, 16).ok()
}

pub(crate) fn to_hex_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}
