//! 交易构建阶段
//!
//! 签名流程只能向前推进：未编译 → 已生成原像 → 已签名 → 已提交。
//! 任一阶段都可能因失败或取消而终止。

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStage {
    /// 交易意图已创建，尚未编码
    Uncompiled,

    /// 已生成待签名原像
    PreimageBuilt,

    /// 已拼装签名后的线路字节
    Signed,

    /// 已提交到网络
    Submitted,

    /// 校验、签名或提交失败
    Failed,

    /// 调用方取消
    Cancelled,
}

impl TransactionStage {
    /// 是否为最终状态（不可再转换）
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Submitted | Self::Failed | Self::Cancelled)
    }

    /// 验证状态转换合法性
    pub fn can_transition_to(&self, target: &Self) -> bool {
        use TransactionStage::*;

        match (self, target) {
            _ if self.is_final() => false,

            (Uncompiled, PreimageBuilt) | (PreimageBuilt, Signed) | (Signed, Submitted) => true,

            // 非最终状态都可失败或取消
            (_, Failed) | (_, Cancelled) => true,

            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uncompiled => "uncompiled",
            Self::PreimageBuilt => "preimage_built",
            Self::Signed => "signed",
            Self::Submitted => "submitted",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
