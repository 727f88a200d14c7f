//! 交易意图与各阶段数据
//!
//! 阶段之间通过消耗式转换推进：`UncompiledTransaction` → `PreimageBuilt` →
//! `SignedTransaction` → `SubmittedTransaction`。后续阶段只能由上一阶段的操作产生。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{amount::Amount, fee::Fee, unspent_output::UnspentOutput};
use crate::error::ValidationError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 协议附加参数
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// UTXO 附加参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoExtras {
    /// 已选中的输入（由选币引擎产生）
    pub unspent_outputs: Vec<UnspentOutput>,
    /// 找零地址，缺省找零回源地址
    pub change_address: Option<String>,
}

/// EVM 合约调用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractCall {
    /// ERC-20 approve；`amount` 为空表示无限授权
    Erc20Approve {
        contract: String,
        spender: String,
        amount: Option<Amount>,
    },
    /// ERC-721 safeTransferFrom(from, to, tokenId)
    Erc721Transfer { contract: String, token_id: u128 },
    /// ERC-1155 safeTransferFrom(from, to, id, amount, data)
    Erc1155Transfer {
        contract: String,
        token_id: u128,
        quantity: u128,
        #[serde(default)]
        data: Vec<u8>,
    },
}

/// EVM 附加参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmExtras {
    pub nonce: Option<u64>,
    /// 原始调用数据（与 `call` 互斥）
    pub data: Option<Vec<u8>>,
    pub call: Option<ContractCall>,
}

/// Algorand 附加参数（来自 `/v2/transactions/params`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorandExtras {
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
    pub first_round: u64,
    pub last_round: u64,
    pub note: Option<Vec<u8>>,
}

/// Solana 附加参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaExtras {
    pub recent_blockhash: [u8; 32],
}

/// 两阶段代币转账的铭文信封（序列化为 JSON 写入赎回脚本）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEnvelope {
    pub p: String,
    pub op: String,
    pub amt: String,
    pub to: String,
    pub tick: String,
}

/// 提交交易已广播、等待揭示的记录（持久化到键值存储，可跨进程重启恢复）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReveal {
    pub commit_tx_id: String,
    /// 提交输出金额 = 揭示手续费 + 粉尘阈值
    pub commit_output_value: Decimal,
    pub reveal_fee: Decimal,
    #[serde(with = "hex_vec")]
    pub redeem_script: Vec<u8>,
    pub envelope: TokenEnvelope,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// 协议相关的附加参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TransactionExtras {
    #[default]
    None,
    Utxo(UtxoExtras),
    Evm(EvmExtras),
    Algorand(AlgorandExtras),
    Solana(SolanaExtras),
    /// 揭示阶段：花费提交交易的输出 0
    Reveal(PendingReveal),
}

impl TransactionExtras {
    pub fn utxo(&self) -> Result<&UtxoExtras, ValidationError> {
        match self {
            Self::Utxo(extras) => Ok(extras),
            _ => Err(ValidationError::MissingRequiredExtra("utxo outputs")),
        }
    }

    pub fn evm(&self) -> Result<&EvmExtras, ValidationError> {
        match self {
            Self::Evm(extras) => Ok(extras),
            _ => Err(ValidationError::MissingRequiredExtra("nonce")),
        }
    }

    pub fn algorand(&self) -> Result<&AlgorandExtras, ValidationError> {
        match self {
            Self::Algorand(extras) => Ok(extras),
            _ => Err(ValidationError::MissingRequiredExtra("algorand transaction params")),
        }
    }

    pub fn reveal(&self) -> Option<&PendingReveal> {
        match self {
            Self::Reveal(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn solana(&self) -> Result<&SolanaExtras, ValidationError> {
        match self {
            Self::Solana(extras) => Ok(extras),
            _ => Err(ValidationError::MissingRequiredExtra("recent blockhash")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 原像与签名
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 签名器需要处理的数据形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreimageKind {
    /// 32 字节摘要（secp256k1 链）
    Digest,
    /// 完整消息（ed25519 链由签名器内部哈希）
    Message,
}

/// 待签名原像
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preimage {
    pub kind: PreimageKind,
    pub bytes: Vec<u8>,
}

impl Preimage {
    pub fn digest(bytes: [u8; 32]) -> Self {
        Self {
            kind: PreimageKind::Digest,
            bytes: bytes.to_vec(),
        }
    }

    pub fn message(bytes: Vec<u8>) -> Self {
        Self {
            kind: PreimageKind::Message,
            bytes,
        }
    }
}

/// 外部签名器返回的原始签名（r‖s 或 r‖s‖v）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        hex::decode(s.trim_start_matches("0x"))
            .map(Self)
            .map_err(|e| ValidationError::InvalidSignature(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 前 64 字节 r‖s
    pub fn compact(&self) -> Result<&[u8], ValidationError> {
        match self.0.len() {
            64 | 65 => Ok(&self.0[..64]),
            n => Err(ValidationError::InvalidSignature(format!("expected 64 or 65 bytes, got {}", n))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 交易阶段
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 交易意图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncompiledTransaction {
    pub source: String,
    pub destination: String,
    pub amount: Amount,
    pub fee: Fee,
    #[serde(default)]
    pub extras: TransactionExtras,
}

impl UncompiledTransaction {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        amount: Amount,
        fee: Fee,
        extras: TransactionExtras,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            amount,
            fee,
            extras,
        }
    }
}

/// 原像已生成
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreimageBuilt {
    transaction: UncompiledTransaction,
    preimages: Vec<Preimage>,
}

impl PreimageBuilt {
    pub(crate) fn new(transaction: UncompiledTransaction, preimages: Vec<Preimage>) -> Self {
        Self {
            transaction,
            preimages,
        }
    }

    pub fn transaction(&self) -> &UncompiledTransaction {
        &self.transaction
    }

    pub fn preimages(&self) -> &[Preimage] {
        &self.preimages
    }

    pub(crate) fn into_parts(self) -> (UncompiledTransaction, Vec<Preimage>) {
        (self.transaction, self.preimages)
    }
}

/// 已签名，可广播
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    transaction: UncompiledTransaction,
    signatures: Vec<Signature>,
    wire_bytes: Vec<u8>,
}

impl SignedTransaction {
    pub(crate) fn new(transaction: UncompiledTransaction, signatures: Vec<Signature>, wire_bytes: Vec<u8>) -> Self {
        Self {
            transaction,
            signatures,
            wire_bytes,
        }
    }

    pub fn transaction(&self) -> &UncompiledTransaction {
        &self.transaction
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn wire_bytes(&self) -> &[u8] {
        &self.wire_bytes
    }

    pub fn wire_hex(&self) -> String {
        hex::encode(&self.wire_bytes)
    }

    pub(crate) fn into_parts(self) -> (UncompiledTransaction, Vec<u8>) {
        (self.transaction, self.wire_bytes)
    }
}

/// 已提交
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub transaction: UncompiledTransaction,
    pub wire_bytes: Vec<u8>,
    pub tx_hash: String,
}

mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        hex::decode(String::deserialize(d)?).map_err(serde::de::Error::custom)
    }
}
