//! 未花费输出

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// UTXO 快照条目；选币只读不改
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// 交易哈希（大端十六进制，与浏览器显示一致）
    pub tx_hash: String,
    pub output_index: u32,
    /// 主币单位金额
    pub amount: Decimal,
    /// 锁定脚本
    #[serde(with = "hex_script")]
    pub script: Vec<u8>,
}

impl UnspentOutput {
    pub fn new(tx_hash: impl Into<String>, output_index: u32, amount: Decimal, script: Vec<u8>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            output_index,
            amount,
            script,
        }
    }

    /// 交易哈希的线路字节序（小端）
    pub fn outpoint_hash(&self) -> Result<[u8; 32], ValidationError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&self.tx_hash, &mut bytes)
            .map_err(|e| ValidationError::InvalidOutpoint(format!("{}: {}", self.tx_hash, e)))?;
        bytes.reverse();
        Ok(bytes)
    }
}

mod hex_script {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        hex::decode(String::deserialize(d)?).map_err(serde::de::Error::custom)
    }
}
