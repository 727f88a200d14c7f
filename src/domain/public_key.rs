//! 钱包公钥
//!
//! SDK 只持有公钥：种子公钥 + 可选的派生信息（派生路径、派生后的公钥、链码）。

use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// 派生信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationInfo {
    pub path: String,
    #[serde(with = "hex_bytes")]
    pub derived_key: Vec<u8>,
    #[serde(default, with = "hex_bytes_opt")]
    pub chain_code: Option<Vec<u8>>,
}

/// 钱包公钥（创建后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(with = "hex_bytes")]
    seed_key: Vec<u8>,
    derivation: Option<DerivationInfo>,
}

impl PublicKey {
    pub fn new(seed_key: Vec<u8>) -> Self {
        Self {
            seed_key,
            derivation: None,
        }
    }

    pub fn with_derivation(seed_key: Vec<u8>, derivation: DerivationInfo) -> Self {
        Self {
            seed_key,
            derivation: Some(derivation),
        }
    }

    /// 十六进制构造
    pub fn from_hex(hex_key: &str) -> Result<Self, ValidationError> {
        let bytes = hex::decode(hex_key.trim_start_matches("0x"))
            .map_err(|e| ValidationError::InvalidPublicKey(e.to_string()))?;
        Ok(Self::new(bytes))
    }

    pub fn seed_key(&self) -> &[u8] {
        &self.seed_key
    }

    pub fn derivation(&self) -> Option<&DerivationInfo> {
        self.derivation.as_ref()
    }

    /// 链上使用的公钥：有派生信息时取派生公钥
    pub fn blockchain_key(&self) -> &[u8] {
        self.derivation
            .as_ref()
            .map(|d| d.derived_key.as_slice())
            .unwrap_or(&self.seed_key)
    }

    /// secp256k1 验签公钥
    pub fn secp256k1_key(&self) -> Result<VerifyingKey, ValidationError> {
        VerifyingKey::from_sec1_bytes(self.blockchain_key())
            .map_err(|e| ValidationError::InvalidPublicKey(format!("secp256k1: {}", e)))
    }

    /// 33 字节压缩公钥
    pub fn compressed(&self) -> Result<Vec<u8>, ValidationError> {
        Ok(self
            .secp256k1_key()?
            .to_encoded_point(true)
            .as_bytes()
            .to_vec())
    }

    /// 65 字节非压缩公钥（0x04 前缀）
    pub fn uncompressed(&self) -> Result<Vec<u8>, ValidationError> {
        Ok(self
            .secp256k1_key()?
            .to_encoded_point(false)
            .as_bytes()
            .to_vec())
    }

    /// 32 字节 ed25519 公钥
    pub fn ed25519(&self) -> Result<[u8; 32], ValidationError> {
        let key = self.blockchain_key();
        <[u8; 32]>::try_from(key).map_err(|_| {
            ValidationError::InvalidPublicKey(format!("ed25519 key must be 32 bytes, got {}", key.len()))
        })
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

mod hex_bytes_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&hex::encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
