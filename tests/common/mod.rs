//! 测试辅助模块
//! 提供链配置、签名器和 JSON-RPC 模拟响应

#![allow(dead_code)]

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use ironcore_sdk::{
    domain::{ChainConfig, ChainRegistry, Preimage, PublicKey, Signature},
    error::SignerError,
    service::signing_coordinator::{Signer, SigningContext},
};
use k256::ecdsa::SigningKey;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use wiremock::ResponseTemplate;

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn chain(id: &str) -> ChainConfig {
    ChainRegistry::new()
        .get(id)
        .unwrap_or_else(|| panic!("chain {} not registered", id))
        .clone()
}

/// JSON-RPC 成功响应
pub fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

/// JSON-RPC 错误响应
pub fn rpc_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": code, "message": message } }))
}

/// 用固定私钥签名的 secp256k1 签名器（返回 r‖s）
pub struct LocalSecp256k1Signer {
    key: SigningKey,
}

impl LocalSecp256k1Signer {
    pub fn new(seed: u8) -> Arc<Self> {
        let key = SigningKey::from_slice(&[seed; 32]).expect("valid scalar");
        Arc::new(Self { key })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.key.verifying_key().to_sec1_bytes().to_vec())
    }
}

#[async_trait]
impl Signer for LocalSecp256k1Signer {
    async fn sign(&self, preimage: &Preimage, _context: &SigningContext) -> Result<Signature, SignerError> {
        let (signature, _recovery) = self
            .key
            .sign_prehash_recoverable(&preimage.bytes)
            .map_err(|e| SignerError::SignerUnavailable(e.to_string()))?;
        Ok(Signature::new(signature.to_bytes().to_vec()))
    }
}
