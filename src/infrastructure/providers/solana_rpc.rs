//! Solana JSON-RPC 节点

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;

use super::{HttpTransport, NetworkProvider, ProviderDescriptor};
use crate::error::SdkResult;

const COMMITMENT: &str = "confirmed";

#[async_trait]
pub trait SolanaNetworkProvider: NetworkProvider {
    /// 余额（lamports）
    async fn get_balance(&self, address: &str) -> SdkResult<u64>;

    async fn get_latest_blockhash(&self) -> SdkResult<[u8; 32]>;

    /// 消息的网络手续费（lamports）
    async fn get_fee_for_message(&self, message: &[u8]) -> SdkResult<u64>;
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct BlockhashValue {
    blockhash: String,
}

/// 线路字节 → RPC 提交使用的 base64
pub fn encode_base64(wire: &[u8]) -> String {
    STANDARD.encode(wire)
}

/// 线路字节 → 旧版 RPC 使用的 base58
pub fn encode_base58(wire: &[u8]) -> String {
    bs58::encode(wire).into_string()
}

pub struct SolanaRpcProvider {
    http: HttpTransport,
}

impl SolanaRpcProvider {
    pub fn new(descriptor: &ProviderDescriptor, timeout: Duration) -> SdkResult<Self> {
        Ok(Self {
            http: HttpTransport::new(descriptor, timeout)?,
        })
    }
}

#[async_trait]
impl NetworkProvider for SolanaRpcProvider {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn submit_transaction(&self, raw: &[u8]) -> SdkResult<String> {
        self.http
            .rpc(
                "sendTransaction",
                vec![
                    json!(encode_base64(raw)),
                    json!({ "encoding": "base64", "preflightCommitment": COMMITMENT }),
                ],
            )
            .await
    }
}

#[async_trait]
impl SolanaNetworkProvider for SolanaRpcProvider {
    async fn get_balance(&self, address: &str) -> SdkResult<u64> {
        let balance: WithContext<u64> = self
            .http
            .rpc("getBalance", vec![json!(address), json!({ "commitment": COMMITMENT })])
            .await?;
        Ok(balance.value)
    }

    async fn get_latest_blockhash(&self) -> SdkResult<[u8; 32]> {
        let latest: WithContext<BlockhashValue> = self
            .http
            .rpc("getLatestBlockhash", vec![json!({ "commitment": COMMITMENT })])
            .await?;

        let bytes = bs58::decode(&latest.value.blockhash)
            .into_vec()
            .map_err(|e| self.http.malformed(format!("blockhash: {}", e)))?;
        bytes
            .try_into()
            .map_err(|_| self.http.malformed("blockhash is not 32 bytes"))
    }

    async fn get_fee_for_message(&self, message: &[u8]) -> SdkResult<u64> {
        let fee: WithContext<Option<u64>> = self
            .http
            .rpc(
                "getFeeForMessage",
                vec![json!(encode_base64(message)), json!({ "commitment": COMMITMENT })],
            )
            .await?;
        // 区块哈希过期时节点返回 null
        fee.value
            .ok_or_else(|| self.http.malformed("fee unavailable for message"))
    }
}
