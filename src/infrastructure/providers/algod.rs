//! Algorand algod 节点

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;

use super::{HttpTransport, NetworkProvider, ProviderDescriptor};
use crate::{domain::transaction::AlgorandExtras, error::SdkResult};

/// 交易有效轮次窗口
pub const VALIDITY_WINDOW: u64 = 1000;

/// 建交易所需的网络参数（微 Algo）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorandTransactionParams {
    /// 每字节费率，拥堵时大于 0
    pub fee_per_byte: u64,
    pub min_fee: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
    pub last_round: u64,
}

impl AlgorandTransactionParams {
    /// 有效期 `[last_round, last_round + 1000]`
    pub fn extras(&self, note: Option<Vec<u8>>) -> AlgorandExtras {
        AlgorandExtras {
            genesis_id: self.genesis_id.clone(),
            genesis_hash: self.genesis_hash,
            first_round: self.last_round,
            last_round: self.last_round + VALIDITY_WINDOW,
            note,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorandAccount {
    pub amount: u64,
    /// 账户必须保留的最低余额
    pub min_balance: u64,
}

#[async_trait]
pub trait AlgorandNetworkProvider: NetworkProvider {
    async fn get_account(&self, address: &str) -> SdkResult<AlgorandAccount>;

    async fn get_transaction_params(&self) -> SdkResult<AlgorandTransactionParams>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ParamsResponse {
    fee: u64,
    min_fee: u64,
    genesis_id: String,
    genesis_hash: String,
    last_round: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AccountResponse {
    amount: u64,
    #[serde(default)]
    min_balance: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    tx_id: String,
}

pub struct AlgodProvider {
    http: HttpTransport,
}

impl AlgodProvider {
    pub fn new(descriptor: &ProviderDescriptor, timeout: Duration) -> SdkResult<Self> {
        Ok(Self {
            http: HttpTransport::new(descriptor, timeout)?,
        })
    }
}

#[async_trait]
impl NetworkProvider for AlgodProvider {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn submit_transaction(&self, raw: &[u8]) -> SdkResult<String> {
        let body = self
            .http
            .post_raw("/v2/transactions", raw.to_vec(), "application/x-binary")
            .await?;
        let submitted: SubmitResponse = serde_json::from_str(&body).map_err(|e| self.http.malformed(e))?;
        Ok(submitted.tx_id)
    }
}

#[async_trait]
impl AlgorandNetworkProvider for AlgodProvider {
    async fn get_account(&self, address: &str) -> SdkResult<AlgorandAccount> {
        let account: AccountResponse = self.http.get_json(&format!("/v2/accounts/{}", address)).await?;
        Ok(AlgorandAccount {
            amount: account.amount,
            min_balance: account.min_balance,
        })
    }

    async fn get_transaction_params(&self) -> SdkResult<AlgorandTransactionParams> {
        let params: ParamsResponse = self.http.get_json("/v2/transactions/params").await?;

        let hash = STANDARD
            .decode(&params.genesis_hash)
            .map_err(|e| self.http.malformed(format!("genesis hash: {}", e)))?;
        let genesis_hash: [u8; 32] = hash
            .try_into()
            .map_err(|_| self.http.malformed("genesis hash is not 32 bytes"))?;

        Ok(AlgorandTransactionParams {
            fee_per_byte: params.fee,
            min_fee: params.min_fee,
            genesis_id: params.genesis_id,
            genesis_hash,
            last_round: params.last_round,
        })
    }
}
