//! EVM JSON-RPC 节点

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_hex_u128, to_hex_quantity, HttpTransport, NetworkProvider, ProviderDescriptor};
use crate::error::SdkResult;

/// 最近 5 个区块（约一分钟）
pub const FEE_HISTORY_BLOCKS: u64 = 5;
/// 奖励分位数，对应 [slow, normal, fast]
pub const FEE_HISTORY_PERCENTILES: [u8; 3] = [25, 50, 75];

/// `eth_estimateGas` 请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvmCallRequest {
    pub from: String,
    pub to: String,
    pub value: Option<u128>,
    pub data: Option<Vec<u8>>,
}

impl EvmCallRequest {
    fn to_json(&self) -> Value {
        let mut call = json!({ "from": self.from, "to": self.to });
        if let Some(value) = self.value {
            call["value"] = json!(to_hex_quantity(value));
        }
        if let Some(data) = &self.data {
            call["data"] = json!(format!("0x{}", hex::encode(data)));
        }
        call
    }
}

/// `eth_feeHistory` 结果（wei）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeHistory {
    /// 比请求区块多一个，最后一项为待出块的基础费
    pub base_fee_per_gas: Vec<u128>,
    /// 每区块一行，每列对应一个分位数
    pub reward: Vec<Vec<u128>>,
}

impl FeeHistory {
    pub fn pending_base_fee(&self) -> Option<u128> {
        self.base_fee_per_gas.last().copied().filter(|fee| *fee > 0)
    }
}

#[async_trait]
pub trait EvmNetworkProvider: NetworkProvider {
    async fn get_balance(&self, address: &str) -> SdkResult<u128>;

    /// 含待打包交易的 nonce
    async fn get_transaction_count(&self, address: &str) -> SdkResult<u64>;

    async fn get_gas_price(&self) -> SdkResult<u128>;

    async fn estimate_gas(&self, call: &EvmCallRequest) -> SdkResult<u64>;

    async fn get_fee_history(&self) -> SdkResult<FeeHistory>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeHistoryResponse {
    #[serde(default)]
    base_fee_per_gas: Vec<String>,
    #[serde(default)]
    reward: Vec<Vec<String>>,
}

pub struct EvmJsonRpcProvider {
    http: HttpTransport,
}

impl EvmJsonRpcProvider {
    pub fn new(descriptor: &ProviderDescriptor, timeout: Duration) -> SdkResult<Self> {
        Ok(Self {
            http: HttpTransport::new(descriptor, timeout)?,
        })
    }

    async fn quantity(&self, method: &str, params: Vec<Value>) -> SdkResult<u128> {
        let hex: String = self.http.rpc(method, params).await?;
        parse_hex_u128(&hex).ok_or_else(|| self.http.malformed(format!("{} returned {:?}", method, hex)))
    }

    fn narrow(&self, value: u128, what: &str) -> SdkResult<u64> {
        u64::try_from(value).map_err(|_| self.http.malformed(format!("{} {} exceeds u64", what, value)))
    }

    fn quantities(&self, values: &[String]) -> SdkResult<Vec<u128>> {
        values
            .iter()
            .map(|hex| parse_hex_u128(hex).ok_or_else(|| self.http.malformed(format!("fee history value {:?}", hex))))
            .collect()
    }
}

#[async_trait]
impl NetworkProvider for EvmJsonRpcProvider {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn submit_transaction(&self, raw: &[u8]) -> SdkResult<String> {
        self.http
            .rpc("eth_sendRawTransaction", vec![json!(format!("0x{}", hex::encode(raw)))])
            .await
    }
}

#[async_trait]
impl EvmNetworkProvider for EvmJsonRpcProvider {
    async fn get_balance(&self, address: &str) -> SdkResult<u128> {
        self.quantity("eth_getBalance", vec![json!(address), json!("latest")]).await
    }

    async fn get_transaction_count(&self, address: &str) -> SdkResult<u64> {
        let count = self
            .quantity("eth_getTransactionCount", vec![json!(address), json!("pending")])
            .await?;
        self.narrow(count, "nonce")
    }

    async fn get_gas_price(&self) -> SdkResult<u128> {
        self.quantity("eth_gasPrice", vec![]).await
    }

    async fn estimate_gas(&self, call: &EvmCallRequest) -> SdkResult<u64> {
        let gas = self.quantity("eth_estimateGas", vec![call.to_json()]).await?;
        self.narrow(gas, "gas")
    }

    async fn get_fee_history(&self) -> SdkResult<FeeHistory> {
        let response: FeeHistoryResponse = self
            .http
            .rpc(
                "eth_feeHistory",
                vec![
                    json!(FEE_HISTORY_BLOCKS),
                    json!("latest"),
                    json!(FEE_HISTORY_PERCENTILES),
                ],
            )
            .await?;

        Ok(FeeHistory {
            base_fee_per_gas: self.quantities(&response.base_fee_per_gas)?,
            reward: response
                .reward
                .iter()
                .map(|row| self.quantities(row))
                .collect::<SdkResult<_>>()?,
        })
    }
}
