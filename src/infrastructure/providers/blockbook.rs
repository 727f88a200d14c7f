//! Blockbook 索引节点（UTXO 链）
//!
//! - `GET  /utxo/{address}`：未花费输出，只保留已确认的
//! - `GET  /address/{address}`：余额
//! - `POST /`：`estimatesmartfee` JSON-RPC
//! - `POST /sendtx/`：十六进制交易，`text/plain`

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{HttpTransport, NetworkProvider, ProviderDescriptor};
use crate::{
    domain::{
        address::BitcoinAddressStrategy, amount::base_units_to_decimal, chain_config::ChainConfig,
        unspent_output::UnspentOutput,
    },
    error::{SdkError, SdkResult},
};

#[async_trait]
pub trait UtxoNetworkProvider: NetworkProvider {
    async fn get_balance(&self, address: &str) -> SdkResult<Decimal>;

    /// 已确认的未花费输出，锁定脚本由地址推导
    async fn get_unspent_outputs(&self, address: &str) -> SdkResult<Vec<UnspentOutput>>;

    /// 预计 `target_blocks` 个区块内确认的费率（主币/KB）
    async fn get_fee_per_kb(&self, target_blocks: u32) -> SdkResult<Decimal>;
}

#[derive(Debug, Deserialize)]
struct UtxoItem {
    txid: String,
    vout: u32,
    value: String,
    #[serde(default)]
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    balance: String,
}

#[derive(Debug, Deserialize)]
struct FeeResult {
    feerate: Decimal,
}

#[derive(Debug, Deserialize)]
struct SendResult {
    result: String,
}

pub struct BlockbookProvider {
    http: HttpTransport,
    addresses: BitcoinAddressStrategy,
    decimals: u8,
}

impl BlockbookProvider {
    pub fn new(descriptor: &ProviderDescriptor, chain: &ChainConfig, timeout: Duration) -> SdkResult<Self> {
        let addresses = BitcoinAddressStrategy::from_format(&chain.address_format)
            .ok_or_else(|| SdkError::config(format!("blockbook does not serve chain {}", chain.id)))?;
        Ok(Self {
            http: HttpTransport::new(descriptor, timeout)?,
            addresses,
            decimals: chain.decimals,
        })
    }

    fn sats(&self, value: &str) -> SdkResult<Decimal> {
        let units: u128 = value
            .parse()
            .map_err(|_| self.http.malformed(format!("amount {:?}", value)))?;
        base_units_to_decimal(units, self.decimals).map_err(|e| self.http.malformed(e))
    }
}

#[async_trait]
impl NetworkProvider for BlockbookProvider {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn submit_transaction(&self, raw: &[u8]) -> SdkResult<String> {
        let body = self
            .http
            .post_raw("/sendtx/", hex::encode(raw).into_bytes(), "text/plain")
            .await?;
        let sent: SendResult = serde_json::from_str(&body).map_err(|e| self.http.malformed(e))?;
        Ok(sent.result)
    }
}

#[async_trait]
impl UtxoNetworkProvider for BlockbookProvider {
    async fn get_balance(&self, address: &str) -> SdkResult<Decimal> {
        let info: AddressInfo = self
            .http
            .get_json(&format!("/address/{}?details=basic", address))
            .await?;
        self.sats(&info.balance)
    }

    async fn get_unspent_outputs(&self, address: &str) -> SdkResult<Vec<UnspentOutput>> {
        let script = self.addresses.script_pubkey(address)?;
        let items: Vec<UtxoItem> = self.http.get_json(&format!("/utxo/{}", address)).await?;

        items
            .into_iter()
            // 未确认输出会阻塞发送
            .filter(|item| item.confirmations > 0)
            .map(|item| {
                let amount = self.sats(&item.value)?;
                Ok(UnspentOutput::new(item.txid, item.vout, amount, script.clone()))
            })
            .collect()
    }

    async fn get_fee_per_kb(&self, target_blocks: u32) -> SdkResult<Decimal> {
        let result: FeeResult = self
            .http
            .rpc("estimatesmartfee", vec![serde_json::json!(target_blocks)])
            .await?;
        if result.feerate <= Decimal::ZERO {
            return Err(self.http.malformed(format!("non-positive fee rate {}", result.feerate)));
        }
        Ok(result.feerate)
    }
}
