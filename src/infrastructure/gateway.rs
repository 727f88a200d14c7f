//! 多节点网关：同构节点列表上的粘性故障切换
//!
//! - 请求总是发往当前节点
//! - 可重试错误（超时、5xx、限流、响应解析失败）时游标前移并重试，单次调用最多尝试 `len` 次
//! - 终止错误立即返回
//! - 成功不重置游标，后续调用从最后成功的节点开始

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::providers::{
    AlgorandAccount, AlgorandNetworkProvider, AlgorandTransactionParams, EvmCallRequest, EvmNetworkProvider,
    FeeHistory, NetworkProvider, SolanaNetworkProvider, UtxoNetworkProvider,
};
use crate::{
    domain::unspent_output::UnspentOutput,
    error::{SdkError, SdkResult},
};

pub struct MultiProviderGateway<P: ?Sized> {
    providers: Vec<Arc<P>>,
    cursor: AtomicUsize,
}

impl<P: NetworkProvider + ?Sized> MultiProviderGateway<P> {
    /// 节点列表不能为空
    pub fn new(providers: Vec<Arc<P>>) -> SdkResult<Self> {
        if providers.is_empty() {
            return Err(SdkError::config("provider list is empty"));
        }
        Ok(Self {
            providers,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.cursor.load(Ordering::Acquire) % self.providers.len()
    }

    pub fn current(&self) -> &Arc<P> {
        &self.providers[self.current_index()]
    }

    /// 在当前节点上执行操作，可重试错误时切换节点
    pub async fn perform<T, F, Fut>(&self, operation: &str, op: F) -> SdkResult<T>
    where
        F: Fn(Arc<P>) -> Fut,
        Fut: Future<Output = SdkResult<T>>,
    {
        let len = self.providers.len();
        let mut last_error = None;

        for attempt in 0..len {
            let index = self.current_index();
            let provider = Arc::clone(&self.providers[index]);

            match op(Arc::clone(&provider)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    let next = (index + 1) % len;
                    tracing::warn!(
                        operation,
                        provider = %provider.base_url(),
                        next = %self.providers[next].base_url(),
                        attempt = attempt + 1,
                        error = %e,
                        "provider failed, switching"
                    );
                    // 其他并发调用已经切换过时不再前移
                    let _ = self
                        .cursor
                        .compare_exchange(index, next, Ordering::AcqRel, Ordering::Acquire);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(operation, providers = len, "all providers failed");
        Err(last_error.unwrap_or_else(|| SdkError::config("provider list is empty")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 网关即逻辑节点
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl<P: NetworkProvider + ?Sized + 'static> NetworkProvider for MultiProviderGateway<P> {
    fn base_url(&self) -> &str {
        self.current().base_url()
    }

    async fn submit_transaction(&self, raw: &[u8]) -> SdkResult<String> {
        self.perform("submit_transaction", |p| async move { p.submit_transaction(raw).await })
            .await
    }
}

#[async_trait]
impl<P: UtxoNetworkProvider + ?Sized + 'static> UtxoNetworkProvider for MultiProviderGateway<P> {
    async fn get_balance(&self, address: &str) -> SdkResult<Decimal> {
        self.perform("get_balance", |p| async move { p.get_balance(address).await })
            .await
    }

    async fn get_unspent_outputs(&self, address: &str) -> SdkResult<Vec<UnspentOutput>> {
        self.perform("get_unspent_outputs", |p| async move { p.get_unspent_outputs(address).await })
            .await
    }

    async fn get_fee_per_kb(&self, target_blocks: u32) -> SdkResult<Decimal> {
        self.perform("get_fee_per_kb", |p| async move { p.get_fee_per_kb(target_blocks).await })
            .await
    }
}

#[async_trait]
impl<P: EvmNetworkProvider + ?Sized + 'static> EvmNetworkProvider for MultiProviderGateway<P> {
    async fn get_balance(&self, address: &str) -> SdkResult<u128> {
        self.perform("get_balance", |p| async move { p.get_balance(address).await })
            .await
    }

    async fn get_transaction_count(&self, address: &str) -> SdkResult<u64> {
        self.perform("get_transaction_count", |p| async move { p.get_transaction_count(address).await })
            .await
    }

    async fn get_gas_price(&self) -> SdkResult<u128> {
        self.perform("get_gas_price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn estimate_gas(&self, call: &EvmCallRequest) -> SdkResult<u64> {
        self.perform("estimate_gas", |p| async move { p.estimate_gas(call).await })
            .await
    }

    async fn get_fee_history(&self) -> SdkResult<FeeHistory> {
        self.perform("get_fee_history", |p| async move { p.get_fee_history().await })
            .await
    }
}

#[async_trait]
impl<P: AlgorandNetworkProvider + ?Sized + 'static> AlgorandNetworkProvider for MultiProviderGateway<P> {
    async fn get_account(&self, address: &str) -> SdkResult<AlgorandAccount> {
        self.perform("get_account", |p| async move { p.get_account(address).await })
            .await
    }

    async fn get_transaction_params(&self) -> SdkResult<AlgorandTransactionParams> {
        self.perform("get_transaction_params", |p| async move { p.get_transaction_params().await })
            .await
    }
}

#[async_trait]
impl<P: SolanaNetworkProvider + ?Sized + 'static> SolanaNetworkProvider for MultiProviderGateway<P> {
    async fn get_balance(&self, address: &str) -> SdkResult<u64> {
        self.perform("get_balance", |p| async move { p.get_balance(address).await })
            .await
    }

    async fn get_latest_blockhash(&self) -> SdkResult<[u8; 32]> {
        self.perform("get_latest_blockhash", |p| async move { p.get_latest_blockhash().await })
            .await
    }

    async fn get_fee_for_message(&self, message: &[u8]) -> SdkResult<u64> {
        self.perform("get_fee_for_message", |p| async move { p.get_fee_for_message(message).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::error::NetworkError;

    #[derive(Clone, Copy)]
    enum Behavior {
        Ok,
        Timeout,
        Reject,
    }

    struct FakeProvider {
        url: String,
        behavior: Behavior,
        calls: AtomicU32,
    }

    impl FakeProvider {
        fn new(url: &str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                url: url.into(),
                behavior,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NetworkProvider for FakeProvider {
        fn base_url(&self) -> &str {
            &self.url
        }

        async fn submit_transaction(&self, _raw: &[u8]) -> SdkResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Ok => Ok(format!("hash-from-{}", self.url)),
                Behavior::Timeout => Err(NetworkError::retryable(&self.url, "timeout").into()),
                Behavior::Reject => Err(NetworkError::terminal(&self.url, "nonce too low").into()),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_list_rejected() {
        let result = MultiProviderGateway::<FakeProvider>::new(vec![]);
        assert!(matches!(result, Err(SdkError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_sticky_failover() {
        let a = FakeProvider::new("a", Behavior::Timeout);
        let b = FakeProvider::new("b", Behavior::Ok);
        let c = FakeProvider::new("c", Behavior::Ok);
        let gateway = MultiProviderGateway::new(vec![a.clone(), b.clone(), c.clone()]).unwrap();

        assert_eq!(gateway.submit_transaction(b"tx").await.unwrap(), "hash-from-b");
        assert_eq!(gateway.current_index(), 1);

        // 第二次调用直接从 b 开始
        assert_eq!(gateway.submit_transaction(b"tx").await.unwrap(), "hash-from-b");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 2);
        assert_eq!(c.calls(), 0);
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let a = FakeProvider::new("a", Behavior::Reject);
        let b = FakeProvider::new("b", Behavior::Ok);
        let gateway = MultiProviderGateway::new(vec![a.clone(), b.clone()]).unwrap();

        let err = gateway.submit_transaction(b"tx").await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(b.calls(), 0);
        assert_eq!(gateway.current_index(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_bounded() {
        let providers: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|url| FakeProvider::new(url, Behavior::Timeout))
            .collect();
        let gateway = MultiProviderGateway::new(providers.clone()).unwrap();

        let err = gateway.submit_transaction(b"tx").await.unwrap_err();
        assert!(err.is_retryable());
        // 每个节点恰好一次，最后一个错误来自 c
        assert!(providers.iter().all(|p| p.calls() == 1));
        assert!(err.to_string().contains("[c]"));
    }

    #[tokio::test]
    async fn test_wraps_around() {
        let a = FakeProvider::new("a", Behavior::Ok);
        let b = FakeProvider::new("b", Behavior::Timeout);
        let gateway = MultiProviderGateway::new(vec![a.clone(), b.clone()]).unwrap();
        gateway.cursor.store(1, Ordering::SeqCst);

        assert_eq!(gateway.submit_transaction(b"tx").await.unwrap(), "hash-from-a");
        assert_eq!(gateway.current_index(), 0);
    }
}
