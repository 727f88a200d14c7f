//! 签名协调器
//!
//! 只负责按顺序驱动四个阶段：
//! 1. 编解码器生成原像
//! 2. 外部签名器逐个签名（失败即终止，不重试）
//! 3. 编解码器拼装线路字节
//! 4. 交给提交方广播（重试由网关负责）
//!
//! 阶段之间检查取消令牌；签名等待期间也可被取消。

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::codec::TransactionCodec;
use crate::{
    domain::{
        public_key::PublicKey,
        transaction::{Preimage, PreimageBuilt, Signature, SignedTransaction, SubmittedTransaction, UncompiledTransaction},
        transaction_status::TransactionStage,
    },
    error::{SdkError, SdkResult, SignerError, ValidationError},
    infrastructure::providers::NetworkProvider,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 协作方
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 签名时交给签名器的上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningContext {
    pub chain_id: String,
    pub public_key: PublicKey,
}

impl SigningContext {
    pub fn new(chain_id: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            chain_id: chain_id.into(),
            public_key,
        }
    }
}

/// 外部签名器（硬件卡片、远程签名服务等），可能很慢或需要用户交互
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, preimage: &Preimage, context: &SigningContext) -> Result<Signature, SignerError>;

    /// 依次签名，任一失败则整体失败
    async fn sign_many(&self, preimages: &[Preimage], context: &SigningContext) -> Result<Vec<Signature>, SignerError> {
        let mut signatures = Vec::with_capacity(preimages.len());
        for preimage in preimages {
            signatures.push(self.sign(preimage, context).await?);
        }
        Ok(signatures)
    }
}

/// 广播线路字节，返回交易哈希
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, wire: &[u8]) -> SdkResult<String>;
}

/// 任何节点（包括多节点网关）都可以直接作为提交方
#[async_trait]
impl<T: NetworkProvider + ?Sized> Submitter for T {
    async fn submit(&self, wire: &[u8]) -> SdkResult<String> {
        self.submit_transaction(wire).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 协调器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct SigningCoordinator {
    codec: Arc<dyn TransactionCodec>,
    signer: Arc<dyn Signer>,
    submitter: Arc<dyn Submitter>,
    context: SigningContext,
    cancel: CancellationToken,
}

impl SigningCoordinator {
    pub fn new(
        codec: Arc<dyn TransactionCodec>,
        signer: Arc<dyn Signer>,
        submitter: Arc<dyn Submitter>,
        context: SigningContext,
    ) -> Self {
        Self {
            codec,
            signer,
            submitter,
            context,
            cancel: CancellationToken::new(),
        }
    }

    /// 使用外部取消令牌（可与其他任务共享）
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn context(&self) -> &SigningContext {
        &self.context
    }

    /// 未编译 → 已生成原像
    pub fn prepare(&self, transaction: UncompiledTransaction) -> SdkResult<PreimageBuilt> {
        self.checkpoint(TransactionStage::Uncompiled)?;
        let preimages = self
            .codec
            .build_for_sign(&transaction)
            .inspect_err(|e| self.failed(TransactionStage::Uncompiled, e))?;
        if preimages.is_empty() {
            let err: SdkError = ValidationError::UnsupportedOperation("codec produced no preimages".into()).into();
            self.failed(TransactionStage::Uncompiled, &err);
            return Err(err);
        }

        self.advance(TransactionStage::Uncompiled, TransactionStage::PreimageBuilt);
        tracing::debug!(chain = %self.context.chain_id, preimages = preimages.len(), "preimages built");
        Ok(PreimageBuilt::new(transaction, preimages))
    }

    /// 请求外部签名
    ///
    /// 进行中的签名请求不会被打断，签名期间的取消在下一个阶段边界（组装）生效。
    pub async fn sign(&self, built: &PreimageBuilt) -> SdkResult<Vec<Signature>> {
        self.checkpoint(TransactionStage::PreimageBuilt)?;

        let signatures = self
            .signer
            .sign_many(built.preimages(), &self.context)
            .await
            .map_err(|e| {
                let err = SdkError::from(e);
                self.failed(TransactionStage::PreimageBuilt, &err);
                err
            })?;

        if signatures.len() != built.preimages().len() {
            let err: SdkError = ValidationError::InvalidSignature(format!(
                "signer returned {} signatures for {} preimages",
                signatures.len(),
                built.preimages().len()
            ))
            .into();
            self.failed(TransactionStage::PreimageBuilt, &err);
            return Err(err);
        }
        Ok(signatures)
    }

    /// 已生成原像 + 签名 → 已签名
    pub fn assemble(&self, built: PreimageBuilt, signatures: Vec<Signature>) -> SdkResult<SignedTransaction> {
        self.checkpoint(TransactionStage::PreimageBuilt)?;
        let (transaction, preimages) = built.into_parts();
        let wire = self
            .codec
            .build_for_send(&transaction, &signatures, &preimages)
            .inspect_err(|e| self.failed(TransactionStage::PreimageBuilt, e))?;

        self.advance(TransactionStage::PreimageBuilt, TransactionStage::Signed);
        Ok(SignedTransaction::new(transaction, signatures, wire))
    }

    /// 已签名 → 已提交
    pub async fn submit(&self, signed: SignedTransaction) -> SdkResult<SubmittedTransaction> {
        self.checkpoint(TransactionStage::Signed)?;
        let (transaction, wire_bytes) = signed.into_parts();

        let tx_hash = self
            .submitter
            .submit(&wire_bytes)
            .await
            .inspect_err(|e| self.failed(TransactionStage::Signed, e))?;

        self.advance(TransactionStage::Signed, TransactionStage::Submitted);
        tracing::info!(chain = %self.context.chain_id, tx_hash = %tx_hash, "transaction submitted");
        Ok(SubmittedTransaction {
            transaction,
            wire_bytes,
            tx_hash,
        })
    }

    /// 签名并组装，不广播
    pub async fn sign_and_assemble(&self, transaction: UncompiledTransaction) -> SdkResult<SignedTransaction> {
        let built = self.prepare(transaction)?;
        let signatures = self.sign(&built).await?;
        self.assemble(built, signatures)
    }

    /// 完整流程
    pub async fn execute(&self, transaction: UncompiledTransaction) -> SdkResult<SubmittedTransaction> {
        let signed = self.sign_and_assemble(transaction).await?;
        self.submit(signed).await
    }

    fn checkpoint(&self, stage: TransactionStage) -> SdkResult<()> {
        if self.cancel.is_cancelled() {
            self.cancelled(stage);
            return Err(SdkError::Cancelled);
        }
        Ok(())
    }

    fn advance(&self, from: TransactionStage, to: TransactionStage) {
        debug_assert!(from.can_transition_to(&to));
        tracing::info!(chain = %self.context.chain_id, from = %from, to = %to, "transaction stage");
    }

    fn cancelled(&self, stage: TransactionStage) {
        tracing::info!(
            chain = %self.context.chain_id,
            from = %stage,
            to = %TransactionStage::Cancelled,
            "transaction stage"
        );
    }

    fn failed(&self, stage: TransactionStage, error: &SdkError) {
        tracing::warn!(
            chain = %self.context.chain_id,
            from = %stage,
            to = %TransactionStage::Failed,
            error = %error,
            "transaction stage"
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 批量
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 并发执行各链互不依赖的任务，结果按链 ID 归集
///
/// 同一链 ID 出现多次时保留最后完成的结果。
pub async fn fan_out_by_chain<T, Fut>(tasks: impl IntoIterator<Item = (String, Fut)>) -> HashMap<String, SdkResult<T>>
where
    Fut: Future<Output = SdkResult<T>>,
{
    let futures: Vec<_> = tasks
        .into_iter()
        .map(|(chain, task)| async move { (chain, task.await) })
        .collect();

    futures::future::join_all(futures).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use rust_decimal::Decimal;

    use super::*;
    use crate::{
        domain::{
            amount::Amount,
            chain_config::ProtocolFamily,
            fee::Fee,
            transaction::TransactionExtras,
        },
        error::NetworkError,
    };

    /// 每个字节一个原像，线路字节为签名拼接
    struct EchoCodec;

    impl TransactionCodec for EchoCodec {
        fn family(&self) -> ProtocolFamily {
            ProtocolFamily::Evm
        }

        fn build_for_sign(&self, transaction: &UncompiledTransaction) -> SdkResult<Vec<Preimage>> {
            Ok(transaction
                .source
                .bytes()
                .map(|b| Preimage::message(vec![b]))
                .collect())
        }

        fn build_for_send(
            &self,
            _transaction: &UncompiledTransaction,
            signatures: &[Signature],
            _preimages: &[Preimage],
        ) -> SdkResult<Vec<u8>> {
            Ok(signatures.iter().flat_map(|s| s.as_bytes().to_vec()).collect())
        }
    }

    struct FakeSigner {
        calls: AtomicU32,
        reject: bool,
    }

    #[async_trait]
    impl Signer for FakeSigner {
        async fn sign(&self, preimage: &Preimage, _context: &SigningContext) -> Result<Signature, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(SignerError::UserCancelled);
            }
            Ok(Signature::new(preimage.bytes.iter().map(|b| b + 1).collect()))
        }
    }

    /// 签名途中触发取消
    struct CancellingSigner {
        token: CancellationToken,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Signer for CancellingSigner {
        async fn sign(&self, preimage: &Preimage, _context: &SigningContext) -> Result<Signature, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.token.cancel();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(Signature::new(preimage.bytes.clone()))
        }
    }

    struct FakeNode {
        fail: bool,
    }

    #[async_trait]
    impl NetworkProvider for FakeNode {
        fn base_url(&self) -> &str {
            "fake"
        }

        async fn submit_transaction(&self, raw: &[u8]) -> SdkResult<String> {
            if self.fail {
                return Err(NetworkError::terminal("fake", "nonce too low").into());
            }
            Ok(hex::encode(raw))
        }
    }

    fn intent(source: &str) -> UncompiledTransaction {
        let amount = Amount::coin(Decimal::ONE, "ETH", 18);
        UncompiledTransaction::new(source, "b", amount.clone(), Fee::Common(amount), TransactionExtras::None)
    }

    fn coordinator(signer: Arc<dyn Signer>, fail_submit: bool) -> SigningCoordinator {
        SigningCoordinator::new(
            Arc::new(EchoCodec),
            signer,
            Arc::new(FakeNode { fail: fail_submit }),
            SigningContext::new("ethereum", PublicKey::new(vec![2; 33])),
        )
    }

    fn signer(reject: bool) -> Arc<FakeSigner> {
        Arc::new(FakeSigner {
            calls: AtomicU32::new(0),
            reject,
        })
    }

    #[tokio::test]
    async fn test_execute_all_stages() {
        let signer = signer(false);
        let submitted = coordinator(signer.clone(), false)
            .execute(intent("\x01\x02\x03"))
            .await
            .unwrap();
        assert_eq!(submitted.wire_bytes, vec![2, 3, 4]);
        assert_eq!(submitted.tx_hash, "020304");
        assert_eq!(signer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_signer_failure_is_not_retried() {
        let signer = signer(true);
        let err = coordinator(signer.clone(), false)
            .execute(intent("\x01\x02"))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Signer(SignerError::UserCancelled)));
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_prepare() {
        let coordinator = coordinator(signer(false), false);
        coordinator.cancellation_token().cancel();
        assert!(matches!(coordinator.prepare(intent("\x01")), Err(SdkError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_while_signing_takes_effect_at_assembly() {
        let token = CancellationToken::new();
        let signer = Arc::new(CancellingSigner {
            token: token.clone(),
            calls: AtomicU32::new(0),
        });
        let coordinator = coordinator(signer.clone(), false).with_cancellation(token.clone());
        let built = coordinator.prepare(intent("\x01\x02")).unwrap();

        // 签名请求跑完，不在中途丢弃
        let signatures = coordinator.sign(&built).await.unwrap();
        assert_eq!(signatures.len(), 2);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
        assert!(token.is_cancelled());

        assert!(matches!(
            coordinator.assemble(built, signatures),
            Err(SdkError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_submit_error_surfaces() {
        let err = coordinator(signer(false), true)
            .execute(intent("\x01"))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_preimages_rejected() {
        let err = coordinator(signer(false), false).prepare(intent("")).unwrap_err();
        assert!(matches!(err, SdkError::Validation(_)));
    }

    #[tokio::test]
    async fn test_fan_out_by_chain() {
        let tasks = vec![
            ("bitcoin".to_string(), futures::future::ready(Ok::<_, SdkError>(1))),
            ("ethereum".to_string(), futures::future::ready(Err(SdkError::Cancelled))),
        ];
        let results = fan_out_by_chain(tasks).await;
        assert_eq!(results.len(), 2);
        assert_eq!(*results["bitcoin"].as_ref().unwrap(), 1);
        assert!(results["ethereum"].is_err());
    }
}
