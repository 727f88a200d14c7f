//! UTXO 链两阶段代币转账流程
//!
//! 提交交易签名后先持久化待揭示记录再广播，揭示交易成功广播后删除记录。
//! 揭示失败（包括节点拒绝）记录都会保留，进程重启后可凭记录继续揭示（`resume`）。

use std::sync::Arc;

use super::{
    codec::{commit_reveal::CommitRevealCodec, TransactionCodec},
    coin_selection,
    signing_coordinator::{Signer, SigningContext, SigningCoordinator, Submitter},
};
use crate::{
    domain::transaction::{PendingReveal, SubmittedTransaction, UncompiledTransaction},
    error::{SdkResult, ValidationError},
    infrastructure::kv_store::{KeyValueStore, TypedStore},
};

/// 两笔交易的广播结果
#[derive(Debug, Clone)]
pub struct TokenTransferOutcome {
    pub commit: SubmittedTransaction,
    pub reveal: SubmittedTransaction,
}

pub struct TokenTransferFlow {
    codec: Arc<CommitRevealCodec>,
    coordinator: SigningCoordinator,
    records: TypedStore<PendingReveal>,
}

impl TokenTransferFlow {
    pub fn new(
        codec: CommitRevealCodec,
        signer: Arc<dyn Signer>,
        submitter: Arc<dyn Submitter>,
        context: SigningContext,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let codec = Arc::new(codec);
        let coordinator = SigningCoordinator::new(codec.clone() as Arc<dyn TransactionCodec>, signer, submitter, context);
        Self {
            codec,
            coordinator,
            records: TypedStore::new(store),
        }
    }

    pub fn coordinator(&self) -> &SigningCoordinator {
        &self.coordinator
    }

    /// 当前钱包未完成的揭示记录
    pub async fn pending(&self) -> SdkResult<Option<PendingReveal>> {
        self.records.load(&self.codec.store_key()?).await
    }

    /// 提交 + 揭示
    ///
    /// `UtxoExtras::unspent_outputs` 传入钱包的可花费输出，提交交易只花费选币选中的子集。
    /// 存在未完成的揭示记录时拒绝开始新的转账，需先 `resume`。
    pub async fn transfer(&self, mut commit: UncompiledTransaction) -> SdkResult<TokenTransferOutcome> {
        let key = self.codec.store_key()?;
        if self.records.load(&key).await?.is_some() {
            return Err(ValidationError::UnsupportedOperation(
                "a previous token transfer is waiting for its reveal; resume it first".into(),
            )
            .into());
        }

        let wallet = commit.extras.utxo()?.unspent_outputs.clone();
        coin_selection::fund_transaction(&mut commit, &wallet, &self.codec.utxo().chain().params)?;

        let built = self.coordinator.prepare(commit)?;
        let signatures = self.coordinator.sign(&built).await?;
        let pending = self.codec.pending_reveal(built.transaction(), &signatures)?;
        let signed = self.coordinator.assemble(built, signatures)?;

        self.records.save(&key, &pending).await?;
        let commit = match self.coordinator.submit(signed).await {
            Ok(submitted) => submitted,
            Err(e) if e.is_retryable() => {
                // 广播结果未知，保留记录等待恢复
                tracing::warn!(key = %key, error = %e, "commit broadcast outcome unknown, keeping pending reveal");
                return Err(e);
            }
            Err(e) => {
                self.discard(&key).await;
                return Err(e);
            }
        };
        tracing::info!(commit_tx = %commit.tx_hash, "commit transaction submitted, revealing");

        let reveal_tx = self.codec.reveal_transaction(&commit.transaction, pending);
        let reveal = self.reveal(reveal_tx, &key).await?;
        Ok(TokenTransferOutcome { commit, reveal })
    }

    /// 继续未完成的揭示；没有记录时返回 `None`
    pub async fn resume(&self, source: &str) -> SdkResult<Option<SubmittedTransaction>> {
        let key = self.codec.store_key()?;
        let Some(pending) = self.records.load(&key).await? else {
            return Ok(None);
        };
        let age = chrono::Utc::now() - pending.created_at;
        tracing::info!(
            commit_tx = %pending.commit_tx_id,
            age_secs = age.num_seconds(),
            "resuming pending reveal"
        );

        let reveal_tx = self.codec.resumed_reveal(source, pending);
        self.reveal(reveal_tx, &key).await.map(Some)
    }

    /// 放弃未完成的揭示，返回是否存在记录
    ///
    /// 记录里有揭示密钥，删除后提交输出只能靠其他途径找回，调用前应确认揭示已上链或不再需要。
    pub async fn abandon(&self) -> SdkResult<bool> {
        let key = self.codec.store_key()?;
        if self.records.load(&key).await?.is_none() {
            return Ok(false);
        }
        self.records.remove(&key).await?;
        tracing::warn!(key = %key, "pending reveal abandoned");
        Ok(true)
    }

    /// 只有揭示广播成功才删除记录；节点拒绝时记录保留，由调用方 `resume` 或 `abandon`
    async fn reveal(&self, transaction: UncompiledTransaction, key: &str) -> SdkResult<SubmittedTransaction> {
        let submitted = self.coordinator.execute(transaction).await.inspect_err(|e| {
            tracing::warn!(key, error = %e, retryable = e.is_retryable(), "reveal failed, keeping pending reveal");
        })?;
        self.discard(key).await;
        Ok(submitted)
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.records.remove(key).await {
            tracing::error!(key, error = %e, "failed to remove pending reveal");
        }
    }
}
