//! 编解码器工厂：按协议族选择实现

use std::sync::Arc;

use super::{
    algorand::AlgorandCodec, commit_reveal::CommitRevealCodec, evm::EvmCodec, solana::SolanaCodec,
    utxo::UtxoCodec, TransactionCodec,
};
use crate::{
    domain::{
        chain_config::{ChainConfig, ChainParams, ProtocolFamily},
        public_key::PublicKey,
        transaction::{Preimage, Signature, UncompiledTransaction},
    },
    error::{SdkResult, ValidationError},
};

/// UTXO 链上代币转账默认使用的铭文协议
pub const DEFAULT_TOKEN_PROTOCOL: &str = "brc-20";

pub struct CodecFactory;

impl CodecFactory {
    /// 创建编解码器，`params` 覆盖注册表中的链参数
    pub fn create(chain: &ChainConfig, key: PublicKey, params: &ChainParams) -> SdkResult<Arc<dyn TransactionCodec>> {
        let mut chain = chain.clone();
        chain.params = params.clone();
        let chain_id = chain.id.clone();

        let family = chain.family;
        let codec: Arc<dyn TransactionCodec> = match family {
            ProtocolFamily::Utxo => Arc::new(UtxoFamilyCodec::new(chain, key)?),
            ProtocolFamily::Evm => Arc::new(EvmCodec::new(chain, &key)?),
            ProtocolFamily::Algorand => Arc::new(AlgorandCodec::new(chain, &key)?),
            ProtocolFamily::Solana => Arc::new(SolanaCodec::new(chain, &key)?),
            ProtocolFamily::Substrate => {
                return Err(ValidationError::UnsupportedOperation(format!(
                    "chain {} supports addresses only",
                    chain_id
                ))
                .into())
            }
        };
        tracing::debug!(chain = %chain_id, family = ?codec.family(), "codec created");
        Ok(codec)
    }

    /// 使用注册表默认参数
    pub fn for_chain(chain: &ChainConfig, key: PublicKey) -> SdkResult<Arc<dyn TransactionCodec>> {
        Self::create(chain, key, &chain.params)
    }

    /// 两阶段代币转账编解码器
    pub fn commit_reveal(chain: &ChainConfig, key: PublicKey, params: &ChainParams) -> SdkResult<CommitRevealCodec> {
        let mut chain = chain.clone();
        chain.params = params.clone();
        CommitRevealCodec::new(UtxoCodec::new(chain, key)?, DEFAULT_TOKEN_PROTOCOL)
    }
}

/// UTXO 族：原生币走普通编码，代币金额与揭示交易走提交/揭示编码
pub struct UtxoFamilyCodec {
    coin: UtxoCodec,
    tokens: Option<CommitRevealCodec>,
}

impl UtxoFamilyCodec {
    pub fn new(chain: ChainConfig, key: PublicKey) -> SdkResult<Self> {
        let coin = UtxoCodec::new(chain, key)?;
        // 粉尘阈值为零的链不支持两阶段转账
        let tokens = CommitRevealCodec::new(coin.clone(), DEFAULT_TOKEN_PROTOCOL).ok();
        Ok(Self { coin, tokens })
    }

    fn route(&self, transaction: &UncompiledTransaction) -> SdkResult<&dyn TransactionCodec> {
        if !transaction.amount.is_token() && transaction.extras.reveal().is_none() {
            return Ok(&self.coin as &dyn TransactionCodec);
        }
        match &self.tokens {
            Some(codec) => Ok(codec as &dyn TransactionCodec),
            None => Err(ValidationError::UnsupportedOperation(format!(
                "chain {} does not support token transfers",
                self.coin.chain().id
            ))
            .into()),
        }
    }
}

impl TransactionCodec for UtxoFamilyCodec {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Utxo
    }

    fn build_for_sign(&self, transaction: &UncompiledTransaction) -> SdkResult<Vec<Preimage>> {
        self.route(transaction)?.build_for_sign(transaction)
    }

    fn build_for_send(
        &self,
        transaction: &UncompiledTransaction,
        signatures: &[Signature],
        preimages: &[Preimage],
    ) -> SdkResult<Vec<u8>> {
        self.route(transaction)?.build_for_send(transaction, signatures, preimages)
    }
}
