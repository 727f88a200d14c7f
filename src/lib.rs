//! IronCore SDK - 多链钱包交易核心
//!
//! 非托管模式：SDK 只持有公钥，签名交给外部签名器

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use config::SdkConfig;
pub use error::{SdkError, SdkResult};

// 统一模块导出
pub mod prelude {
    pub use crate::{
        config::{LoggingConfig, NetworkConfig, SdkConfig},
        domain::{
            Address, AddressStrategy, AddressStrategyFactory, Amount, AmountKind, ChainConfig, ChainParams,
            ChainRegistry, Fee, FeeTiers, GasSpeed, ProtocolFamily, PublicKey, Signature, Token, TransactionExtras,
            TransactionStage, UncompiledTransaction, UnspentOutput,
        },
        error::{ErrorCategory, NetworkError, SdkError, SdkResult, SignerError, ValidationError},
        infrastructure::{
            gateway::MultiProviderGateway,
            kv_store::{FileStore, InMemoryStore, KeyValueStore, TypedStore},
            providers::{NetworkProvider, ProviderDescriptor},
        },
        service::{
            codec::{CodecFactory, TransactionCodec},
            signing_coordinator::{Signer, SigningContext, SigningCoordinator, Submitter},
        },
    };
}
