//! Domain 模块
//!
//! 纯数据模型：金额、手续费、公钥与地址、链配置、交易意图

pub mod address;
pub mod amount;
pub mod chain_config;
pub mod fee;
pub mod public_key;
pub mod transaction;
pub mod transaction_status;
pub mod unspent_output;

// 重新导出常用类型
pub use address::{Address, AddressStrategy, AddressStrategyFactory, AddressType};
pub use amount::{Amount, AmountKind, Token};
pub use chain_config::{
    AddressFormat, ChainConfig, ChainParams, ChainRegistry, CurveType, DustPolicy, ProtocolFamily,
    SighashScheme,
};
pub use fee::{Fee, FeeTiers, FixedFeeParams, GasSpeed};
pub use public_key::{DerivationInfo, PublicKey};
pub use transaction::{
    AlgorandExtras, ContractCall, EvmExtras, PendingReveal, Preimage, PreimageBuilt, PreimageKind,
    Signature, SignedTransaction, SolanaExtras, SubmittedTransaction, TokenEnvelope, TransactionExtras,
    UncompiledTransaction, UtxoExtras,
};
pub use transaction_status::TransactionStage;
pub use unspent_output::UnspentOutput;
