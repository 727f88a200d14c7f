pub mod codec;
pub mod coin_selection; // 选币
pub mod fee_estimation; // 手续费三档估算
pub mod signing_coordinator;
pub mod token_transfer; // UTXO 两阶段代币转账
