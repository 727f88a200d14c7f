//! 手续费模型
//!
//! 每个协议族的手续费形态不同，统一为一个带标签的枚举，由手续费估算产生、编解码器消费。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::Amount;

/// 手续费速度档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasSpeed {
    Slow,   // 慢速
    Normal, // 正常
    Fast,   // 快速
}

impl GasSpeed {
    pub const ALL: [GasSpeed; 3] = [GasSpeed::Slow, GasSpeed::Normal, GasSpeed::Fast];

    /// 档位下标，对应 [slow, normal, fast] 配置数组
    pub fn index(self) -> usize {
        match self {
            Self::Slow => 0,
            Self::Normal => 1,
            Self::Fast => 2,
        }
    }
}

/// 定额手续费的附加参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedFeeParams {
    /// 网络要求的最低手续费
    pub minimum: Option<Decimal>,
    /// 协议规定的手续费上限
    pub ceiling: Option<Decimal>,
}

/// 协议相关的手续费
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fee {
    /// 单一金额
    Common(Amount),

    /// UTXO：按 KB 计费
    UtxoPerKb { amount: Amount, fee_per_kb: Amount },

    /// EVM 传统 gasPrice
    EvmLegacy {
        amount: Amount,
        gas_limit: u64,
        gas_price: u128,
    },

    /// EVM EIP-1559
    Evm1559 {
        amount: Amount,
        gas_limit: u64,
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },

    /// 账户模型链的定额/估算手续费
    AccountFixed { amount: Amount, params: FixedFeeParams },

    /// 两阶段 UTXO 交易：总额（提交 + 揭示）及其中的揭示部分
    CommitReveal { amount: Amount, reveal_fee: Amount },
}

impl Fee {
    /// 总手续费金额
    pub fn amount(&self) -> &Amount {
        match self {
            Self::Common(amount) => amount,
            Self::UtxoPerKb { amount, .. }
            | Self::EvmLegacy { amount, .. }
            | Self::Evm1559 { amount, .. }
            | Self::AccountFixed { amount, .. }
            | Self::CommitReveal { amount, .. } => amount,
        }
    }

    pub fn gas_limit(&self) -> Option<u64> {
        match self {
            Self::EvmLegacy { gas_limit, .. } | Self::Evm1559 { gas_limit, .. } => Some(*gas_limit),
            _ => None,
        }
    }
}

/// 三档手续费
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTiers {
    pub minimum: Fee,
    pub normal: Fee,
    pub priority: Fee,
}

impl FeeTiers {
    /// 单一手续费（无档位区分的链）
    pub fn single(fee: Fee) -> Self {
        Self {
            minimum: fee.clone(),
            normal: fee.clone(),
            priority: fee,
        }
    }

    pub fn get(&self, speed: GasSpeed) -> &Fee {
        match speed {
            GasSpeed::Slow => &self.minimum,
            GasSpeed::Normal => &self.normal,
            GasSpeed::Fast => &self.priority,
        }
    }
}
