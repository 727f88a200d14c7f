// 手续费估算
// 每个协议族一个纯函数：网络快照 + 交易形态 → 三档手续费。
// 快照获取（fetch_*）与计算分离，计算部分不做任何 I/O。

use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal, RoundingStrategy,
};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        amount::{base_units_to_decimal, Amount},
        chain_config::{ChainConfig, ChainParams},
        fee::{Fee, FeeTiers, FixedFeeParams, GasSpeed},
    },
    error::{SdkError, SdkResult, ValidationError},
    infrastructure::providers::{EvmCallRequest, EvmNetworkProvider, FeeHistory, UtxoNetworkProvider},
};

/// `estimatesmartfee` 目标区块数，对应 [minimum, normal, priority]
pub const UTXO_FEE_TARGET_BLOCKS: [u32; 3] = [8, 4, 1];

const BYTES_PER_KB: i64 = 1024;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EVM 倍数配置
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// EVM 手续费倍数，数组顺序为 [slow, normal, fast]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmFeeMultipliers {
    /// EIP-1559 基础费倍数
    pub base_fee: [Decimal; 3],
    /// 传统 gasPrice 倍数（也用于 1559 无奖励数据时的优先费回退）
    pub gas_price: [Decimal; 3],
}

impl Default for EvmFeeMultipliers {
    fn default() -> Self {
        let tiers = [Decimal::ONE, Decimal::new(12, 1), Decimal::new(15, 1)];
        Self {
            base_fee: tiers,
            gas_price: tiers,
        }
    }
}

impl EvmFeeMultipliers {
    /// 从环境变量读取倍数（支持动态调整）
    ///
    /// 多级降级策略：
    /// 1. `GAS_BASE_MULTIPLIER_<CHAIN>_<SPEED>` / `GAS_PRICE_MULTIPLIER_<CHAIN>_<SPEED>`
    /// 2. 去掉链名的通用变量
    /// 3. 默认值 1.0 / 1.2 / 1.5
    pub fn from_env(chain_id: &str) -> Self {
        let defaults = Self::default();
        let chain = chain_id.to_uppercase().replace('-', "_");

        let mut base_fee = defaults.base_fee;
        let mut gas_price = defaults.gas_price;
        for speed in GasSpeed::ALL {
            let i = speed.index();
            let suffix = speed_suffix(speed);
            base_fee[i] = Self::lookup("GAS_BASE_MULTIPLIER", &chain, suffix).unwrap_or(base_fee[i]);
            gas_price[i] = Self::lookup("GAS_PRICE_MULTIPLIER", &chain, suffix).unwrap_or(gas_price[i]);
        }
        Self { base_fee, gas_price }
    }

    fn lookup(prefix: &str, chain: &str, suffix: &str) -> Option<Decimal> {
        get_env_decimal(&format!("{}_{}_{}", prefix, chain, suffix))
            .or_else(|| get_env_decimal(&format!("{}_{}", prefix, suffix)))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let all_positive = self
            .base_fee
            .iter()
            .chain(self.gas_price.iter())
            .all(|m| *m > Decimal::ZERO);
        if !all_positive {
            return Err(ValidationError::InvalidAmount("fee multipliers must be positive".into()));
        }
        Ok(())
    }
}

fn speed_suffix(speed: GasSpeed) -> &'static str {
    match speed {
        GasSpeed::Slow => "SLOW",
        GasSpeed::Normal => "NORMAL",
        GasSpeed::Fast => "FAST",
    }
}

fn get_env_decimal(key: &str) -> Option<Decimal> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<Decimal>() {
        Ok(v) if v > Decimal::ZERO => Some(v),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid fee multiplier");
            None
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UTXO
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 三个目标区块的费率（主币/KB），费率向上取整到链精度
pub async fn fetch_utxo_fee_rates<P>(provider: &P, chain: &ChainConfig) -> SdkResult<[Decimal; 3]>
where
    P: UtxoNetworkProvider + ?Sized,
{
    let [slow, normal, fast] = UTXO_FEE_TARGET_BLOCKS;
    let (slow, normal, fast) = futures::try_join!(
        provider.get_fee_per_kb(slow),
        provider.get_fee_per_kb(normal),
        provider.get_fee_per_kb(fast),
    )?;
    let round_up = |rate: Decimal| rate.round_dp_with_strategy(chain.decimals as u32, RoundingStrategy::AwayFromZero);
    Ok([round_up(slow), round_up(normal), round_up(fast)])
}

/// UTXO 三档手续费
///
/// - 费率不低于 `min_fee_per_kb`，档位之间保持单调
/// - 手续费 = 体积 × 费率 / 1024，截断到链精度，不低于 `min_fee`
pub fn utxo_fee_tiers(
    chain: &ChainConfig,
    params: &ChainParams,
    rates_per_kb: [Decimal; 3],
    size_bytes: usize,
) -> SdkResult<FeeTiers> {
    if rates_per_kb.iter().any(|r| r.is_sign_negative()) {
        return Err(ValidationError::InvalidAmount("negative fee rate".into()).into());
    }

    let mut rates = rates_per_kb.map(|r| r.max(params.min_fee_per_kb));
    rates[1] = rates[1].max(rates[0]);
    rates[2] = rates[2].max(rates[1]);

    let size = Decimal::from(size_bytes as u64);
    let fee = |rate: Decimal| -> Fee {
        let value = (size * rate / Decimal::from(BYTES_PER_KB))
            .round_dp_with_strategy(chain.decimals as u32, RoundingStrategy::ToZero)
            .max(params.min_fee);
        Fee::UtxoPerKb {
            amount: Amount::coin(value, chain.symbol.clone(), chain.decimals),
            fee_per_kb: Amount::coin(rate, chain.symbol.clone(), chain.decimals),
        }
    };

    tracing::debug!(chain = %chain.id, size_bytes, rates = ?rates, "utxo fee tiers");
    Ok(FeeTiers {
        minimum: fee(rates[0]),
        normal: fee(rates[1]),
        priority: fee(rates[2]),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EVM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// EVM 网络快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmFeeSnapshot {
    pub gas_limit: u64,
    pub gas_price: u128,
    /// 仅 EIP-1559 链获取
    pub history: Option<FeeHistory>,
}

pub async fn fetch_evm_snapshot<P>(provider: &P, call: &EvmCallRequest, eip1559: bool) -> SdkResult<EvmFeeSnapshot>
where
    P: EvmNetworkProvider + ?Sized,
{
    let (gas_limit, gas_price) = futures::try_join!(provider.estimate_gas(call), provider.get_gas_price())?;
    let history = if eip1559 {
        Some(provider.get_fee_history().await?)
    } else {
        None
    };
    Ok(EvmFeeSnapshot {
        gas_limit,
        gas_price,
        history,
    })
}

/// 根据快照选择 1559 或传统定价
pub fn evm_fee_tiers(
    chain: &ChainConfig,
    snapshot: &EvmFeeSnapshot,
    multipliers: &EvmFeeMultipliers,
) -> SdkResult<FeeTiers> {
    match &snapshot.history {
        Some(history) => eip1559_fee_tiers(chain, snapshot.gas_limit, history, snapshot.gas_price, multipliers),
        None => legacy_fee_tiers(chain, snapshot.gas_limit, snapshot.gas_price, multipliers),
    }
}

/// 传统定价：`gasPrice × {1.0, 1.2, 1.5}`
pub fn legacy_fee_tiers(
    chain: &ChainConfig,
    gas_limit: u64,
    gas_price: u128,
    multipliers: &EvmFeeMultipliers,
) -> SdkResult<FeeTiers> {
    let tier = |speed: GasSpeed| -> SdkResult<Fee> {
        let price = scale(gas_price, multipliers.gas_price[speed.index()])?;
        Ok(Fee::EvmLegacy {
            amount: wei_amount(chain, price, gas_limit)?,
            gas_limit,
            gas_price: price,
        })
    };
    Ok(FeeTiers {
        minimum: tier(GasSpeed::Slow)?,
        normal: tier(GasSpeed::Normal)?,
        priority: tier(GasSpeed::Fast)?,
    })
}

/// EIP-1559：`maxFee = baseFee × 倍数 + 优先费`
///
/// 优先费取各分位数列非零奖励的平均值（四舍五入）；任一列没有非零奖励时
/// 整体回退为 `gasPrice × 倍数`。待出块基础费为零时回退到传统定价。
pub fn eip1559_fee_tiers(
    chain: &ChainConfig,
    gas_limit: u64,
    history: &FeeHistory,
    gas_price: u128,
    multipliers: &EvmFeeMultipliers,
) -> SdkResult<FeeTiers> {
    let Some(base_fee) = history.pending_base_fee() else {
        tracing::warn!(chain = %chain.id, "fee history has no pending base fee, using legacy pricing");
        return legacy_fee_tiers(chain, gas_limit, gas_price, multipliers);
    };

    let priority = match average_rewards(history) {
        Some(rewards) => rewards,
        None => {
            tracing::warn!(chain = %chain.id, "fee history has no usable rewards, deriving priority fee from gas price");
            [
                scale(gas_price, multipliers.gas_price[0])?,
                scale(gas_price, multipliers.gas_price[1])?,
                scale(gas_price, multipliers.gas_price[2])?,
            ]
        }
    };

    let tier = |speed: GasSpeed| -> SdkResult<Fee> {
        let i = speed.index();
        let max_fee = scale(base_fee, multipliers.base_fee[i])?
            .checked_add(priority[i])
            .ok_or_else(|| overflow("max fee per gas"))?;
        Ok(Fee::Evm1559 {
            amount: wei_amount(chain, max_fee, gas_limit)?,
            gas_limit,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority[i],
        })
    };
    Ok(FeeTiers {
        minimum: tier(GasSpeed::Slow)?,
        normal: tier(GasSpeed::Normal)?,
        priority: tier(GasSpeed::Fast)?,
    })
}

/// 每个分位数列的非零奖励平均值
fn average_rewards(history: &FeeHistory) -> Option<[u128; 3]> {
    let mut averages = [0u128; 3];
    for (column, average) in averages.iter_mut().enumerate() {
        let rewards: Vec<u128> = history
            .reward
            .iter()
            .filter_map(|row| row.get(column).copied())
            .filter(|r| *r > 0)
            .collect();
        if rewards.is_empty() {
            return None;
        }
        let sum: u128 = rewards.iter().sum();
        let count = rewards.len() as u128;
        // 四舍五入
        *average = (sum + count / 2) / count;
    }
    Some(averages)
}

fn scale(value: u128, multiplier: Decimal) -> SdkResult<u128> {
    let value = Decimal::from_u128(value).ok_or_else(|| overflow("fee value"))?;
    value
        .checked_mul(multiplier)
        .map(|v| v.trunc())
        .and_then(|v| v.to_u128())
        .ok_or_else(|| overflow("scaled fee"))
}

fn wei_amount(chain: &ChainConfig, price: u128, gas_limit: u64) -> SdkResult<Amount> {
    let total = price
        .checked_mul(gas_limit as u128)
        .ok_or_else(|| overflow("fee amount"))?;
    let value = base_units_to_decimal(total, chain.decimals)?;
    Ok(Amount::coin(value, chain.symbol.clone(), chain.decimals))
}

fn overflow(what: &str) -> SdkError {
    ValidationError::InvalidAmount(format!("{} overflows", what)).into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 定额 / 网络估算
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 网络给出的手续费（最小单位）→ 单档手续费
///
/// 不低于链的 `min_fee`；设置了上限时截断到上限并记一条警告。
pub fn fixed_fee(chain: &ChainConfig, params: &ChainParams, network_units: u128) -> SdkResult<FeeTiers> {
    let mut value = base_units_to_decimal(network_units, chain.decimals)?.max(params.min_fee);
    if let Some(ceiling) = params.fee_ceiling {
        if value > ceiling {
            tracing::warn!(chain = %chain.id, quoted = %value, ceiling = %ceiling, "fee clamped to ceiling");
            value = ceiling;
        }
    }

    Ok(FeeTiers::single(Fee::AccountFixed {
        amount: Amount::coin(value, chain.symbol.clone(), chain.decimals),
        params: FixedFeeParams {
            minimum: Some(params.min_fee),
            ceiling: params.fee_ceiling,
        },
    }))
}

/// Algorand：`max(每字节费率 × 体积, 网络最低费)`
pub fn algorand_fee(
    chain: &ChainConfig,
    params: &ChainParams,
    fee_per_byte: u64,
    network_min_fee: u64,
    size_bytes: usize,
) -> SdkResult<FeeTiers> {
    let by_size = (fee_per_byte as u128) * (size_bytes as u128);
    fixed_fee(chain, params, by_size.max(network_min_fee as u128))
}
