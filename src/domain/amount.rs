//! 金额与币种模型
//!
//! 金额以十进制值 + 精度 + 币种表示。不同币种（或精度）之间的运算与比较属于
//! 编程错误：运算符直接断言，`checked_*` 变体返回 `CurrencyMismatch`。

use std::{
    cmp::Ordering,
    fmt,
    ops::{Add, Sub},
};

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Decimal 支持的最大小数位
const MAX_SCALE: u8 = 28;

/// 代币定义
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub contract_address: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(symbol: impl Into<String>, contract_address: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            contract_address: contract_address.into(),
            decimals,
        }
    }
}

/// 金额类别
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountKind {
    /// 链原生币
    Coin,
    /// 合约代币
    Token(Token),
    /// 账户保留金（部分链的最低余额）
    Reserve,
}

/// 金额
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub value: Decimal,
    pub decimals: u8,
    pub currency_symbol: String,
    pub kind: AmountKind,
}

impl Amount {
    pub fn new(value: Decimal, decimals: u8, currency_symbol: impl Into<String>, kind: AmountKind) -> Self {
        Self {
            value,
            decimals,
            currency_symbol: currency_symbol.into(),
            kind,
        }
    }

    /// 原生币金额
    pub fn coin(value: Decimal, currency_symbol: impl Into<String>, decimals: u8) -> Self {
        Self::new(value, decimals, currency_symbol, AmountKind::Coin)
    }

    /// 代币金额（精度取自代币定义）
    pub fn token(value: Decimal, token: &Token) -> Self {
        Self::new(
            value,
            token.decimals,
            token.symbol.clone(),
            AmountKind::Token(token.clone()),
        )
    }

    /// 同币种的零值
    pub fn zero_like(&self) -> Self {
        Self {
            value: Decimal::ZERO,
            ..self.clone()
        }
    }

    /// 同币种、新数值
    pub fn with_value(&self, value: Decimal) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_token(&self) -> bool {
        matches!(self.kind, AmountKind::Token(_))
    }

    pub fn token_ref(&self) -> Option<&Token> {
        match &self.kind {
            AmountKind::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn same_currency(&self, other: &Amount) -> bool {
        self.kind == other.kind
            && self.decimals == other.decimals
            && self.currency_symbol == other.currency_symbol
    }

    /// 换算为最小单位（wei / satoshi / microalgo ...）
    ///
    /// 负数、超出精度的小数位、溢出均返回 `InvalidAmount`。
    pub fn to_base_units(&self) -> Result<u128, ValidationError> {
        if self.value.is_sign_negative() && !self.value.is_zero() {
            return Err(ValidationError::InvalidAmount(format!(
                "negative amount {}",
                self.value
            )));
        }
        let scaled = self
            .value
            .checked_mul(pow10(self.decimals)?)
            .ok_or_else(|| ValidationError::InvalidAmount(format!("{} overflows", self.value)))?;
        if !scaled.fract().is_zero() {
            return Err(ValidationError::InvalidAmount(format!(
                "{} has more than {} decimal places",
                self.value, self.decimals
            )));
        }
        scaled
            .trunc()
            .to_u128()
            .ok_or_else(|| ValidationError::InvalidAmount(format!("{} overflows", self.value)))
    }

    /// 由最小单位构造
    pub fn from_base_units(
        units: u128,
        decimals: u8,
        currency_symbol: impl Into<String>,
        kind: AmountKind,
    ) -> Result<Self, ValidationError> {
        let value = base_units_to_decimal(units, decimals)?;
        Ok(Self::new(value, decimals, currency_symbol, kind))
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount, ValidationError> {
        self.ensure_same_currency(other)?;
        Ok(self.with_value(self.value + other.value))
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, ValidationError> {
        self.ensure_same_currency(other)?;
        Ok(self.with_value(self.value - other.value))
    }

    pub fn ensure_same_currency(&self, other: &Amount) -> Result<(), ValidationError> {
        if self.same_currency(other) {
            Ok(())
        } else {
            Err(ValidationError::CurrencyMismatch {
                expected: self.currency_symbol.clone(),
                actual: other.currency_symbol.clone(),
            })
        }
    }
}

/// 10^decimals
pub fn pow10(decimals: u8) -> Result<Decimal, ValidationError> {
    if decimals > MAX_SCALE {
        return Err(ValidationError::InvalidAmount(format!(
            "unsupported decimals {}",
            decimals
        )));
    }
    Decimal::try_from_i128_with_scale(10i128.pow(decimals as u32), 0)
        .map_err(|e| ValidationError::InvalidAmount(e.to_string()))
}

/// 最小单位换算为十进制值
pub fn base_units_to_decimal(units: u128, decimals: u8) -> Result<Decimal, ValidationError> {
    if decimals > MAX_SCALE {
        return Err(ValidationError::InvalidAmount(format!(
            "unsupported decimals {}",
            decimals
        )));
    }
    let units = i128::try_from(units)
        .map_err(|_| ValidationError::InvalidAmount(format!("{} overflows", units)))?;
    let mut value = Decimal::try_from_i128_with_scale(units, decimals as u32)
        .map_err(|e| ValidationError::InvalidAmount(e.to_string()))?;
    value.normalize_assign();
    Ok(value)
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        assert!(
            self.same_currency(&rhs),
            "cannot add {} to {}",
            rhs.currency_symbol,
            self.currency_symbol
        );
        self.with_value(self.value + rhs.value)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        assert!(
            self.same_currency(&rhs),
            "cannot subtract {} from {}",
            rhs.currency_symbol,
            self.currency_symbol
        );
        self.with_value(self.value - rhs.value)
    }
}

impl PartialOrd for Amount {
    /// 不同币种不可比较
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.same_currency(other) {
            self.value.partial_cmp(&other.value)
        } else {
            None
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value.normalize(), self.currency_symbol)
    }
}
