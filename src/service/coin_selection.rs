// UTXO 选币
// 逐步挑选最贴近剩余需求的输出：有能一次覆盖剩余金额的就取其中最小的，
// 否则取当前最大的，直到累计金额达到 目标 + 手续费。

use rust_decimal::Decimal;

use crate::{
    domain::{
        amount::Amount,
        chain_config::{ChainParams, DustPolicy},
        fee::Fee,
        transaction::{TransactionExtras, UncompiledTransaction},
        unspent_output::UnspentOutput,
    },
    error::{SdkError, SdkResult, ValidationError},
};

/// 选币
///
/// - 负的目标金额或手续费直接拒绝，不进入选币逻辑
/// - 全部输出加起来仍不足时返回按金额降序的全集，由调用方判定余额不足
/// - 找零为正且低于 `dust` 时追加一个最小的未选输出
///
/// 返回顺序即选取顺序，输入集合不会被修改。
pub fn select<T, F>(
    outputs: &[T],
    target: Decimal,
    fee: Decimal,
    dust: Option<Decimal>,
    amount_of: F,
) -> Result<Vec<T>, ValidationError>
where
    T: Clone,
    F: Fn(&T) -> Decimal,
{
    if target.is_sign_negative() && !target.is_zero() {
        return Err(ValidationError::InvalidAmount(format!("negative target {}", target)));
    }
    if fee.is_sign_negative() && !fee.is_zero() {
        return Err(ValidationError::InvalidAmount(format!("negative fee {}", fee)));
    }

    let required = target + fee;
    let available: Decimal = outputs.iter().map(&amount_of).sum();
    if available < required {
        let mut all = outputs.to_vec();
        all.sort_by(|a, b| amount_of(b).cmp(&amount_of(a)));
        return Ok(all);
    }

    let mut unused = outputs.to_vec();
    unused.sort_by(|a, b| amount_of(a).cmp(&amount_of(b)));

    let mut selected = Vec::new();
    let mut total = Decimal::ZERO;
    while total < required && !unused.is_empty() {
        let remaining = required - total;
        let idx = unused
            .partition_point(|u| amount_of(u) < remaining)
            .min(unused.len() - 1);
        let utxo = unused.remove(idx);
        total += amount_of(&utxo);
        selected.push(utxo);
    }

    let change = total - required;
    if let Some(dust) = dust {
        if !change.is_zero() && change < dust && !unused.is_empty() {
            // 升序排列，下标 0 即最小
            let utxo = unused.remove(0);
            total += amount_of(&utxo);
            selected.push(utxo);
        }
    }

    tracing::debug!(
        selected = selected.len(),
        total = %total,
        required = %required,
        "coin selection done"
    );
    Ok(selected)
}

/// 按链参数为一笔转账选币
///
/// 只有 `DustPolicy::AddSmallest` 才追加最小输出，其余策略交给编码阶段处理找零。
pub fn select_for(
    outputs: &[UnspentOutput],
    amount: &Amount,
    fee: &Amount,
    params: &ChainParams,
) -> SdkResult<Vec<UnspentOutput>> {
    amount.ensure_same_currency(fee)?;

    let dust = match params.dust_policy {
        DustPolicy::AddSmallest if params.dust_threshold > Decimal::ZERO => Some(params.dust_threshold),
        _ => None,
    };
    select_checked(outputs, amount.value, fee.value, dust, params)
}

/// 从钱包的全部可花费输出中为交易意图选币，结果写回 `UtxoExtras::unspent_outputs`
///
/// 两阶段代币转账的提交交易只需要覆盖 `粉尘 + 总手续费`，且提交交易不接受粉尘找零，
/// 这时无论链的粉尘策略如何都会追加最小输出。
pub fn fund_transaction(
    transaction: &mut UncompiledTransaction,
    wallet: &[UnspentOutput],
    params: &ChainParams,
) -> SdkResult<()> {
    let selected = match &transaction.fee {
        Fee::CommitReveal { amount, .. } => {
            let dust = (params.dust_threshold > Decimal::ZERO).then_some(params.dust_threshold);
            select_checked(wallet, params.dust_threshold, amount.value, dust, params)?
        }
        fee => {
            if transaction.amount.is_token() {
                return Err(ValidationError::UnsupportedOperation(
                    "token transfer requires the commit/reveal flow".into(),
                )
                .into());
            }
            select_for(wallet, &transaction.amount, fee.amount(), params)?
        }
    };

    match &mut transaction.extras {
        TransactionExtras::Utxo(extras) => {
            extras.unspent_outputs = selected;
            Ok(())
        }
        _ => Err(ValidationError::MissingRequiredExtra("utxo outputs").into()),
    }
}

fn select_checked(
    outputs: &[UnspentOutput],
    target: Decimal,
    fee: Decimal,
    dust: Option<Decimal>,
    params: &ChainParams,
) -> SdkResult<Vec<UnspentOutput>> {
    let selected = select(outputs, target, fee, dust, |u| u.amount)?;

    let required = target + fee;
    let available: Decimal = selected.iter().map(|u| u.amount).sum();
    if available < required {
        return Err(SdkError::InsufficientFunds { required, available });
    }

    if let Some(max) = params.max_inputs {
        if selected.len() > max {
            return Err(ValidationError::UnsupportedOperation(format!(
                "transaction needs {} inputs, chain allows {}",
                selected.len(),
                max
            ))
            .into());
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::domain::{amount::Token, transaction::UtxoExtras};

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn wallet() -> Vec<Decimal> {
        ["1.10", "4.10", "2.10", "12.10", "10.10", "3.10"]
            .into_iter()
            .map(d)
            .collect()
    }

    fn run(target: &str, fee: &str) -> Vec<Decimal> {
        select(&wallet(), d(target), d(fee), Some(d("0.00001")), |v| *v).unwrap()
    }

    #[test]
    fn test_exact_single_output() {
        assert_eq!(run("12.10", "0"), vec![d("12.10")]);
        assert_eq!(run("10.10", "2.0"), vec![d("12.10")]);
    }

    #[test]
    fn test_two_outputs() {
        assert_eq!(run("14.10", "2.10"), vec![d("12.10"), d("4.10")]);
        assert_eq!(run("14.10", "2.0"), vec![d("12.10"), d("4.10")]);
    }

    #[test]
    fn test_everything_needed() {
        let mut expected = wallet();
        expected.sort_by(|a, b| b.cmp(a));
        assert_eq!(run("30.10", "2.0"), expected);
    }

    #[test]
    fn test_insufficient_returns_full_set_descending() {
        let mut expected = wallet();
        expected.sort_by(|a, b| b.cmp(a));
        assert_eq!(run("31.10", "2.0"), expected);
    }

    #[test]
    fn test_dust_change_adds_smallest() {
        assert_eq!(run("10", "2.0999999"), vec![d("12.10"), d("1.10")]);
    }

    #[test]
    fn test_no_dust_threshold() {
        let picked = select(&wallet(), d("10"), d("2.0999999"), None, |v| *v).unwrap();
        assert_eq!(picked, vec![d("12.10")]);
    }

    #[test]
    fn test_negative_inputs_rejected() {
        for (target, fee) in [("-31.10", "2.0"), ("31.10", "-2.0"), ("-31.10", "-2.0")] {
            assert!(matches!(
                select(&wallet(), d(target), d(fee), None, |v| *v),
                Err(ValidationError::InvalidAmount(_))
            ));
        }
    }

    #[test]
    fn test_input_untouched() {
        let outputs = wallet();
        let before = outputs.clone();
        let _ = select(&outputs, d("5"), d("0"), None, |v| *v).unwrap();
        assert_eq!(outputs, before);
    }

    fn utxos() -> Vec<UnspentOutput> {
        wallet()
            .into_iter()
            .enumerate()
            .map(|(i, amount)| UnspentOutput::new(format!("{:064x}", i), i as u32, amount, vec![]))
            .collect()
    }

    #[test]
    fn test_select_for_insufficient() {
        let params = ChainParams::default();
        let amount = Amount::coin(d("40"), "BTC", 8);
        let fee = Amount::coin(d("0.001"), "BTC", 8);
        let err = select_for(&utxos(), &amount, &fee, &params).unwrap_err();
        assert!(matches!(err, SdkError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_select_for_max_inputs() {
        let params = ChainParams {
            max_inputs: Some(1),
            ..ChainParams::default()
        };
        let amount = Amount::coin(d("14.10"), "BTC", 8);
        let fee = Amount::coin(d("0.001"), "BTC", 8);
        assert!(select_for(&utxos(), &amount, &fee, &params).is_err());
    }

    fn transfer(amount: &str, fee: Fee) -> UncompiledTransaction {
        UncompiledTransaction::new(
            "source",
            "destination",
            Amount::coin(d(amount), "BTC", 8),
            fee,
            TransactionExtras::Utxo(UtxoExtras::default()),
        )
    }

    #[test]
    fn test_fund_transaction_spends_only_needed_outputs() {
        let wallet: Vec<UnspentOutput> = (0..6)
            .map(|i| UnspentOutput::new(format!("{:064x}", i), 0, Decimal::ONE, vec![]))
            .collect();
        let mut tx = transfer("0.1", Fee::Common(Amount::coin(d("0.001"), "BTC", 8)));
        fund_transaction(&mut tx, &wallet, &ChainParams::default()).unwrap();
        assert_eq!(tx.extras.utxo().unwrap().unspent_outputs.len(), 1);

        let mut tx = transfer("2.5", Fee::Common(Amount::coin(d("0.001"), "BTC", 8)));
        fund_transaction(&mut tx, &wallet, &ChainParams::default()).unwrap();
        assert_eq!(tx.extras.utxo().unwrap().unspent_outputs.len(), 3);
        assert_eq!(wallet.len(), 6);
    }

    #[test]
    fn test_fund_transaction_dust_top_up() {
        let params = ChainParams {
            dust_threshold: d("0.00001"),
            dust_policy: DustPolicy::AddSmallest,
            ..ChainParams::default()
        };
        let mut tx = transfer("10", Fee::Common(Amount::coin(d("2.0999999"), "BTC", 8)));
        fund_transaction(&mut tx, &utxos(), &params).unwrap();
        let amounts: Vec<Decimal> = tx
            .extras
            .utxo()
            .unwrap()
            .unspent_outputs
            .iter()
            .map(|u| u.amount)
            .collect();
        assert_eq!(amounts, vec![d("12.10"), d("1.10")]);

        // 并入手续费的链不追加
        let absorb = ChainParams {
            dust_policy: DustPolicy::AbsorbIntoFee,
            ..params
        };
        let mut tx = transfer("10", Fee::Common(Amount::coin(d("2.0999999"), "BTC", 8)));
        fund_transaction(&mut tx, &utxos(), &absorb).unwrap();
        assert_eq!(tx.extras.utxo().unwrap().unspent_outputs.len(), 1);
    }

    #[test]
    fn test_fund_commit_covers_dust_and_total_fee() {
        let params = ChainParams {
            dust_threshold: d("0.00000546"),
            dust_policy: DustPolicy::AbsorbIntoFee,
            ..ChainParams::default()
        };
        let wallet = vec![
            UnspentOutput::new("aa".repeat(32), 0, d("0.0003"), vec![]),
            UnspentOutput::new("bb".repeat(32), 0, d("0.00030546"), vec![]),
            UnspentOutput::new("cc".repeat(32), 0, d("0.5"), vec![]),
        ];
        let mut tx = UncompiledTransaction::new(
            "source",
            "source",
            Amount::token(d("250"), &Token::new("ORDI", "", 18)),
            Fee::CommitReveal {
                amount: Amount::coin(d("0.0003"), "BTC", 8),
                reveal_fee: Amount::coin(d("0.0001"), "BTC", 8),
            },
            TransactionExtras::Utxo(UtxoExtras::default()),
        );
        fund_transaction(&mut tx, &wallet, &params).unwrap();
        let selected = &tx.extras.utxo().unwrap().unspent_outputs;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].amount, d("0.00030546"));
    }

    #[test]
    fn test_fund_transaction_errors() {
        let fee = Fee::Common(Amount::coin(d("0.001"), "BTC", 8));
        let mut tx = transfer("100", fee.clone());
        assert!(matches!(
            fund_transaction(&mut tx, &utxos(), &ChainParams::default()),
            Err(SdkError::InsufficientFunds { .. })
        ));

        let mut tx = transfer("1", fee);
        tx.extras = TransactionExtras::None;
        assert!(matches!(
            fund_transaction(&mut tx, &utxos(), &ChainParams::default()),
            Err(SdkError::Validation(ValidationError::MissingRequiredExtra(_)))
        ));
    }

    #[test]
    fn test_select_for_currency_mismatch() {
        let amount = Amount::coin(d("1"), "BTC", 8);
        let fee = Amount::coin(d("0.001"), "LTC", 8);
        assert!(select_for(&utxos(), &amount, &fee, &ChainParams::default()).is_err());
    }
}
