//! 两阶段（提交/揭示）UTXO 代币转账
//!
//! 提交交易把 `揭示手续费 + 粉尘` 付给 `P2SH(redeemScript)`，赎回脚本内嵌 JSON 信封：
//!
//! ```text
//! <pubkey> OP_CHECKSIG OP_FALSE OP_IF <protocol> <envelope json> OP_ENDIF
//! ```
//!
//! 揭示交易花费提交交易的输出 0，`scriptSig = <sig> <redeemScript>`，余额找回源地址。
//! 两次交易之间的状态记录为 `PendingReveal`，由调用方持久化。

use rust_decimal::Decimal;

use super::{
    ensure_signature_count,
    utxo::{transaction_id, InputSpend, RawInput, RawOutput, RawTransaction, UtxoCodec},
    TransactionCodec,
};
use crate::{
    domain::{
        address::{script, AddressStrategy},
        amount::Amount,
        chain_config::ProtocolFamily,
        fee::Fee,
        transaction::{
            PendingReveal, Preimage, Signature, TokenEnvelope, TransactionExtras, UncompiledTransaction,
        },
    },
    error::{SdkError, SdkResult, ValidationError},
    utils::crypto::hash160,
};

/// 待揭示记录的存储键前缀
pub const PENDING_REVEAL_RECORD: &str = "PendingReveal";

pub struct CommitRevealCodec {
    utxo: UtxoCodec,
    protocol: String,
}

impl CommitRevealCodec {
    pub fn new(utxo: UtxoCodec, protocol: impl Into<String>) -> SdkResult<Self> {
        if utxo.chain().params.dust_threshold <= Decimal::ZERO {
            return Err(SdkError::config(format!(
                "chain {} needs a positive dust threshold for commit/reveal transfers",
                utxo.chain().id
            )));
        }
        Ok(Self {
            utxo,
            protocol: protocol.into(),
        })
    }

    pub fn utxo(&self) -> &UtxoCodec {
        &self.utxo
    }

    /// 存储键：`PendingReveal-<压缩公钥十六进制>`
    pub fn store_key(&self) -> SdkResult<String> {
        Ok(format!(
            "{}-{}",
            PENDING_REVEAL_RECORD,
            hex::encode(self.utxo.public_key().compressed()?)
        ))
    }

    pub fn envelope(&self, transaction: &UncompiledTransaction) -> SdkResult<TokenEnvelope> {
        let token = transaction.amount.token_ref().ok_or_else(|| {
            ValidationError::UnsupportedOperation("commit/reveal transfer requires a token amount".into())
        })?;
        if transaction.amount.is_zero() || transaction.amount.value.is_sign_negative() {
            return Err(ValidationError::InvalidAmount(format!("token amount {}", transaction.amount.value)).into());
        }
        if !self.utxo.addresses().validate(&transaction.destination) {
            return Err(ValidationError::InvalidAddress(transaction.destination.clone()).into());
        }
        Ok(TokenEnvelope {
            p: self.protocol.clone(),
            op: "transfer".to_string(),
            amt: transaction.amount.to_base_units()?.to_string(),
            to: transaction.destination.clone(),
            tick: token.symbol.to_lowercase(),
        })
    }

    pub fn redeem_script(&self, envelope: &TokenEnvelope) -> SdkResult<Vec<u8>> {
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| ValidationError::InvalidAmount(format!("envelope encoding: {}", e)))?;
        let key = self.utxo.public_key().compressed()?;

        let mut s = Vec::with_capacity(key.len() + payload.len() + self.protocol.len() + 8);
        script::push_data(&mut s, &key);
        s.push(script::OP_CHECKSIG);
        s.push(script::OP_0);
        s.push(script::OP_IF);
        script::push_data(&mut s, self.protocol.as_bytes());
        script::push_data(&mut s, &payload);
        s.push(script::OP_ENDIF);
        Ok(s)
    }

    /// 拆出 (总手续费, 揭示手续费)
    fn split_fee(&self, fee: &Fee) -> SdkResult<(Decimal, Decimal)> {
        match fee {
            Fee::CommitReveal { amount, reveal_fee } => {
                self.utxo.check_coin(amount)?;
                self.utxo.check_coin(reveal_fee)?;
                if reveal_fee.value > amount.value {
                    return Err(ValidationError::InvalidAmount(format!(
                        "reveal fee {} exceeds total fee {}",
                        reveal_fee.value, amount.value
                    ))
                    .into());
                }
                Ok((amount.value, reveal_fee.value))
            }
            _ => Err(ValidationError::MissingRequiredExtra("reveal fee").into()),
        }
    }

    fn build_commit(&self, transaction: &UncompiledTransaction) -> SdkResult<(RawTransaction, Vec<InputSpend>)> {
        let extras = transaction.extras.utxo()?;
        if extras.unspent_outputs.is_empty() {
            return Err(ValidationError::MissingRequiredExtra("utxo outputs").into());
        }
        let (total_fee, reveal_fee) = self.split_fee(&transaction.fee)?;
        let redeem = self.redeem_script(&self.envelope(transaction)?)?;

        let dust = self.utxo.chain().params.dust_threshold;
        let commit_value = reveal_fee + dust;
        let commit_fee = total_fee - reveal_fee;
        let available: Decimal = extras.unspent_outputs.iter().map(|u| u.amount).sum();
        let required = commit_value + commit_fee;
        if available < required {
            return Err(SdkError::InsufficientFunds { required, available });
        }

        let change = available - required;
        if change > Decimal::ZERO && change < dust {
            return Err(ValidationError::DustChange { change, dust }.into());
        }

        let (inputs, spends) = self.utxo.inputs(&extras.unspent_outputs)?;
        let mut outputs = vec![RawOutput {
            value: self.utxo.units(commit_value)?,
            script_pubkey: script::p2sh(&hash160(&redeem)),
        }];
        if change > Decimal::ZERO {
            let change_address = extras.change_address.as_deref().unwrap_or(&transaction.source);
            outputs.push(RawOutput {
                value: self.utxo.units(change)?,
                script_pubkey: self.utxo.addresses().script_pubkey(change_address)?,
            });
        }
        Ok((RawTransaction::new(inputs, outputs), spends))
    }

    fn build_reveal(
        &self,
        transaction: &UncompiledTransaction,
        pending: &PendingReveal,
    ) -> SdkResult<(RawTransaction, Vec<InputSpend>)> {
        let mut prev_hash = [0u8; 32];
        hex::decode_to_slice(&pending.commit_tx_id, &mut prev_hash)
            .map_err(|e| ValidationError::InvalidOutpoint(format!("{}: {}", pending.commit_tx_id, e)))?;
        prev_hash.reverse();

        let change = pending.commit_output_value - pending.reveal_fee;
        if change.is_sign_negative() {
            return Err(ValidationError::InvalidAmount(format!(
                "reveal fee {} exceeds commit output {}",
                pending.reveal_fee, pending.commit_output_value
            ))
            .into());
        }

        let input = RawInput {
            prev_hash,
            prev_index: 0,
            value: self.utxo.units(pending.commit_output_value)?,
            script_pubkey: script::p2sh(&hash160(&pending.redeem_script)),
            sequence: self.utxo.chain().params.input_sequence,
        };
        let output = RawOutput {
            value: self.utxo.units(change)?,
            script_pubkey: self.utxo.addresses().script_pubkey(&transaction.destination)?,
        };
        Ok((
            RawTransaction::new(vec![input], vec![output]),
            vec![InputSpend::P2shRedeem(pending.redeem_script.clone())],
        ))
    }

    fn build(&self, transaction: &UncompiledTransaction) -> SdkResult<(RawTransaction, Vec<InputSpend>)> {
        match transaction.extras.reveal() {
            Some(pending) => self.build_reveal(transaction, pending),
            None => self.build_commit(transaction),
        }
    }

    /// 提交交易签名后生成待揭示记录
    pub fn pending_reveal(
        &self,
        commit: &UncompiledTransaction,
        signatures: &[Signature],
    ) -> SdkResult<PendingReveal> {
        let (_, reveal_fee) = self.split_fee(&commit.fee)?;
        let envelope = self.envelope(commit)?;
        let redeem_script = self.redeem_script(&envelope)?;
        let (raw, spends) = self.build_commit(commit)?;

        let assembler = self.utxo.signer();
        let encoded = assembler.encode_signatures(signatures)?;
        let (script_sigs, _) = assembler.unlocking(&spends, &encoded)?;

        Ok(PendingReveal {
            commit_tx_id: transaction_id(&raw, &script_sigs),
            commit_output_value: reveal_fee + self.utxo.chain().params.dust_threshold,
            reveal_fee,
            redeem_script,
            envelope,
            created_at: chrono::Utc::now(),
        })
    }

    /// 由待揭示记录生成揭示交易意图（余额找回源地址）
    pub fn reveal_transaction(&self, commit: &UncompiledTransaction, pending: PendingReveal) -> UncompiledTransaction {
        let chain = self.utxo.chain();
        let reveal_fee = Amount::coin(pending.reveal_fee, chain.symbol.clone(), chain.decimals);
        UncompiledTransaction::new(
            commit.source.clone(),
            commit.source.clone(),
            commit.amount.clone(),
            Fee::Common(reveal_fee),
            TransactionExtras::Reveal(pending),
        )
    }

    /// 重启后只凭记录恢复揭示交易（金额记为揭示输出的原生币金额）
    pub fn resumed_reveal(&self, source: &str, pending: PendingReveal) -> UncompiledTransaction {
        let chain = self.utxo.chain();
        let output = Amount::coin(
            pending.commit_output_value - pending.reveal_fee,
            chain.symbol.clone(),
            chain.decimals,
        );
        let reveal_fee = Amount::coin(pending.reveal_fee, chain.symbol.clone(), chain.decimals);
        UncompiledTransaction::new(
            source,
            source,
            output,
            Fee::Common(reveal_fee),
            TransactionExtras::Reveal(pending),
        )
    }
}

impl TransactionCodec for CommitRevealCodec {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Utxo
    }

    fn build_for_sign(&self, transaction: &UncompiledTransaction) -> SdkResult<Vec<Preimage>> {
        let (raw, spends) = self.build(transaction)?;
        Ok(self
            .utxo
            .signer()
            .sighashes(&raw, &spends)?
            .into_iter()
            .map(Preimage::digest)
            .collect())
    }

    fn build_for_send(
        &self,
        transaction: &UncompiledTransaction,
        signatures: &[Signature],
        preimages: &[Preimage],
    ) -> SdkResult<Vec<u8>> {
        ensure_signature_count(signatures, preimages)?;
        let (raw, spends) = self.build(transaction)?;
        if spends.len() != signatures.len() {
            return Err(ValidationError::InvalidSignature(format!(
                "expected {} signatures, got {}",
                spends.len(),
                signatures.len()
            ))
            .into());
        }
        let assembler = self.utxo.signer();
        let encoded = assembler.encode_signatures(signatures)?;
        assembler.assemble(&raw, &spends, &encoded)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::domain::{
        address::BitcoinAddressStrategy,
        amount::Token,
        chain_config::ChainRegistry,
        public_key::PublicKey,
        transaction::UtxoExtras,
        unspent_output::UnspentOutput,
    };

    const WALLET_KEY: &str = "03E3F3BE3CE3D8284DB3BA073AD0291040093D83C11A277B905D5555C9EC41073E";
    const SEGWIT: &str = "bc1qm9wu5ncxk8mqhm3nfmxa552728wkty70marsfl";

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn codec() -> CommitRevealCodec {
        let chain = ChainRegistry::new().get("bitcoin").unwrap().clone();
        let utxo = UtxoCodec::new(chain, PublicKey::from_hex(WALLET_KEY).unwrap()).unwrap();
        CommitRevealCodec::new(utxo, "brc-20").unwrap()
    }

    fn commit(available: &str, total_fee: &str, reveal_fee: &str) -> UncompiledTransaction {
        let script = BitcoinAddressStrategy::bitcoin_mainnet().script_pubkey(SEGWIT).unwrap();
        let token = Token::new("ORDI", "", 18);
        UncompiledTransaction::new(
            SEGWIT,
            "34gJYef7yHBmRhnmKzrXKJddWMzCuFkbBY",
            Amount::token(d("1.5"), &token),
            Fee::CommitReveal {
                amount: Amount::coin(d(total_fee), "BTC", 8),
                reveal_fee: Amount::coin(d(reveal_fee), "BTC", 8),
            },
            TransactionExtras::Utxo(UtxoExtras {
                unspent_outputs: vec![UnspentOutput::new(
                    "aef291cc72c2a82311bfcacb94b52368470dd3023b7ee47e3e3e2fc17dd6863f",
                    1,
                    d(available),
                    script,
                )],
                change_address: None,
            }),
        )
    }

    fn signature() -> Signature {
        Signature::new([1u8; 64].to_vec())
    }

    #[test]
    fn test_envelope_and_redeem_script() {
        let codec = codec();
        let envelope = codec.envelope(&commit("0.01", "0.0002", "0.0001")).unwrap();
        assert_eq!(envelope.amt, "1500000000000000000");
        assert_eq!(envelope.tick, "ordi");
        assert_eq!(envelope.p, "brc-20");

        let redeem = codec.redeem_script(&envelope).unwrap();
        assert_eq!(redeem[0], 33);
        assert_eq!(redeem[34], script::OP_CHECKSIG);
        assert_eq!(&redeem[35..37], &[script::OP_0, script::OP_IF]);
        assert_eq!(*redeem.last().unwrap(), script::OP_ENDIF);
    }

    #[test]
    fn test_commit_outputs() {
        let codec = codec();
        let (raw, spends) = codec.build_commit(&commit("0.01", "0.0002", "0.0001")).unwrap();
        assert_eq!(spends, vec![InputSpend::P2wpkh]);
        // 揭示手续费 10000 + 粉尘 546
        assert_eq!(raw.outputs[0].value, 10_546);
        assert!(script::is_p2sh(&raw.outputs[0].script_pubkey));
        assert_eq!(raw.outputs[1].value, 1_000_000 - 10_546 - 10_000);
    }

    #[test]
    fn test_commit_dust_change_rejected() {
        // 找零 = 0.00020646 - 0.00010546 - 0.0001 = 100 sat
        let err = codec()
            .build_for_sign(&commit("0.00020646", "0.0002", "0.0001"))
            .unwrap_err();
        assert!(matches!(err, SdkError::Validation(ValidationError::DustChange { .. })));
    }

    #[test]
    fn test_requires_token_amount() {
        let mut tx = commit("0.01", "0.0002", "0.0001");
        tx.amount = Amount::coin(d("0.1"), "BTC", 8);
        assert!(codec().build_for_sign(&tx).is_err());
    }

    #[test]
    fn test_reveal_spends_commit_output() {
        let codec = codec();
        let commit_tx = commit("0.01", "0.0002", "0.0001");
        let pending = codec.pending_reveal(&commit_tx, &[signature()]).unwrap();
        assert_eq!(pending.commit_output_value, d("0.00010546"));

        let reveal = codec.reveal_transaction(&commit_tx, pending.clone());
        assert_eq!(reveal.destination, SEGWIT);

        let preimages = codec.build_for_sign(&reveal).unwrap();
        assert_eq!(preimages.len(), 1);
        let wire = codec.build_for_send(&reveal, &[signature()], &preimages).unwrap();
        // 非隔离见证格式，scriptSig 内含赎回脚本
        assert_ne!(&wire[4..6], &[0x00, 0x01]);
        let redeem_hex = hex::encode(&pending.redeem_script);
        assert!(hex::encode(&wire).contains(&redeem_hex));
    }

    #[test]
    fn test_pending_record_serde() {
        let codec = codec();
        let pending = codec
            .pending_reveal(&commit("0.01", "0.0002", "0.0001"), &[signature()])
            .unwrap();
        let json = serde_json::to_vec(&pending).unwrap();
        let back: PendingReveal = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, pending);
        assert!(codec.store_key().unwrap().starts_with("PendingReveal-03e3f3be"));
    }
}
