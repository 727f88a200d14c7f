//! 规范化 msgpack 映射族编解码器（Algorand）
//!
//! 签名原像为 `"TX" ‖ msgpack(txn)`，由签名器直接对消息做 ed25519 签名；
//! 发送时封装为 `msgpack({sig, txn})`。

use super::{
    ensure_signature_count,
    msgpack::CanonicalMap,
    utxo::to_units,
    TransactionCodec,
};
use crate::{
    domain::{
        address::AlgorandAddressStrategy,
        amount::AmountKind,
        chain_config::{ChainConfig, ProtocolFamily},
        public_key::PublicKey,
        transaction::{AlgorandExtras, Preimage, Signature, UncompiledTransaction},
    },
    error::{SdkResult, ValidationError},
};

/// 交易签名域分隔前缀
const TX_TAG: &[u8] = b"TX";

const PAYMENT: &str = "pay";
const ASSET_TRANSFER: &str = "axfer";

pub struct AlgorandCodec {
    chain: ChainConfig,
    sender: [u8; 32],
}

impl AlgorandCodec {
    pub fn new(chain: ChainConfig, key: &PublicKey) -> SdkResult<Self> {
        Ok(Self {
            chain,
            sender: key.ed25519()?,
        })
    }

    pub fn sender_address(&self) -> String {
        AlgorandAddressStrategy::encode_key(&self.sender)
    }

    /// 交易意图 → 规范化字段映射
    pub fn transaction_map(&self, transaction: &UncompiledTransaction) -> SdkResult<CanonicalMap> {
        let extras = transaction.extras.algorand()?;
        self.check_source(transaction)?;
        if extras.last_round < extras.first_round {
            return Err(ValidationError::InvalidAmount(format!(
                "round window {}..{} is empty",
                extras.first_round, extras.last_round
            ))
            .into());
        }

        let receiver = AlgorandAddressStrategy::parse(&transaction.destination)?;
        let fee = transaction.fee.amount();
        let fee = to_units(fee.value, &self.chain.symbol, self.chain.decimals)?;

        let mut map = CanonicalMap::new();
        self.common_fields(&mut map, fee, extras);

        match &transaction.amount.kind {
            AmountKind::Coin => {
                self.check_coin(transaction)?;
                let amount = units_u64(transaction.amount.to_base_units()?)?;
                map.str("type", PAYMENT).uint("amt", amount).bin("rcv", receiver.to_vec());
            }
            AmountKind::Token(token) => {
                let asset_id: u64 = token.contract_address.parse().map_err(|_| {
                    ValidationError::InvalidAmount(format!("asset id {} is not numeric", token.contract_address))
                })?;
                let amount = units_u64(transaction.amount.to_base_units()?)?;
                map.str("type", ASSET_TRANSFER)
                    .uint("xaid", asset_id)
                    .uint("aamt", amount)
                    .bin("arcv", receiver.to_vec());
            }
            AmountKind::Reserve => {
                return Err(ValidationError::UnsupportedOperation("reserve amount cannot be transferred".into()).into())
            }
        }
        Ok(map)
    }

    fn common_fields(&self, map: &mut CanonicalMap, fee: u64, extras: &AlgorandExtras) {
        map.uint("fee", fee)
            .uint("fv", extras.first_round)
            .uint("lv", extras.last_round)
            .str("gen", extras.genesis_id.clone())
            .bin("gh", extras.genesis_hash.to_vec())
            .bin("snd", self.sender.to_vec());
        if let Some(note) = &extras.note {
            map.bin("note", note.clone());
        }
    }

    fn check_source(&self, transaction: &UncompiledTransaction) -> Result<(), ValidationError> {
        let source = AlgorandAddressStrategy::parse(&transaction.source)?;
        if source != self.sender {
            return Err(ValidationError::InvalidAddress(format!(
                "{} does not belong to the wallet key",
                transaction.source
            )));
        }
        Ok(())
    }

    fn check_coin(&self, transaction: &UncompiledTransaction) -> Result<(), ValidationError> {
        let amount = &transaction.amount;
        if amount.currency_symbol != self.chain.symbol || amount.decimals != self.chain.decimals {
            return Err(ValidationError::CurrencyMismatch {
                expected: self.chain.symbol.clone(),
                actual: amount.currency_symbol.clone(),
            });
        }
        Ok(())
    }

    /// 签名原像
    pub fn signing_bytes(&self, map: &CanonicalMap) -> Vec<u8> {
        let mut out = TX_TAG.to_vec();
        map.encode(&mut out);
        out
    }

    /// 已签名封装
    pub fn envelope(&self, map: CanonicalMap, signature: &Signature) -> Result<Vec<u8>, ValidationError> {
        let sig = signature.as_bytes();
        if sig.len() != 64 {
            return Err(ValidationError::InvalidSignature(format!(
                "ed25519 signature must be 64 bytes, got {}",
                sig.len()
            )));
        }
        let mut envelope = CanonicalMap::new();
        envelope.bin("sig", sig.to_vec()).map("txn", map);
        Ok(envelope.to_bytes())
    }
}

fn units_u64(units: u128) -> Result<u64, ValidationError> {
    u64::try_from(units).map_err(|_| ValidationError::InvalidAmount(format!("{} exceeds u64 range", units)))
}

impl TransactionCodec for AlgorandCodec {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Algorand
    }

    fn build_for_sign(&self, transaction: &UncompiledTransaction) -> SdkResult<Vec<Preimage>> {
        let map = self.transaction_map(transaction)?;
        Ok(vec![Preimage::message(self.signing_bytes(&map))])
    }

    fn build_for_send(
        &self,
        transaction: &UncompiledTransaction,
        signatures: &[Signature],
        preimages: &[Preimage],
    ) -> SdkResult<Vec<u8>> {
        ensure_signature_count(signatures, preimages)?;
        let map = self.transaction_map(transaction)?;
        match signatures {
            [signature] => Ok(self.envelope(map, signature)?),
            _ => Err(ValidationError::InvalidSignature(format!("expected 1 signature, got {}", signatures.len())).into()),
        }
    }
}
