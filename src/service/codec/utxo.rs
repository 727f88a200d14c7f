//! UTXO 脚本族编解码器
//!
//! 交易结构：version | [marker flag] | inputs | outputs | [witness] | locktime。
//! 输出顺序固定为 `[目标, 找零?]`，找零回源地址（或显式找零地址）。
//!
//! 摘要算法：
//! - `Legacy`：P2PKH 输入用传统摘要，P2WPKH 输入用 BIP-143，P2SH 输入以赎回脚本为 scriptCode
//! - `ForkId`：所有输入用 BIP-143，hashtype 为 `SIGHASH_ALL | FORKID`

use rust_decimal::Decimal;

use super::{der_encode, ensure_signature_count, parse_secp256k1, TransactionCodec};
use crate::{
    domain::{
        address::{script, AddressStrategy, BitcoinAddressStrategy},
        amount::{Amount, AmountKind},
        chain_config::{ChainConfig, DustPolicy, ProtocolFamily, SighashScheme},
        public_key::PublicKey,
        transaction::{Preimage, Signature, UncompiledTransaction},
        unspent_output::UnspentOutput,
    },
    error::{SdkError, SdkResult, ValidationError},
    utils::{
        bytes::{write_var_bytes, write_varint},
        crypto::double_sha256,
    },
};

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_FORKID: u32 = 0x40;

const TX_VERSION: u32 = 1;

/// DER 签名最大长度 + hashtype，用于体积估算
const PLACEHOLDER_SIGNATURE_LEN: usize = 73;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 原始交易结构
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    /// 线路字节序的前序交易哈希
    pub prev_hash: [u8; 32],
    pub prev_index: u32,
    /// 被花费输出的金额（最小单位）
    pub value: u64,
    pub script_pubkey: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

impl RawOutput {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(out, &self.script_pubkey);
    }
}

/// 输入的解锁方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpend {
    /// scriptSig = <sig> <pubkey>
    P2pkh,
    /// witness = [sig, compressed pubkey]
    P2wpkh,
    /// scriptSig = <sig> <redeemScript>
    P2shRedeem(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub version: u32,
    pub inputs: Vec<RawInput>,
    pub outputs: Vec<RawOutput>,
    pub lock_time: u32,
}

impl RawTransaction {
    pub fn new(inputs: Vec<RawInput>, outputs: Vec<RawOutput>) -> Self {
        Self {
            version: TX_VERSION,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// 传统摘要：被签输入放入 scriptCode，其余输入脚本置空
    pub fn legacy_sighash(&self, index: usize, script_code: &[u8], hash_type: u32) -> [u8; 32] {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut buf, self.inputs.len() as u64);
        for (i, input) in self.inputs.iter().enumerate() {
            buf.extend_from_slice(&input.prev_hash);
            buf.extend_from_slice(&input.prev_index.to_le_bytes());
            write_var_bytes(&mut buf, if i == index { script_code } else { &[] });
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        self.write_outputs(&mut buf);
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf.extend_from_slice(&hash_type.to_le_bytes());
        double_sha256(&buf)
    }

    /// BIP-143 摘要
    pub fn bip143_sighash(&self, index: usize, script_code: &[u8], hash_type: u32) -> [u8; 32] {
        let input = &self.inputs[index];

        let mut prevouts = Vec::with_capacity(self.inputs.len() * 36);
        let mut sequences = Vec::with_capacity(self.inputs.len() * 4);
        for i in &self.inputs {
            prevouts.extend_from_slice(&i.prev_hash);
            prevouts.extend_from_slice(&i.prev_index.to_le_bytes());
            sequences.extend_from_slice(&i.sequence.to_le_bytes());
        }
        let mut outputs = Vec::new();
        for output in &self.outputs {
            output.write(&mut outputs);
        }

        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&double_sha256(&prevouts));
        buf.extend_from_slice(&double_sha256(&sequences));
        buf.extend_from_slice(&input.prev_hash);
        buf.extend_from_slice(&input.prev_index.to_le_bytes());
        write_var_bytes(&mut buf, script_code);
        buf.extend_from_slice(&input.value.to_le_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());
        buf.extend_from_slice(&double_sha256(&outputs));
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf.extend_from_slice(&hash_type.to_le_bytes());
        double_sha256(&buf)
    }

    fn write_outputs(&self, buf: &mut Vec<u8>) {
        write_varint(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(buf);
        }
    }

    /// 序列化；任一输入带见证时使用隔离见证格式
    pub fn serialize(&self, script_sigs: &[Vec<u8>], witnesses: &[Vec<Vec<u8>>]) -> Vec<u8> {
        let segwit = witnesses.iter().any(|w| !w.is_empty());
        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(&self.version.to_le_bytes());
        if segwit {
            buf.extend_from_slice(&[0x00, 0x01]);
        }
        write_varint(&mut buf, self.inputs.len() as u64);
        for (i, input) in self.inputs.iter().enumerate() {
            buf.extend_from_slice(&input.prev_hash);
            buf.extend_from_slice(&input.prev_index.to_le_bytes());
            write_var_bytes(&mut buf, script_sigs.get(i).map(Vec::as_slice).unwrap_or(&[]));
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        self.write_outputs(&mut buf);
        if segwit {
            for i in 0..self.inputs.len() {
                let items = witnesses.get(i).map(Vec::as_slice).unwrap_or(&[]);
                write_varint(&mut buf, items.len() as u64);
                for item in items {
                    write_var_bytes(&mut buf, item);
                }
            }
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }
}

/// 交易哈希（去见证序列化的双 SHA256，按浏览器习惯反序显示）
pub fn transaction_id(raw: &RawTransaction, script_sigs: &[Vec<u8>]) -> String {
    let mut hash = double_sha256(&raw.serialize(script_sigs, &[]));
    hash.reverse();
    hex::encode(hash)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 签名拼装
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 按链的摘要方案计算所有输入的签名哈希，并负责拼装解锁脚本
#[derive(Debug, Clone)]
pub struct SpendAssembler<'a> {
    pub sighash: SighashScheme,
    pub key: &'a PublicKey,
}

impl<'a> SpendAssembler<'a> {
    pub fn hash_type(&self) -> u32 {
        match self.sighash {
            SighashScheme::Legacy => SIGHASH_ALL,
            SighashScheme::ForkId { fork_value } => SIGHASH_ALL | SIGHASH_FORKID | (fork_value << 8),
        }
    }

    pub fn sighashes(&self, raw: &RawTransaction, spends: &[InputSpend]) -> SdkResult<Vec<[u8; 32]>> {
        let hash_type = self.hash_type();
        raw.inputs
            .iter()
            .zip(spends)
            .enumerate()
            .map(|(i, (input, spend))| {
                let script_code = self.script_code(input, spend)?;
                Ok(match (self.sighash, spend) {
                    (SighashScheme::ForkId { .. }, _) | (SighashScheme::Legacy, InputSpend::P2wpkh) => {
                        raw.bip143_sighash(i, &script_code, hash_type)
                    }
                    (SighashScheme::Legacy, _) => raw.legacy_sighash(i, &script_code, hash_type),
                })
            })
            .collect()
    }

    fn script_code(&self, input: &RawInput, spend: &InputSpend) -> SdkResult<Vec<u8>> {
        Ok(match spend {
            InputSpend::P2pkh => input.script_pubkey.clone(),
            InputSpend::P2wpkh => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&input.script_pubkey[2..22]);
                script::p2pkh(&hash)
            }
            InputSpend::P2shRedeem(redeem) => redeem.clone(),
        })
    }

    /// 拼装带签名的交易字节
    pub fn assemble(
        &self,
        raw: &RawTransaction,
        spends: &[InputSpend],
        signatures: &[Vec<u8>],
    ) -> SdkResult<Vec<u8>> {
        let (script_sigs, witnesses) = self.unlocking(spends, signatures)?;
        Ok(raw.serialize(&script_sigs, &witnesses))
    }

    /// 由签名（已附加 hashtype 的 DER）生成 scriptSig 与见证
    pub fn unlocking(
        &self,
        spends: &[InputSpend],
        signatures: &[Vec<u8>],
    ) -> SdkResult<(Vec<Vec<u8>>, Vec<Vec<Vec<u8>>>)> {
        let mut script_sigs = Vec::with_capacity(spends.len());
        let mut witnesses = Vec::with_capacity(spends.len());
        for (spend, signature) in spends.iter().zip(signatures) {
            match spend {
                InputSpend::P2pkh => {
                    let mut s = Vec::with_capacity(signature.len() + 67);
                    script::push_data(&mut s, signature);
                    script::push_data(&mut s, self.key.blockchain_key());
                    script_sigs.push(s);
                    witnesses.push(Vec::new());
                }
                InputSpend::P2wpkh => {
                    script_sigs.push(Vec::new());
                    witnesses.push(vec![signature.clone(), self.key.compressed()?]);
                }
                InputSpend::P2shRedeem(redeem) => {
                    let mut s = Vec::with_capacity(signature.len() + redeem.len() + 4);
                    script::push_data(&mut s, signature);
                    script::push_data(&mut s, redeem);
                    script_sigs.push(s);
                    witnesses.push(Vec::new());
                }
            }
        }
        Ok((script_sigs, witnesses))
    }

    /// 外部签名 → DER + hashtype 字节
    pub fn encode_signatures(&self, signatures: &[Signature]) -> SdkResult<Vec<Vec<u8>>> {
        let hash_type = (self.hash_type() & 0xff) as u8;
        signatures
            .iter()
            .map(|signature| {
                let mut der = der_encode(&parse_secp256k1(signature)?);
                der.push(hash_type);
                Ok(der)
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UTXO 编解码器
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 金额 → 最小单位
pub(crate) fn to_units(value: Decimal, symbol: &str, decimals: u8) -> Result<u64, ValidationError> {
    let units = Amount::coin(value, symbol, decimals).to_base_units()?;
    u64::try_from(units).map_err(|_| ValidationError::InvalidAmount(format!("{} exceeds u64 range", value)))
}

#[derive(Clone)]
pub struct UtxoCodec {
    chain: ChainConfig,
    key: PublicKey,
    addresses: BitcoinAddressStrategy,
}

impl UtxoCodec {
    pub fn new(chain: ChainConfig, key: PublicKey) -> SdkResult<Self> {
        let addresses = BitcoinAddressStrategy::from_format(&chain.address_format).ok_or_else(|| {
            SdkError::config(format!(
                "chain {} uses {:?}, not a UTXO address format",
                chain.id, chain.address_format
            ))
        })?;
        key.secp256k1_key()?;
        Ok(Self {
            chain,
            key,
            addresses,
        })
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn addresses(&self) -> &BitcoinAddressStrategy {
        &self.addresses
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    pub(crate) fn signer(&self) -> SpendAssembler<'_> {
        SpendAssembler {
            sighash: self.chain.params.sighash,
            key: &self.key,
        }
    }

    pub(crate) fn units(&self, value: Decimal) -> Result<u64, ValidationError> {
        to_units(value, &self.chain.symbol, self.chain.decimals)
    }

    /// 金额必须是本链原生币
    pub(crate) fn check_coin(&self, amount: &Amount) -> Result<(), ValidationError> {
        if amount.kind != AmountKind::Coin
            || amount.currency_symbol != self.chain.symbol
            || amount.decimals != self.chain.decimals
        {
            return Err(ValidationError::CurrencyMismatch {
                expected: self.chain.symbol.clone(),
                actual: amount.currency_symbol.clone(),
            });
        }
        if amount.value.is_sign_negative() {
            return Err(ValidationError::InvalidAmount(format!("negative amount {}", amount.value)));
        }
        Ok(())
    }

    /// 输入转换：按锁定脚本识别解锁方式
    pub(crate) fn inputs(&self, utxos: &[UnspentOutput]) -> SdkResult<(Vec<RawInput>, Vec<InputSpend>)> {
        let mut inputs = Vec::with_capacity(utxos.len());
        let mut spends = Vec::with_capacity(utxos.len());
        for utxo in utxos {
            let spend = if script::is_p2pkh(&utxo.script) {
                InputSpend::P2pkh
            } else if script::is_p2wpkh(&utxo.script) {
                InputSpend::P2wpkh
            } else {
                return Err(ValidationError::UnsupportedOperation(format!(
                    "cannot spend output {}:{} with script {}",
                    utxo.tx_hash,
                    utxo.output_index,
                    hex::encode(&utxo.script)
                ))
                .into());
            };
            inputs.push(RawInput {
                prev_hash: utxo.outpoint_hash()?,
                prev_index: utxo.output_index,
                value: self.units(utxo.amount)?,
                script_pubkey: utxo.script.clone(),
                sequence: self.chain.params.input_sequence,
            });
            spends.push(spend);
        }
        Ok((inputs, spends))
    }

    /// 计算找零；低于粉尘阈值按链策略处理
    pub(crate) fn change_output(&self, change: Decimal, change_address: &str) -> SdkResult<Option<RawOutput>> {
        if change.is_zero() {
            return Ok(None);
        }
        let dust = self.chain.params.dust_threshold;
        if change < dust {
            return match self.chain.params.dust_policy {
                DustPolicy::Reject => Err(ValidationError::DustChange { change, dust }.into()),
                DustPolicy::AbsorbIntoFee | DustPolicy::AddSmallest => {
                    tracing::debug!(chain = %self.chain.id, %change, %dust, "dust change absorbed into fee");
                    Ok(None)
                }
            };
        }
        Ok(Some(RawOutput {
            value: self.units(change)?,
            script_pubkey: self.addresses.script_pubkey(change_address)?,
        }))
    }

    /// 由交易意图构建未签名交易骨架
    pub fn build_raw(&self, transaction: &UncompiledTransaction) -> SdkResult<(RawTransaction, Vec<InputSpend>)> {
        if transaction.amount.is_token() {
            return Err(ValidationError::UnsupportedOperation(
                "token transfer requires the commit/reveal flow".into(),
            )
            .into());
        }
        let extras = transaction.extras.utxo()?;
        if extras.unspent_outputs.is_empty() {
            return Err(ValidationError::MissingRequiredExtra("utxo outputs").into());
        }
        self.check_coin(&transaction.amount)?;
        let fee = transaction.fee.amount();
        self.check_coin(fee)?;

        let dust = self.chain.params.dust_threshold;
        if transaction.amount.is_zero() || transaction.amount.value < dust {
            return Err(ValidationError::InvalidAmount(format!(
                "{} is below dust threshold {}",
                transaction.amount.value, dust
            ))
            .into());
        }

        let available: Decimal = extras.unspent_outputs.iter().map(|u| u.amount).sum();
        let required = transaction.amount.value + fee.value;
        if available < required {
            return Err(SdkError::InsufficientFunds { required, available });
        }

        let (inputs, spends) = self.inputs(&extras.unspent_outputs)?;
        let mut outputs = vec![RawOutput {
            value: self.units(transaction.amount.value)?,
            script_pubkey: self.addresses.script_pubkey(&transaction.destination)?,
        }];
        let change_address = extras.change_address.as_deref().unwrap_or(&transaction.source);
        if let Some(change) = self.change_output(available - required, change_address)? {
            outputs.push(change);
        }

        Ok((RawTransaction::new(inputs, outputs), spends))
    }

    /// 用占位签名拼装后估算虚拟体积（vbytes）
    pub fn estimate_virtual_size(&self, transaction: &UncompiledTransaction) -> SdkResult<usize> {
        let (raw, spends) = self.build_raw(transaction)?;
        estimate_virtual_size(&self.signer(), &raw, &spends)
    }

    /// 签名后交易的交易哈希
    pub fn transaction_id(&self, transaction: &UncompiledTransaction, signatures: &[Signature]) -> SdkResult<String> {
        let (raw, spends) = self.build_raw(transaction)?;
        let signer = self.signer();
        let encoded = signer.encode_signatures(signatures)?;
        let (script_sigs, _) = signer.unlocking(&spends, &encoded)?;
        Ok(transaction_id(&raw, &script_sigs))
    }
}

pub(crate) fn estimate_virtual_size(
    signer: &SpendAssembler<'_>,
    raw: &RawTransaction,
    spends: &[InputSpend],
) -> SdkResult<usize> {
    let placeholders = vec![vec![0u8; PLACEHOLDER_SIGNATURE_LEN]; spends.len()];
    let (script_sigs, witnesses) = signer.unlocking(spends, &placeholders)?;
    let base = raw.serialize(&script_sigs, &[]).len();
    let total = raw.serialize(&script_sigs, &witnesses).len();
    Ok((base * 3 + total + 3) / 4)
}

impl TransactionCodec for UtxoCodec {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Utxo
    }

    fn build_for_sign(&self, transaction: &UncompiledTransaction) -> SdkResult<Vec<Preimage>> {
        let (raw, spends) = self.build_raw(transaction)?;
        Ok(self
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
        let (raw, spends) = self.build_raw(transaction)?;
        if spends.len() != signatures.len() {
            return Err(ValidationError::InvalidSignature(format!(
                "expected {} signatures, got {}",
                spends.len(),
                signatures.len()
            ))
            .into());
        }
        let signer = self.signer();
        let encoded = signer.encode_signatures(signatures)?;
        signer.assemble(&raw, &spends, &encoded)
    }
}
