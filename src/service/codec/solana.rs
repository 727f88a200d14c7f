//! Borsh 风格定长消息族编解码器（Solana）
//!
//! 传统消息格式：
//! `header[3] ‖ compact(keys) ‖ keys ‖ recent_blockhash ‖ compact(instructions) ‖ instructions`
//!
//! 签名原像即消息本身（ed25519 对消息签名），线路格式为
//! `compact(n) ‖ signatures[n * 64] ‖ message`。

use ed25519_dalek::VerifyingKey as Ed25519Key;

use super::{ensure_signature_count, TransactionCodec};
use crate::{
    domain::{
        address::SolanaAddressStrategy,
        amount::AmountKind,
        chain_config::{ChainConfig, ProtocolFamily},
        public_key::PublicKey,
        transaction::{Preimage, Signature, UncompiledTransaction},
    },
    error::{SdkResult, ValidationError},
    utils::{bytes::write_compact_u16, crypto::sha256},
};

pub const SYSTEM_PROGRAM: [u8; 32] = [0u8; 32];
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const ASSOCIATED_TOKEN_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// SystemInstruction::Transfer
const SYSTEM_TRANSFER: u32 = 2;
/// TokenInstruction::TransferChecked
const TOKEN_TRANSFER_CHECKED: u8 = 12;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// 编译后的指令：程序与账户均以账户表下标引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// 传统消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
    pub account_keys: Vec<[u8; 32]>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + 1 + self.account_keys.len() * 32 + 32 + 64);
        out.push(self.num_required_signatures);
        out.push(self.num_readonly_signed);
        out.push(self.num_readonly_unsigned);

        write_compact_u16(&mut out, self.account_keys.len() as u16);
        for key in &self.account_keys {
            out.extend_from_slice(key);
        }
        out.extend_from_slice(&self.recent_blockhash);

        write_compact_u16(&mut out, self.instructions.len() as u16);
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            write_compact_u16(&mut out, ix.accounts.len() as u16);
            out.extend_from_slice(&ix.accounts);
            write_compact_u16(&mut out, ix.data.len() as u16);
            out.extend_from_slice(&ix.data);
        }
        out
    }
}

/// 程序派生地址：从 bump=255 向下找第一个不在曲线上的哈希
pub fn find_program_address(seeds: &[&[u8]], program_id: &[u8; 32]) -> Option<([u8; 32], u8)> {
    (0..=u8::MAX).rev().find_map(|bump| {
        let mut buf = Vec::with_capacity(seeds.iter().map(|s| s.len()).sum::<usize>() + 1 + 32 + PDA_MARKER.len());
        for seed in seeds {
            buf.extend_from_slice(seed);
        }
        buf.push(bump);
        buf.extend_from_slice(program_id);
        buf.extend_from_slice(PDA_MARKER);
        let hash = sha256(&buf);
        (!is_on_curve(&hash)).then_some((hash, bump))
    })
}

/// 能解压为 ed25519 点即视为在曲线上
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    Ed25519Key::from_bytes(bytes).is_ok()
}

/// 关联代币账户地址
pub fn associated_token_address(owner: &[u8; 32], mint: &[u8; 32]) -> Result<[u8; 32], ValidationError> {
    let token_program = SolanaAddressStrategy::parse(TOKEN_PROGRAM)?;
    let ata_program = SolanaAddressStrategy::parse(ASSOCIATED_TOKEN_PROGRAM)?;
    find_program_address(&[owner.as_slice(), token_program.as_slice(), mint.as_slice()], &ata_program)
        .map(|(address, _)| address)
        .ok_or_else(|| ValidationError::InvalidAddress("no viable program address".into()))
}

pub struct SolanaCodec {
    chain: ChainConfig,
    payer: [u8; 32],
}

impl SolanaCodec {
    pub fn new(chain: ChainConfig, key: &PublicKey) -> SdkResult<Self> {
        Ok(Self {
            chain,
            payer: key.ed25519()?,
        })
    }

    pub fn payer_address(&self) -> String {
        bs58::encode(self.payer).into_string()
    }

    /// 交易意图 → 消息
    pub fn message(&self, transaction: &UncompiledTransaction) -> SdkResult<Message> {
        let extras = transaction.extras.solana()?;
        let source = SolanaAddressStrategy::parse(&transaction.source)?;
        if source != self.payer {
            return Err(ValidationError::InvalidAddress(format!(
                "{} does not belong to the wallet key",
                transaction.source
            ))
            .into());
        }
        let destination = SolanaAddressStrategy::parse(&transaction.destination)?;
        // 账户表不允许重复公钥
        if destination == self.payer {
            return Err(ValidationError::UnsupportedOperation("transfer to the paying account itself".into()).into());
        }
        let units = u64::try_from(transaction.amount.to_base_units()?)
            .map_err(|_| ValidationError::InvalidAmount(format!("{} exceeds u64 range", transaction.amount.value)))?;

        match &transaction.amount.kind {
            AmountKind::Coin => {
                self.check_coin(transaction)?;
                Ok(self.system_transfer(destination, units, extras.recent_blockhash))
            }
            AmountKind::Token(token) => {
                let mint = SolanaAddressStrategy::parse(&token.contract_address)?;
                Ok(self.token_transfer(destination, mint, units, token.decimals, extras.recent_blockhash)?)
            }
            AmountKind::Reserve => {
                Err(ValidationError::UnsupportedOperation("reserve amount cannot be transferred".into()).into())
            }
        }
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

    /// 账户表：[payer(签名,可写), destination(可写), system(只读)]
    fn system_transfer(&self, destination: [u8; 32], lamports: u64, recent_blockhash: [u8; 32]) -> Message {
        let mut data = Vec::with_capacity(12);
        data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
        data.extend_from_slice(&lamports.to_le_bytes());

        Message {
            num_required_signatures: 1,
            num_readonly_signed: 0,
            num_readonly_unsigned: 1,
            account_keys: vec![self.payer, destination, SYSTEM_PROGRAM],
            recent_blockhash,
            instructions: vec![CompiledInstruction {
                program_id_index: 2,
                accounts: vec![0, 1],
                data,
            }],
        }
    }

    /// 账户表：[owner, source_ata, destination_ata, mint, token_program]
    ///
    /// 接收方的关联代币账户需已存在。
    fn token_transfer(
        &self,
        destination: [u8; 32],
        mint: [u8; 32],
        amount: u64,
        decimals: u8,
        recent_blockhash: [u8; 32],
    ) -> Result<Message, ValidationError> {
        let token_program = SolanaAddressStrategy::parse(TOKEN_PROGRAM)?;
        let source_ata = associated_token_address(&self.payer, &mint)?;
        let destination_ata = associated_token_address(&destination, &mint)?;

        let mut data = Vec::with_capacity(10);
        data.push(TOKEN_TRANSFER_CHECKED);
        data.extend_from_slice(&amount.to_le_bytes());
        data.push(decimals);

        Ok(Message {
            num_required_signatures: 1,
            num_readonly_signed: 0,
            num_readonly_unsigned: 2,
            account_keys: vec![self.payer, source_ata, destination_ata, mint, token_program],
            recent_blockhash,
            instructions: vec![CompiledInstruction {
                program_id_index: 4,
                // source, mint, destination, authority
                accounts: vec![1, 3, 2, 0],
                data,
            }],
        })
    }

    /// 签名前置于消息
    pub fn wire(&self, message: &[u8], signatures: &[Signature]) -> Result<Vec<u8>, ValidationError> {
        let mut out = Vec::with_capacity(1 + signatures.len() * 64 + message.len());
        write_compact_u16(&mut out, signatures.len() as u16);
        for signature in signatures {
            let bytes = signature.as_bytes();
            if bytes.len() != 64 {
                return Err(ValidationError::InvalidSignature(format!(
                    "ed25519 signature must be 64 bytes, got {}",
                    bytes.len()
                )));
            }
            out.extend_from_slice(bytes);
        }
        out.extend_from_slice(message);
        Ok(out)
    }
}

impl TransactionCodec for SolanaCodec {
    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Solana
    }

    fn build_for_sign(&self, transaction: &UncompiledTransaction) -> SdkResult<Vec<Preimage>> {
        Ok(vec![Preimage::message(self.message(transaction)?.serialize())])
    }

    fn build_for_send(
        &self,
        transaction: &UncompiledTransaction,
        signatures: &[Signature],
        preimages: &[Preimage],
    ) -> SdkResult<Vec<u8>> {
        ensure_signature_count(signatures, preimages)?;
        let message = self.message(transaction)?.serialize();
        Ok(self.wire(&message, signatures)?)
    }
}
