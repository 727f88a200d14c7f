//! 地址策略
//!
//! 每种地址格式一个策略实现：由公钥生成地址、校验地址、解码出原始载荷。
//! 按 `ChainConfig::address_format` 由工厂选择具体策略。

use bech32::{segwit, Hrp};
use serde::{Deserialize, Serialize};

use super::{
    chain_config::{AddressFormat, ChainConfig},
    public_key::PublicKey,
};
use crate::{
    error::ValidationError,
    utils::crypto::{blake2b_512, hash160, keccak256, sha512_256},
};

/// 地址类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    /// 该链的首选格式
    Default,
    /// Base58Check P2PKH
    Legacy,
    /// Bech32 P2WPKH
    Segwit,
}

/// 格式化后的地址
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub value: String,
    pub address_type: AddressType,
}

/// 地址策略 trait
pub trait AddressStrategy: Send + Sync {
    /// 支持的地址类型
    fn supported_types(&self) -> Vec<AddressType> {
        vec![AddressType::Default]
    }

    /// 由公钥生成地址
    fn make_address(&self, key: &PublicKey, address_type: AddressType) -> Result<Address, ValidationError>;

    /// 生成所有支持类型的地址
    fn make_addresses(&self, key: &PublicKey) -> Result<Vec<Address>, ValidationError> {
        self.supported_types()
            .into_iter()
            .map(|t| self.make_address(key, t))
            .collect()
    }

    /// 解码地址，返回编码前的载荷（公钥哈希 / 见证程序 / 公钥）
    fn decode(&self, address: &str) -> Result<Vec<u8>, ValidationError>;

    fn validate(&self, address: &str) -> bool {
        self.decode(address).is_ok()
    }
}

fn invalid(address: &str, reason: impl std::fmt::Display) -> ValidationError {
    ValidationError::InvalidAddress(format!("{}: {}", address, reason))
}

fn unsupported_type(address_type: AddressType) -> ValidationError {
    ValidationError::UnsupportedOperation(format!("address type {:?}", address_type))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Base58Check / Bech32 (Bitcoin 系)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 锁定脚本模板
pub mod script {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_1: u8 = 0x51;
    pub const OP_IF: u8 = 0x63;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_CHECKSIG: u8 = 0xac;

    pub fn p2pkh(pubkey_hash: &[u8; 20]) -> Vec<u8> {
        let mut s = Vec::with_capacity(25);
        s.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
        s.extend_from_slice(pubkey_hash);
        s.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        s
    }

    pub fn p2sh(script_hash: &[u8; 20]) -> Vec<u8> {
        let mut s = Vec::with_capacity(23);
        s.extend_from_slice(&[OP_HASH160, 20]);
        s.extend_from_slice(script_hash);
        s.push(OP_EQUAL);
        s
    }

    /// 见证程序：OP_n <program>
    pub fn witness(version: u8, program: &[u8]) -> Vec<u8> {
        let mut s = Vec::with_capacity(2 + program.len());
        s.push(if version == 0 { OP_0 } else { OP_1 + version - 1 });
        s.push(program.len() as u8);
        s.extend_from_slice(program);
        s
    }

    pub fn is_p2pkh(s: &[u8]) -> bool {
        s.len() == 25 && s[0] == OP_DUP && s[1] == OP_HASH160 && s[2] == 20 && s[23] == OP_EQUALVERIFY && s[24] == OP_CHECKSIG
    }

    pub fn is_p2wpkh(s: &[u8]) -> bool {
        s.len() == 22 && s[0] == OP_0 && s[1] == 20
    }

    pub fn is_p2sh(s: &[u8]) -> bool {
        s.len() == 23 && s[0] == OP_HASH160 && s[1] == 20 && s[22] == OP_EQUAL
    }

    /// 数据压栈（最小编码）
    pub fn push_data(out: &mut Vec<u8>, data: &[u8]) {
        let len = data.len();
        if len < OP_PUSHDATA1 as usize {
            out.push(len as u8);
        } else if len <= 0xff {
            out.push(OP_PUSHDATA1);
            out.push(len as u8);
        } else {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(len as u16).to_le_bytes());
        }
        out.extend_from_slice(data);
    }
}

/// Bitcoin 系地址策略
///
/// 配置了 CashAddr 时首选地址为 CashAddr，Base58Check 作为 `Legacy` 继续支持。
#[derive(Debug, Clone)]
pub struct BitcoinAddressStrategy {
    pub p2pkh_prefix: u8,
    pub p2sh_prefix: u8,
    pub bech32_hrp: Option<String>,
    pub cash_addr: Option<CashAddr>,
}

impl BitcoinAddressStrategy {
    pub fn new(p2pkh_prefix: u8, p2sh_prefix: u8, bech32_hrp: Option<String>) -> Self {
        Self {
            p2pkh_prefix,
            p2sh_prefix,
            bech32_hrp,
            cash_addr: None,
        }
    }

    pub fn with_cash_addr(p2pkh_prefix: u8, p2sh_prefix: u8, prefix: impl Into<String>) -> Self {
        Self {
            cash_addr: Some(CashAddr::new(prefix)),
            ..Self::new(p2pkh_prefix, p2sh_prefix, None)
        }
    }

    /// 仅 Base58Check / CashAddr 格式有对应策略
    pub fn from_format(format: &AddressFormat) -> Option<Self> {
        match format {
            AddressFormat::Base58Check {
                p2pkh_prefix,
                p2sh_prefix,
                bech32_hrp,
            } => Some(Self::new(*p2pkh_prefix, *p2sh_prefix, bech32_hrp.clone())),
            AddressFormat::CashAddr {
                prefix,
                p2pkh_prefix,
                p2sh_prefix,
            } => Some(Self::with_cash_addr(*p2pkh_prefix, *p2sh_prefix, prefix.clone())),
            _ => None,
        }
    }

    pub fn bitcoin_mainnet() -> Self {
        Self::new(0x00, 0x05, Some("bc".to_string()))
    }

    /// P2SH 地址（两阶段交易的承诺输出）
    pub fn p2sh_address(&self, redeem_script: &[u8]) -> String {
        let mut payload = vec![self.p2sh_prefix];
        payload.extend_from_slice(&hash160(redeem_script));
        bitcoin::base58::encode_check(&payload)
    }

    /// 地址 → 锁定脚本
    pub fn script_pubkey(&self, address: &str) -> Result<Vec<u8>, ValidationError> {
        if let Ok(payload) = bitcoin::base58::decode_check(address) {
            let hash = base58_hash(address, &payload)?;
            return match payload[0] {
                v if v == self.p2pkh_prefix => Ok(script::p2pkh(&hash)),
                v if v == self.p2sh_prefix => Ok(script::p2sh(&hash)),
                v => Err(invalid(address, format!("unknown version byte {:#04x}", v))),
            };
        }
        if let Some(cash_addr) = &self.cash_addr {
            let (version, hash) = cash_addr.decode(address)?;
            return Ok(match version {
                CASHADDR_P2SH => script::p2sh(&hash),
                _ => script::p2pkh(&hash),
            });
        }
        let (version, program) = self.decode_segwit(address)?;
        Ok(script::witness(version, &program))
    }

    fn decode_segwit(&self, address: &str) -> Result<(u8, Vec<u8>), ValidationError> {
        let expected = self
            .bech32_hrp
            .as_deref()
            .ok_or_else(|| invalid(address, "not a base58check address"))?;
        let (hrp, version, program) = segwit::decode(address).map_err(|e| invalid(address, e))?;
        if hrp.to_string().to_lowercase() != expected {
            return Err(invalid(address, format!("unexpected hrp {}", hrp)));
        }
        Ok((version.to_u8(), program))
    }

    fn legacy(&self, key: &PublicKey) -> String {
        let mut payload = vec![self.p2pkh_prefix];
        payload.extend_from_slice(&hash160(key.blockchain_key()));
        bitcoin::base58::encode_check(&payload)
    }

    fn segwit(&self, key: &PublicKey, hrp: &str) -> Result<String, ValidationError> {
        let hrp = Hrp::parse(hrp).map_err(|e| ValidationError::InvalidAddress(e.to_string()))?;
        let program = hash160(&key.compressed()?);
        segwit::encode(hrp, segwit::VERSION_0, &program)
            .map_err(|e| ValidationError::InvalidAddress(e.to_string()))
    }
}

fn base58_hash(address: &str, payload: &[u8]) -> Result<[u8; 20], ValidationError> {
    if payload.len() != 21 {
        return Err(invalid(address, format!("payload length {}", payload.len())));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok(hash)
}

impl AddressStrategy for BitcoinAddressStrategy {
    fn supported_types(&self) -> Vec<AddressType> {
        if self.cash_addr.is_some() {
            vec![AddressType::Default, AddressType::Legacy]
        } else if self.bech32_hrp.is_some() {
            vec![AddressType::Legacy, AddressType::Segwit]
        } else {
            vec![AddressType::Legacy]
        }
    }

    fn make_address(&self, key: &PublicKey, address_type: AddressType) -> Result<Address, ValidationError> {
        // 校验公钥合法
        key.secp256k1_key()?;
        // CashAddr 链统一使用压缩公钥
        if let Some(cash_addr) = &self.cash_addr {
            let hash = hash160(&key.compressed()?);
            let value = match address_type {
                AddressType::Default => cash_addr.encode(CASHADDR_P2PKH, &hash),
                AddressType::Legacy => {
                    let mut payload = vec![self.p2pkh_prefix];
                    payload.extend_from_slice(&hash);
                    bitcoin::base58::encode_check(&payload)
                }
                AddressType::Segwit => return Err(unsupported_type(address_type)),
            };
            return Ok(Address { value, address_type });
        }
        let (value, address_type) = match (address_type, self.bech32_hrp.as_deref()) {
            (AddressType::Legacy, _) | (AddressType::Default, None) => (self.legacy(key), AddressType::Legacy),
            (AddressType::Segwit | AddressType::Default, Some(hrp)) => {
                (self.segwit(key, hrp)?, AddressType::Segwit)
            }
            (AddressType::Segwit, None) => return Err(unsupported_type(address_type)),
        };
        Ok(Address { value, address_type })
    }

    fn decode(&self, address: &str) -> Result<Vec<u8>, ValidationError> {
        if let Ok(payload) = bitcoin::base58::decode_check(address) {
            if payload.first() != Some(&self.p2pkh_prefix) && payload.first() != Some(&self.p2sh_prefix) {
                return Err(invalid(address, "unknown version byte"));
            }
            return Ok(base58_hash(address, &payload)?.to_vec());
        }
        if let Some(cash_addr) = &self.cash_addr {
            return Ok(cash_addr.decode(address)?.1.to_vec());
        }
        Ok(self.decode_segwit(address)?.1)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CashAddr (Bitcoin Cash)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const CASHADDR_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const CASHADDR_CHECKSUM_LEN: usize = 8;
const CASHADDR_GENERATORS: [u64; 5] = [0x98f2bc8e61, 0x79b76d99e2, 0xf33e5fb3c4, 0xae2eabe2a8, 0x1e4f43e470];

/// 版本字节：类型 << 3 | 长度编码（160 位哈希为 0）
pub const CASHADDR_P2PKH: u8 = 0x00;
pub const CASHADDR_P2SH: u8 = 0x08;

/// CashAddr 编解码，`prefix:payload`，校验和为 40 位 BCH 码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashAddr {
    prefix: String,
}

impl CashAddr {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().to_lowercase(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn encode(&self, version: u8, hash: &[u8; 20]) -> String {
        let mut payload = vec![version];
        payload.extend_from_slice(hash);
        let mut data = convert_bits(&payload, 8, 5, true).unwrap_or_default();
        let checksum = self.polymod(&data, true);
        data.extend((0..CASHADDR_CHECKSUM_LEN).map(|i| ((checksum >> (5 * (7 - i))) & 0x1f) as u8));

        let mut out = String::with_capacity(self.prefix.len() + 1 + data.len());
        out.push_str(&self.prefix);
        out.push(':');
        out.extend(data.iter().map(|&v| CASHADDR_CHARSET[v as usize] as char));
        out
    }

    /// 地址 → (版本字节, 哈希)；前缀可省略，不允许大小写混用
    pub fn decode(&self, address: &str) -> Result<(u8, [u8; 20]), ValidationError> {
        let has_lower = address.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = address.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper {
            return Err(invalid(address, "mixed case"));
        }
        let lowered = address.to_lowercase();
        let body = match lowered.split_once(':') {
            Some((prefix, body)) if prefix == self.prefix => body,
            Some((prefix, _)) => return Err(invalid(address, format!("unexpected prefix {}", prefix))),
            None => lowered.as_str(),
        };

        let values = body
            .bytes()
            .map(|c| CASHADDR_CHARSET.iter().position(|&a| a == c).map(|v| v as u8))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| invalid(address, "invalid character"))?;
        if values.len() <= CASHADDR_CHECKSUM_LEN {
            return Err(invalid(address, "too short"));
        }
        if self.polymod(&values, false) != 0 {
            return Err(invalid(address, "checksum mismatch"));
        }

        let data = &values[..values.len() - CASHADDR_CHECKSUM_LEN];
        let payload = convert_bits(data, 5, 8, false).ok_or_else(|| invalid(address, "invalid padding"))?;
        if payload.len() != 21 {
            return Err(invalid(address, format!("payload length {}", payload.len())));
        }
        let version = payload[0];
        if version != CASHADDR_P2PKH && version != CASHADDR_P2SH {
            return Err(invalid(address, format!("unsupported version byte {:#04x}", version)));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok((version, hash))
    }

    /// 前缀各字符低 5 位 + 0 分隔 + 数据；编码时补 8 个 0 作为校验和占位
    fn polymod(&self, data: &[u8], pad_checksum: bool) -> u64 {
        let prefix = self.prefix.bytes().map(|c| c & 0x1f);
        let padding = if pad_checksum { CASHADDR_CHECKSUM_LEN } else { 0 };
        let values = prefix
            .chain(std::iter::once(0))
            .chain(data.iter().copied())
            .chain(std::iter::repeat(0).take(padding));

        let mut c: u64 = 1;
        for d in values {
            let c0 = c >> 35;
            c = ((c & 0x07_ffff_ffff) << 5) ^ d as u64;
            for (i, g) in CASHADDR_GENERATORS.iter().enumerate() {
                if (c0 >> i) & 1 == 1 {
                    c ^= g;
                }
            }
        }
        c ^ 1
    }
}

/// 位宽转换；不补位时剩余位必须为 0 且不足一组
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max = (1u32 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &value in data {
        if (value as u32) >> from != 0 {
            return None;
        }
        acc = (acc << from) | value as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
        acc &= (1u32 << bits) - 1;
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || acc != 0 {
        return None;
    }
    Some(out)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EIP-55 (EVM 系)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Eip55AddressStrategy;

impl Eip55AddressStrategy {
    /// 20 字节 → EIP-55 校验格式
    pub fn checksum_encode(bytes: &[u8; 20]) -> String {
        let lower = hex::encode(bytes);
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, ch) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 { hash[i / 2] >> 4 } else { hash[i / 2] & 0x0f };
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }

    /// 解析为 20 字节；含大写字母时必须满足 EIP-55 校验
    pub fn parse(address: &str) -> Result<[u8; 20], ValidationError> {
        let hex_part = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .ok_or_else(|| invalid(address, "missing 0x prefix"))?;
        if hex_part.len() != 40 {
            return Err(invalid(address, "expected 40 hex characters"));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex_part, &mut bytes).map_err(|e| invalid(address, e))?;

        let mixed_case = hex_part.chars().any(|c| c.is_ascii_uppercase())
            && hex_part.chars().any(|c| c.is_ascii_lowercase());
        if mixed_case && Self::checksum_encode(&bytes)[2..] != *hex_part {
            return Err(invalid(address, "EIP-55 checksum mismatch"));
        }
        Ok(bytes)
    }
}

impl AddressStrategy for Eip55AddressStrategy {
    fn make_address(&self, key: &PublicKey, address_type: AddressType) -> Result<Address, ValidationError> {
        if address_type != AddressType::Default {
            return Err(unsupported_type(address_type));
        }
        let uncompressed = key.uncompressed()?;
        let hash = keccak256(&uncompressed[1..]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash[12..]);
        Ok(Address {
            value: Self::checksum_encode(&bytes),
            address_type,
        })
    }

    fn decode(&self, address: &str) -> Result<Vec<u8>, ValidationError> {
        Ok(Self::parse(address)?.to_vec())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SS58 (Substrate)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SS58_PREFIX: &[u8] = b"SS58PRE";

pub struct Ss58AddressStrategy {
    pub network_prefix: u16,
}

impl Ss58AddressStrategy {
    fn prefix_bytes(&self) -> Vec<u8> {
        let ident = self.network_prefix;
        if ident < 64 {
            vec![ident as u8]
        } else {
            vec![
                (((ident & 0b0000_0000_1111_1100) as u8) >> 2) | 0b0100_0000,
                ((ident >> 8) as u8) | (((ident & 0b0000_0000_0000_0011) as u8) << 6),
            ]
        }
    }

    fn checksum(data: &[u8]) -> [u8; 2] {
        let hash = blake2b_512(&[SS58_PREFIX, data]);
        [hash[0], hash[1]]
    }
}

impl AddressStrategy for Ss58AddressStrategy {
    fn make_address(&self, key: &PublicKey, address_type: AddressType) -> Result<Address, ValidationError> {
        if address_type != AddressType::Default {
            return Err(unsupported_type(address_type));
        }
        let mut data = self.prefix_bytes();
        data.extend_from_slice(&key.ed25519()?);
        let checksum = Self::checksum(&data);
        data.extend_from_slice(&checksum);
        Ok(Address {
            value: bs58::encode(data).into_string(),
            address_type,
        })
    }

    fn decode(&self, address: &str) -> Result<Vec<u8>, ValidationError> {
        let raw = bs58::decode(address)
            .into_vec()
            .map_err(|e| invalid(address, e))?;
        let prefix = self.prefix_bytes();
        if raw.len() != prefix.len() + 32 + 2 {
            return Err(invalid(address, "unexpected length"));
        }
        if raw[..prefix.len()] != prefix[..] {
            return Err(invalid(address, "network prefix mismatch"));
        }
        let (data, checksum) = raw.split_at(raw.len() - 2);
        if Self::checksum(data) != checksum {
            return Err(invalid(address, "checksum mismatch"));
        }
        Ok(data[prefix.len()..].to_vec())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Algorand (Base32 + SHA-512/256 校验)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const ALGORAND_CHECKSUM_LEN: usize = 4;

pub struct AlgorandAddressStrategy;

impl AlgorandAddressStrategy {
    fn checksum(key: &[u8]) -> [u8; ALGORAND_CHECKSUM_LEN] {
        let hash = sha512_256(key);
        let mut out = [0u8; ALGORAND_CHECKSUM_LEN];
        out.copy_from_slice(&hash[32 - ALGORAND_CHECKSUM_LEN..]);
        out
    }

    /// 32 字节公钥 → 地址
    pub fn encode_key(key: &[u8; 32]) -> String {
        let mut data = key.to_vec();
        data.extend_from_slice(&Self::checksum(key));
        base32_encode(&data)
    }

    /// 地址 → 32 字节公钥
    pub fn parse(address: &str) -> Result<[u8; 32], ValidationError> {
        let raw = base32_decode(address).ok_or_else(|| invalid(address, "invalid base32"))?;
        if raw.len() != 32 + ALGORAND_CHECKSUM_LEN {
            return Err(invalid(address, "unexpected length"));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&raw[..32]);
        if Self::checksum(&key) != raw[32..] {
            return Err(invalid(address, "checksum mismatch"));
        }
        Ok(key)
    }
}

impl AddressStrategy for AlgorandAddressStrategy {
    fn make_address(&self, key: &PublicKey, address_type: AddressType) -> Result<Address, ValidationError> {
        if address_type != AddressType::Default {
            return Err(unsupported_type(address_type));
        }
        Ok(Address {
            value: Self::encode_key(&key.ed25519()?),
            address_type,
        })
    }

    fn decode(&self, address: &str) -> Result<Vec<u8>, ValidationError> {
        Ok(Self::parse(address)?.to_vec())
    }
}

/// RFC 4648 base32，无填充
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u16 = 0;
    let mut bits = 0u8;
    for &byte in data {
        buffer = (buffer << 8) | byte as u16;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(s: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len() * 5 / 8);
    let mut buffer: u16 = 0;
    let mut bits = 0u8;
    for c in s.trim_end_matches('=').bytes() {
        let value = BASE32_ALPHABET.iter().position(|&a| a == c.to_ascii_uppercase())? as u16;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    // 尾部填充位必须为 0，否则同一字节串会有多种写法
    if bits >= 5 || buffer != 0 {
        return None;
    }
    Some(out)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Solana (Base58 公钥)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SolanaAddressStrategy;

impl SolanaAddressStrategy {
    pub fn parse(address: &str) -> Result<[u8; 32], ValidationError> {
        let raw = bs58::decode(address)
            .into_vec()
            .map_err(|e| invalid(address, e))?;
        <[u8; 32]>::try_from(raw.as_slice()).map_err(|_| invalid(address, "expected 32 bytes"))
    }
}

impl AddressStrategy for SolanaAddressStrategy {
    fn make_address(&self, key: &PublicKey, address_type: AddressType) -> Result<Address, ValidationError> {
        if address_type != AddressType::Default {
            return Err(unsupported_type(address_type));
        }
        Ok(Address {
            value: bs58::encode(key.ed25519()?).into_string(),
            address_type,
        })
    }

    fn decode(&self, address: &str) -> Result<Vec<u8>, ValidationError> {
        Ok(Self::parse(address)?.to_vec())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 策略工厂
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AddressStrategyFactory;

impl AddressStrategyFactory {
    pub fn for_chain(chain: &ChainConfig) -> Box<dyn AddressStrategy> {
        Self::create_strategy(&chain.address_format)
    }

    /// 根据地址格式创建对应的策略
    pub fn create_strategy(format: &AddressFormat) -> Box<dyn AddressStrategy> {
        match format {
            AddressFormat::Base58Check {
                p2pkh_prefix,
                p2sh_prefix,
                bech32_hrp,
            } => Box::new(BitcoinAddressStrategy::new(
                *p2pkh_prefix,
                *p2sh_prefix,
                bech32_hrp.clone(),
            )),
            AddressFormat::CashAddr {
                prefix,
                p2pkh_prefix,
                p2sh_prefix,
            } => Box::new(BitcoinAddressStrategy::with_cash_addr(
                *p2pkh_prefix,
                *p2sh_prefix,
                prefix.clone(),
            )),
            AddressFormat::Eip55 => Box::new(Eip55AddressStrategy),
            AddressFormat::Ss58 { network_prefix } => Box::new(Ss58AddressStrategy {
                network_prefix: *network_prefix,
            }),
            AddressFormat::Algorand => Box::new(AlgorandAddressStrategy),
            AddressFormat::SolanaBase58 => Box::new(SolanaAddressStrategy),
        }
    }
}
