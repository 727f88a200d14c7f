//! 多链配置模块
//!
//! 定义所有支持的区块链、协议族、地址格式及手续费/粉尘默认参数

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 加密曲线类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    /// secp256k1 曲线 (Bitcoin, Litecoin, Ethereum, BSC, Polygon)
    Secp256k1,
    /// ed25519 曲线 (Solana, Algorand, Polkadot)
    Ed25519,
}

/// 协议族：每个协议族对应一个编解码器实现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    /// UTXO 脚本族
    Utxo,
    /// 账户/nonce RLP 族
    Evm,
    /// 规范化 msgpack 映射族
    Algorand,
    /// Borsh 风格定长消息族
    Solana,
    /// 仅支持地址
    Substrate,
}

/// 地址编码格式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressFormat {
    /// Base58Check (P2PKH/P2SH)，可选 Bech32 隔离见证
    Base58Check {
        p2pkh_prefix: u8,
        p2sh_prefix: u8,
        bech32_hrp: Option<String>,
    },
    /// CashAddr (Bitcoin Cash)，旧版 Base58Check 地址仍可解析
    CashAddr {
        prefix: String,
        p2pkh_prefix: u8,
        p2sh_prefix: u8,
    },
    /// 十六进制 0x... (EIP-55 校验)
    Eip55,
    /// SS58 编码 (Polkadot/Substrate)
    Ss58 { network_prefix: u16 },
    /// Base32 + SHA-512/256 校验 (Algorand)
    Algorand,
    /// Base58 编码 (Solana)
    SolanaBase58,
}

/// HD 派生标准
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivationStandard {
    /// BIP44: m/44'/coin_type'/account'/change/index
    BIP44,
    /// BIP84: m/84'/coin_type'/account'/change/index (native segwit)
    BIP84,
    /// SLIP-0010: 适用于 ed25519
    SLIP0010,
}

/// 找零低于粉尘阈值时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DustPolicy {
    /// 追加一个最小的未选 UTXO，把找零抬到阈值以上
    AddSmallest,
    /// 不创建找零输出，差额并入手续费
    AbsorbIntoFee,
    /// 拒绝构建交易
    Reject,
}

/// UTXO 签名摘要算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SighashScheme {
    /// 经典双 SHA256：P2PKH 用传统摘要，P2WPKH 用 BIP-143
    Legacy,
    /// 所有输入都用 BIP-143 摘要，hashtype 带 FORKID 标记 (Bitcoin Cash 系)
    ForkId { fork_value: u32 },
}

/// 链参数（手续费下限、粉尘阈值等，可被配置覆盖）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    pub dust_threshold: Decimal,
    pub dust_policy: DustPolicy,
    pub min_fee: Decimal,
    pub min_fee_per_kb: Decimal,
    pub input_sequence: u32,
    pub sighash: SighashScheme,
    pub fee_ceiling: Option<Decimal>,
    /// 单笔交易最多输入数
    pub max_inputs: Option<usize>,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            dust_threshold: Decimal::ZERO,
            dust_policy: DustPolicy::AddSmallest,
            min_fee: Decimal::ZERO,
            min_fee_per_kb: Decimal::ZERO,
            input_sequence: 0xFFFF_FFFF,
            sighash: SighashScheme::Legacy,
            fee_ceiling: None,
            max_inputs: None,
        }
    }
}

/// 链配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// 链标识 (bitcoin, ethereum, solana ...)
    pub id: String,
    /// 链名称
    pub name: String,
    /// 链符号 (ETH, BTC, SOL, DOT, etc.)
    pub symbol: String,
    /// 原生币精度
    pub decimals: u8,
    /// 加密曲线类型
    pub curve_type: CurveType,
    /// 协议族
    pub family: ProtocolFamily,
    /// 地址格式
    pub address_format: AddressFormat,
    /// HD 派生标准
    pub derivation_standard: DerivationStandard,
    /// BIP44 coin type (用于派生路径)
    pub coin_type: u32,
    /// EIP-155 chain id（仅 EVM）
    pub evm_chain_id: Option<u64>,
    /// 是否为测试网
    pub is_testnet: bool,
    /// 手续费/粉尘参数
    pub params: ChainParams,
}

impl ChainConfig {
    /// 生成派生路径
    ///
    /// # Arguments
    /// * `account` - 账户索引 (通常为 0)
    /// * `change` - 找零索引 (外部地址为 0，内部地址为 1)
    /// * `index` - 地址索引
    pub fn derivation_path(&self, account: u32, change: u32, index: u32) -> String {
        match self.derivation_standard {
            DerivationStandard::BIP44 => {
                format!("m/44'/{}'/{}'/{}/{}", self.coin_type, account, change, index)
            }
            DerivationStandard::BIP84 => {
                format!("m/84'/{}'/{}'/{}/{}", self.coin_type, account, change, index)
            }
            // ed25519 只支持硬化派生
            DerivationStandard::SLIP0010 => {
                format!("m/44'/{}'/{}'/{}'", self.coin_type, account, change)
            }
        }
    }
}

/// 链配置注册表
pub struct ChainRegistry {
    configs: HashMap<String, ChainConfig>,
    symbol_map: HashMap<String, String>,
}

impl ChainRegistry {
    /// 空注册表
    pub fn empty() -> Self {
        Self {
            configs: HashMap::new(),
            symbol_map: HashMap::new(),
        }
    }

    /// 创建预配置的注册表
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_default_chains();
        registry
    }

    /// 注册默认支持的链
    fn register_default_chains(&mut self) {
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // UTXO 系列
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

        self.register(utxo_chain(
            "bitcoin",
            "Bitcoin",
            "BTC",
            0,
            AddressFormat::Base58Check {
                p2pkh_prefix: 0x00,
                p2sh_prefix: 0x05,
                bech32_hrp: Some("bc".to_string()),
            },
            ChainParams {
                dust_threshold: Decimal::new(546, 8),
                min_fee: Decimal::new(1_000, 8),
                min_fee_per_kb: Decimal::new(1_000, 8),
                ..ChainParams::default()
            },
            false,
        ));

        self.register(utxo_chain(
            "bitcoin-testnet",
            "Bitcoin Testnet",
            "tBTC",
            1,
            AddressFormat::Base58Check {
                p2pkh_prefix: 0x6f,
                p2sh_prefix: 0xc4,
                bech32_hrp: Some("tb".to_string()),
            },
            ChainParams {
                dust_threshold: Decimal::new(546, 8),
                min_fee: Decimal::new(1_000, 8),
                min_fee_per_kb: Decimal::new(1_000, 8),
                ..ChainParams::default()
            },
            true,
        ));

        self.register(utxo_chain(
            "litecoin",
            "Litecoin",
            "LTC",
            2,
            AddressFormat::Base58Check {
                p2pkh_prefix: 0x30,
                p2sh_prefix: 0x32,
                bech32_hrp: Some("ltc".to_string()),
            },
            ChainParams {
                dust_threshold: Decimal::new(10_000, 8),
                min_fee: Decimal::new(10_000, 8),
                min_fee_per_kb: Decimal::new(10_000, 8),
                ..ChainParams::default()
            },
            false,
        ));

        // Bitcoin Cash：所有输入走 FORKID 摘要，找零粉尘并入手续费
        self.register(utxo_chain(
            "bitcoin-cash",
            "Bitcoin Cash",
            "BCH",
            145,
            AddressFormat::CashAddr {
                prefix: "bitcoincash".to_string(),
                p2pkh_prefix: 0x00,
                p2sh_prefix: 0x05,
            },
            ChainParams {
                dust_threshold: Decimal::new(546, 8),
                dust_policy: DustPolicy::AbsorbIntoFee,
                min_fee: Decimal::new(1_000, 8),
                min_fee_per_kb: Decimal::new(1_000, 8),
                sighash: SighashScheme::ForkId { fork_value: 0 },
                ..ChainParams::default()
            },
            false,
        ));

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // EVM 系列 (可共享实现)
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

        self.register(evm_chain("ethereum", "Ethereum", "ETH", 1, false));
        self.register(evm_chain("ethereum-sepolia", "Ethereum Sepolia", "sepETH", 11155111, true));
        // BSC 与 Polygon 使用与 ETH 相同的派生路径
        self.register(evm_chain("bsc", "BNB Smart Chain", "BNB", 56, false));
        self.register(evm_chain("polygon", "Polygon", "POL", 137, false));

        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
        // Ed25519 系列 (独立实现)
        // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

        self.register(ChainConfig {
            id: "algorand".to_string(),
            name: "Algorand".to_string(),
            symbol: "ALGO".to_string(),
            decimals: 6,
            curve_type: CurveType::Ed25519,
            family: ProtocolFamily::Algorand,
            address_format: AddressFormat::Algorand,
            derivation_standard: DerivationStandard::SLIP0010,
            coin_type: 283,
            evm_chain_id: None,
            is_testnet: false,
            params: ChainParams {
                min_fee: Decimal::new(1_000, 6),
                ..ChainParams::default()
            },
        });

        self.register(ChainConfig {
            id: "solana".to_string(),
            name: "Solana".to_string(),
            symbol: "SOL".to_string(),
            decimals: 9,
            curve_type: CurveType::Ed25519,
            family: ProtocolFamily::Solana,
            address_format: AddressFormat::SolanaBase58,
            derivation_standard: DerivationStandard::SLIP0010,
            coin_type: 501,
            evm_chain_id: None,
            is_testnet: false,
            params: ChainParams {
                min_fee: Decimal::new(5_000, 9),
                ..ChainParams::default()
            },
        });

        // Polkadot 仅提供地址能力
        self.register(ChainConfig {
            id: "polkadot".to_string(),
            name: "Polkadot".to_string(),
            symbol: "DOT".to_string(),
            decimals: 10,
            curve_type: CurveType::Ed25519,
            family: ProtocolFamily::Substrate,
            address_format: AddressFormat::Ss58 { network_prefix: 0 },
            derivation_standard: DerivationStandard::SLIP0010,
            coin_type: 354,
            evm_chain_id: None,
            is_testnet: false,
            params: ChainParams::default(),
        });
    }

    /// 注册链配置（同 id 覆盖）
    pub fn register(&mut self, config: ChainConfig) {
        let id = config.id.clone();
        let symbol = config.symbol.to_lowercase();

        self.symbol_map.insert(symbol, id.clone());
        self.configs.insert(id, config);
    }

    /// 通过链标识获取配置
    pub fn get(&self, id: &str) -> Option<&ChainConfig> {
        self.configs.get(id)
    }

    /// 通过符号获取配置
    pub fn get_by_symbol(&self, symbol: &str) -> Option<&ChainConfig> {
        let id = self.symbol_map.get(&symbol.to_lowercase())?;
        self.configs.get(id)
    }

    /// 通过 EIP-155 chain id 获取配置
    pub fn get_by_evm_chain_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.configs
            .values()
            .find(|c| c.evm_chain_id == Some(chain_id))
    }

    /// 可变引用，用于应用配置覆盖
    pub fn get_mut(&mut self, id: &str) -> Option<&mut ChainConfig> {
        self.configs.get_mut(id)
    }

    /// 按协议族分组获取所有链
    pub fn get_by_family(&self, family: ProtocolFamily) -> Vec<&ChainConfig> {
        self.configs.values().filter(|c| c.family == family).collect()
    }

    /// 列出所有支持的链
    pub fn list_all(&self) -> Vec<&ChainConfig> {
        self.configs.values().collect()
    }

    /// 验证链配置完整性
    pub fn validate_configs(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (id, config) in &self.configs {
            if config.name.is_empty() {
                errors.push(format!("Chain {} has empty name", id));
            }
            if config.symbol.is_empty() {
                errors.push(format!("Chain {} has empty symbol", id));
            }
            if config.family == ProtocolFamily::Evm && config.evm_chain_id.is_none() {
                errors.push(format!("Chain {} is EVM but has no chain id", id));
            }
            if config.params.dust_threshold.is_sign_negative() {
                errors.push(format!("Chain {} has negative dust threshold", id));
            }

            // 验证曲线类型和地址格式匹配
            match (config.curve_type, &config.address_format) {
                (
                    CurveType::Secp256k1,
                    AddressFormat::Base58Check { .. } | AddressFormat::CashAddr { .. } | AddressFormat::Eip55,
                ) => {}
                (
                    CurveType::Ed25519,
                    AddressFormat::SolanaBase58 | AddressFormat::Algorand | AddressFormat::Ss58 { .. },
                ) => {}
                _ => {
                    errors.push(format!(
                        "Chain {} has incompatible curve_type and address_format: {:?} / {:?}",
                        config.name, config.curve_type, config.address_format
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn utxo_chain(
    id: &str,
    name: &str,
    symbol: &str,
    coin_type: u32,
    address_format: AddressFormat,
    params: ChainParams,
    is_testnet: bool,
) -> ChainConfig {
    let derivation_standard = match &address_format {
        AddressFormat::Base58Check {
            bech32_hrp: Some(_), ..
        } => DerivationStandard::BIP84,
        _ => DerivationStandard::BIP44,
    };
    ChainConfig {
        id: id.to_string(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        decimals: 8,
        curve_type: CurveType::Secp256k1,
        family: ProtocolFamily::Utxo,
        address_format,
        derivation_standard,
        coin_type,
        evm_chain_id: None,
        is_testnet,
        params,
    }
}

fn evm_chain(id: &str, name: &str, symbol: &str, chain_id: u64, is_testnet: bool) -> ChainConfig {
    ChainConfig {
        id: id.to_string(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        decimals: 18,
        curve_type: CurveType::Secp256k1,
        family: ProtocolFamily::Evm,
        address_format: AddressFormat::Eip55,
        derivation_standard: DerivationStandard::BIP44,
        coin_type: 60,
        evm_chain_id: Some(chain_id),
        is_testnet,
        params: ChainParams::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_registry() {
        let registry = ChainRegistry::new();

        let eth = registry.get_by_evm_chain_id(1).unwrap();
        assert_eq!(eth.name, "Ethereum");
        assert_eq!(eth.family, ProtocolFamily::Evm);

        let sol = registry.get_by_symbol("SOL").unwrap();
        assert_eq!(sol.id, "solana");
        assert_eq!(sol.curve_type, CurveType::Ed25519);

        let btc = registry.get("bitcoin").unwrap();
        assert_eq!(btc.derivation_path(0, 0, 0), "m/84'/0'/0'/0/0");
        assert_eq!(btc.params.dust_threshold, Decimal::new(546, 8));

        let bch = registry.get("bitcoin-cash").unwrap();
        assert_eq!(bch.derivation_path(0, 1, 3), "m/44'/145'/0'/1/3");
        assert_eq!(bch.params.dust_policy, DustPolicy::AbsorbIntoFee);
        assert!(matches!(&bch.address_format, AddressFormat::CashAddr { prefix, .. } if prefix == "bitcoincash"));
    }

    #[test]
    fn test_family_grouping() {
        let registry = ChainRegistry::new();
        assert!(registry.get_by_family(ProtocolFamily::Evm).len() >= 4);
        assert!(registry.get_by_family(ProtocolFamily::Utxo).len() >= 3);
    }

    #[test]
    fn test_default_configs_are_valid() {
        assert!(ChainRegistry::new().validate_configs().is_ok());
    }

    #[test]
    fn test_incompatible_format_detected() {
        let mut registry = ChainRegistry::empty();
        let mut bad = evm_chain("weird", "Weird", "WRD", 9999, true);
        bad.curve_type = CurveType::Ed25519;
        registry.register(bad);
        let errors = registry.validate_configs().unwrap_err();
        assert_eq!(errors.len(), 1);
    }
}
