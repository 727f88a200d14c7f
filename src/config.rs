//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{collections::HashMap, path::Path, time::Duration};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    domain::chain_config::{ChainParams, ChainRegistry, DustPolicy},
    error::{SdkError, SdkResult},
    infrastructure::providers::ProviderDescriptor,
    service::fee_estimation::EvmFeeMultipliers,
};

/// SDK 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    /// 按链 ID 覆盖注册表中的链参数
    #[serde(default)]
    pub chains: HashMap<String, ChainParamsConfig>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
    pub max_files: usize,
}

/// 网络配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    /// 链 ID → 节点列表（按优先级排列）
    #[serde(default)]
    pub providers: HashMap<String, Vec<ProviderDescriptor>>,
}

/// 单链参数覆盖，未设置的字段沿用注册表默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainParamsConfig {
    pub dust_threshold: Option<Decimal>,
    pub dust_policy: Option<DustPolicy>,
    pub min_fee: Option<Decimal>,
    pub min_fee_per_kb: Option<Decimal>,
    pub input_sequence: Option<u32>,
    pub fee_ceiling: Option<Decimal>,
    pub max_inputs: Option<usize>,
    /// EIP-1559 基础费倍数 [slow, normal, fast]
    pub base_fee_multipliers: Option<[Decimal; 3]>,
    /// gasPrice 倍数 [slow, normal, fast]
    pub gas_price_multipliers: Option<[Decimal; 3]>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
            enable_file_logging: std::env::var("LOG_FILE_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            log_file_path: std::env::var("LOG_FILE_PATH").ok(),
            max_files: std::env::var("LOG_MAX_FILES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: std::env::var("SDK_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            providers: HashMap::new(),
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn providers_for(&self, chain_id: &str) -> &[ProviderDescriptor] {
        self.providers.get(chain_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `SDK_PROVIDERS_<CHAIN>=url1,url2`，链 ID 中的 `-` 写作 `_`
    fn providers_from_env(registry: &ChainRegistry) -> HashMap<String, Vec<ProviderDescriptor>> {
        registry
            .list_all()
            .into_iter()
            .filter_map(|chain| {
                let key = format!("SDK_PROVIDERS_{}", chain.id.to_uppercase().replace('-', "_"));
                let urls = std::env::var(key).ok()?;
                let descriptors: Vec<_> = urls
                    .split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(ProviderDescriptor::new)
                    .collect();
                Some((chain.id.clone(), descriptors))
            })
            .collect()
    }
}

impl ChainParamsConfig {
    /// 把覆盖项应用到默认参数上
    pub fn apply(&self, defaults: &ChainParams) -> ChainParams {
        ChainParams {
            dust_threshold: self.dust_threshold.unwrap_or(defaults.dust_threshold),
            dust_policy: self.dust_policy.unwrap_or(defaults.dust_policy),
            min_fee: self.min_fee.unwrap_or(defaults.min_fee),
            min_fee_per_kb: self.min_fee_per_kb.unwrap_or(defaults.min_fee_per_kb),
            input_sequence: self.input_sequence.unwrap_or(defaults.input_sequence),
            sighash: defaults.sighash,
            fee_ceiling: self.fee_ceiling.or(defaults.fee_ceiling),
            max_inputs: self.max_inputs.or(defaults.max_inputs),
        }
    }
}

impl SdkConfig {
    /// 从环境变量加载配置（先读取 `.env`）
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut network = NetworkConfig::default();
        network.providers = NetworkConfig::providers_from_env(&ChainRegistry::new());

        Ok(Self {
            logging: LoggingConfig::default(),
            network,
            chains: HashMap::new(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: SdkConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                let mut file_config = Self::from_file(path)?;
                // 文件中未列出节点的链沿用环境变量
                for (chain, providers) in config.network.providers {
                    file_config.network.providers.entry(chain).or_insert(providers);
                }
                config = file_config;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self, registry: &ChainRegistry) -> SdkResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(SdkError::config(format!("LOG_LEVEL must be one of: {:?}", valid_levels)));
        }
        if self.logging.format != "json" && self.logging.format != "text" {
            return Err(SdkError::config("LOG_FORMAT must be 'json' or 'text'"));
        }
        if self.network.request_timeout_secs == 0 {
            return Err(SdkError::config("request timeout must be positive"));
        }

        for (chain, providers) in &self.network.providers {
            if registry.get(chain).is_none() {
                return Err(SdkError::config(format!("providers configured for unknown chain {}", chain)));
            }
            if providers.is_empty() {
                return Err(SdkError::config(format!("provider list for {} is empty", chain)));
            }
            if let Some(bad) = providers
                .iter()
                .find(|p| !(p.base_url.starts_with("http://") || p.base_url.starts_with("https://")))
            {
                return Err(SdkError::config(format!("{}: invalid provider url {}", chain, bad.base_url)));
            }
        }

        for (chain, params) in &self.chains {
            if registry.get(chain).is_none() {
                return Err(SdkError::config(format!("parameters configured for unknown chain {}", chain)));
            }
            let negative = [params.dust_threshold, params.min_fee, params.min_fee_per_kb, params.fee_ceiling]
                .into_iter()
                .flatten()
                .any(|v| v.is_sign_negative());
            if negative {
                return Err(SdkError::config(format!("{}: fee parameters must not be negative", chain)));
            }
            self.fee_multipliers(chain)
                .validate()
                .map_err(|e| SdkError::config(format!("{}: {}", chain, e)))?;
        }

        Ok(())
    }

    /// 应用了覆盖项的链注册表
    pub fn registry(&self) -> ChainRegistry {
        let mut registry = ChainRegistry::new();
        for (chain, overrides) in &self.chains {
            if let Some(config) = registry.get_mut(chain) {
                config.params = overrides.apply(&config.params);
            }
        }
        registry
    }

    /// 单链生效参数
    pub fn chain_params(&self, registry: &ChainRegistry, chain_id: &str) -> SdkResult<ChainParams> {
        let chain = registry
            .get(chain_id)
            .ok_or_else(|| SdkError::config(format!("unknown chain {}", chain_id)))?;
        Ok(match self.chains.get(chain_id) {
            Some(overrides) => overrides.apply(&chain.params),
            None => chain.params.clone(),
        })
    }

    /// EVM 手续费倍数：配置文件 > 环境变量 > 默认值
    pub fn fee_multipliers(&self, chain_id: &str) -> EvmFeeMultipliers {
        let mut multipliers = EvmFeeMultipliers::from_env(chain_id);
        if let Some(overrides) = self.chains.get(chain_id) {
            if let Some(base_fee) = overrides.base_fee_multipliers {
                multipliers.base_fee = base_fee;
            }
            if let Some(gas_price) = overrides.gas_price_multipliers {
                multipliers.gas_price = gas_price;
            }
        }
        multipliers
    }
}
