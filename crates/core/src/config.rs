//! Engine configuration: chains, storage paths, cache TTL.
//!
//! Loaded from a TOML file with `${VAR}` environment expansion for RPC
//! endpoints. Without a file, the built-in chain table is used; chains
//! whose RPC variable is unset are skipped at startup rather than
//! failing the whole engine.

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Canonical NonfungiblePositionManager deployment.
const DEFAULT_POSITION_MANAGER: &str = "0xC36442b4a4522E871399CD717aBDD847Ab11FE88";
/// Canonical UniswapV3Factory deployment.
const DEFAULT_FACTORY: &str = "0x1F98431c8aD98523631AE4a59f267346ea31F984";

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory for durable cache files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Position cache TTL in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Chains to aggregate over.
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainSettings>,
}

/// One chain's settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    /// Chain ID
    pub chain_id: u64,
    /// Human-readable name
    pub name: String,
    /// HTTP RPC endpoint; `${VAR}` is expanded from the environment
    pub rpc: String,
    /// NonfungiblePositionManager address
    #[serde(default = "default_position_manager")]
    pub position_manager: String,
    /// Pool factory address
    #[serde(default = "default_factory")]
    pub factory: String,
    /// Pool init code hash override, for chains with a non-canonical
    /// factory deployment
    #[serde(default)]
    pub pool_init_code_hash: Option<String>,
    /// Statically known tokens, seeded into the metadata cache
    #[serde(default)]
    pub tokens: Vec<SeedToken>,
}

/// A well-known token seeded without an on-chain lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedToken {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_cache_ttl_secs() -> u64 {
    120
}

fn default_position_manager() -> String {
    DEFAULT_POSITION_MANAGER.to_string()
}

fn default_factory() -> String {
    DEFAULT_FACTORY.to_string()
}

fn default_chains() -> Vec<ChainSettings> {
    let chain = |chain_id, name: &str, rpc_var: &str| ChainSettings {
        chain_id,
        name: name.to_string(),
        rpc: format!("${{{rpc_var}}}"),
        position_manager: default_position_manager(),
        factory: default_factory(),
        pool_init_code_hash: None,
        tokens: Vec::new(),
    };

    let mut base = chain(8453, "base", "BASE_RPC_URL");
    base.position_manager = "0x03a520b32C04BF3bEEf7BEb72E919cf822Ed34f1".to_string();
    base.factory = "0x33128a8fC17869897dcE68Ed026d694621f6FDfD".to_string();

    vec![
        chain(1, "mainnet", "ETH_RPC_URL"),
        chain(10, "optimism", "OPTIMISM_RPC_URL"),
        chain(137, "polygon", "POLYGON_RPC_URL"),
        chain(42161, "arbitrum", "ARBITRUM_RPC_URL"),
        base,
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_ttl_secs: default_cache_ttl_secs(),
            chains: default_chains(),
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading config at {}", path.as_ref().display()))?;
        let config: EngineConfig = toml::from_str(&content).context("parsing config")?;
        Ok(config)
    }

    /// Load from `LPSCOPE_CONFIG` if set, else built-in defaults.
    pub fn load() -> Result<Self> {
        match std::env::var("LPSCOPE_CONFIG") {
            Ok(path) => {
                info!(path, "loading config file");
                Self::from_file(path)
            }
            Err(_) => {
                info!("no config file set, using built-in chain table");
                Ok(Self::default())
            }
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl ChainSettings {
    /// RPC endpoint with `${VAR}` expanded. `None` when the variable is
    /// unset, meaning this chain should be skipped.
    pub fn rpc_url(&self) -> Option<String> {
        let expanded = expand_env(&self.rpc);
        (!expanded.contains("${")).then_some(expanded)
    }

    pub fn position_manager(&self) -> Result<Address> {
        self.position_manager
            .parse()
            .with_context(|| format!("invalid position manager for {}", self.name))
    }

    pub fn factory(&self) -> Result<Address> {
        self.factory
            .parse()
            .with_context(|| format!("invalid factory for {}", self.name))
    }

    pub fn pool_init_code_hash(&self) -> Result<Option<B256>> {
        self.pool_init_code_hash
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .with_context(|| format!("invalid init code hash for {}", self.name))
            })
            .transpose()
    }
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
/// Unset variables are left as-is so the caller can tell.
fn expand_env(s: &str) -> String {
    let mut result = s.to_string();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else { break };
        let pattern = &rest[start..start + end + 1];
        let var_name = &pattern[2..pattern.len() - 1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(pattern, &value);
        }
        rest = &rest[start + end + 1..];
    }
    result
}
