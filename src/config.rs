//! TOML configuration.
//!
//! Every command reads one file (default `./config/sieve.toml`). Only
//! `[storage]` is required; the other tables fall back to defaults.
//!
//! ```toml
//! [storage]
//! contracts_dir = "./data/contracts"
//! db_path = "./data/sieve.sqlite"
//!
//! [matching]
//! overlap_threshold = 0.66
//! exact_threshold = 0.99
//! diff_ratio = 0.1
//!
//! [libraries]
//! popular_hashes = "./data/popular_hashes.json"
//! library_hashes = "./data/oz_hashes.json"
//!
//! [fetch]
//! concurrency = 5
//! max_retries = 3
//! retry_delay_secs = 5
//! timeout_secs = 30
//!
//! [chains."0x1"]
//! endpoint = "https://api.etherscan.io/api?module=contract&action=getsourcecode"
//! api_key_env = "ETHERSCAN_API_KEY"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use source_sieve_core::matcher::MatchConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub libraries: LibrariesConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root of the per-contract directories and of `contracts.json`.
    pub contracts_dir: PathBuf,
    pub db_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
    #[serde(default = "default_exact_threshold")]
    pub exact_threshold: f64,
    #[serde(default = "default_diff_ratio")]
    pub diff_ratio: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: default_overlap_threshold(),
            exact_threshold: default_exact_threshold(),
            diff_ratio: default_diff_ratio(),
        }
    }
}

impl MatchingConfig {
    pub fn to_match_config(&self) -> MatchConfig {
        MatchConfig {
            overlap_threshold: self.overlap_threshold,
            exact_threshold: self.exact_threshold,
            diff_ratio: self.diff_ratio,
        }
    }
}

fn default_overlap_threshold() -> f64 {
    0.66
}
fn default_exact_threshold() -> f64 {
    0.99
}
fn default_diff_ratio() -> f64 {
    0.1
}

/// Hash lists feeding the known-library filter. Missing files are skipped.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LibrariesConfig {
    #[serde(default)]
    pub popular_hashes: Option<PathBuf>,
    #[serde(default)]
    pub library_hashes: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// One explorer endpoint, keyed by hex chain id (`"0x1"`, `"0x89"`, ...).
#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    /// `getsourcecode` URL; `&address=...&apikey=...` is appended.
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the key, used when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ChainConfig {
    pub fn resolve_api_key(&self) -> String {
        if let Some(key) = &self.api_key {
            return key.clone();
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }
}

impl Config {
    pub fn chain(&self, chain_id: &str) -> Result<&ChainConfig> {
        self.chains.get(chain_id).ok_or_else(|| {
            let known: Vec<&str> = self.chains.keys().map(String::as_str).collect();
            anyhow::anyhow!(
                "No [chains.\"{}\"] entry in config. Configured: {}",
                chain_id,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            )
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.storage.contracts_dir.join(crate::ledger::LEDGER_FILE)
    }
}

fn in_unit_interval(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let m = &config.matching;
    if !in_unit_interval(m.overlap_threshold) {
        anyhow::bail!("matching.overlap_threshold must be in (0.0, 1.0]");
    }
    if !in_unit_interval(m.exact_threshold) {
        anyhow::bail!("matching.exact_threshold must be in (0.0, 1.0]");
    }
    if m.exact_threshold < m.overlap_threshold {
        anyhow::bail!("matching.exact_threshold must be >= matching.overlap_threshold");
    }
    if !in_unit_interval(m.diff_ratio) {
        anyhow::bail!("matching.diff_ratio must be in (0.0, 1.0]");
    }

    if config.fetch.concurrency == 0 {
        anyhow::bail!("fetch.concurrency must be >= 1");
    }

    for (chain_id, chain) in &config.chains {
        if chain.endpoint.trim().is_empty() {
            anyhow::bail!("chains.\"{}\".endpoint must not be empty", chain_id);
        }
    }

    Ok(())
}
