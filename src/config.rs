//! Service configuration loaded from environment variables.

use crate::ledger::EvmLedgerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Which ledger implementation the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Evm,
    Memory,
}

impl FromStr for LedgerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evm" => Ok(Self::Evm),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid { key: ENV_BACKEND, value: other.to_string() }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} is required for the evm ledger backend")]
    Missing(&'static str),
}

const ENV_LISTEN_ADDR: &str = "CHAT_LEDGER_LISTEN_ADDR";
const ENV_BACKEND: &str = "CHAT_LEDGER_BACKEND";
const ENV_RPC_URL: &str = "CHAT_LEDGER_RPC_URL";
const ENV_CONTRACT_ADDRESS: &str = "CHAT_LEDGER_CONTRACT_ADDRESS";
const ENV_FROM_ADDRESS: &str = "CHAT_LEDGER_FROM_ADDRESS";
const ENV_GAS_LIMIT: &str = "CHAT_LEDGER_GAS_LIMIT";
const ENV_TIMEOUT_SECS: &str = "CHAT_LEDGER_TIMEOUT_SECS";
const ENV_POLL_INTERVAL_MS: &str = "CHAT_LEDGER_POLL_INTERVAL_MS";
const ENV_MAX_POLLS: &str = "CHAT_LEDGER_MAX_POLLS";
const ENV_RECORDS_PATH: &str = "CHAT_LEDGER_RECORDS_PATH";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP API listens on.
    pub listen_addr: SocketAddr,
    pub backend: LedgerBackend,
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: String,
    pub contract_address: Option<String>,
    pub from_address: Option<String>,
    pub gas_limit: u64,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    /// JSON-lines record file; `None` keeps records in memory.
    pub records_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            backend: LedgerBackend::Memory,
            rpc_url: "http://127.0.0.1:8545".into(),
            contract_address: None,
            from_address: None,
            gas_limit: 1_000_000,
            timeout_secs: 30,
            poll_interval_ms: 500,
            max_polls: 120,
            records_path: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(val) = lookup(ENV_LISTEN_ADDR) {
            config.listen_addr = parse(ENV_LISTEN_ADDR, &val)?;
        }
        if let Some(val) = lookup(ENV_BACKEND) {
            config.backend = val.parse()?;
        }
        if let Some(val) = lookup(ENV_RPC_URL) {
            url::Url::parse(&val).map_err(|_| ConfigError::Invalid { key: ENV_RPC_URL, value: val.clone() })?;
            config.rpc_url = val;
        }
        config.contract_address = lookup(ENV_CONTRACT_ADDRESS);
        config.from_address = lookup(ENV_FROM_ADDRESS);
        if let Some(val) = lookup(ENV_GAS_LIMIT) {
            config.gas_limit = parse(ENV_GAS_LIMIT, &val)?;
        }
        if let Some(val) = lookup(ENV_TIMEOUT_SECS) {
            config.timeout_secs = parse(ENV_TIMEOUT_SECS, &val)?;
        }
        if let Some(val) = lookup(ENV_POLL_INTERVAL_MS) {
            config.poll_interval_ms = parse(ENV_POLL_INTERVAL_MS, &val)?;
        }
        if let Some(val) = lookup(ENV_MAX_POLLS) {
            config.max_polls = parse(ENV_MAX_POLLS, &val)?;
        }
        config.records_path = lookup(ENV_RECORDS_PATH).filter(|p| !p.trim().is_empty()).map(PathBuf::from);

        Ok(config)
    }

    /// Settings for the EVM ledger. Fails when the addresses are not configured.
    pub fn evm_ledger(&self) -> Result<EvmLedgerConfig, ConfigError> {
        let contract = self.contract_address.clone().ok_or(ConfigError::Missing(ENV_CONTRACT_ADDRESS))?;
        let from = self.from_address.clone().ok_or(ConfigError::Missing(ENV_FROM_ADDRESS))?;
        let mut ledger = EvmLedgerConfig::new(self.rpc_url.clone(), contract, from)
            .with_polling(self.poll_interval_ms, self.max_polls);
        ledger.gas_limit = self.gas_limit;
        ledger.timeout_secs = self.timeout_secs;
        Ok(ledger)
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: value.to_string() })
}
