//! Relayer configuration.

use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use trinity_core::{ChainRole, ChainValidator, LocalValidator, ValidatorSet};

/// Verifier deployed on Arbitrum Sepolia.
pub const DEFAULT_VERIFIER_ADDRESS: &str = "0x59396D58Fa856025bD5249E342729d5550Be151C";
pub const DEFAULT_ARBITRUM_RPC_URL: &str = "https://sepolia-rollup.arbitrum.io/rpc";
pub const DEFAULT_SOLANA_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_TON_ENDPOINT: &str = "https://testnet.toncenter.com/api/v2/jsonRPC";
pub const DEFAULT_GAS_LIMIT: u64 = 500_000;

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Runtime tuning for the relayer's timers and submissions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayerSettings {
    /// Solana watcher tick.
    pub solana_poll_interval: Duration,
    /// TON watcher tick.
    pub ton_poll_interval: Duration,
    /// Retry tick for home proofs that failed at event time.
    pub home_retry_interval: Duration,
    /// Health report tick.
    pub health_interval: Duration,
    /// Gas ceiling for `submitChainProof`.
    pub gas_limit: u64,
}

impl Default for RelayerSettings {
    fn default() -> Self {
        Self {
            solana_poll_interval: Duration::from_millis(5_000),
            ton_poll_interval: Duration::from_millis(8_000),
            home_retry_interval: Duration::from_secs(15),
            health_interval: Duration::from_secs(60),
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

impl RelayerSettings {
    /// Poll interval of a secondary chain watcher.
    pub fn poll_interval(&self, chain: ChainRole) -> Duration {
        match chain {
            ChainRole::Solana => self.solana_poll_interval,
            ChainRole::Ton => self.ton_poll_interval,
            ChainRole::Arbitrum => self.home_retry_interval,
        }
    }
}

/// Relayer configuration.
#[derive(Clone)]
pub struct RelayerConfig {
    /// Arbitrum JSON-RPC endpoint.
    pub arbitrum_rpc_url: String,
    /// Optional Arbitrum websocket endpoint for push event delivery.
    pub arbitrum_ws_url: Option<String>,
    /// Solana JSON-RPC endpoint.
    pub solana_rpc_url: String,
    /// toncenter JSON-RPC endpoint.
    pub ton_endpoint: String,
    /// Home validator key. Also signs Arbitrum transactions.
    pub private_key: String,
    /// Optional dedicated key for the Solana role.
    pub solana_validator_key: Option<String>,
    /// Optional dedicated key for the TON role.
    pub ton_validator_key: Option<String>,
    /// TrinityConsensusVerifier address on Arbitrum.
    pub verifier_address: Address,
    /// sled path. `None` keeps state in memory.
    pub db_path: Option<PathBuf>,
    pub log_format: LogFormat,
    pub settings: RelayerSettings,
}

impl RelayerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from a map of variables.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let private_key = var("PRIVATE_KEY")
            .context("PRIVATE_KEY must be set; the relayer cannot sign proofs without it")?;

        let verifier_address = var("CONSENSUS_VERIFIER_ADDRESS")
            .unwrap_or_else(|| DEFAULT_VERIFIER_ADDRESS.to_string())
            .parse::<Address>()
            .context("CONSENSUS_VERIFIER_ADDRESS is not a valid address")?;

        let millis = |key: &str, default: u64| -> Result<Duration> {
            parse_or(var(key), default, key).map(Duration::from_millis)
        };
        let secs = |key: &str, default: u64| -> Result<Duration> {
            parse_or(var(key), default, key).map(Duration::from_secs)
        };

        let settings = RelayerSettings {
            solana_poll_interval: millis("SOLANA_POLL_INTERVAL_MS", 5_000)?,
            ton_poll_interval: millis("TON_POLL_INTERVAL_MS", 8_000)?,
            home_retry_interval: secs("HOME_RETRY_INTERVAL_SECS", 15)?,
            health_interval: secs("HEALTH_INTERVAL_SECS", 60)?,
            gas_limit: parse_or(var("SUBMISSION_GAS_LIMIT"), DEFAULT_GAS_LIMIT, "SUBMISSION_GAS_LIMIT")?,
        };
        if settings.solana_poll_interval.is_zero()
            || settings.ton_poll_interval.is_zero()
            || settings.home_retry_interval.is_zero()
            || settings.health_interval.is_zero()
        {
            bail!("poll and health intervals must be greater than zero");
        }

        let log_format = match var("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            arbitrum_rpc_url: var("ARBITRUM_RPC_URL")
                .unwrap_or_else(|| DEFAULT_ARBITRUM_RPC_URL.to_string()),
            arbitrum_ws_url: var("ARBITRUM_WS_URL"),
            solana_rpc_url: var("SOLANA_RPC_URL").unwrap_or_else(|| DEFAULT_SOLANA_RPC_URL.to_string()),
            ton_endpoint: var("TON_ENDPOINT").unwrap_or_else(|| DEFAULT_TON_ENDPOINT.to_string()),
            private_key,
            solana_validator_key: var("SOLANA_VALIDATOR_KEY"),
            ton_validator_key: var("TON_VALIDATOR_KEY"),
            verifier_address,
            db_path: var("RELAYER_DB_PATH").map(PathBuf::from),
            log_format,
            settings,
        })
    }

    /// Home validator, which also pays for submissions.
    pub fn home_validator(&self) -> Result<LocalValidator> {
        LocalValidator::from_private_key(&self.private_key).context("Invalid PRIVATE_KEY")
    }

    /// One validator per chain role.
    ///
    /// Roles without a dedicated key share the home validator.
    pub fn validator_set(&self) -> Result<ValidatorSet> {
        let home: Arc<dyn ChainValidator> = Arc::new(self.home_validator()?);
        let mut validators = ValidatorSet::shared(home);

        for (chain, key, name) in [
            (ChainRole::Solana, &self.solana_validator_key, "SOLANA_VALIDATOR_KEY"),
            (ChainRole::Ton, &self.ton_validator_key, "TON_VALIDATOR_KEY"),
        ] {
            if let Some(key) = key {
                let validator = LocalValidator::from_private_key(key)
                    .with_context(|| format!("Invalid {}", name))?;
                validators = validators.with_validator(chain, Arc::new(validator));
            }
        }

        Ok(validators)
    }
}

impl std::fmt::Debug for RelayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerConfig")
            .field("arbitrum_rpc_url", &self.arbitrum_rpc_url)
            .field("arbitrum_ws_url", &self.arbitrum_ws_url)
            .field("solana_rpc_url", &self.solana_rpc_url)
            .field("ton_endpoint", &self.ton_endpoint)
            .field("private_key", &"<redacted>")
            .field("verifier_address", &self.verifier_address)
            .field("db_path", &self.db_path)
            .field("log_format", &self.log_format)
            .field("settings", &self.settings)
            .finish()
    }
}

fn parse_or<T>(value: Option<String>, default: T, key: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const SECOND_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = RelayerConfig::from_map(&vars(&[("PRIVATE_KEY", DEV_KEY)])).unwrap();

        assert_eq!(config.arbitrum_rpc_url, DEFAULT_ARBITRUM_RPC_URL);
        assert_eq!(config.ton_endpoint, DEFAULT_TON_ENDPOINT);
        assert_eq!(config.verifier_address, DEFAULT_VERIFIER_ADDRESS.parse::<Address>().unwrap());
        assert_eq!(config.settings, RelayerSettings::default());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.db_path.is_none());
        assert!(config.arbitrum_ws_url.is_none());
    }

    #[test]
    fn test_missing_private_key_is_fatal() {
        let err = RelayerConfig::from_map(&vars(&[])).unwrap_err();
        assert!(err.to_string().contains("PRIVATE_KEY"));

        // Blank counts as missing.
        assert!(RelayerConfig::from_map(&vars(&[("PRIVATE_KEY", "  ")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = RelayerConfig::from_map(&vars(&[
            ("PRIVATE_KEY", DEV_KEY),
            ("SOLANA_POLL_INTERVAL_MS", "1500"),
            ("HEALTH_INTERVAL_SECS", "5"),
            ("SUBMISSION_GAS_LIMIT", "750000"),
            ("RELAYER_DB_PATH", "/var/lib/trinity/relayer.db"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.settings.solana_poll_interval, Duration::from_millis(1500));
        assert_eq!(config.settings.poll_interval(ChainRole::Solana), Duration::from_millis(1500));
        assert_eq!(config.settings.health_interval, Duration::from_secs(5));
        assert_eq!(config.settings.gas_limit, 750_000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.db_path, Some(PathBuf::from("/var/lib/trinity/relayer.db")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RelayerConfig::from_map(&vars(&[
            ("PRIVATE_KEY", DEV_KEY),
            ("TON_POLL_INTERVAL_MS", "soon"),
        ]))
        .is_err());
        assert!(RelayerConfig::from_map(&vars(&[
            ("PRIVATE_KEY", DEV_KEY),
            ("HOME_RETRY_INTERVAL_SECS", "0"),
        ]))
        .is_err());
        assert!(RelayerConfig::from_map(&vars(&[
            ("PRIVATE_KEY", DEV_KEY),
            ("CONSENSUS_VERIFIER_ADDRESS", "0x1234"),
        ]))
        .is_err());
    }

    #[test]
    fn test_validator_set_single_and_per_role_keys() {
        let single = RelayerConfig::from_map(&vars(&[("PRIVATE_KEY", DEV_KEY)])).unwrap();
        let set = single.validator_set().unwrap();
        let addresses = set.addresses();
        assert!(set.missing_roles().is_empty());
        assert!(addresses.iter().all(|(_, address)| *address == addresses[0].1));

        let split = RelayerConfig::from_map(&vars(&[
            ("PRIVATE_KEY", DEV_KEY),
            ("TON_VALIDATOR_KEY", SECOND_KEY),
        ]))
        .unwrap();
        let set = split.validator_set().unwrap();
        let home = set.get(ChainRole::Arbitrum).unwrap().address();
        assert_eq!(set.get(ChainRole::Solana).unwrap().address(), home);
        assert_ne!(set.get(ChainRole::Ton).unwrap().address(), home);
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = RelayerConfig::from_map(&vars(&[("PRIVATE_KEY", DEV_KEY)])).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains(&DEV_KEY[2..]));
        assert!(debug.contains("<redacted>"));
    }
}
