// Network configuration, loaded once at startup

use std::time::Duration;
use thiserror::Error;

use crate::keys::SigningKey;
use crate::rpc::{ChainRpcConfig, DEFAULT_HTTP_ENDPOINT, DEFAULT_TIMEOUT_SECS};

/// Decimal scaling the currencies contract expects when none is configured
pub const DEFAULT_PRECISION: u8 = 4;

pub const ENV_HTTP_ENDPOINT: &str = "PLASMA_HTTP_ENDPOINT";
pub const ENV_TIMEOUT_SECS: &str = "PLASMA_TIMEOUT_SECS";
pub const ENV_MOCK_MODE: &str = "PLASMA_MOCK_MODE";
pub const ENV_CURRENCIES_KEY: &str = "CURRENCIES_KEY";
pub const ENV_CURRENCIES_CONTRACT: &str = "CURRENCIES_CONTRACT";
pub const ENV_CURRENCIES_ACCOUNT: &str = "CURRENCIES_ACCOUNT";
pub const ENV_CURRENCIES_PRECISION: &str = "CURRENCIES_PRECISION";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Everything the oracles need to reach and sign for the currencies contract
#[derive(Clone)]
pub struct NetworkConfig {
    pub http_endpoint: String,
    pub timeout: Duration,
    pub mock_mode: bool,
    /// Private key authorizing `currencies_account`
    pub currencies_key: Option<String>,
    pub currencies_contract: String,
    pub currencies_account: String,
    pub precision: u8,
}

impl NetworkConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let mock_mode = get(ENV_MOCK_MODE)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let timeout_secs = match get(ENV_TIMEOUT_SECS) {
            Some(v) => v.parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: ENV_TIMEOUT_SECS,
                reason: e.to_string(),
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let precision = match get(ENV_CURRENCIES_PRECISION) {
            Some(v) => v.parse::<u8>().map_err(|e| ConfigError::Invalid {
                var: ENV_CURRENCIES_PRECISION,
                reason: e.to_string(),
            })?,
            None => DEFAULT_PRECISION,
        };

        let currencies_key = get(ENV_CURRENCIES_KEY);
        if currencies_key.is_none() && !mock_mode {
            return Err(ConfigError::Missing(ENV_CURRENCIES_KEY));
        }

        let http_endpoint =
            get(ENV_HTTP_ENDPOINT).unwrap_or_else(|| DEFAULT_HTTP_ENDPOINT.to_string());

        Ok(NetworkConfig {
            http_endpoint,
            timeout: Duration::from_secs(timeout_secs),
            mock_mode,
            currencies_key,
            currencies_contract: required(ENV_CURRENCIES_CONTRACT)?,
            currencies_account: required(ENV_CURRENCIES_ACCOUNT)?,
            precision,
        })
    }

    pub fn chain_rpc_config(&self) -> ChainRpcConfig {
        ChainRpcConfig {
            endpoint: self.http_endpoint.clone(),
            timeout: self.timeout,
            mock_mode: self.mock_mode,
        }
    }

    /// Parse the configured key; mock mode without a key signs with a throwaway one
    pub fn signing_key(&self) -> Result<SigningKey, ConfigError> {
        match &self.currencies_key {
            Some(key) => SigningKey::from_key_string(key).map_err(|e| ConfigError::Invalid {
                var: ENV_CURRENCIES_KEY,
                reason: e.to_string(),
            }),
            None if self.mock_mode => Ok(SigningKey::generate()),
            None => Err(ConfigError::Missing(ENV_CURRENCIES_KEY)),
        }
    }
}

impl std::fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("http_endpoint", &self.http_endpoint)
            .field("timeout", &self.timeout)
            .field("mock_mode", &self.mock_mode)
            .field("currencies_key", &self.currencies_key.as_ref().map(|_| "<redacted>"))
            .field("currencies_contract", &self.currencies_contract)
            .field("currencies_account", &self.currencies_account)
            .field("precision", &self.precision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const DEV_WIF: &str = "5KQwrPbwdL6PhXujxW37FSSQZ1JiwsST4cqQzDeyXtP79zkvFD3";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_CURRENCIES_KEY, DEV_WIF),
            (ENV_CURRENCIES_CONTRACT, "currencies"),
            (ENV_CURRENCIES_ACCOUNT, "oracle"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = NetworkConfig::from_lookup(lookup(&base())).unwrap();
        assert_eq!(config.http_endpoint, DEFAULT_HTTP_ENDPOINT);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.precision, DEFAULT_PRECISION);
        assert!(!config.mock_mode);
        assert!(config.signing_key().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut vars = base();
        vars.push((ENV_HTTP_ENDPOINT, "https://node.example:443"));
        vars.push((ENV_CURRENCIES_PRECISION, "6"));
        vars.push((ENV_TIMEOUT_SECS, "5"));

        let config = NetworkConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.http_endpoint, "https://node.example:443");
        assert_eq!(config.precision, 6);

        let rpc = config.chain_rpc_config();
        assert_eq!(rpc.endpoint, "https://node.example:443");
        assert_eq!(rpc.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_required() {
        let vars = vec![(ENV_CURRENCIES_KEY, DEV_WIF), (ENV_CURRENCIES_ACCOUNT, "oracle")];
        assert_eq!(
            NetworkConfig::from_lookup(lookup(&vars)).unwrap_err(),
            ConfigError::Missing(ENV_CURRENCIES_CONTRACT)
        );

        let vars = vec![
            (ENV_CURRENCIES_CONTRACT, "currencies"),
            (ENV_CURRENCIES_ACCOUNT, "oracle"),
        ];
        assert_eq!(
            NetworkConfig::from_lookup(lookup(&vars)).unwrap_err(),
            ConfigError::Missing(ENV_CURRENCIES_KEY)
        );
    }

    #[test]
    fn test_invalid_precision() {
        let mut vars = base();
        vars.push((ENV_CURRENCIES_PRECISION, "lots"));
        assert!(matches!(
            NetworkConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid { var: ENV_CURRENCIES_PRECISION, .. })
        ));
    }

    #[test]
    fn test_mock_mode_without_key() {
        let vars = vec![
            (ENV_MOCK_MODE, "1"),
            (ENV_CURRENCIES_CONTRACT, "currencies"),
            (ENV_CURRENCIES_ACCOUNT, "oracle"),
        ];
        let config = NetworkConfig::from_lookup(lookup(&vars)).unwrap();
        assert!(config.mock_mode);
        assert!(config.chain_rpc_config().mock_mode);
        assert!(config.signing_key().is_ok());
    }

    #[test]
    fn test_bad_key_reported() {
        let vars = vec![
            (ENV_CURRENCIES_KEY, "PVT_K1_garbage"),
            (ENV_CURRENCIES_CONTRACT, "currencies"),
            (ENV_CURRENCIES_ACCOUNT, "oracle"),
        ];
        let config = NetworkConfig::from_lookup(lookup(&vars)).unwrap();
        assert!(matches!(
            config.signing_key(),
            Err(ConfigError::Invalid { var: ENV_CURRENCIES_KEY, .. })
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = NetworkConfig::from_lookup(lookup(&base())).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains(DEV_WIF));
        assert!(debug.contains("<redacted>"));
    }
}
