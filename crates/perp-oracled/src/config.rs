//! Daemon configuration file.
//!
//! ```toml
//! [oracle]
//! sampling_interval = 28800
//!
//! [daemon]
//! socket_path = "/run/perp-oracle.sock"
//! log_level = "info"
//!
//! [access]
//! price_pushers = ["keeper-1"]
//! configurators = ["funding-engine"]
//!
//! [[instruments]]
//! external_id = "BTC-PERP"
//! initial_index_price = "64000000000000000000000"
//! initial_last_price = "64000000000000000000000"
//! ```

use std::path::{Path, PathBuf};

use perp_math::U256;
use perp_oracle::{AllowList, InstrumentSpec, OracleConfig, Role};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "PERP_ORACLE_CONFIG";

/// Config file used when neither the environment nor the command line names one.
pub const DEFAULT_CONFIG_FILE: &str = "perp-oracle.toml";

/// Errors raised while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("instrument {external_id}: {field} is not a decimal integer: {value:?}")]
    InvalidPrice {
        external_id: String,
        field: &'static str,
        value: String,
    },
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Store settings.
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Process settings.
    #[serde(default)]
    pub daemon: ServiceConfig,
    /// Role grants.
    #[serde(default)]
    pub access: AccessConfig,
    /// Tracked instruments, registered in file order.
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

/// Process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unix socket the JSON-RPC server listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Log level for the `perp` crates: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Caller ids holding each role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Callers allowed to push index and last prices.
    #[serde(default)]
    pub price_pushers: Vec<String>,
    /// Callers allowed to change intervals and funding state.
    #[serde(default)]
    pub configurators: Vec<String>,
}

/// One `[[instruments]]` entry. Prices are decimal strings since they may
/// exceed what TOML integers hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub external_id: String,
    pub initial_index_price: String,
    pub initial_last_price: String,
}

fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join("perp-oracle.sock")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load the configuration from [`DaemonConfig::config_path`].
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load the configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Config file location: `$PERP_ORACLE_CONFIG`, then the first CLI
    /// argument, then `perp-oracle.toml` in the working directory.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        std::env::args_os()
            .nth(1)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Tracing filter directive for the configured level.
    pub fn log_directive(&self) -> String {
        format!("perp={}", self.daemon.log_level)
    }

    /// Parse the instrument table into store registrations.
    pub fn instrument_specs(&self) -> Result<Vec<InstrumentSpec>, ConfigError> {
        self.instruments
            .iter()
            .map(|entry| {
                Ok(InstrumentSpec {
                    external_id: entry.external_id.clone(),
                    initial_index_price: parse_price(
                        entry,
                        "initial_index_price",
                        &entry.initial_index_price,
                    )?,
                    initial_last_price: parse_price(
                        entry,
                        "initial_last_price",
                        &entry.initial_last_price,
                    )?,
                })
            })
            .collect()
    }

    /// Role grants as an allow list.
    pub fn allow_list(&self) -> AllowList {
        let mut list = AllowList::new();
        for caller in &self.access.price_pushers {
            list.grant(caller.as_str(), Role::PricePusher);
        }
        for caller in &self.access.configurators {
            list.grant(caller.as_str(), Role::Configurator);
        }
        list
    }
}

fn parse_price(
    entry: &InstrumentConfig,
    field: &'static str,
    value: &str,
) -> Result<U256, ConfigError> {
    U256::from_str_radix(value.trim(), 10).map_err(|_| ConfigError::InvalidPrice {
        external_id: entry.external_id.clone(),
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use perp_oracle::{Authorizer, CallerId};

    const SAMPLE: &str = r#"
[oracle]
sampling_interval = 3600

[daemon]
socket_path = "/tmp/test-oracle.sock"

[access]
price_pushers = ["keeper"]
configurators = ["admin"]

[[instruments]]
external_id = "BTC-PERP"
initial_index_price = "100"
initial_last_price = "101"

[[instruments]]
external_id = "ETH-PERP"
initial_index_price = "115792089237316195423570985008687907853269984665640564039457584007913129639935"
initial_last_price = "1"
"#;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.oracle, OracleConfig::default());
        assert!(config.instruments.is_empty());
        assert_eq!(config.log_directive(), "perp=info");
    }

    #[test]
    fn test_parse_sample() {
        let config: DaemonConfig = toml::from_str(SAMPLE).expect("parse");
        assert_eq!(config.oracle.sampling_interval, 3600);
        assert_eq!(config.oracle.mark_sampling_interval, 300);
        assert_eq!(config.daemon.socket_path, PathBuf::from("/tmp/test-oracle.sock"));

        let specs = config.instrument_specs().expect("specs");
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].initial_last_price, U256::new(101));
        assert_eq!(specs[1].initial_index_price, U256::MAX);
    }

    #[test]
    fn test_allow_list_from_access() {
        let config: DaemonConfig = toml::from_str(SAMPLE).expect("parse");
        let list = config.allow_list();
        assert!(list.is_allowed(&CallerId::from("keeper"), Role::PricePusher));
        assert!(!list.is_allowed(&CallerId::from("keeper"), Role::Configurator));
        assert!(list.is_allowed(&CallerId::from("admin"), Role::Configurator));
    }

    #[test]
    fn test_invalid_price_rejected() {
        let config = DaemonConfig {
            instruments: vec![InstrumentConfig {
                external_id: "X".to_string(),
                initial_index_price: "1.5".to_string(),
                initial_last_price: "1".to_string(),
            }],
            ..DaemonConfig::default()
        };
        let err = config.instrument_specs().expect_err("decimal point");
        assert!(matches!(
            err,
            ConfigError::InvalidPrice { field: "initial_index_price", .. }
        ));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("perp-oracle-does-not-exist.toml");
        let config = DaemonConfig::load_from(&path).expect("defaults");
        assert!(config.instruments.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config: DaemonConfig = toml::from_str(SAMPLE).expect("parse");
        let toml_str = toml::to_string(&config).expect("serialize");
        let parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.instruments, config.instruments);
    }
}
