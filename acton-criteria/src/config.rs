//! Configuration management using Figment
//!
//! The library never reads configuration on its own. Hosts call
//! [`Config::load_from`] (or extend [`Config::figment`]) and hand the typed
//! sections to the data sources they construct.
//!
//! Layers, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. A TOML file
//! 3. `ACTON_` environment variables, with `__` separating nested keys
//!    (`ACTON_POSTGRES__MAX_CONNECTIONS=20`)

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Per-call timeout applied by every data source when none is configured
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Timeouts and retries shared by all data sources
    #[serde(default)]
    pub datasource: DataSourceConfig,

    /// PostgreSQL connection
    #[serde(default)]
    pub postgres: PostgresConfig,

    /// Redis connection
    #[serde(default)]
    pub redis: RedisConfig,

    /// DynamoDB client
    #[serde(default)]
    pub dynamodb: DynamoDbConfig,

    /// Elasticsearch node
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Timeouts and retries shared by all data sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Upper bound for a single backend call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries of a failed read or idempotent write
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential backoff in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Retries of a failed connection attempt
    #[serde(default = "default_max_retries")]
    pub connect_max_retries: u32,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            connect_max_retries: default_max_retries(),
        }
    }
}

/// PostgreSQL configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Connection URL
    #[serde(default = "default_postgres_url")]
    pub url: String,

    /// Maximum pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum idle connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: default_postgres_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Maximum pool size
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Expire stored records after this many seconds
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            max_connections: default_redis_max_connections(),
            ttl_secs: None,
        }
    }
}

/// DynamoDB configuration
///
/// Unset fields fall back to the default AWS provider chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamoDbConfig {
    /// AWS region
    #[serde(default)]
    pub region: Option<String>,

    /// Endpoint override, e.g. DynamoDB Local
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Static access key id
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Static secret access key
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

/// Elasticsearch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Node URL
    #[serde(default = "default_elasticsearch_url")]
    pub url: String,

    /// Basic auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Wait for writes to become searchable before returning
    #[serde(default)]
    pub refresh: bool,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_elasticsearch_url(),
            username: None,
            password: None,
            refresh: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_postgres_url() -> String {
    "postgres://localhost:5432/postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_max_connections() -> usize {
    16
}

fn default_elasticsearch_url() -> String {
    "http://localhost:9200".to_string()
}

impl Config {
    /// The layered provider without a file: defaults then environment
    ///
    /// Hosts can merge further providers before extracting.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("ACTON_").split("__"))
    }

    /// Load configuration from a specific file
    ///
    /// A missing file is skipped. Environment variables override the file.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Load from config file (if exists)
            .merge(Toml::file(path))
            // Override with environment variables
            .merge(Env::prefixed("ACTON_").split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.datasource.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.datasource.max_retries, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.postgres.max_connections, 10);
        assert!(config.redis.ttl_secs.is_none());
        assert!(!config.elasticsearch.refresh);
    }

    #[test]
    fn test_load_from_file() {
        // Jail serializes environment access with the env override tests
        figment::Jail::expect_with(|_jail| {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(
                file,
                r#"
[logging]
level = "debug"
format = "pretty"

[datasource]
timeout_ms = 250
max_retries = 1

[postgres]
url = "postgres://app@db/app"
max_connections = 4

[redis]
ttl_secs = 60
"#
            )
            .unwrap();

            let config = Config::load_from(file.path().to_str().unwrap()).unwrap();
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.logging.format, LogFormat::Pretty);
            assert_eq!(config.datasource.timeout_ms, 250);
            assert_eq!(config.datasource.max_retries, 1);
            // Unset keys keep their defaults
            assert_eq!(config.datasource.retry_delay_ms, 100);
            assert_eq!(config.postgres.url, "postgres://app@db/app");
            assert_eq!(config.postgres.min_connections, 1);
            assert_eq!(config.redis.ttl_secs, Some(60));
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        figment::Jail::expect_with(|_jail| {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("absent.toml");
            let config = Config::load_from(path.to_str().unwrap()).unwrap();
            assert_eq!(config.postgres, PostgresConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ACTON_POSTGRES__MAX_CONNECTIONS", "42");
            jail.set_env("ACTON_DATASOURCE__TIMEOUT_MS", "900");
            let config: Config = Config::figment().extract()?;
            assert_eq!(config.postgres.max_connections, 42);
            assert_eq!(config.datasource.timeout_ms, 900);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[datasource]\ntimeout_ms = \"soon\"\n")?;
            let error = Config::load_from("bad.toml").unwrap_err();
            assert!(matches!(error, crate::error::Error::Config(_)));
            Ok(())
        });
    }
}
