//! Configuration types
//!
//! A single TOML file with a `[database]` section describing how to reach the
//! store and a `[query]` section tuning the statement query layer:
//!
//! ```toml
//! [database]
//! host = "127.0.0.1"
//! port = 6001
//! username = "dump"
//! password = "111"
//! database = "mysql"
//! ppv2_enabled = false
//!
//! [query]
//! enable_statement_cu = true
//! slow_threshold_ms = 100
//! ```

use crate::{Result, StmtqError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub query: QueryConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content).map_err(|e| {
            StmtqError::Configuration(format!("failed to load {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), host = %config.database.host, "configuration loaded");
        Ok(config)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StmtqError::Configuration(format!("invalid TOML: {}", e)))?;
        config.database.validate()?;
        Ok(config)
    }
}

/// Connection settings for the MySQL-protocol store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Write a PROXY protocol v2 header before any MySQL traffic
    pub ppv2_enabled: bool,
    /// Client source address declared in the PROXY header
    pub client_ip: String,
    /// Upper bound of pooled connections
    pub max_open_conns: usize,
    /// Absolute lifetime of a pooled connection in seconds
    pub conn_max_lifetime_secs: u64,
    /// Timeout in seconds for establishing the first connection
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6001,
            username: String::new(),
            password: String::new(),
            database: "mysql".to_string(),
            ppv2_enabled: false,
            client_ip: String::new(),
            max_open_conns: 1,
            conn_max_lifetime_secs: 2 * 60 * 60,
            connect_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// Create a configuration for the given endpoint and credentials
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            ..Self::default()
        }
    }

    /// Set the default database
    pub fn with_database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// Enable the PROXY v2 header with the given client source address
    pub fn with_proxy_client_ip(mut self, client_ip: &str) -> Self {
        self.ppv2_enabled = true;
        self.client_ip = client_ip.to_string();
        self
    }

    /// Set the maximum number of pooled connections
    pub fn with_max_open_conns(mut self, max: usize) -> Self {
        self.max_open_conns = max.max(1);
        self
    }

    /// Absolute connection lifetime as a Duration
    pub fn conn_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.conn_max_lifetime_secs)
    }

    /// Connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Reject settings the connection layer cannot act on
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(StmtqError::Configuration("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(StmtqError::Configuration("port must not be 0".into()));
        }
        if self.max_open_conns == 0 {
            return Err(StmtqError::Configuration(
                "max_open_conns must be greater than 0".into(),
            ));
        }
        if self.ppv2_enabled && self.client_ip.trim().is_empty() {
            return Err(StmtqError::Configuration("invalid client IP".into()));
        }
        Ok(())
    }
}

/// Settings of the statement query layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Allow joining the precomputed cost side table when CU is requested
    pub enable_statement_cu: bool,
    /// Queries slower than this are logged at WARN
    pub slow_threshold_ms: u64,
    /// Suppress error logs for point lookups that match nothing
    pub ignore_not_found: bool,
    /// Default deadline for a query call
    pub timeout_ms: Option<u64>,
    /// Leading SQL comment used to tag generated statements
    pub sql_comment: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            enable_statement_cu: false,
            slow_threshold_ms: 100,
            ignore_not_found: false,
            timeout_ms: None,
            sql_comment: "cloud_nonuser".to_string(),
        }
    }
}

impl QueryConfig {
    /// Slow query threshold as a Duration
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }

    /// Default call deadline as a Duration, if set
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
