//! Configuration management for the warehouse console.
//!
//! Handles loading configuration from TOML files and environment variables.
//! Values the file leaves unset are filled from the environment the hosting
//! platform injects (`SNOWFLAKE_ACCOUNT`, `SNOWFLAKE_HOST`, ...).

use crate::error::{ConsoleError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Well-known location of the platform-issued session token.
pub const DEFAULT_TOKEN_PATH: &str = "/snowflake/session/token";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Static warehouse connection parameters.
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Timeouts and result limits.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Log level and output format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Deployment label reported by the health endpoint.
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            environment: default_environment(),
        }
    }
}

/// Static warehouse connection parameters.
///
/// These never come from a request body.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Account identifier (e.g. `myorg-myaccount`).
    pub account: Option<String>,

    /// Warehouse host name.
    pub host: Option<String>,

    /// Warehouse port.
    #[serde(default = "default_warehouse_port")]
    pub port: u16,

    /// `https` in production, `http` only for local fakes.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Default database for the session.
    pub database: Option<String>,

    /// Default schema for the session.
    pub schema: Option<String>,

    /// Virtual warehouse to run statements on.
    pub warehouse: Option<String>,

    /// Role to assume.
    pub role: Option<String>,

    /// Login name for password and key-pair authentication.
    pub user: Option<String>,

    /// Password (not recommended to store in config).
    pub password: Option<String>,

    /// Path to a PEM-encoded PKCS#8 private key.
    pub private_key_path: Option<PathBuf>,

    /// Location of the platform-issued session token.
    pub token_path: Option<PathBuf>,
}

fn default_warehouse_port() -> u16 {
    443
}

fn default_protocol() -> String {
    "https".to_string()
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            account: None,
            host: None,
            port: default_warehouse_port(),
            protocol: default_protocol(),
            database: None,
            schema: None,
            warehouse: None,
            role: None,
            user: None,
            password: None,
            private_key_path: None,
            token_path: None,
        }
    }
}

impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("account", &self.account)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field("token_path", &self.token_path)
            .finish()
    }
}

impl WarehouseConfig {
    /// Returns the session token path, falling back to the platform default.
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH))
    }

    /// Applies `SNOWFLAKE_*` environment variables as defaults.
    pub fn apply_env_defaults(&mut self) {
        self.apply_defaults_from(|key| std::env::var(key).ok());
    }

    /// Fills unset fields from the given lookup.
    pub fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |slot: &mut Option<String>, key: &str| {
            if slot.is_none() {
                *slot = lookup(key).filter(|v| !v.trim().is_empty());
            }
        };

        fill(&mut self.account, "SNOWFLAKE_ACCOUNT");
        fill(&mut self.host, "SNOWFLAKE_HOST");
        fill(&mut self.database, "SNOWFLAKE_DATABASE");
        fill(&mut self.schema, "SNOWFLAKE_SCHEMA");
        fill(&mut self.warehouse, "SNOWFLAKE_WAREHOUSE");
        fill(&mut self.role, "SNOWFLAKE_ROLE");
        fill(&mut self.user, "SNOWFLAKE_USER");
        fill(&mut self.password, "SNOWFLAKE_PASSWORD");

        if self.port == default_warehouse_port() {
            if let Some(port) = lookup("SNOWFLAKE_PORT").and_then(|p| p.parse().ok()) {
                self.port = port;
            }
        }
        if self.protocol == default_protocol() {
            if let Some(protocol) = lookup("SNOWFLAKE_PROTOCOL") {
                self.protocol = protocol.to_lowercase();
            }
        }
        if self.private_key_path.is_none() {
            self.private_key_path = lookup("SNOWFLAKE_PRIVATE_KEY_PATH").map(PathBuf::from);
        }
        if self.token_path.is_none() {
            self.token_path = lookup("SNOWFLAKE_TOKEN_PATH").map(PathBuf::from);
        }
    }

    /// Returns a display-safe string (no secrets) for logs.
    pub fn display_string(&self) -> String {
        let account = self.account.as_deref().unwrap_or("unknown");
        let database = self.database.as_deref().unwrap_or("-");
        let schema = self.schema.as_deref().unwrap_or("-");
        let warehouse = self.warehouse.as_deref().unwrap_or("-");
        format!("{account}/{database}.{schema} on {warehouse}")
    }
}

/// Timeouts and result limits for a single execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Ceiling on waiting for login confirmation.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound on the main statement.
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,

    /// Maximum rows returned to the caller.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_statement_timeout_secs() -> u64 {
    60
}

fn default_max_rows() -> usize {
    10_000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            statement_timeout_secs: default_statement_timeout_secs(),
            max_rows: default_max_rows(),
        }
    }
}

impl ExecutionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid log format: {s}. Expected: pretty or json")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warehouse-console")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConsoleError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConsoleError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies environment variables as defaults for unset values.
    pub fn apply_env_defaults(&mut self) {
        self.apply_defaults_from(|key| std::env::var(key).ok());
    }

    /// Fills unset values from the given lookup.
    pub fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.server.host == default_server_host() {
            if let Some(host) = lookup("SERVER_HOST") {
                self.server.host = host;
            }
        }
        if self.server.port == default_server_port() {
            if let Some(port) = lookup("SERVER_PORT").and_then(|p| p.parse().ok()) {
                self.server.port = port;
            }
        }
        if self.server.environment == default_environment() {
            if let Some(env) = lookup("APP_ENV") {
                self.server.environment = env;
            }
        }
        self.warehouse.apply_defaults_from(&lookup);
    }

    /// Checks values that would otherwise fail at request time.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ConsoleError::config("server.port must be non-zero"));
        }
        if self.execution.connect_timeout_ms == 0 {
            return Err(ConsoleError::config(
                "execution.connect_timeout_ms must be non-zero",
            ));
        }
        if self.execution.statement_timeout_secs == 0 {
            return Err(ConsoleError::config(
                "execution.statement_timeout_secs must be non-zero",
            ));
        }
        if self.execution.max_rows == 0 {
            return Err(ConsoleError::config("execution.max_rows must be non-zero"));
        }
        match self.warehouse.protocol.as_str() {
            "http" | "https" => Ok(()),
            other => Err(ConsoleError::config(format!(
                "Invalid warehouse protocol '{other}'. Expected 'http' or 'https'"
            ))),
        }
    }
}
