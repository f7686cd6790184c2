//! Command-line argument parsing for the warehouse console.

use crate::config::{Config, LogFormat};
use clap::Parser;
use std::path::PathBuf;

/// SQL console service running queries under owner's or caller's rights.
#[derive(Parser, Debug)]
#[command(name = "warehouse-console")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Bind address (overrides config and SERVER_HOST)
    #[arg(short = 'H', long, value_name = "HOST")]
    pub host: Option<String>,

    /// Bind port (overrides config and SERVER_PORT)
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Use the in-memory warehouse instead of Snowflake
    #[arg(long)]
    pub mock_warehouse: bool,

    /// Log output format: pretty or json
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Parses the --log-format argument, if given.
    pub fn parse_log_format(&self) -> Result<Option<LogFormat>, String> {
        self.log_format.as_deref().map(str::parse).transpose()
    }

    /// Applies CLI overrides, which take precedence over file and environment.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<(), String> {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(format) = self.parse_log_format()? {
            config.logging.format = format;
        }
        Ok(())
    }
}
