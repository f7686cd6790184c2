//! Warehouse console - runs SQL against Snowflake under owner's or caller's rights.

use std::sync::Arc;

use tracing::{error, info, warn};
use warehouse_console::cli::Cli;
use warehouse_console::config::Config;
use warehouse_console::error::{ConsoleError, Result};
use warehouse_console::logging::init_logging;
use warehouse_console::server::{self, AppState};
use warehouse_console::warehouse::{MockConnector, SnowflakeConnector, WarehouseConnector};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();

    // Precedence: CLI flags, then the config file, then the environment
    let config_path = cli.config_path();
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_defaults();
    cli.apply_overrides(&mut config).map_err(ConsoleError::config)?;
    config.validate()?;

    init_logging(&config.logging);
    info!("Loaded config from: {}", config_path.display());
    info!("Warehouse: {}", config.warehouse.display_string());

    let connector: Arc<dyn WarehouseConnector> = if cli.mock_warehouse {
        warn!("Using the in-memory mock warehouse");
        Arc::new(MockConnector::new())
    } else {
        Arc::new(SnowflakeConnector::new(config.execution.statement_timeout())?)
    };

    let state = AppState::new(config, connector)?;
    server::serve(state).await
}
