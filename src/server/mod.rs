//! HTTP surface: `POST /execute` and `GET /health`.

pub mod api;
mod handlers;

use crate::config::Config;
use crate::credentials::{SessionTokenSource, StaticConnectionParams};
use crate::error::{ConsoleError, Result};
use crate::query::ExecutionLimits;
use crate::warehouse::WarehouseConnector;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;

/// Immutable state shared by all requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    connector: Arc<dyn WarehouseConnector>,
    params: Arc<StaticConnectionParams>,
    token_source: SessionTokenSource,
    limits: ExecutionLimits,
    started: Instant,
}

impl AppState {
    /// Builds the state, loading static credentials from the configuration.
    pub fn new(config: Config, connector: Arc<dyn WarehouseConnector>) -> Result<Self> {
        let params = StaticConnectionParams::from_config(&config.warehouse)?;
        let token_source = SessionTokenSource::new(config.warehouse.token_path());
        let limits = ExecutionLimits::from_config(&config.execution);

        Ok(Self {
            config: Arc::new(config),
            connector,
            params: Arc::new(params),
            token_source,
            limits,
            started: Instant::now(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/execute", post(handlers::execute))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl-C or SIGTERM.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ConsoleError::config(format!("Failed to bind {addr}: {e}")))?;

    serve_listener(listener, state, shutdown_signal()).await
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve_listener(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| ConsoleError::internal(format!("Listener has no address: {e}")))?;
    info!(
        address = %local_addr,
        backend = state.connector.backend(),
        environment = %state.config.server.environment,
        "Listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ConsoleError::internal(format!("Server error: {e}")))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
