//! Shared helpers: a console server on an ephemeral port.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use warehouse_console::config::Config;
use warehouse_console::server::{serve_listener, AppState};
use warehouse_console::warehouse::WarehouseConnector;

pub const BASE_TOKEN: &str = "platform-session-token";
pub const USER_TOKEN: &str = "ingress-user-token";

/// A running console server; stopped on drop.
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    _dir: TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Configuration pointing at the default test account.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.environment = "test".to_string();
    config.warehouse.account = Some("myorg-demo".to_string());
    config.warehouse.host = Some("myorg-demo.snowflakecomputing.com".to_string());
    config.warehouse.database = Some("DEMO_DB".to_string());
    config.warehouse.schema = Some("PUBLIC".to_string());
    config.warehouse.warehouse = Some("DEMO_WH".to_string());
    config.warehouse.role = Some("APP_ROLE".to_string());
    config
}

/// Starts the console with `connector`, writing `token` as the session token file.
pub async fn spawn_server(
    mut config: Config,
    connector: Arc<dyn WarehouseConnector>,
    token: Option<&str>,
) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let token_path: PathBuf = dir.path().join("token");
    if let Some(token) = token {
        std::fs::write(&token_path, token).unwrap();
    }
    config.warehouse.token_path = Some(token_path);

    let state = AppState::new(config, connector).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown = async {
            let _ = rx.await;
        };
        let _ = serve_listener(listener, state, shutdown).await;
    });

    TestServer {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        shutdown: Some(tx),
        _dir: dir,
    }
}
