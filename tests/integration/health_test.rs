//! `GET /health` tests.

use std::sync::Arc;

use serde_json::{json, Value};
use warehouse_console::warehouse::MockConnector;

use super::common::{spawn_server, test_config, BASE_TOKEN};

#[tokio::test]
async fn test_health_reports_diagnostics() {
    let server = spawn_server(test_config(), Arc::new(MockConnector::new()), Some(BASE_TOKEN)).await;

    let response = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["environment"], json!("test"));
    assert_eq!(body["warehouseBackend"], json!("mock"));
    assert_eq!(body["sessionTokenPresent"], json!(true));
    assert_eq!(body["account"], json!("myorg-demo"));
    assert_eq!(body["role"], json!("APP_ROLE"));
    assert!(body["uptime"].is_number());
    assert!(body["timestamp"].is_string());
    assert!(!body.to_string().contains(BASE_TOKEN));
}

#[tokio::test]
async fn test_health_without_session_token() {
    let mut config = test_config();
    config.warehouse.password = Some("hunter2".to_string());
    let server = spawn_server(config, Arc::new(MockConnector::new()), None).await;

    let body: Value = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["sessionTokenPresent"], json!(false));
    assert!(!body.to_string().contains("hunter2"));
}
