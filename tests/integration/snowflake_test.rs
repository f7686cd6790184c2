//! Snowflake driver against the fake REST endpoint.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio_test::assert_ok;
use warehouse_console::credentials::{
    CompositeCredential, ConnectionDescriptor, Identity, Secret, INGRESS_TOKEN_HEADER,
};
use warehouse_console::warehouse::{SnowflakeConnector, Value as Cell, WarehouseConnector};

use super::common::{spawn_server, test_config, BASE_TOKEN, USER_TOKEN};
use super::fake_snowflake::{FakeSnowflake, REJECTED_TOKEN};

fn descriptor(fake: &FakeSnowflake, identity: Identity) -> ConnectionDescriptor {
    descriptor_for_port(fake.port, identity)
}

fn descriptor_for_port(port: u16, identity: Identity) -> ConnectionDescriptor {
    ConnectionDescriptor {
        account: "myorg-demo".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        protocol: "http".to_string(),
        database: Some("DEMO_DB".to_string()),
        schema: Some("PUBLIC".to_string()),
        warehouse: Some("DEMO_WH".to_string()),
        role: Some("APP_ROLE".to_string()),
        identity,
    }
}

fn connector() -> SnowflakeConnector {
    SnowflakeConnector::new(Duration::from_secs(10)).unwrap()
}

#[tokio::test]
async fn test_login_query_and_close() {
    let fake = FakeSnowflake::start().await;
    let session = connector()
        .connect(&descriptor(&fake, Identity::Token(Secret::new(BASE_TOKEN))))
        .await
        .unwrap();

    session.wait_connected().await.unwrap();
    let result = session.execute("SELECT 1", 100).await.unwrap();
    assert_ok!(session.close().await);

    assert_eq!(result.rows, vec![vec![Cell::Int(1)]]);
    assert_eq!(result.columns[0].name, "1");
    assert!(!result.columns[0].nullable);
    assert_eq!(result.statement_id.as_deref(), Some("q-one"));
    assert_eq!(fake.deletes(), 1);

    let login = &fake.logins()[0]["data"];
    assert_eq!(login["AUTHENTICATOR"], json!("OAUTH"));
    assert_eq!(login["TOKEN"], json!(BASE_TOKEN));
    assert_eq!(login["SESSION_PARAMETERS"]["QUERY_RESULT_FORMAT"], json!("JSON"));
}

#[tokio::test]
async fn test_composite_token_is_presented() {
    let fake = FakeSnowflake::start().await;
    let credential =
        CompositeCredential::new(Secret::new(BASE_TOKEN), Secret::new(USER_TOKEN)).unwrap();
    let session = connector()
        .connect(&descriptor(&fake, Identity::TokenWithImpersonation(credential)))
        .await
        .unwrap();

    session.wait_connected().await.unwrap();
    assert_ok!(session.close().await);

    assert_eq!(
        fake.logins()[0]["data"]["TOKEN"],
        json!(format!("{BASE_TOKEN}.{USER_TOKEN}"))
    );
}

#[tokio::test]
async fn test_rejected_login_keeps_native_code() {
    let fake = FakeSnowflake::start().await;
    let session = connector()
        .connect(&descriptor(&fake, Identity::Token(Secret::new(REJECTED_TOKEN))))
        .await
        .unwrap();

    let err = session.wait_connected().await.unwrap_err();
    assert_eq!(err.category(), "Connection Error");
    assert_eq!(err.warehouse().and_then(|e| e.code.as_deref()), Some("390303"));

    // A statement after a failed login reports the same error
    let err = session.execute("SELECT 1", 10).await.unwrap_err();
    assert_eq!(err.category(), "Connection Error");

    assert_ok!(session.close().await);
    assert_eq!(fake.deletes(), 0);
    assert!(fake.statements().is_empty());
}

#[tokio::test]
async fn test_statement_error_keeps_native_fields() {
    let fake = FakeSnowflake::start().await;
    let session = connector()
        .connect(&descriptor(&fake, Identity::Token(Secret::new(BASE_TOKEN))))
        .await
        .unwrap();

    let err = session
        .execute("SELECT * FROM restricted", 10)
        .await
        .unwrap_err();
    let native = err.warehouse().unwrap();

    assert_eq!(err.category(), "Statement Error");
    assert_eq!(native.code.as_deref(), Some("003001"));
    assert_eq!(native.sql_state.as_deref(), Some("42501"));
    assert_eq!(
        native.message,
        "SQL access control error:\nInsufficient privileges to operate on table 'RESTRICTED'"
    );
    assert_ok!(session.close().await);
}

#[tokio::test]
async fn test_running_statement_is_polled() {
    let fake = FakeSnowflake::start().await;
    let session = connector()
        .connect(&descriptor(&fake, Identity::Token(Secret::new(BASE_TOKEN))))
        .await
        .unwrap();

    let result = session.execute("SELECT slow", 10).await.unwrap();
    assert_eq!(result.rows, vec![vec![Cell::Int(7), Cell::from("late")]]);
    assert_ok!(session.close().await);
}

#[tokio::test]
async fn test_chunks_are_fetched_up_to_limit() {
    let fake = FakeSnowflake::start().await;
    let session = connector()
        .connect(&descriptor(&fake, Identity::Token(Secret::new(BASE_TOKEN))))
        .await
        .unwrap();

    let all = session.execute("SELECT chunked", 100).await.unwrap();
    assert_eq!(all.row_count, 4);
    assert_eq!(all.rows[3], vec![Cell::Int(4), Cell::Null]);
    assert!(!all.was_truncated);

    let limited = session.execute("SELECT chunked", 3).await.unwrap();
    assert_eq!(limited.row_count, 3);
    assert_eq!(limited.total_rows, Some(4));
    assert!(limited.was_truncated);

    assert_ok!(session.close().await);
}

#[tokio::test]
async fn test_arrow_results_are_rejected() {
    let fake = FakeSnowflake::start().await;
    let session = connector()
        .connect(&descriptor(&fake, Identity::Token(Secret::new(BASE_TOKEN))))
        .await
        .unwrap();

    let err = session.execute("SELECT arrow", 10).await.unwrap_err();
    assert!(err.message().contains("arrow"));
    assert_ok!(session.close().await);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let fake = FakeSnowflake::start().await;
    let session = connector()
        .connect(&descriptor(&fake, Identity::Token(Secret::new(BASE_TOKEN))))
        .await
        .unwrap();

    session.wait_connected().await.unwrap();
    assert_ok!(session.close().await);
    assert_ok!(session.close().await);
    assert_eq!(fake.deletes(), 1);
}

#[tokio::test]
async fn test_console_end_to_end() {
    let fake = FakeSnowflake::start().await;
    let mut config = test_config();
    config.warehouse.host = Some("127.0.0.1".to_string());
    config.warehouse.port = fake.port;
    config.warehouse.protocol = "http".to_string();

    let server = spawn_server(config, Arc::new(connector()), Some(BASE_TOKEN)).await;

    let response = server
        .client
        .post(server.url("/execute"))
        .header(INGRESS_TOKEN_HEADER, USER_TOKEN)
        .json(&json!({"query": "SELECT 1", "useCallersRights": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["data"], json!([{"1": 1}]));
    assert_eq!(body["metadata"]["executionMode"], json!("caller's_rights"));
    assert_eq!(body["metadata"]["statementId"], json!("q-one"));
    assert_eq!(
        fake.statements(),
        vec![
            "ALTER SESSION SET QUERY_TAG = 'CALLERS_RIGHTS_EXECUTION'".to_string(),
            "SELECT 1".to_string(),
        ]
    );
    assert_eq!(
        fake.logins()[0]["data"]["TOKEN"],
        json!(format!("{BASE_TOKEN}.{USER_TOKEN}"))
    );
    assert_eq!(fake.deletes(), 1);

    let response = server
        .client
        .post(server.url("/execute"))
        .json(&json!({"query": "SELECT nonsense"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], json!("001003"));
    assert_eq!(body["sqlState"], json!("42000"));
    assert_eq!(body["executionMode"], json!("owner's_rights"));
    assert_eq!(fake.deletes(), 2);
}

#[tokio::test]
async fn test_close_during_pending_login() {
    // Accepts connections but never answers, so the login stays pending
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let descriptor = descriptor_for_port(port, Identity::Token(Secret::new(BASE_TOKEN)));

    let session = connector().connect(&descriptor).await.unwrap();
    assert_ok!(session.close().await);
    assert_ok!(session.close().await);

    let err = session.execute("SELECT 1", 10).await.unwrap_err();
    assert_eq!(err.category(), "Connection Error");
    drop(listener);
}
