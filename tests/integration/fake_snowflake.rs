//! A local stand-in for the Snowflake session REST API.
//!
//! Recognizes a handful of statements by their text and records every login,
//! statement and session deletion it sees.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const SESSION_TOKEN: &str = "fake-session-token";
pub const REJECTED_TOKEN: &str = "expired-token";

#[derive(Debug, Default)]
pub struct FakeLedger {
    pub logins: Vec<Value>,
    pub statements: Vec<String>,
    pub deletes: usize,
}

#[derive(Clone)]
struct FakeState {
    ledger: Arc<Mutex<FakeLedger>>,
    base_url: String,
}

/// A running fake; its port is ephemeral.
pub struct FakeSnowflake {
    pub port: u16,
    ledger: Arc<Mutex<FakeLedger>>,
}

impl FakeSnowflake {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let ledger = Arc::new(Mutex::new(FakeLedger::default()));
        let state = FakeState {
            ledger: ledger.clone(),
            base_url: format!("http://127.0.0.1:{port}"),
        };

        let app = Router::new()
            .route("/session/v1/login-request", post(login))
            .route("/queries/v1/query-request", post(query))
            .route("/queries/:id/result", get(query_result))
            .route("/chunks/:id", get(chunk))
            .route("/session", post(delete_session))
            .with_state(state);

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { port, ledger }
    }

    pub fn logins(&self) -> Vec<Value> {
        self.ledger.lock().unwrap().logins.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.ledger.lock().unwrap().statements.clone()
    }

    pub fn deletes(&self) -> usize {
        self.ledger.lock().unwrap().deletes
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Snowflake Token=\"{SESSION_TOKEN}\""))
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "data": null,
            "code": "390112",
            "message": "Your session has expired. Please login again.",
            "success": false
        })),
    )
}

async fn login(State(state): State<FakeState>, Json(body): Json<Value>) -> Json<Value> {
    state.ledger.lock().unwrap().logins.push(body.clone());

    if body["data"]["TOKEN"] == json!(REJECTED_TOKEN) {
        return Json(json!({
            "data": null,
            "code": 390303,
            "message": "Invalid OAuth access token. ",
            "success": false
        }));
    }

    Json(json!({
        "data": {"token": SESSION_TOKEN, "masterToken": "unused"},
        "code": null,
        "message": null,
        "success": true
    }))
}

fn rowset(values: &[(&str, &str)]) -> Value {
    Value::Array(
        values
            .iter()
            .map(|(id, name)| json!([id, name]))
            .collect(),
    )
}

fn two_columns() -> Value {
    json!([
        {"name": "ID", "type": "fixed", "nullable": false, "scale": 0, "precision": 38},
        {"name": "NAME", "type": "text", "nullable": true, "scale": null, "precision": null}
    ])
}

async fn query(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }

    let sql = body["sqlText"].as_str().unwrap_or_default().to_string();
    state.ledger.lock().unwrap().statements.push(sql.clone());

    let response = match sql.as_str() {
        s if s.starts_with("ALTER SESSION SET QUERY_TAG") => json!({
            "data": {"rowtype": [], "rowset": [], "total": 0, "queryId": "q-tag"},
            "code": null, "message": null, "success": true
        }),
        "SELECT 1" => json!({
            "data": {
                "rowtype": [{"name": "1", "type": "fixed", "nullable": false, "scale": 0, "precision": 1}],
                "rowset": [["1"]],
                "total": 1,
                "queryId": "q-one",
                "queryResultFormat": "json"
            },
            "code": null, "message": null, "success": true
        }),
        "SELECT * FROM restricted" => json!({
            "data": {"sqlState": "42501", "queryId": "q-denied"},
            "code": "003001",
            "message": "SQL access control error:\nInsufficient privileges to operate on table 'RESTRICTED'",
            "success": false
        }),
        "SELECT slow" => json!({
            "data": {"getResultUrl": "/queries/q-slow/result", "queryId": "q-slow"},
            "code": "333334",
            "message": "Asynchronous execution in progress.",
            "success": true
        }),
        "SELECT chunked" => json!({
            "data": {
                "rowtype": two_columns(),
                "rowset": rowset(&[("1", "a"), ("2", "b")]),
                "total": 4,
                "queryId": "q-chunked",
                "chunks": [{"url": format!("{}/chunks/0", state.base_url), "rowCount": 2, "uncompressedSize": 20}],
                "chunkHeaders": {"x-fake-chunk-key": "secret"}
            },
            "code": null, "message": null, "success": true
        }),
        "SELECT arrow" => json!({
            "data": {"rowtype": [], "rowsetBase64": "", "queryResultFormat": "arrow"},
            "code": null, "message": null, "success": true
        }),
        _ => json!({
            "data": {"sqlState": "42000", "queryId": "q-syntax"},
            "code": "001003",
            "message": "SQL compilation error:\nsyntax error line 1 at position 0 unexpected 'nonsense'.",
            "success": false
        }),
    };

    (StatusCode::OK, Json(response))
}

async fn query_result(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({
            "data": {
                "rowtype": two_columns(),
                "rowset": rowset(&[("7", "late")]),
                "total": 1,
                "queryId": "q-slow"
            },
            "code": null, "message": null, "success": true
        })),
    )
}

async fn chunk(headers: HeaderMap) -> (StatusCode, String) {
    if headers.get("x-fake-chunk-key").and_then(|v| v.to_str().ok()) != Some("secret") {
        return (StatusCode::FORBIDDEN, "<Error>AccessDenied</Error>".to_string());
    }
    (StatusCode::OK, "[\"3\",\"c\"],\n[\"4\",null]".to_string())
}

async fn delete_session(
    State(state): State<FakeState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return unauthorized();
    }
    if params.get("delete").map(String::as_str) == Some("true") {
        state.ledger.lock().unwrap().deletes += 1;
    }
    (
        StatusCode::OK,
        Json(json!({"data": null, "code": null, "message": null, "success": true})),
    )
}
