//! Snowflake client speaking the session REST protocol.
//!
//! A session logs in once, runs statements with its session token and is
//! deleted on close. The login runs as a background task started by
//! `connect`, so callers can bound how long they wait for it.

use super::convert::convert_cell;
use super::keypair::key_pair_jwt;
use super::{ColumnDescriptor, Row, StatementResult, WarehouseConnector, WarehouseSession};
use crate::credentials::{ConnectionDescriptor, Identity, Secret};
use crate::error::{ConsoleError, Result, WarehouseError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Client identifier sent at login.
const CLIENT_APP_ID: &str = "warehouse-console";

/// Response codes meaning the statement is still running.
const QUERY_IN_PROGRESS_CODES: [&str; 2] = ["333333", "333334"];

/// Delay between result polls for a running statement.
const POLL_INTERVAL_MS: u64 = 500;

/// Connect timeout for the underlying HTTP client.
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Snowflake connector backed by a shared HTTP client.
#[derive(Debug, Clone)]
pub struct SnowflakeConnector {
    client: Client,
}

impl SnowflakeConnector {
    /// Creates a connector whose HTTP requests are bounded by `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .map_err(|e| ConsoleError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl WarehouseConnector for SnowflakeConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn WarehouseSession>> {
        let base = Url::parse(&descriptor.base_url()).map_err(|e| {
            ConsoleError::config(format!("Invalid warehouse endpoint {}: {e}", descriptor.host))
        })?;
        let login_body = login_request_body(descriptor)?;
        let login_url = login_url(&base, descriptor)?;

        let (tx, rx) = watch::channel(LoginState::Pending);
        let client = self.client.clone();
        let task = tokio::spawn(async move {
            let state = match login(&client, login_url, &login_body).await {
                Ok(token) => LoginState::Ready(token),
                Err(err) => LoginState::Failed(err),
            };
            let _ = tx.send(state);
        });

        debug!(
            identity = descriptor.identity.kind().as_str(),
            host = %descriptor.host,
            "Snowflake login started"
        );

        Ok(Box::new(SnowflakeSession {
            client: self.client.clone(),
            base,
            login: rx,
            login_task: task,
            sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }))
    }

    fn backend(&self) -> &'static str {
        "snowflake"
    }
}

#[derive(Debug, Clone)]
enum LoginState {
    Pending,
    Ready(Secret),
    Failed(WarehouseError),
}

struct SnowflakeSession {
    client: Client,
    base: Url,
    login: watch::Receiver<LoginState>,
    login_task: JoinHandle<()>,
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl Drop for SnowflakeSession {
    fn drop(&mut self) {
        self.login_task.abort();
    }
}

impl SnowflakeSession {
    /// Waits for the login task and returns the session token.
    async fn session_token(&self) -> Result<Secret> {
        let mut rx = self.login.clone();
        let state = rx
            .wait_for(|s| !matches!(s, LoginState::Pending))
            .await
            .map_err(|_| ConsoleError::connection("Login ended without a result"))?
            .clone();

        match state {
            LoginState::Ready(token) => Ok(token),
            LoginState::Failed(err) => Err(ConsoleError::Connection(err)),
            LoginState::Pending => Err(ConsoleError::internal("Login still pending")),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ConsoleError::internal(format!("Invalid endpoint path {path}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("requestId", &uuid::Uuid::new_v4().to_string());
        Ok(url)
    }

    async fn fetch_chunks(
        &self,
        data: &QueryData,
        columns: &[ColumnDescriptor],
        rows: &mut Vec<Row>,
        max_rows: usize,
    ) -> Result<()> {
        let headers = chunk_headers(data);

        for chunk in &data.chunks {
            if rows.len() >= max_rows {
                break;
            }

            let mut request = self.client.get(&chunk.url);
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let response = request
                .send()
                .await
                .map_err(|e| ConsoleError::statement(format!("Failed to fetch result chunk: {e}")))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ConsoleError::statement(format!("Failed to read result chunk: {e}")))?;
            if !status.is_success() {
                return Err(ConsoleError::Statement(http_error(status, &body)));
            }

            let chunk_rows: Vec<Vec<Option<String>>> = serde_json::from_str(&format!("[{body}]"))
                .map_err(|e| ConsoleError::statement(format!("Malformed result chunk: {e}")))?;
            let remaining = max_rows - rows.len();
            rows.extend(
                chunk_rows
                    .iter()
                    .take(remaining)
                    .map(|cells| convert_row(cells, columns)),
            );
        }

        Ok(())
    }
}

#[async_trait]
impl WarehouseSession for SnowflakeSession {
    async fn wait_connected(&self) -> Result<()> {
        self.session_token().await.map(|_| ())
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<StatementResult> {
        let token = self.session_token().await?;
        let start = Instant::now();

        let sequence_id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let body = QueryRequest {
            sql_text: sql,
            async_exec: false,
            sequence_id,
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };

        let url = self.endpoint("/queries/v1/query-request")?;
        let mut response: QueryResponse = send_json(
            self.client
                .post(url)
                .header(AUTHORIZATION, auth_header(&token))
                .json(&body),
        )
        .await
        .map_err(ConsoleError::Statement)?;

        while response.is_in_progress() {
            let result_url = response
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.as_deref())
                .ok_or_else(|| ConsoleError::statement("Running statement has no result URL"))?;
            let url = self.base.join(result_url).map_err(|e| {
                ConsoleError::internal(format!("Invalid result URL {result_url}: {e}"))
            })?;

            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            debug!(sequence_id, "Polling running statement");
            response = send_json(
                self.client
                    .get(url)
                    .header(AUTHORIZATION, auth_header(&token)),
            )
            .await
            .map_err(ConsoleError::Statement)?;
        }

        if !response.success {
            return Err(ConsoleError::Statement(response.into_error()));
        }

        let data = response
            .data
            .ok_or_else(|| ConsoleError::statement("Statement response carried no data"))?;

        if data
            .query_result_format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("arrow"))
        {
            return Err(ConsoleError::statement(
                "Result format 'arrow' is not supported; expected JSON results",
            ));
        }

        let columns: Vec<ColumnDescriptor> = data.rowtype.iter().map(RowType::describe).collect();
        let mut rows: Vec<Row> = data
            .rowset
            .iter()
            .take(max_rows)
            .map(|cells| convert_row(cells, &columns))
            .collect();
        self.fetch_chunks(&data, &columns, &mut rows, max_rows).await?;

        let collected = rows.len();
        let mut result = StatementResult::with_data(columns, rows);
        result.total_rows = Some(data.total.map_or(collected, |t| t as usize));
        result.statement_id = data.query_id.clone();
        debug!(
            statement_id = data.query_id.as_deref().unwrap_or_default(),
            rows = collected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Snowflake statement finished"
        );

        Ok(result.truncate(max_rows))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let state = self.login.borrow().clone();
        match state {
            LoginState::Pending => {
                // The login request may already have reached the warehouse
                warn!(
                    assumed_open = true,
                    "Closing before login completed, remote session may remain open"
                );
                self.login_task.abort();
                Ok(())
            }
            LoginState::Failed(_) => Ok(()),
            LoginState::Ready(token) => {
                let mut url = self.endpoint("/session")?;
                url.query_pairs_mut().append_pair("delete", "true");

                let response: SnowflakeResponse<serde_json::Value> = send_json(
                    self.client
                        .post(url)
                        .header(AUTHORIZATION, auth_header(&token)),
                )
                .await
                .map_err(ConsoleError::Connection)?;

                if response.success {
                    debug!("Snowflake session deleted");
                    Ok(())
                } else {
                    Err(ConsoleError::Connection(response.into_error()))
                }
            }
        }
    }
}

/// Performs the login request and returns the session token.
async fn login(
    client: &Client,
    url: Url,
    body: &serde_json::Value,
) -> std::result::Result<Secret, WarehouseError> {
    let start = Instant::now();
    let response: SnowflakeResponse<LoginData> = send_json(client.post(url).json(body)).await?;

    if !response.success {
        return Err(response.into_error());
    }

    let token = response
        .data
        .and_then(|d| d.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| WarehouseError::new("Login response carried no session token"))?;

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "Snowflake login confirmed");
    Ok(Secret::new(token))
}

fn login_url(base: &Url, descriptor: &ConnectionDescriptor) -> Result<Url> {
    let mut url = base
        .join("/session/v1/login-request")
        .map_err(|e| ConsoleError::internal(format!("Invalid login endpoint: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("requestId", &uuid::Uuid::new_v4().to_string());
        let optional = [
            ("databaseName", &descriptor.database),
            ("schemaName", &descriptor.schema),
            ("warehouse", &descriptor.warehouse),
            ("roleName", &descriptor.role),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                query.append_pair(name, value);
            }
        }
    }
    Ok(url)
}

/// Builds the login payload for the descriptor's identity.
fn login_request_body(descriptor: &ConnectionDescriptor) -> Result<serde_json::Value> {
    let mut data = serde_json::Map::new();
    data.insert("CLIENT_APP_ID".into(), json!(CLIENT_APP_ID));
    data.insert(
        "CLIENT_APP_VERSION".into(),
        json!(env!("CARGO_PKG_VERSION")),
    );
    data.insert("ACCOUNT_NAME".into(), json!(descriptor.account));
    data.insert(
        "SESSION_PARAMETERS".into(),
        json!({ "QUERY_RESULT_FORMAT": "JSON" }),
    );

    match &descriptor.identity {
        Identity::Token(token) => {
            data.insert("AUTHENTICATOR".into(), json!("OAUTH"));
            data.insert("TOKEN".into(), json!(token.expose()));
        }
        Identity::TokenWithImpersonation(credential) => {
            data.insert("AUTHENTICATOR".into(), json!("OAUTH"));
            data.insert("TOKEN".into(), json!(credential.render().expose()));
        }
        Identity::Password { user, password } => {
            data.insert("LOGIN_NAME".into(), json!(user));
            data.insert("PASSWORD".into(), json!(password.expose()));
        }
        Identity::KeyPair { user, private_key } => {
            let jwt = key_pair_jwt(&descriptor.account, user, private_key)?;
            data.insert("LOGIN_NAME".into(), json!(user));
            data.insert("AUTHENTICATOR".into(), json!("SNOWFLAKE_JWT"));
            data.insert("TOKEN".into(), json!(jwt.expose()));
        }
        Identity::ExternalBrowser { .. } => {
            warn!("No unattended credential configured, interactive login is unavailable");
            return Err(ConsoleError::connection(
                "No session token, password or private key is configured; \
                 interactive browser login is not available in an unattended service",
            ));
        }
    }

    Ok(json!({ "data": data }))
}

fn auth_header(token: &Secret) -> String {
    format!("Snowflake Token=\"{}\"", token.expose())
}

/// Sends a request and decodes a JSON body, mapping transport failures.
async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> std::result::Result<T, WarehouseError> {
    let response = request
        .header(ACCEPT, "application/json")
        .header(
            USER_AGENT,
            format!("{CLIENT_APP_ID}/{}", env!("CARGO_PKG_VERSION")),
        )
        .send()
        .await
        .map_err(|e| WarehouseError::new(format!("Request to warehouse failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| WarehouseError::new(format!("Failed to read warehouse response: {e}")))?;

    if !status.is_success() {
        return Err(http_error(status, &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| WarehouseError::new(format!("Malformed warehouse response: {e}")))
}

/// Maps a non-2xx reply, keeping the warehouse's own code when the body has one.
fn http_error(status: StatusCode, body: &str) -> WarehouseError {
    if let Ok(parsed) = serde_json::from_str::<SnowflakeResponse<serde_json::Value>>(body) {
        if parsed.message.is_some() || parsed.code.is_some() {
            return parsed.into_error();
        }
    }
    WarehouseError::new(format!("Warehouse returned HTTP {status}")).with_code(status.as_str())
}

fn chunk_headers(data: &QueryData) -> HashMap<String, String> {
    match (&data.chunk_headers, &data.qrmk) {
        (Some(headers), _) => headers.clone(),
        (None, Some(qrmk)) => HashMap::from([
            (
                "x-amz-server-side-encryption-customer-algorithm".to_string(),
                "AES256".to_string(),
            ),
            (
                "x-amz-server-side-encryption-customer-key".to_string(),
                qrmk.clone(),
            ),
        ]),
        (None, None) => HashMap::new(),
    }
}

fn convert_row(cells: &[Option<String>], columns: &[ColumnDescriptor]) -> Row {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| convert_cell(cells.get(i).and_then(|c| c.as_deref()), column))
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    sql_text: &'a str,
    async_exec: bool,
    sequence_id: u64,
    query_submission_time: i64,
}

#[derive(Debug, Deserialize)]
struct SnowflakeResponse<T> {
    data: Option<T>,
    #[serde(default, deserialize_with = "string_or_number")]
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    success: bool,
}

impl<T: SqlStateCarrier> SnowflakeResponse<T> {
    fn into_error(self) -> WarehouseError {
        let sql_state = self.data.as_ref().and_then(SqlStateCarrier::sql_state);
        WarehouseError {
            code: self.code,
            sql_state,
            message: self
                .message
                .unwrap_or_else(|| "Warehouse reported an unspecified error".to_string()),
        }
    }
}

impl SnowflakeResponse<QueryData> {
    fn is_in_progress(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|c| QUERY_IN_PROGRESS_CODES.contains(&c))
    }
}

type QueryResponse = SnowflakeResponse<QueryData>;

/// Response payloads that may carry a SQL state.
trait SqlStateCarrier {
    fn sql_state(&self) -> Option<String>;
}

impl SqlStateCarrier for QueryData {
    fn sql_state(&self) -> Option<String> {
        self.sql_state.clone()
    }
}

impl SqlStateCarrier for LoginData {
    fn sql_state(&self) -> Option<String> {
        None
    }
}

impl SqlStateCarrier for serde_json::Value {
    fn sql_state(&self) -> Option<String> {
        self.get("sqlState")
            .and_then(|s| s.as_str())
            .map(String::from)
    }
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    rowtype: Vec<RowType>,
    #[serde(default)]
    rowset: Vec<Vec<Option<String>>>,
    total: Option<u64>,
    query_id: Option<String>,
    sql_state: Option<String>,
    get_result_url: Option<String>,
    query_result_format: Option<String>,
    #[serde(default)]
    chunks: Vec<ChunkRef>,
    chunk_headers: Option<HashMap<String, String>>,
    qrmk: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkRef {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    nullable: bool,
    scale: Option<i64>,
    precision: Option<i64>,
}

impl RowType {
    fn describe(&self) -> ColumnDescriptor {
        ColumnDescriptor {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            nullable: self.nullable,
            scale: self.scale,
            precision: self.precision,
        }
    }
}

/// Accepts codes sent either as `"002003"` or as a bare number.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
