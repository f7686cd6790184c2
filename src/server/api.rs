//! Wire types for the HTTP surface.

use crate::credentials::ExecutionMode;
use crate::query::ExecutionOutcome;
use crate::warehouse::ColumnDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Body of `POST /execute`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequestBody {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub use_callers_rights: Option<bool>,
}

impl ExecuteRequestBody {
    /// Requested mode; an absent or null flag means owner's rights.
    pub fn requested_mode(&self) -> ExecutionMode {
        ExecutionMode::from_caller_flag(self.use_callers_rights.unwrap_or(false))
    }
}

/// Successful `POST /execute` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    /// One object per row, keyed by column name.
    pub data: Vec<Map<String, JsonValue>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub metadata: ExecuteMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteMetadata {
    pub sql_text: String,
    pub statement_id: Option<String>,
    pub execution_mode: ExecutionMode,
    pub ingress_user: Option<String>,
    pub has_ingress_token: bool,
    pub columns: Vec<ColumnDescriptor>,
    pub note: String,
    pub requested_mode: ExecutionMode,
    pub mode_resolution: &'static str,
    pub connection: &'static str,
    pub execution_time_ms: u64,
    pub total_rows: Option<usize>,
    pub truncated: bool,
    pub warnings: Vec<String>,
}

impl ExecuteResponse {
    pub fn from_outcome(outcome: &ExecutionOutcome) -> Self {
        let names = outcome.column_names();
        let data = outcome
            .rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect()
            })
            .collect();

        Self {
            data,
            columns: names,
            row_count: outcome.row_count,
            metadata: ExecuteMetadata {
                sql_text: outcome.sql.clone(),
                statement_id: outcome.statement_id.clone(),
                execution_mode: outcome.actual_mode,
                ingress_user: outcome.ingress_user.clone(),
                has_ingress_token: outcome.has_ingress_token,
                columns: outcome.columns.clone(),
                note: outcome.note(),
                requested_mode: outcome.resolution.requested_mode(),
                mode_resolution: outcome.resolution.as_str(),
                connection: outcome.connection.as_str(),
                execution_time_ms: outcome.duration.as_millis() as u64,
                total_rows: outcome.total_rows,
                truncated: outcome.truncated,
                warnings: outcome.warnings.clone(),
            },
        }
    }
}

/// Error body for 4xx and 5xx responses.
///
/// Validation failures carry only `error` and `timestamp`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            sql_state: None,
            code: None,
            timestamp: now_rfc3339(),
            execution_mode: None,
        }
    }
}

/// `GET /health` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    /// Seconds since startup.
    pub uptime: f64,
    pub environment: String,
    pub version: &'static str,
    pub warehouse_backend: &'static str,
    pub session_token_present: bool,
    pub account: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
