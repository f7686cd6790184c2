//! Request handlers.

use super::api::{now_rfc3339, ErrorBody, ExecuteRequestBody, ExecuteResponse, HealthResponse};
use super::AppState;
use crate::credentials::{
    AmbientCredentials, IngressIdentity, INGRESS_TOKEN_HEADER, INGRESS_USER_HEADER,
};
use crate::error::ConsoleError;
use crate::query::{ExecutionFailure, ExecutionRequest, QueryExecutor};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::{debug, error, field, info_span, warn, Instrument};

type ApiError = (StatusCode, Json<ErrorBody>);

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn validation_error(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message)))
}

fn failure_response(failure: ExecutionFailure) -> ApiError {
    let status = match failure.error {
        ConsoleError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut body = ErrorBody::new(failure.error.message());
    if let Some(native) = failure.error.warehouse() {
        body.code = native.code.clone();
        body.sql_state = native.sql_state.clone();
    }
    body.execution_mode = Some(failure.mode);
    (status, Json(body))
}

/// `POST /execute`
pub async fn execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ExecuteRequestBody>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let span = info_span!(
        "execute",
        request_id = %uuid::Uuid::new_v4(),
        requested_mode = field::Empty
    );

    run_execute(state, headers, body).instrument(span).await
}

async fn run_execute(
    state: AppState,
    headers: HeaderMap,
    body: Result<Json<ExecuteRequestBody>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(body) = body.map_err(|e| {
        debug!(error = %e, "Rejected request body");
        validation_error("Invalid JSON request body")
    })?;

    let mode = body.requested_mode();
    tracing::Span::current().record("requested_mode", mode.as_str());

    let request = ExecutionRequest::new(body.query.as_deref().unwrap_or_default(), mode)
        .map_err(|e| validation_error(e.message()))?;

    let ingress = IngressIdentity::new(
        header_value(&headers, INGRESS_USER_HEADER),
        header_value(&headers, INGRESS_TOKEN_HEADER),
    );
    let session_token = state.token_source.read().await;
    let ambient = AmbientCredentials::new(session_token, (*state.params).clone(), ingress);

    let executor = QueryExecutor::new(state.connector.as_ref(), state.limits);
    match executor.execute(&request, &ambient).await {
        Ok(outcome) => Ok(Json(ExecuteResponse::from_outcome(&outcome))),
        Err(failure) => {
            match &failure.error {
                ConsoleError::Connection(_)
                | ConsoleError::Statement(_)
                | ConsoleError::Timeout(_) => {
                    warn!(mode = %failure.mode, error = %failure.error, "Execution failed")
                }
                _ => error!(mode = %failure.mode, error = %failure.error, "Execution failed"),
            }
            Err(failure_response(failure))
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let params = &state.params;
    Json(HealthResponse {
        status: "healthy",
        timestamp: now_rfc3339(),
        uptime: state.started.elapsed().as_secs_f64(),
        environment: state.config.server.environment.clone(),
        version: env!("CARGO_PKG_VERSION"),
        warehouse_backend: state.connector.backend(),
        session_token_present: state.token_source.read().await.is_some(),
        account: params.account.clone(),
        database: params.database.clone(),
        schema: params.schema.clone(),
        warehouse: params.warehouse.clone(),
        role: params.role.clone(),
    })
}
