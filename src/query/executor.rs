//! Statement execution under a resolved identity.
//!
//! Each call opens exactly one warehouse session, tags it with the mode,
//! runs the caller's SQL verbatim and releases the session on every exit
//! path. The executor can be tested against the mock connector without
//! the HTTP layer.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::credentials::{resolve_context, resolve_mode, AmbientCredentials, ExecutionMode};
use crate::credentials::{ModeResolution, ResolvedContext};
use crate::error::{ConsoleError, Result};
use crate::warehouse::{ColumnDescriptor, Row, StatementResult, WarehouseConnector, WarehouseSession};

/// A validated statement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    sql: String,
    mode: ExecutionMode,
}

impl ExecutionRequest {
    /// Creates a request, rejecting empty or whitespace-only SQL.
    pub fn new(sql: &str, mode: ExecutionMode) -> Result<Self> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(ConsoleError::validation("Query is required"));
        }
        Ok(Self {
            sql: sql.to_string(),
            mode,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

/// Bounds applied to every execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// How long to wait for login confirmation before assuming the session is open.
    pub connect_ceiling: Duration,
    /// Upper bound on the main statement.
    pub statement_timeout: Duration,
    /// Rows kept from the result set.
    pub max_rows: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl ExecutionLimits {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            connect_ceiling: config.connect_timeout(),
            statement_timeout: config.statement_timeout(),
            max_rows: config.max_rows,
        }
    }
}

/// How the session came to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// The driver confirmed the login within the ceiling.
    Confirmed,
    /// The ceiling elapsed first and the session was used anyway.
    Assumed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Assumed => "assumed",
        }
    }
}

/// Successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub sql: String,
    pub resolution: ModeResolution,
    /// Always derived from `resolution`.
    pub actual_mode: ExecutionMode,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub total_rows: Option<usize>,
    pub truncated: bool,
    pub statement_id: Option<String>,
    pub duration: Duration,
    pub warnings: Vec<String>,
    pub ingress_user: Option<String>,
    pub has_ingress_token: bool,
    pub connection: ConnectionState,
}

impl ExecutionOutcome {
    /// Human-readable summary of the mode decision.
    pub fn note(&self) -> String {
        match self.resolution {
            ModeResolution::OwnerExplicit => {
                "Executed with owner's rights as requested".to_string()
            }
            ModeResolution::CallerGranted => match &self.ingress_user {
                Some(user) => format!("Executed with caller's rights as {user}"),
                None => "Executed with caller's rights".to_string(),
            },
            ModeResolution::CallerDowngraded { reason } => format!(
                "Caller's rights were requested but {}; executed with owner's rights",
                reason.describe()
            ),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Failed execution, carrying the mode that was attempted.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub mode: ExecutionMode,
    pub error: ConsoleError,
}

impl ExecutionFailure {
    pub fn new(mode: ExecutionMode, error: ConsoleError) -> Self {
        Self { mode, error }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (attempted {})", self.error, self.mode)
    }
}

impl std::error::Error for ExecutionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// What happened inside an opened session.
struct SessionRun {
    connection: ConnectionState,
    result: StatementResult,
    warnings: Vec<String>,
}

/// Runs requests against a warehouse connector.
pub struct QueryExecutor<'a> {
    connector: &'a dyn WarehouseConnector,
    limits: ExecutionLimits,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new query executor.
    pub fn new(connector: &'a dyn WarehouseConnector, limits: ExecutionLimits) -> Self {
        Self { connector, limits }
    }

    /// Resolves the identity, runs the statement and reports the outcome.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        ambient: &AmbientCredentials,
    ) -> std::result::Result<ExecutionOutcome, ExecutionFailure> {
        let start = Instant::now();

        debug!(
            session_token_present = ambient.session_token.is_some(),
            ingress_token_present = ambient.ingress.has_token(),
            ingress_user_present = ambient.ingress.user().is_some(),
            "Resolving execution context"
        );

        let context = resolve_context(request.mode(), ambient).map_err(|e| {
            ExecutionFailure::new(resolve_mode(request.mode(), ambient).actual_mode(), e)
        })?;
        let mode = context.actual_mode();
        let fail = |error: ConsoleError| ExecutionFailure::new(mode, error);

        if let ModeResolution::CallerDowngraded { reason } = context.resolution {
            warn!(
                requested = %request.mode(),
                actual = %mode,
                reason = reason.describe(),
                "Caller's rights unavailable, running with owner's rights"
            );
        }

        info!(
            mode = %mode,
            resolution = context.resolution.as_str(),
            identity = context.descriptor.identity.kind().as_str(),
            "Opening warehouse session"
        );

        // A connect error means no session exists, so there is nothing to release
        let session = self.connector.connect(&context.descriptor).await.map_err(fail)?;

        let run = self.run_in_session(session.as_ref(), &context, request).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to release warehouse session");
        }

        let SessionRun {
            connection,
            result,
            warnings,
        } = run.map_err(fail)?;

        let duration = start.elapsed();
        info!(
            mode = %mode,
            rows = result.row_count,
            truncated = result.was_truncated,
            elapsed_ms = duration.as_millis() as u64,
            "Statement completed"
        );

        Ok(ExecutionOutcome {
            sql: request.sql().to_string(),
            resolution: context.resolution,
            actual_mode: mode,
            columns: result.columns,
            rows: result.rows,
            row_count: result.row_count,
            total_rows: result.total_rows,
            truncated: result.was_truncated,
            statement_id: result.statement_id,
            duration,
            warnings,
            ingress_user: ambient.ingress.user().map(String::from),
            has_ingress_token: ambient.ingress.has_token(),
            connection,
        })
    }

    async fn run_in_session(
        &self,
        session: &dyn WarehouseSession,
        context: &ResolvedContext,
        request: &ExecutionRequest,
    ) -> Result<SessionRun> {
        let mut warnings = Vec::new();

        if let ModeResolution::CallerDowngraded { reason } = context.resolution {
            warnings.push(format!(
                "Caller's rights downgraded to owner's rights: {}",
                reason.describe()
            ));
        }

        let connection = self.await_connection(session, &mut warnings).await?;

        let tag_sql = format!(
            "ALTER SESSION SET QUERY_TAG = '{}'",
            context.actual_mode().session_tag()
        );
        match tokio::time::timeout(self.limits.statement_timeout, session.execute(&tag_sql, 1))
            .await
        {
            Ok(Ok(_)) => debug!(tag = context.actual_mode().session_tag(), "Session tagged"),
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to tag session");
                warnings.push(format!("Session tag could not be set: {}", e.message()));
            }
            Err(_) => {
                warn!("Session tag timed out");
                warnings.push("Session tag could not be set: timed out".to_string());
            }
        }

        let result = tokio::time::timeout(
            self.limits.statement_timeout,
            session.execute(request.sql(), self.limits.max_rows),
        )
        .await
        .map_err(|_| {
            ConsoleError::timeout(format!(
                "Statement did not complete within {} s",
                self.limits.statement_timeout.as_secs_f64()
            ))
        })??;

        if let Some(warning) = result.truncation_warning() {
            warnings.push(warning);
        }

        Ok(SessionRun {
            connection,
            result,
            warnings,
        })
    }

    /// Waits for login confirmation up to the connect ceiling.
    async fn await_connection(
        &self,
        session: &dyn WarehouseSession,
        warnings: &mut Vec<String>,
    ) -> Result<ConnectionState> {
        let ceiling = self.limits.connect_ceiling;
        match tokio::time::timeout(ceiling, session.wait_connected()).await {
            Ok(Ok(())) => Ok(ConnectionState::Confirmed),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    assumed_open = true,
                    ceiling_ms = ceiling.as_millis() as u64,
                    "Login not confirmed within ceiling, assuming session is open"
                );
                warnings.push(format!(
                    "Connection was not confirmed within {} ms and was assumed open",
                    ceiling.as_millis()
                ));
                Ok(ConnectionState::Assumed)
            }
        }
    }
}
