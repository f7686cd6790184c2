//! Mock warehouse for testing and local demos.
//!
//! Records every session it opens so tests can check which identity was
//! presented, which statements ran and how often sessions were released.

use super::{ColumnDescriptor, StatementResult, Value, WarehouseConnector, WarehouseSession};
use crate::credentials::ConnectionDescriptor;
use crate::error::{ConsoleError, Result, WarehouseError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Scripted failures and delays.
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Fail before any session exists.
    pub connect_error: Option<WarehouseError>,
    /// Fail the login (reported through `wait_connected` and statements).
    pub login_error: Option<WarehouseError>,
    /// Delay before the login is confirmed.
    pub login_delay: Option<Duration>,
    /// Fail the `ALTER SESSION SET QUERY_TAG` statement.
    pub tag_error: Option<WarehouseError>,
    /// Fail every other statement.
    pub statement_error: Option<WarehouseError>,
    /// Delay every other statement.
    pub statement_delay: Option<Duration>,
    /// Returned for every other statement instead of the canned result.
    pub result: Option<StatementResult>,
}

#[derive(Debug, Default)]
struct LedgerState {
    descriptors: Vec<ConnectionDescriptor>,
    statements: Vec<String>,
    closes: usize,
}

/// Shared record of what the mock was asked to do.
#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of sessions opened.
    pub fn connects(&self) -> usize {
        self.lock().descriptors.len()
    }

    /// Number of sessions released.
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Descriptors in the order sessions were opened.
    pub fn descriptors(&self) -> Vec<ConnectionDescriptor> {
        self.lock().descriptors.clone()
    }

    /// Statements in execution order, session tags included.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }
}

/// A connector that never leaves the process.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    behavior: MockBehavior,
    ledger: MockLedger,
}

impl MockConnector {
    /// Creates a connector that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector with scripted behavior.
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ledger: MockLedger::default(),
        }
    }

    /// Handle to the shared ledger.
    pub fn ledger(&self) -> MockLedger {
        self.ledger.clone()
    }
}

#[async_trait]
impl WarehouseConnector for MockConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn WarehouseSession>> {
        if let Some(err) = &self.behavior.connect_error {
            return Err(ConsoleError::Connection(err.clone()));
        }

        self.ledger.lock().descriptors.push(descriptor.clone());

        let ready_at = Instant::now() + self.behavior.login_delay.unwrap_or_default();
        Ok(Box::new(MockSession {
            behavior: self.behavior.clone(),
            ledger: self.ledger.clone(),
            ready_at,
            sequence: AtomicUsize::new(0),
        }))
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

struct MockSession {
    behavior: MockBehavior,
    ledger: MockLedger,
    ready_at: Instant,
    sequence: AtomicUsize,
}

impl MockSession {
    fn canned_result(sql: &str) -> StatementResult {
        let sql_upper = sql.trim().to_uppercase();

        if sql_upper == "SELECT 1" {
            StatementResult::with_data(
                vec![ColumnDescriptor::new("1", "fixed")
                    .with_numeric(1, 0)
                    .with_nullable(false)],
                vec![vec![Value::Int(1)]],
            )
        } else if sql_upper.starts_with("SELECT") || sql_upper.starts_with("SHOW") {
            StatementResult::with_data(
                vec![ColumnDescriptor::new("RESULT", "text")],
                vec![vec![Value::String(format!("Mock result for: {}", sql))]],
            )
        } else {
            StatementResult::new()
        }
    }
}

#[async_trait]
impl WarehouseSession for MockSession {
    async fn wait_connected(&self) -> Result<()> {
        tokio::time::sleep_until(self.ready_at).await;
        match &self.behavior.login_error {
            Some(err) => Err(ConsoleError::Connection(err.clone())),
            None => Ok(()),
        }
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<StatementResult> {
        self.wait_connected().await?;
        self.ledger.lock().statements.push(sql.to_string());

        let statement_id = format!(
            "mock-{}",
            self.sequence.fetch_add(1, Ordering::SeqCst) + 1
        );

        if sql.starts_with("ALTER SESSION SET QUERY_TAG") {
            return match &self.behavior.tag_error {
                Some(err) => Err(ConsoleError::Statement(err.clone())),
                None => Ok(StatementResult::new().with_statement_id(statement_id)),
            };
        }

        if let Some(delay) = self.behavior.statement_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.behavior.statement_error {
            return Err(ConsoleError::Statement(err.clone()));
        }

        let result = self
            .behavior
            .result
            .clone()
            .unwrap_or_else(|| Self::canned_result(sql));
        Ok(result.with_statement_id(statement_id).truncate(max_rows))
    }

    async fn close(&self) -> Result<()> {
        self.ledger.lock().closes += 1;
        Ok(())
    }
}
