//! Warehouse abstraction layer.
//!
//! Provides a trait-based interface for opening sessions and running
//! statements, so the Snowflake driver and the in-memory mock can be used
//! interchangeably.

mod convert;
mod keypair;
mod mock;
mod snowflake;
mod types;

pub use convert::convert_cell;
pub use keypair::{key_pair_jwt, public_key_fingerprint};
pub use mock::{MockBehavior, MockConnector, MockLedger};
pub use snowflake::SnowflakeConnector;
pub use types::{ColumnDescriptor, Row, StatementResult, Value};

use crate::credentials::ConnectionDescriptor;
use crate::error::Result;
use async_trait::async_trait;

/// Opens warehouse sessions.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    /// Starts opening a session under the descriptor's identity.
    ///
    /// Returns as soon as the login is in flight; confirmation is observed
    /// through [`WarehouseSession::wait_connected`]. An error here means no
    /// session exists and nothing needs releasing.
    async fn connect(&self, descriptor: &ConnectionDescriptor)
        -> Result<Box<dyn WarehouseSession>>;

    /// Backend name for diagnostics.
    fn backend(&self) -> &'static str;
}

/// One short-lived warehouse session.
#[async_trait]
pub trait WarehouseSession: Send + Sync {
    /// Resolves when the driver confirms the login, or with its error.
    async fn wait_connected(&self) -> Result<()>;

    /// Executes a statement verbatim, returning at most `max_rows` rows.
    ///
    /// Waits for the login internally if it is still pending.
    async fn execute(&self, sql: &str, max_rows: usize) -> Result<StatementResult>;

    /// Releases the session.
    async fn close(&self) -> Result<()>;
}
