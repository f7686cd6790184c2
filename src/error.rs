//! Error types for the warehouse console.
//!
//! Defines the main error enum used throughout the service, plus the
//! native diagnostic payload reported by the warehouse.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Diagnostics reported by the warehouse, carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseError {
    /// Native error code (e.g. `002003`).
    pub code: Option<String>,
    /// ANSI SQL state (e.g. `42S02`).
    pub sql_state: Option<String>,
    /// Native error message.
    pub message: String,
}

impl WarehouseError {
    /// Creates a warehouse error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            sql_state: None,
            message: message.into(),
        }
    }

    /// Sets the native error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the SQL state.
    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }
}

impl fmt::Display for WarehouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Main error type for console operations.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// Rejected input (empty query, malformed body, etc.)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Warehouse connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(WarehouseError),

    /// Statement errors (syntax errors, permission denied, etc.)
    #[error("Statement error: {0}")]
    Statement(WarehouseError),

    /// A bounded wait elapsed.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConsoleError {
    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a connection error from a bare message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(WarehouseError::new(msg))
    }

    /// Creates a statement error from a bare message.
    pub fn statement(msg: impl Into<String>) -> Self {
        Self::Statement(WarehouseError::new(msg))
    }

    /// Creates a timeout error with the given message.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::Connection(_) => "Connection Error",
            Self::Statement(_) => "Statement Error",
            Self::Timeout(_) => "Timeout",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the warehouse diagnostics, if the warehouse produced this error.
    pub fn warehouse(&self) -> Option<&WarehouseError> {
        match self {
            Self::Connection(e) | Self::Statement(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the message without the category prefix.
    ///
    /// Warehouse errors yield the native message unchanged.
    pub fn message(&self) -> String {
        match self {
            Self::Connection(e) | Self::Statement(e) => e.message.clone(),
            Self::Validation(m)
            | Self::Timeout(m)
            | Self::Config(m)
            | Self::Internal(m) => m.clone(),
        }
    }
}

/// Result type alias using ConsoleError.
pub type Result<T> = std::result::Result<T, ConsoleError>;
