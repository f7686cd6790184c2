//! Request-scoped statement execution.
//!
//! This module resolves the identity for one request, runs the statement in
//! a short-lived warehouse session and reports which mode actually ran.

pub mod executor;

pub use executor::{
    ConnectionState, ExecutionFailure, ExecutionLimits, ExecutionOutcome, ExecutionRequest,
    QueryExecutor,
};
