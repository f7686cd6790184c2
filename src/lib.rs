//! Warehouse console - a small HTTP service that runs SQL against Snowflake
//! under owner's or caller's rights.
//!
//! This library exposes the core modules for use in integration tests.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod query;
pub mod server;
pub mod warehouse;
