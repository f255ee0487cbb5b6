//! stmtq Core - shared abstractions for the statement query layer
//!
//! This crate provides the types every other stmtq crate depends on:
//!
//! - `Connection` - Trait for a pooled data-store handle
//! - `Value`, `Row`, `QueryResult` - Driver-neutral result types
//! - `StmtqError` - The error taxonomy surfaced to callers
//! - `Config` - File-backed configuration for the store and query layer

pub mod config;
mod connection;
mod error;
mod types;

pub use config::{Config, DatabaseConfig, QueryConfig};
pub use connection::*;
pub use error::*;
pub use types::*;
