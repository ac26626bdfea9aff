//! # courtdb common library
//!
//! Shared code for the courtdb warehouse tooling:
//! - Infrastructure error type
//! - Bootstrap settings loading
//! - Warehouse connection, introspection and tabular snapshots
//! - Run ledger table definitions

pub mod config;
pub mod db;
pub mod error;
pub mod severity;

pub use error::{Error, Result};
pub use severity::Severity;
