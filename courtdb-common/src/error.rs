//! Common error types for courtdb
//!
//! Only infrastructure failures live here. Data-quality findings are
//! reported as issues by the engine and never travel through `Error`.

use thiserror::Error;

/// Common result type for courtdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure error types shared by all courtdb crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid caller input (e.g. an empty identifier passed to a resolver)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
