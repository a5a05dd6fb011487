//! Loader error types.

use thiserror::Error;

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors raised by the loader and its stores.
///
/// Data-quality problems (missing masters, groups without a reference gene)
/// are not errors; they are aggregated per phase as warnings. Everything
/// below aborts the current phase, which rolls back its transaction.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Missing or inconsistent configuration, detected before any write.
    #[error("configuration error: {0}")]
    Config(String),

    /// Referential-integrity violation in the promoted data.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Failed statement or dropped connection. Not retried; the operator
    /// restarts the pipeline and the run resumes from the committed phases.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }
}
