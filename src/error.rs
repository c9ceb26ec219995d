//! Error types for seavent.
//!
//! User input mistakes (bad date, bad duration) and timeouts are not errors;
//! they come back as workflow outcomes. Everything here aborts the current
//! invocation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The invocation lacks something the workflow cannot run without,
    /// e.g. a channel to attach action controls to.
    #[error("{0}")]
    MissingContext(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
