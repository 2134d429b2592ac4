//! Error types for minimesh

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Validation ===
    #[error("validation error: {0}")]
    Validation(String),

    // === Membership / RPC ===
    #[error("coordinator [{host}] unavailable: {reason}")]
    RemoteUnavailable { host: String, reason: String },

    // === Listings ===
    #[error("service not found: {0}")]
    NotFound(String),

    // === Client lifecycle ===
    #[error("mesh client not started, call start() first")]
    NotStarted,

    // === Config ===
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // === I/O ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Remote failure against a named coordinator host.
    pub fn unavailable(host: &str, reason: impl std::fmt::Display) -> Self {
        Error::RemoteUnavailable {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Convert to HTTP status code for API responses
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::Validation(_) | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RemoteUnavailable { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
