//! Error types
//!
//! Typed errors for API requests and session persistence, with helpers for
//! turning them into user-facing messages.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the REST API client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Credentials missing, expired or rejected (HTTP 401)
    #[error("Not authorized: {}", .message.as_deref().unwrap_or("session expired or credentials rejected"))]
    Unauthorized { message: Option<String> },

    /// Server rejected the request
    #[error("Request rejected ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Rejected {
        status: u16,
        message: Option<String>,
    },

    /// Request never produced a response
    #[error("Request to '{url}' failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body did not have the expected shape
    #[error("Unexpected response from '{url}': {details}")]
    Decode { url: String, details: String },

    /// Rejected locally before any request was sent
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    /// Check if this error came from a rejected credential
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// Check if retrying the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Message to show the user
    ///
    /// Prefers the server's own error text; otherwise uses `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Rejected {
                message: Some(message),
                ..
            }
            | ApiError::Unauthorized {
                message: Some(message),
            } => message.clone(),
            ApiError::Validation(message) => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

/// Errors persisting or restoring the session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to read the session file
    #[error("Failed to read session '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write the session file
    #[error("Failed to write session '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Session file exists but cannot be parsed
    #[error("Session file '{path}' is invalid: {details}")]
    InvalidFormat { path: PathBuf, details: String },
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
