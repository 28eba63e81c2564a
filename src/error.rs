// src/error.rs

//! Unified error handling for the article workflow.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for workflow operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A remote service answered with a missing or malformed payload
    #[error("Upstream error from {service}: {message}")]
    Upstream { service: String, message: String },

    /// CMS login was rejected or incomplete
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Desk or stage lookup returned no items
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The CMS rejected a write because the etag precondition failed
    #[error("Conflict on {id}: {message}")]
    Conflict { id: String, message: String },

    /// The generator reported that the job failed
    #[error("Article generation failed: {0}")]
    GenerationFailed(String),

    /// Polling exceeded its time budget
    #[error("Generation {ref_key} did not finish within {elapsed:?}")]
    PollTimeout { ref_key: String, elapsed: Duration },

    /// The caller cancelled the flow
    #[error("Cancelled while waiting for generation {0}")]
    Cancelled(String),

    /// A newer initiate call superseded this handle
    #[error("Generation handle {0} was superseded by a newer request")]
    StaleHandle(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an upstream error for the named service.
    pub fn upstream(service: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Upstream {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Create an authentication error.
    pub fn auth(message: impl fmt::Display) -> Self {
        Self::Auth(message.to_string())
    }

    /// Create a lookup miss for a desk, stage, or similar named record.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a precondition conflict for the record `id`.
    pub fn conflict(id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Conflict {
            id: id.into(),
            message: message.to_string(),
        }
    }

    /// Whether a poll that failed with this error may be retried.
    ///
    /// Network failures and unreadable payloads are transient; every
    /// other variant ends the flow.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Json(_) | Self::Upstream { .. })
    }
}
