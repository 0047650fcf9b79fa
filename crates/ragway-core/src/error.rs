use thiserror::Error;

use crate::types::QueryMethod;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Backend '{backend}' unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("Method '{method}' is not implemented for backend '{backend}'")]
    UnsupportedMethod { backend: String, method: QueryMethod },

    #[error("Collections use different embedding models: {}", .0.join(", "))]
    DifferentCollectionModels(Vec<String>),

    #[error("Embedding failed (status {}): {message}", fmt_status(.status))]
    EmbeddingFailed { status: Option<u16>, message: String },

    #[error("Completion failed (status {}): {message}", fmt_status(.status))]
    CompletionFailed { status: Option<u16>, message: String },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Request cancelled by caller")]
    CancelledByCaller,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl Error {
    pub fn backend(backend: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable { backend: backend.into(), message: err.to_string() }
    }

    /// Whether the transport-level retry layer may try the call again.
    ///
    /// Rate limiting (429) and server-side failures (5xx) are transient, as are
    /// timeouts and failures that never produced a status (connect/reset).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::BackendUnavailable { .. } => true,
            Self::EmbeddingFailed { status, .. } | Self::CompletionFailed { status, .. } => {
                matches!(status, None | Some(429) | Some(500..=599))
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
