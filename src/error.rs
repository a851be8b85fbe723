use serde::Serialize;
use std::time::Duration;

/// Coarse failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Timeout,
    Server,
    NotFound,
    Validation,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Cannot reach backend: {0}")]
    Transport(String),
    #[error("Request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("Server returned {status}: {message}")]
    Http { status: u16, message: String },
    /// A reachable backend answered with `success: false`.
    #[error("{0}")]
    Server(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Document not found")]
    NotFound(String),
    #[error("Invalid {field}: {value} is outside {min}..={max}")]
    Validation {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::Http { .. } | ApiError::Server(_) | ApiError::Malformed(_) => {
                ErrorKind::Server
            }
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Validation { .. } => ErrorKind::Validation,
        }
    }

    /// True when the backend could not be reached at all. Only these failures
    /// may be answered by the mock fallback.
    pub fn is_unreachable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Timeout)
    }

    /// Classifies a reqwest failure. `budget` is the client's request timeout.
    pub(crate) fn from_reqwest(err: reqwest::Error, budget: Duration) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(budget)
        } else if err.is_connect() || err.is_request() {
            ApiError::Transport(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ApiError::Malformed(err.to_string())
        } else {
            ApiError::Server(err.to_string())
        }
    }
}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
