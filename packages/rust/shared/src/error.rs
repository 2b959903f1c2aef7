//! Error types for the EcoSpray backend.
//!
//! Library crates use [`SiteError`] via `thiserror`.
//! The server maps it onto HTTP statuses; the CLI wraps it with `color-eyre`.

use std::path::PathBuf;

/// Top-level error type for all EcoSpray operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// An upstream host could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// An upstream service answered, but rejected the call.
    #[error("{message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    /// An external call exceeded its timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    /// HTML, JSON or archive parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The generative-text service returned something that is not the
    /// expected JSON object. Retrying the same prompt may succeed.
    #[error("malformed AI response: {message}")]
    MalformedAiResponse { message: String },

    /// Bad or missing caller input.
    #[error("{message}")]
    Validation { message: String },

    /// Tabular store error (local backend or bookkeeping around a remote one).
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteError>;

impl SiteError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-AI-response error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedAiResponse {
            message: msg.into(),
        }
    }

    /// Create an upstream rejection carrying the upstream's own message.
    pub fn upstream(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify a transport-level `reqwest` failure.
    ///
    /// Timeouts keep their own kind so callers can tell them apart from
    /// unreachable hosts.
    pub fn request(context: impl std::fmt::Display, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{context}: {err}"))
        } else {
            Self::Network(format!("{context}: {err}"))
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Network(_) => "network",
            Self::Upstream { .. } => "upstream",
            Self::Timeout(_) => "timeout",
            Self::Parse { .. } => "parse",
            Self::MalformedAiResponse { .. } => "malformed_ai_response",
            Self::Validation { .. } => "validation",
            Self::Storage(_) => "storage",
            Self::Io { .. } => "io",
        }
    }
}
