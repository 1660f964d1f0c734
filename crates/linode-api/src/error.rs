//! Error types for Linode API operations.
//!
//! Every failure carries enough structure for callers to branch on it: API
//! errors keep their HTTP status code so a `404` can be treated as "resource
//! absent", and every error maps to an [`ErrorCategory`] that drives retry
//! decisions and user-facing advice.

use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for Linode API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of API errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, TLS or DNS failure (transient, retryable).
    Network,
    /// The API asked us to slow down (429).
    RateLimited,
    /// The requested entity does not exist (404).
    NotFound,
    /// The token is missing, invalid, or lacks the required scope.
    Unauthorized,
    /// The request was rejected as invalid (400, 409, 422...).
    Invalid,
    /// The API failed on its side (5xx).
    Server,
    /// The caller cancelled the operation or its deadline passed.
    Cancelled,
    /// The response could not be decoded.
    Format,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::Server)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::RateLimited => "Rate limited by the Linode API",
            Self::NotFound => "Resource not found",
            Self::Unauthorized => "Authentication or authorization failed",
            Self::Invalid => "Request rejected by the Linode API",
            Self::Server => "Linode API server error",
            Self::Cancelled => "Operation cancelled",
            Self::Format => "Unexpected response format",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::RateLimited => "Wait a moment or raise the retry delays in the provider config",
            Self::NotFound => "The resource may have been deleted outside of this provider",
            Self::Unauthorized => "Verify the API token and its OAuth scopes",
            Self::Invalid => "Check the field reasons reported by the API",
            Self::Server => "Try again later; check status.linode.com for incidents",
            Self::Cancelled => "Re-run the operation to converge any partial changes",
            Self::Format => "The API may have changed; check for a provider update",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A single reason from an API error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiReason {
    /// Field the reason applies to, when the API names one.
    #[serde(default)]
    pub field: Option<String>,
    /// Human-readable reason.
    pub reason: String,
}

impl fmt::Display for ApiReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] {}", field, self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Errors that can occur while talking to the Linode API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The API answered with a non-success status code.
    #[error("[{status}] {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Joined reasons, or the status text when the body had none.
        message: String,
        /// Individual reasons from the `errors` envelope.
        reasons: Vec<ApiReason>,
    },

    /// The request never produced a response.
    #[error("request failed: {message}")]
    Transport {
        /// Error message from the HTTP layer.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation completed.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The response body could not be decoded.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// The client could not be configured.
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// IO error while reading local files (CA bundles).
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create an API error from a status code and reasons.
    pub fn api(status: u16, reasons: Vec<ApiReason>) -> Self {
        let message = if reasons.is_empty() {
            status_text(status).to_string()
        } else {
            reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        Self::Api {
            status,
            message,
            reasons,
        }
    }

    /// Create a 404 error for an entity that does not exist.
    pub fn not_found() -> Self {
        Self::api(
            404,
            vec![ApiReason {
                field: None,
                reason: "Not found".to_string(),
            }],
        )
    }

    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Numeric HTTP status code, when the API produced one.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the API reported the entity as absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(404)
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Api { status, .. } => match *status {
                401 | 403 => ErrorCategory::Unauthorized,
                404 => ErrorCategory::NotFound,
                429 => ErrorCategory::RateLimited,
                502..=504 => ErrorCategory::Server,
                500..=599 => ErrorCategory::Other,
                _ => ErrorCategory::Invalid,
            },
            Error::Transport { .. } => ErrorCategory::Network,
            Error::Cancelled | Error::DeadlineExceeded(_) => ErrorCategory::Cancelled,
            Error::InvalidResponse(_) => ErrorCategory::Format,
            Error::Config(_) | Error::Io { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Returns true when `err` is an API 404, looking through `anyhow` chains.
pub fn is_not_found(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(api) = e.downcast_ref::<Error>() {
            return api.is_not_found();
        }
        current = e.source();
    }
    false
}

fn status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unexpected status",
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::api(code, Vec::new()),
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
