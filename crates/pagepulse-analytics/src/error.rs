use thiserror::Error;

/// Coarse classification used for retry decisions and run bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Transient,
    Quota,
    Auth,
    Malformed,
}

impl ApiErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ApiErrorKind::Transient => "api_transient",
            ApiErrorKind::Quota => "api_quota",
            ApiErrorKind::Auth => "api_auth",
            ApiErrorKind::Malformed => "api_malformed",
        }
    }
}

/// Errors returned by the realtime reporting API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network failure, timeout or 5xx. Retried until attempts run out.
    #[error("transient API failure after {attempts} attempt(s): {message}")]
    Transient { attempts: u32, message: String },

    /// HTTP 429 or `RESOURCE_EXHAUSTED`. Retried until attempts run out.
    #[error("API quota exhausted after {attempts} attempt(s): {message}")]
    Quota {
        attempts: u32,
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Expired or invalid credentials. Never retried.
    #[error("API rejected credentials (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// The response did not have the requested shape.
    #[error("malformed API response for {context}: {reason}")]
    Malformed { context: String, reason: String },

    /// Any other 4xx: the API refused the request itself.
    #[error("API rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    #[must_use]
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            ApiError::Transient { .. } => ApiErrorKind::Transient,
            ApiError::Quota { .. } => ApiErrorKind::Quota,
            ApiError::Auth { .. } => ApiErrorKind::Auth,
            ApiError::Malformed { .. } | ApiError::Rejected { .. } | ApiError::Config(_) => {
                ApiErrorKind::Malformed
            }
        }
    }

    /// Records how many attempts were spent before this error surfaced.
    #[must_use]
    pub(crate) fn with_attempts(self, total: u32) -> Self {
        match self {
            ApiError::Transient { message, .. } => ApiError::Transient {
                attempts: total,
                message,
            },
            ApiError::Quota {
                message,
                retry_after_secs,
                ..
            } => ApiError::Quota {
                attempts: total,
                message,
                retry_after_secs,
            },
            other => other,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ApiError::Config(err.to_string())
        } else if err.is_decode() {
            ApiError::Malformed {
                context: err
                    .url()
                    .map_or_else(|| "response body".to_string(), ToString::to_string),
                reason: err.to_string(),
            }
        } else {
            ApiError::Transient {
                attempts: 1,
                message: err.to_string(),
            }
        }
    }
}
