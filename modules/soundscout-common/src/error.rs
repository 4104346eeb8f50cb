use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SoundscoutError>;

/// Error taxonomy for the discovery pipeline.
///
/// Only `Cancelled` and `Fatal` abort a session; everything else is contained
/// at the stage that produced it (a failed source, a skipped candidate) and
/// surfaces as a structured rejection reason instead.
#[derive(Debug, Error)]
pub enum SoundscoutError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("too many concurrent sessions")]
    Busy,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rate limited")]
    RateLimited {
        /// Seconds to wait, from a Retry-After header when the upstream sent one.
        retry_after_secs: Option<u64>,
    },

    #[error("blocked by upstream: {0}")]
    Blocked(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("data quality violation: {0}")]
    DataQuality(String),

    #[error("cancelled")]
    Cancelled,

    #[error("fatal: {0}")]
    Fatal(String),
}

impl SoundscoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SoundscoutError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            SoundscoutError::Busy => ErrorKind::Busy,
            SoundscoutError::Transient(_) => ErrorKind::Transient,
            SoundscoutError::RateLimited { .. } => ErrorKind::RateLimited,
            SoundscoutError::Blocked(_) => ErrorKind::Blocked,
            SoundscoutError::NotFound(_) => ErrorKind::NotFound,
            SoundscoutError::DataQuality(_) => ErrorKind::DataQuality,
            SoundscoutError::Cancelled => ErrorKind::Cancelled,
            SoundscoutError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether a source worker should retry this error (with backoff).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SoundscoutError::Transient(_) | SoundscoutError::RateLimited { .. }
        )
    }

    /// Whether this error terminates the whole session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SoundscoutError::Cancelled | SoundscoutError::Fatal(_)
        )
    }
}

/// Serializable error kind, carried on progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Busy,
    Transient,
    RateLimited,
    Blocked,
    NotFound,
    DataQuality,
    Cancelled,
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidRequest => write!(f, "invalid_request"),
            ErrorKind::Busy => write!(f, "busy"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::RateLimited => write!(f, "rate_limited"),
            ErrorKind::Blocked => write!(f, "blocked"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::DataQuality => write!(f, "data_quality"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cancelled_and_fatal_are_terminal() {
        assert!(SoundscoutError::Cancelled.is_terminal());
        assert!(SoundscoutError::Fatal("store down".into()).is_terminal());
        assert!(!SoundscoutError::Blocked("403".into()).is_terminal());
        assert!(!SoundscoutError::NotFound("gone".into()).is_terminal());
        assert!(!SoundscoutError::Transient("reset".into()).is_terminal());
    }

    #[test]
    fn transient_and_rate_limited_are_retryable() {
        assert!(SoundscoutError::Transient("timeout".into()).is_retryable());
        assert!(SoundscoutError::RateLimited {
            retry_after_secs: Some(2)
        }
        .is_retryable());
        assert!(!SoundscoutError::NotFound("404".into()).is_retryable());
        assert!(!SoundscoutError::DataQuality("negative count".into()).is_retryable());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
    }
}
