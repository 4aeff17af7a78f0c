//! Error kinds and result codes shared by every gavc operation.
//! Core code returns `Result`; the parameter surfaces turn errors into codes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

/// Result code for a successful operation.
pub const OK: i32 = 0;

/// Coarse error classification. Each kind maps to a stable, nonzero result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidCoordinate,
    InvalidUploadSpec,
    NotFound,
    Unresolvable,
    Unauthorized,
    CacheUnavailable,
    CacheWriteError,
    RetryExhausted,
    Offline,
    DownloadFailed,
    PartialUploadFailure,
    UnsupportedParameter,
    InvalidRequest,
    BadRequest,
    IntegrityMismatch,
    InvalidParameter,
    Protocol,
}

impl ErrorKind {
    /// Result code returned by the parameter surfaces and the CLI exit status.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidCoordinate => 1,
            ErrorKind::InvalidUploadSpec => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Unresolvable => 4,
            ErrorKind::Unauthorized => 5,
            ErrorKind::CacheUnavailable => 6,
            ErrorKind::CacheWriteError => 7,
            ErrorKind::RetryExhausted => 8,
            ErrorKind::Offline => 9,
            ErrorKind::DownloadFailed => 10,
            ErrorKind::PartialUploadFailure => 11,
            ErrorKind::UnsupportedParameter => 12,
            ErrorKind::InvalidRequest => 13,
            ErrorKind::BadRequest => 14,
            ErrorKind::IntegrityMismatch => 15,
            ErrorKind::InvalidParameter => 16,
            ErrorKind::Protocol => 17,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidCoordinate => "InvalidCoordinate",
            ErrorKind::InvalidUploadSpec => "InvalidUploadSpec",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Unresolvable => "Unresolvable",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::CacheUnavailable => "CacheUnavailable",
            ErrorKind::CacheWriteError => "CacheWriteError",
            ErrorKind::RetryExhausted => "RetryExhausted",
            ErrorKind::Offline => "Offline",
            ErrorKind::DownloadFailed => "DownloadFailed",
            ErrorKind::PartialUploadFailure => "PartialUploadFailure",
            ErrorKind::UnsupportedParameter => "UnsupportedParameter",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::IntegrityMismatch => "IntegrityMismatch",
            ErrorKind::InvalidParameter => "InvalidParameter",
            ErrorKind::Protocol => "Protocol",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Main error type for gavc operations.
#[derive(Debug, thiserror::Error)]
pub enum GavcError {
    #[error("invalid coordinate '{input}': {reason}")]
    InvalidCoordinate { input: String, reason: String },

    #[error("invalid upload spec: {reason}")]
    InvalidUploadSpec { reason: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("unable to resolve '{query}': {reason}")]
    Unresolvable { query: String, reason: String },

    #[error("unauthorized (HTTP {status}) for {url}")]
    Unauthorized { status: u16, url: String },

    #[error("cache unavailable at {path}: {reason}")]
    CacheUnavailable { path: PathBuf, reason: String },

    #[error("cache write failed at {path}: {reason}")]
    CacheWriteError { path: PathBuf, reason: String },

    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: TransportError,
    },

    #[error("{operation} is not possible in force-offline mode")]
    Offline { operation: String },

    #[error("download to {path} failed: {reason}")]
    DownloadFailed { path: PathBuf, reason: String },

    #[error("upload partially accepted: {accepted} of {total} objects ({reason})")]
    PartialUploadFailure {
        accepted: usize,
        total: usize,
        reason: String,
    },

    #[error("unsupported parameter: {param}")]
    UnsupportedParameter { param: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("server rejected request (HTTP {status}) for {url}")]
    BadRequest { status: u16, url: String },

    #[error("integrity check failed for {object}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        object: String,
        expected: String,
        actual: String,
    },

    #[error("invalid value '{value}' for parameter {param}")]
    InvalidParameter { param: String, value: String },

    #[error("malformed server response: {detail}")]
    Protocol { detail: String },
}

impl GavcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GavcError::InvalidCoordinate { .. } => ErrorKind::InvalidCoordinate,
            GavcError::InvalidUploadSpec { .. } => ErrorKind::InvalidUploadSpec,
            GavcError::NotFound { .. } => ErrorKind::NotFound,
            GavcError::Unresolvable { .. } => ErrorKind::Unresolvable,
            GavcError::Unauthorized { .. } => ErrorKind::Unauthorized,
            GavcError::CacheUnavailable { .. } => ErrorKind::CacheUnavailable,
            GavcError::CacheWriteError { .. } => ErrorKind::CacheWriteError,
            GavcError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            GavcError::Offline { .. } => ErrorKind::Offline,
            GavcError::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            GavcError::PartialUploadFailure { .. } => ErrorKind::PartialUploadFailure,
            GavcError::UnsupportedParameter { .. } => ErrorKind::UnsupportedParameter,
            GavcError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            GavcError::BadRequest { .. } => ErrorKind::BadRequest,
            GavcError::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            GavcError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            GavcError::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    pub fn code(&self) -> i32 {
        self.kind().code()
    }

    pub(crate) fn cache_unavailable(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        GavcError::CacheUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn cache_write(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        GavcError::CacheWriteError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn download_failed(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        GavcError::DownloadFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        GavcError::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Map a transport error that is final for this call (non-retryable).
    pub(crate) fn from_transport(operation: &str, err: TransportError) -> Self {
        match err {
            TransportError::Status { code: 404, url } => GavcError::NotFound {
                what: format!("{operation}: {url}"),
            },
            TransportError::Status { code, url } if code == 401 || code == 403 => {
                GavcError::Unauthorized { status: code, url }
            }
            TransportError::Status { code, url } if (400..500).contains(&code) && code != 429 => {
                GavcError::BadRequest { status: code, url }
            }
            TransportError::Protocol(detail) => GavcError::Protocol { detail },
            TransportError::NotConfigured(what) => GavcError::InvalidParameter {
                param: what.to_string(),
                value: String::new(),
            },
            TransportError::Ambiguous(reason) => GavcError::InvalidRequest { reason },
            other => GavcError::Protocol {
                detail: format!("{operation}: {other}"),
            },
        }
    }
}

/// Result alias for gavc operations.
pub type Result<T> = std::result::Result<T, GavcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_nonzero() {
        let kinds = [
            ErrorKind::InvalidCoordinate,
            ErrorKind::InvalidUploadSpec,
            ErrorKind::NotFound,
            ErrorKind::Unresolvable,
            ErrorKind::Unauthorized,
            ErrorKind::CacheUnavailable,
            ErrorKind::CacheWriteError,
            ErrorKind::RetryExhausted,
            ErrorKind::Offline,
            ErrorKind::DownloadFailed,
            ErrorKind::PartialUploadFailure,
            ErrorKind::UnsupportedParameter,
            ErrorKind::InvalidRequest,
            ErrorKind::BadRequest,
            ErrorKind::IntegrityMismatch,
            ErrorKind::InvalidParameter,
            ErrorKind::Protocol,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.code()).collect();
        assert!(codes.iter().all(|c| *c != OK));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_transport_status_mapping() {
        let nf = GavcError::from_transport(
            "fetch",
            TransportError::Status {
                code: 404,
                url: "http://x/y".into(),
            },
        );
        assert_eq!(nf.kind(), ErrorKind::NotFound);

        let auth = GavcError::from_transport(
            "fetch",
            TransportError::Status {
                code: 403,
                url: "http://x/y".into(),
            },
        );
        assert_eq!(auth.kind(), ErrorKind::Unauthorized);

        let bad = GavcError::from_transport(
            "put",
            TransportError::Status {
                code: 409,
                url: "http://x/y".into(),
            },
        );
        assert_eq!(bad.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_unexpected_status_is_protocol_not_exhaustion() {
        let redirect = GavcError::from_transport(
            "fetch",
            TransportError::Status {
                code: 302,
                url: "http://x/y".into(),
            },
        );
        assert_eq!(redirect.kind(), ErrorKind::Protocol);
        assert!(redirect.to_string().contains("HTTP 302"));
    }
}
