//! Remote operations behind a `Transport` trait, and the retry/offline wrapper
//! every engine goes through.
//!
//! Retryable: connection failures, timeouts, HTTP 5xx and 429. Everything else
//! surfaces on the first attempt. Retries wait a fixed `retry_timeout`.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::coordinate::Coordinate;
use crate::error::{GavcError, Result};
use crate::resolver::ResolvedVersion;
use crate::version::{sort_versions, VersionRange};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_TIMEOUT_SECS: u64 = 15;

/// Wire-level failure reported by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("HTTP {code} for {url}")]
    Status { code: u16, url: String },

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{0}")]
    Ambiguous(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connection(_) | TransportError::Timeout(_) => true,
            TransportError::Status { code, .. } => *code >= 500 || *code == 429,
            TransportError::Protocol(_)
            | TransportError::NotConfigured(_)
            | TransportError::Ambiguous(_) => false,
        }
    }
}

/// One version entry from a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVersion {
    pub version: String,
    /// Publish time when the server reports it; breaks ties between equal versions.
    pub published_at: Option<DateTime<Utc>>,
    /// Server-side location of the version, passed back on fetch/delete.
    pub locator: Option<String>,
}

impl RemoteVersion {
    pub fn new(version: impl Into<String>) -> Self {
        RemoteVersion {
            version: version.into(),
            published_at: None,
            locator: None,
        }
    }
}

/// Bytes of one downloaded object plus the digest the server advertised.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub file_name: String,
    pub content: Vec<u8>,
    /// Lowercase hex SHA-256, if the server provided one.
    pub sha256: Option<String>,
}

/// One named object of a multi-file upload, already read from disk.
#[derive(Debug, Clone)]
pub struct UploadObject {
    pub remote_name: String,
    pub content: Vec<u8>,
}

/// Remote artifact repository. Implementations perform exactly one attempt per call.
pub trait Transport {
    /// Versions published for the coordinate's group/artifact, filtered by classifier.
    fn list(&self, coordinate: &Coordinate) -> std::result::Result<Vec<RemoteVersion>, TransportError>;

    fn fetch(&self, version: &ResolvedVersion) -> std::result::Result<FetchedObject, TransportError>;

    /// Delete the classifier object, or the whole version when no classifier is set.
    fn delete(&self, version: &ResolvedVersion) -> std::result::Result<(), TransportError>;

    fn put(
        &self,
        target: &Coordinate,
        remote_name: &str,
        content: &[u8],
    ) -> std::result::Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn list(&self, coordinate: &Coordinate) -> std::result::Result<Vec<RemoteVersion>, TransportError> {
        (**self).list(coordinate)
    }

    fn fetch(&self, version: &ResolvedVersion) -> std::result::Result<FetchedObject, TransportError> {
        (**self).fetch(version)
    }

    fn delete(&self, version: &ResolvedVersion) -> std::result::Result<(), TransportError> {
        (**self).delete(version)
    }

    fn put(
        &self,
        target: &Coordinate,
        remote_name: &str,
        content: &[u8],
    ) -> std::result::Result<(), TransportError> {
        (**self).put(target, remote_name, content)
    }
}

/// Bounded retry applied uniformly to every remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_timeout: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            retry_timeout,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_secs(DEFAULT_RETRY_TIMEOUT_SECS),
        )
    }
}

/// Wraps a [`Transport`] with the retry policy and the force-offline short-circuit.
pub struct RetryingTransport<'a> {
    inner: &'a dyn Transport,
    policy: RetryPolicy,
    force_offline: bool,
}

impl<'a> RetryingTransport<'a> {
    pub fn new(inner: &'a dyn Transport, policy: RetryPolicy, force_offline: bool) -> Self {
        RetryingTransport {
            inner,
            policy,
            force_offline,
        }
    }

    pub fn is_force_offline(&self) -> bool {
        self.force_offline
    }

    pub fn list(&self, coordinate: &Coordinate) -> Result<Vec<RemoteVersion>> {
        self.ensure_online("list")?;
        self.with_retry("list", || self.inner.list(coordinate))
    }

    pub fn fetch(&self, version: &ResolvedVersion) -> Result<FetchedObject> {
        self.ensure_online("fetch")?;
        self.with_retry("fetch", || self.inner.fetch(version))
    }

    pub fn delete(&self, version: &ResolvedVersion) -> Result<()> {
        self.ensure_online("delete")?;
        self.with_retry("delete", || self.inner.delete(version))
    }

    /// Delete every listed version of `coordinate` inside `range` (inclusive).
    /// Returns the deleted versions in ascending order.
    pub fn delete_range(&self, coordinate: &Coordinate, range: &VersionRange) -> Result<Vec<String>> {
        self.ensure_online("delete-versions")?;
        let whole_versions = Coordinate {
            classifier: None,
            ..coordinate.clone()
        };
        let mut versions: Vec<String> = self
            .list(&whole_versions)?
            .into_iter()
            .map(|r| r.version)
            .filter(|v| range.contains(v))
            .collect();
        sort_versions(&mut versions);
        for v in &versions {
            let target = ResolvedVersion::new(whole_versions.with_version(v), v.clone(), None);
            self.delete(&target)?;
            tracing::info!(target: "gavc::transport", version = %v, "deleted remote version");
        }
        Ok(versions)
    }

    /// Publish all objects under `target`. Once any object was accepted, a later
    /// failure is reported as a partial upload.
    pub fn put(&self, target: &Coordinate, objects: &[UploadObject]) -> Result<()> {
        self.ensure_online("put")?;
        for (accepted, object) in objects.iter().enumerate() {
            let res = self.with_retry("put", || {
                self.inner.put(target, &object.remote_name, &object.content)
            });
            match res {
                Ok(()) => {
                    tracing::debug!(target: "gavc::transport", object = %object.remote_name, "uploaded");
                }
                Err(e) if accepted > 0 => {
                    return Err(GavcError::PartialUploadFailure {
                        accepted,
                        total: objects.len(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn ensure_online(&self, operation: &str) -> Result<()> {
        if self.force_offline {
            return Err(GavcError::Offline {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    fn with_retry<R, F>(&self, operation: &str, mut call: F) -> Result<R>
    where
        F: FnMut() -> std::result::Result<R, TransportError>,
    {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match call() {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(target: "gavc::transport", operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    if attempt >= max {
                        return Err(GavcError::RetryExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last: err,
                        });
                    }
                    tracing::warn!(
                        target: "gavc::transport",
                        operation,
                        attempt,
                        max,
                        error = %err,
                        "remote operation failed, retrying"
                    );
                    if !self.policy.retry_timeout.is_zero() {
                        thread::sleep(self.policy.retry_timeout);
                    }
                }
                Err(err) => return Err(GavcError::from_transport(operation, err)),
            }
        }
    }
}
