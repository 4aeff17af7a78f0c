//! In-memory transport for engine and resolver tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::coordinate::Coordinate;
use crate::integrity::sha256_hex;
use crate::resolver::ResolvedVersion;
use crate::transport::{FetchedObject, RemoteVersion, Transport, TransportError};

/// Scripted server: a fixed version listing, generated object bytes, and
/// queued failures. Records every call it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    remote: Mutex<Vec<(RemoteVersion, Option<String>)>>,
    list_failures: Mutex<Vec<TransportError>>,
    fetch_failures: Mutex<Vec<TransportError>>,
    delete_failures: Mutex<Vec<TransportError>>,
    put_failures: Mutex<Vec<TransportError>>,
    put_rejections: Mutex<HashMap<String, TransportError>>,
    wrong_digest: Mutex<bool>,
    deleted: Mutex<Vec<String>>,
    put_names: Mutex<Vec<String>>,
    put_targets: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions available for every classifier.
    pub fn with_versions(self, versions: &[&str]) -> Self {
        for v in versions {
            self.push_remote(RemoteVersion::new(*v));
        }
        self
    }

    /// Version published only with `classifier`.
    pub fn with_classified(self, version: &str, classifier: &str) -> Self {
        self.lock_remote()
            .push((RemoteVersion::new(version), Some(classifier.to_string())));
        self
    }

    pub fn push_remote(&self, remote: RemoteVersion) {
        self.lock_remote().push((remote, None));
    }

    pub fn fail_list_times(&self, n: usize, err: TransportError) {
        self.list_failures.lock().unwrap().extend(std::iter::repeat(err).take(n));
    }

    pub fn fail_fetch_times(&self, n: usize, err: TransportError) {
        self.fetch_failures.lock().unwrap().extend(std::iter::repeat(err).take(n));
    }

    pub fn fail_delete_times(&self, n: usize, err: TransportError) {
        self.delete_failures.lock().unwrap().extend(std::iter::repeat(err).take(n));
    }

    /// The next `n` puts fail with `err`, whatever their name.
    pub fn fail_put_times(&self, n: usize, err: TransportError) {
        self.put_failures.lock().unwrap().extend(std::iter::repeat(err).take(n));
    }

    /// Every put of `name` fails with `err`.
    pub fn reject_put_named(&self, name: &str, err: TransportError) {
        self.put_rejections.lock().unwrap().insert(name.to_string(), err);
    }

    /// Advertise a digest that does not match the served bytes.
    pub fn serve_wrong_digest(&self) {
        *self.wrong_digest.lock().unwrap() = true;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.fetch_calls() + self.delete_calls() + self.put_calls()
    }

    /// Versions deleted so far, in call order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Remote names accepted by put, in call order.
    pub fn put_names(&self) -> Vec<String> {
        self.put_names.lock().unwrap().clone()
    }

    /// Target coordinates of accepted puts.
    pub fn put_targets(&self) -> Vec<String> {
        self.put_targets.lock().unwrap().clone()
    }

    /// Bytes served for a version: deterministic so tests can compare files.
    pub fn content_for(artifact: &str, version: &str) -> Vec<u8> {
        format!("{artifact}-{version}").into_bytes()
    }

    fn lock_remote(&self) -> std::sync::MutexGuard<'_, Vec<(RemoteVersion, Option<String>)>> {
        self.remote.lock().unwrap()
    }

    fn matching(&self, coordinate: &Coordinate) -> Vec<RemoteVersion> {
        self.lock_remote()
            .iter()
            .filter(|(_, only)| match (only, &coordinate.classifier) {
                (Some(only), Some(wanted)) => only == wanted,
                _ => true,
            })
            .map(|(r, _)| r.clone())
            .collect()
    }

    fn pop_failure(queue: &Mutex<Vec<TransportError>>) -> Option<TransportError> {
        let mut q = queue.lock().unwrap();
        if q.is_empty() {
            None
        } else {
            Some(q.remove(0))
        }
    }
}

impl Transport for ScriptedTransport {
    fn list(&self, coordinate: &Coordinate) -> Result<Vec<RemoteVersion>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = Self::pop_failure(&self.list_failures) {
            return Err(err);
        }
        Ok(self.matching(coordinate))
    }

    fn fetch(&self, version: &ResolvedVersion) -> Result<FetchedObject, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = Self::pop_failure(&self.fetch_failures) {
            return Err(err);
        }
        let coordinate = version.coordinate();
        let known = self
            .matching(coordinate)
            .iter()
            .any(|r| r.version == version.version());
        if !known {
            return Err(TransportError::Status {
                code: 404,
                url: coordinate.to_string(),
            });
        }
        let content = Self::content_for(&coordinate.artifact, version.version());
        let sha256 = if *self.wrong_digest.lock().unwrap() {
            sha256_hex(b"something else")
        } else {
            sha256_hex(&content)
        };
        let file_name = match &coordinate.classifier {
            Some(c) => format!("{}-{}-{c}.bin", coordinate.artifact, version.version()),
            None => format!("{}-{}.bin", coordinate.artifact, version.version()),
        };
        Ok(FetchedObject {
            file_name,
            content,
            sha256: Some(sha256),
        })
    }

    fn delete(&self, version: &ResolvedVersion) -> Result<(), TransportError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = Self::pop_failure(&self.delete_failures) {
            return Err(err);
        }
        self.deleted.lock().unwrap().push(version.version().to_string());
        Ok(())
    }

    fn put(&self, target: &Coordinate, remote_name: &str, _content: &[u8]) -> Result<(), TransportError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = Self::pop_failure(&self.put_failures) {
            return Err(err);
        }
        if let Some(err) = self.put_rejections.lock().unwrap().get(remote_name) {
            return Err(err.clone());
        }
        self.put_names.lock().unwrap().push(remote_name.to_string());
        self.put_targets.lock().unwrap().push(target.to_string());
        Ok(())
    }
}
