//! Query / download / delete for one coordinate.
//!
//! Parse -> validate -> resolve -> {download | delete | query}. Validation of
//! the request happens before any cache or network access.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cache::{ArtifactCache, CacheKey};
use crate::config::GavcConfig;
use crate::coordinate::Coordinate;
use crate::error::{GavcError, Result};
use crate::integrity::verify_sha256;
use crate::resolver::{resolve, Mode, ResolvedVersion};
use crate::transport::{RetryingTransport, Transport};

/// What a successful `perform` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GavcOutcome {
    pub mode: Mode,
    /// Resolved concrete versions, ascending.
    pub versions: Vec<String>,
    /// Output file written by a download.
    pub downloaded: Option<PathBuf>,
    /// Remote versions removed by delete / delete-versions.
    pub deleted: Vec<String>,
}

pub struct GavcEngine<'a> {
    config: &'a GavcConfig,
    transport: &'a dyn Transport,
}

impl<'a> GavcEngine<'a> {
    pub fn new(config: &'a GavcConfig, transport: &'a dyn Transport) -> Self {
        GavcEngine { config, transport }
    }

    pub fn perform(&self, coordinate_text: &str) -> Result<GavcOutcome> {
        let coordinate = Coordinate::parse(coordinate_text)?;
        self.validate(&coordinate)?;

        let cache = self.config.cache()?;
        cache.init()?;
        let rt = RetryingTransport::new(self.transport, self.config.retry, self.config.force_offline);

        let resolution = resolve(&coordinate, &rt, &cache)?;
        tracing::debug!(
            target: "gavc::engine",
            query = %coordinate,
            mode = ?resolution.mode,
            count = resolution.versions.len(),
            "resolved"
        );

        let mut outcome = GavcOutcome {
            mode: resolution.mode,
            versions: resolution.versions.iter().map(|v| v.version().to_string()).collect(),
            downloaded: None,
            deleted: Vec::new(),
        };

        if self.config.download {
            let [only] = resolution.versions.as_slice() else {
                return Err(GavcError::invalid_request(format!(
                    "download needs exactly one version, '{coordinate}' resolved to {}",
                    resolution.versions.len()
                )));
            };
            let path = self.download(&rt, &cache, only)?;
            tracing::info!(target: "gavc::engine", object = %only.coordinate(), path = %path.display(), "downloaded");
            outcome.downloaded = Some(path);
        }

        if self.config.delete {
            for v in &resolution.versions {
                rt.delete(v)?;
                tracing::info!(target: "gavc::engine", object = %v.coordinate(), "deleted");
                outcome.deleted.push(v.version().to_string());
            }
        }

        if let Some(range) = &self.config.delete_versions {
            outcome.deleted.extend(rt.delete_range(&coordinate, range)?);
        }

        Ok(outcome)
    }

    fn validate(&self, coordinate: &Coordinate) -> Result<()> {
        if self.config.download && !coordinate.version.is_single() {
            return Err(GavcError::invalid_request(
                "download of '*' is ambiguous; query a single version",
            ));
        }
        if self.config.force_offline && (self.config.delete || self.config.delete_versions.is_some()) {
            return Err(GavcError::Offline {
                operation: "delete".to_string(),
            });
        }
        Ok(())
    }

    fn download(
        &self,
        rt: &RetryingTransport<'_>,
        cache: &ArtifactCache,
        version: &ResolvedVersion,
    ) -> Result<PathBuf> {
        let key = CacheKey::new(version.coordinate(), version.version());

        if let Some(entry) = cache.lookup(&key)? {
            let file_name = entry
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| version.version().to_string());
            let dest = self.destination(&file_name);
            match publish_output(&dest, Source::File(&entry.path)) {
                Ok(()) => {
                    tracing::debug!(target: "gavc::engine", key = %key, "cache hit");
                    return Ok(dest);
                }
                // Evicted between lookup and copy: fetch it again.
                Err(_) if !entry.path.exists() => {}
                Err(e) => return Err(GavcError::download_failed(&dest, e)),
            }
        }

        let object = rt.fetch(version)?;
        if let Some(expected) = &object.sha256 {
            verify_sha256(&object.file_name, &object.content, expected)?;
        }
        cache.store(&key, &object.file_name, &mut object.content.as_slice())?;

        let dest = self.destination(&object.file_name);
        publish_output(&dest, Source::Bytes(&object.content))
            .map_err(|e| GavcError::download_failed(&dest, e))?;
        Ok(dest)
    }

    /// `output` if set (a directory receives the object's own name), else `./<file name>`.
    fn destination(&self, file_name: &str) -> PathBuf {
        match &self.config.output {
            Some(out) if out.is_dir() => out.join(file_name),
            Some(out) => out.clone(),
            None => PathBuf::from(file_name),
        }
    }
}

enum Source<'a> {
    File(&'a Path),
    Bytes(&'a [u8]),
}

/// Write into a scratch directory next to `dest`, then rename over it.
fn publish_output(dest: &Path, source: Source<'_>) -> std::io::Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let scratch = tempfile::Builder::new().prefix(".gavc-").tempdir_in(&parent)?;
    let staged = scratch.path().join("object");
    match source {
        Source::File(src) => {
            reflink_copy::reflink_or_copy(src, &staged)?;
        }
        Source::Bytes(bytes) => {
            let mut f = fs::File::create(&staged)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
    }
    fs::rename(&staged, dest)
}
