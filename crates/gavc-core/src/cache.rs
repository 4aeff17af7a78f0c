//! Local artifact cache: immutable entries published by atomic rename.
//!
//! Layout under the root:
//!
//! ```text
//! .layout.json                         layout marker
//! .staging/entry-XXXX/                 in-progress stores (never visible)
//! .trash/evict-XXXX/                   entries being removed by clean
//! <group/path>/<artifact>/<version>/<slot>/
//!     .entry.json                      metadata (key, fetched_at, size, sha256)
//!     <object file>
//! ```
//!
//! `<slot>` is `default` without a classifier and `classifier.<name>` with one.
//! Coordinate segments never start with `.`, so the dot-prefixed names above
//! cannot collide with entry paths. There is no central lock: an entry is
//! either fully published or absent.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinate::{check_segment, Coordinate};
use crate::error::{GavcError, Result};
use crate::integrity::HashingWriter;
use crate::version::sort_versions;

/// Bump when the on-disk layout changes; an older cache is reset on init.
pub const LAYOUT_VERSION: u32 = 1;

const MARKER_FILE: &str = ".layout.json";
const STAGING_DIR: &str = ".staging";
const TRASH_DIR: &str = ".trash";
const ENTRY_META: &str = ".entry.json";
const DEFAULT_SLOT: &str = "default";
const CLASSIFIER_SLOT_PREFIX: &str = "classifier.";
/// Staging and trash directories younger than this may belong to a live process.
const LEFTOVER_GRACE_HOURS: i64 = 1;

/// Identity of one cached object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
}

impl CacheKey {
    /// Key for `coordinate` pinned to `version`.
    pub fn new(coordinate: &Coordinate, version: &str) -> Self {
        CacheKey {
            group: coordinate.group.clone(),
            artifact: coordinate.artifact.clone(),
            version: version.to_string(),
            classifier: coordinate.classifier.clone(),
        }
    }

    /// Entry directory relative to the root; `None` when the version is not
    /// usable as a directory name (e.g. a hostile server listing).
    fn relative_dir(&self) -> Option<PathBuf> {
        check_segment(&self.version).ok()?;
        let mut dir: PathBuf = self.group.split('.').collect();
        dir.push(&self.artifact);
        dir.push(&self.version);
        dir.push(slot_name(self.classifier.as_deref()));
        Some(dir)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{c}")?;
        }
        Ok(())
    }
}

fn slot_name(classifier: Option<&str>) -> String {
    match classifier {
        Some(c) => format!("{CLASSIFIER_SLOT_PREFIX}{c}"),
        None => DEFAULT_SLOT.to_string(),
    }
}

/// A published cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Path of the cached object file.
    pub path: PathBuf,
    pub fetched_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the object.
    pub sha256: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    group: String,
    artifact: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    classifier: Option<String>,
    file_name: String,
    fetched_at: DateTime<Utc>,
    size_bytes: u64,
    sha256: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LayoutMarker {
    layout: u32,
    created_at: DateTime<Utc>,
}

/// Handle on a cache root. Cheap to clone; holds no open files.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
    disabled: bool,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactCache {
            root: root.into(),
            disabled: false,
        }
    }

    /// A cache that never hits and never stores.
    pub fn disabled() -> Self {
        ArtifactCache {
            root: PathBuf::new(),
            disabled: true,
        }
    }

    /// `$HOME/.pie/gavc/cache`
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".pie").join("gavc").join("cache"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Create the root and layout marker. Idempotent.
    pub fn init(&self) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(GavcError::cache_unavailable(
                    &self.root,
                    "exists and is not a directory",
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.root)
                    .map_err(|e| GavcError::cache_unavailable(&self.root, e))?;
            }
            Err(e) => return Err(GavcError::cache_unavailable(&self.root, e)),
        }

        // Dropped right away; only proves we can create files here.
        tempfile::Builder::new()
            .prefix(".probe-")
            .tempfile_in(&self.root)
            .map_err(|e| GavcError::cache_unavailable(&self.root, format!("not writable: {e}")))?;

        match self.read_marker() {
            Marker::Current => Ok(()),
            Marker::Missing => self.write_marker(),
            Marker::Incompatible(found) => {
                tracing::warn!(
                    target: "gavc::cache",
                    root = %self.root.display(),
                    found = %found,
                    expected = LAYOUT_VERSION,
                    "incompatible cache layout, resetting"
                );
                self.reset()
            }
        }
    }

    /// Remove everything under the root and write a fresh marker.
    pub fn reset(&self) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        let children =
            fs::read_dir(&self.root).map_err(|e| GavcError::cache_unavailable(&self.root, e))?;
        for child in children {
            let child = child.map_err(|e| GavcError::cache_unavailable(&self.root, e))?;
            let path = child.path();
            let res = match child.file_type() {
                Ok(t) if t.is_dir() => fs::remove_dir_all(&path),
                _ => fs::remove_file(&path),
            };
            match res {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(GavcError::cache_unavailable(&path, e)),
            }
        }
        self.write_marker()
    }

    /// Published entry for `key`, if any. Never touches the network.
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        if self.disabled {
            return Ok(None);
        }
        match key.relative_dir() {
            Some(rel) => read_entry(&self.root.join(rel)),
            None => Ok(None),
        }
    }

    /// Copy `source` into the cache as `file_name` under `key`.
    ///
    /// Returns `None` when the cache is disabled. If another writer published
    /// the same key first, its entry is returned and ours is discarded.
    pub fn store(
        &self,
        key: &CacheKey,
        file_name: &str,
        source: &mut dyn Read,
    ) -> Result<Option<CacheEntry>> {
        self.store_at(key, file_name, source, Utc::now())
    }

    pub(crate) fn store_at(
        &self,
        key: &CacheKey,
        file_name: &str,
        source: &mut dyn Read,
        fetched_at: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>> {
        if self.disabled {
            return Ok(None);
        }
        let rel = key
            .relative_dir()
            .ok_or_else(|| GavcError::cache_write(&self.root, format!("unusable version '{}'", key.version)))?;
        check_segment(file_name)
            .map_err(|r| GavcError::cache_write(&self.root, format!("object name '{file_name}' {r}")))?;
        let final_dir = self.root.join(rel);

        let staging_root = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging_root).map_err(|e| GavcError::cache_write(&staging_root, e))?;
        // Removed on drop unless renamed into place first.
        let staging = tempfile::Builder::new()
            .prefix("entry-")
            .tempdir_in(&staging_root)
            .map_err(|e| GavcError::cache_write(&staging_root, e))?;

        let object_path = staging.path().join(file_name);
        let file = File::create(&object_path).map_err(|e| GavcError::cache_write(&object_path, e))?;
        let mut writer = HashingWriter::new(file);
        io::copy(source, &mut writer).map_err(|e| GavcError::cache_write(&object_path, e))?;
        let (sha256, size_bytes, file) = writer.finish();
        file.sync_all().map_err(|e| GavcError::cache_write(&object_path, e))?;
        drop(file);

        let meta = EntryMeta {
            group: key.group.clone(),
            artifact: key.artifact.clone(),
            version: key.version.clone(),
            classifier: key.classifier.clone(),
            file_name: file_name.to_string(),
            fetched_at,
            size_bytes,
            sha256,
        };
        let meta_path = staging.path().join(ENTRY_META);
        let json = serde_json::to_vec_pretty(&meta).map_err(|e| GavcError::cache_write(&meta_path, e))?;
        write_synced(&meta_path, &json).map_err(|e| GavcError::cache_write(&meta_path, e))?;

        if let Some(parent) = final_dir.parent() {
            fs::create_dir_all(parent).map_err(|e| GavcError::cache_write(parent, e))?;
        }

        // A racing clean may evict the winner between our rename and lookup.
        for _ in 0..2 {
            match fs::rename(staging.path(), &final_dir) {
                Ok(()) => {
                    tracing::debug!(target: "gavc::cache", key = %key, size_bytes, "stored cache entry");
                    return read_entry(&final_dir);
                }
                Err(e) if final_dir.exists() => {
                    if let Some(existing) = read_entry(&final_dir)? {
                        tracing::debug!(target: "gavc::cache", key = %key, error = %e, "entry already published");
                        return Ok(Some(existing));
                    }
                }
                Err(e) => return Err(GavcError::cache_write(&final_dir, e)),
            }
        }
        Err(GavcError::cache_write(&final_dir, "entry kept changing during publish"))
    }

    /// Remove entries fetched more than `max_age_days` ago. Returns how many were removed.
    pub fn clean(&self, max_age_days: u32) -> Result<usize> {
        self.clean_before(Utc::now() - Duration::days(i64::from(max_age_days)))
    }

    /// Remove entries with `fetched_at` strictly before `cutoff`.
    pub fn clean_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.clean_at(cutoff, Utc::now())
    }

    /// Entries before `cutoff` go; so do staging and trash leftovers last
    /// modified before both `cutoff` and the grace window ending at `now`.
    pub(crate) fn clean_at(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<usize> {
        if self.disabled || !self.root.exists() {
            return Ok(0);
        }
        match self.read_marker() {
            Marker::Current => {}
            Marker::Missing => {
                return Err(GavcError::cache_unavailable(&self.root, "cache is not initialized"))
            }
            Marker::Incompatible(found) => {
                return Err(GavcError::cache_unavailable(
                    &self.root,
                    format!("incompatible layout {found}"),
                ))
            }
        }

        let trash = self.root.join(TRASH_DIR);
        let mut removed = 0;
        for entry in self.entries()? {
            if entry.fetched_at >= cutoff {
                continue;
            }
            let Some(dir) = entry.path.parent() else {
                continue;
            };
            fs::create_dir_all(&trash).map_err(|e| GavcError::cache_write(&trash, e))?;
            let grave = tempfile::Builder::new()
                .prefix("evict-")
                .tempdir_in(&trash)
                .map_err(|e| GavcError::cache_write(&trash, e))?;
            match fs::rename(dir, grave.path().join("entry")) {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(target: "gavc::cache", key = %entry.key, "evicted cache entry");
                }
                // Someone else already evicted it.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(GavcError::cache_write(dir, e)),
            }
        }

        let stale_before = cutoff.min(now - Duration::hours(LEFTOVER_GRACE_HOURS));
        let swept = sweep_leftovers(&self.root.join(STAGING_DIR), stale_before)
            + sweep_leftovers(&trash, stale_before);
        if removed > 0 || swept > 0 {
            tracing::info!(target: "gavc::cache", removed, swept, "cache cleaned");
        }
        Ok(removed)
    }

    /// Every published entry, in no particular order.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut out = Vec::new();
        if self.disabled || !self.root.exists() {
            return Ok(out);
        }
        collect_entries(&self.root, &mut out)?;
        Ok(out)
    }

    /// Cached concrete versions of the coordinate's group/artifact, ascending.
    /// Only the coordinate's own slot counts, so every version returned can be
    /// served by a lookup of `CacheKey::new(coordinate, version)`.
    pub fn versions(&self, coordinate: &Coordinate) -> Result<Vec<String>> {
        let mut out = Vec::new();
        if self.disabled {
            return Ok(out);
        }
        let mut artifact_dir: PathBuf = coordinate.group.split('.').collect();
        artifact_dir.push(&coordinate.artifact);
        let artifact_dir = self.root.join(artifact_dir);

        let versions = match fs::read_dir(&artifact_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(GavcError::cache_unavailable(&artifact_dir, e)),
        };
        for v in versions {
            let v = v.map_err(|e| GavcError::cache_unavailable(&artifact_dir, e))?;
            let Some(name) = v.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || !v.path().is_dir() {
                continue;
            }
            let slot = v.path().join(slot_name(coordinate.classifier.as_deref()));
            if slot.join(ENTRY_META).is_file() {
                out.push(name);
            }
        }
        sort_versions(&mut out);
        Ok(out)
    }

    fn read_marker(&self) -> Marker {
        let text = match fs::read_to_string(self.root.join(MARKER_FILE)) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Marker::Missing,
            Err(e) => return Marker::Incompatible(format!("unreadable marker: {e}")),
        };
        match serde_json::from_str::<LayoutMarker>(&text) {
            Ok(m) if m.layout == LAYOUT_VERSION => Marker::Current,
            Ok(m) => Marker::Incompatible(m.layout.to_string()),
            Err(e) => Marker::Incompatible(format!("corrupt marker: {e}")),
        }
    }

    fn write_marker(&self) -> Result<()> {
        let marker = LayoutMarker {
            layout: LAYOUT_VERSION,
            created_at: Utc::now(),
        };
        let path = self.root.join(MARKER_FILE);
        let json = serde_json::to_vec_pretty(&marker).map_err(|e| GavcError::cache_unavailable(&path, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(|e| GavcError::cache_unavailable(&self.root, e))?;
        tmp.write_all(&json)
            .map_err(|e| GavcError::cache_unavailable(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| GavcError::cache_unavailable(&path, e.error))?;
        Ok(())
    }
}

enum Marker {
    Current,
    Missing,
    Incompatible(String),
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

/// Remove children of `dir` last modified before `stale_before`. Failures are
/// skipped; the next clean tries again.
fn sweep_leftovers(dir: &Path, stale_before: DateTime<Utc>) -> usize {
    let Ok(children) = fs::read_dir(dir) else {
        return 0;
    };
    let mut swept = 0;
    for child in children.flatten() {
        let modified = match child.metadata().and_then(|m| m.modified()) {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(_) => continue,
        };
        if modified >= stale_before {
            continue;
        }
        let path = child.path();
        let res = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match res {
            Ok(()) => swept += 1,
            Err(e) => tracing::debug!(target: "gavc::cache", path = %path.display(), error = %e, "leftover not removed"),
        }
    }
    swept
}

/// Read the entry published at `dir`. A directory that vanished (evicted
/// concurrently) reads as a miss; a half-present entry is an error.
fn read_entry(dir: &Path) -> Result<Option<CacheEntry>> {
    let meta_path = dir.join(ENTRY_META);
    let text = match fs::read_to_string(&meta_path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(GavcError::cache_unavailable(&meta_path, e)),
    };
    let meta: EntryMeta = serde_json::from_str(&text)
        .map_err(|e| GavcError::cache_unavailable(&meta_path, format!("corrupt entry metadata: {e}")))?;
    let path = dir.join(&meta.file_name);
    match fs::metadata(&path) {
        Ok(m) if m.is_file() => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound && !dir.exists() => return Ok(None),
        _ => return Err(GavcError::cache_unavailable(&path, "entry object is missing")),
    }
    Ok(Some(CacheEntry {
        key: CacheKey {
            group: meta.group,
            artifact: meta.artifact,
            version: meta.version,
            classifier: meta.classifier,
        },
        path,
        fetched_at: meta.fetched_at,
        size_bytes: meta.size_bytes,
        sha256: meta.sha256,
    }))
}

fn collect_entries(dir: &Path, out: &mut Vec<CacheEntry>) -> Result<()> {
    let children = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(GavcError::cache_unavailable(dir, e)),
    };
    for child in children {
        let child = child.map_err(|e| GavcError::cache_unavailable(dir, e))?;
        if child.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = child.path();
        if !path.is_dir() {
            continue;
        }
        if path.join(ENTRY_META).is_file() {
            if let Some(entry) = read_entry(&path)? {
                out.push(entry);
            }
        } else {
            collect_entries(&path, out)?;
        }
    }
    Ok(())
}
