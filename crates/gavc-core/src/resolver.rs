//! Turns a coordinate's version spec into concrete versions.
//!
//! Exact versions resolve without touching the server. `+` and `*` list the
//! server, or read the local cache when forced offline. A non-forced listing
//! that exhausts its retries falls back to cached versions when the cache is
//! enabled; the result then reports [`Mode::Offline`].

use std::cmp::Ordering;

use crate::cache::ArtifactCache;
use crate::coordinate::{Coordinate, VersionSpec};
use crate::error::{ErrorKind, GavcError, Result};
use crate::transport::{RemoteVersion, RetryingTransport};
use crate::version::{compare_versions, sort_versions};

/// How a query was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The server was reachable (or was not needed).
    Online,
    /// The server could not be reached; answered from the cache.
    Offline,
    /// Offline was requested; the server was never contacted.
    ForceOffline,
}

/// A coordinate pinned to one concrete version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    coordinate: Coordinate,
    version: String,
    locator: Option<String>,
}

impl ResolvedVersion {
    pub(crate) fn new(coordinate: Coordinate, version: String, locator: Option<String>) -> Self {
        ResolvedVersion {
            coordinate,
            version,
            locator,
        }
    }

    /// Coordinate with the version token replaced by [`Self::version`].
    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Server-side location from the listing, if any.
    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub mode: Mode,
    /// Ascending by version order.
    pub versions: Vec<ResolvedVersion>,
}

/// Resolve `coordinate` against the server, or the cache when offline.
///
/// Cache policy comes from its two carriers: force-offline lives on the
/// transport, disable-cache on the cache handle.
pub fn resolve(
    coordinate: &Coordinate,
    transport: &RetryingTransport<'_>,
    cache: &ArtifactCache,
) -> Result<Resolution> {
    let forced = transport.is_force_offline();
    if let VersionSpec::Exact(v) = &coordinate.version {
        let mode = if forced { Mode::ForceOffline } else { Mode::Online };
        return Ok(Resolution {
            mode,
            versions: vec![ResolvedVersion::new(coordinate.clone(), v.clone(), None)],
        });
    }

    if forced {
        let versions = from_cache(coordinate, cache)?;
        if versions.is_empty() {
            return Err(GavcError::Unresolvable {
                query: coordinate.to_string(),
                reason: if cache.is_disabled() {
                    "force-offline with the cache disabled".to_string()
                } else {
                    "no cached versions".to_string()
                },
            });
        }
        return Ok(Resolution {
            mode: Mode::ForceOffline,
            versions,
        });
    }

    match transport.list(coordinate) {
        Ok(listing) => {
            if listing.is_empty() {
                return Err(GavcError::NotFound {
                    what: format!("no versions of {coordinate}"),
                });
            }
            Ok(Resolution {
                mode: Mode::Online,
                versions: from_listing(coordinate, listing),
            })
        }
        Err(err) if err.kind() == ErrorKind::RetryExhausted && !cache.is_disabled() => {
            let versions = from_cache(coordinate, cache)?;
            if versions.is_empty() {
                return Err(err);
            }
            tracing::warn!(
                target: "gavc::resolver",
                query = %coordinate,
                error = %err,
                "server unreachable, resolving from cache"
            );
            Ok(Resolution {
                mode: Mode::Offline,
                versions,
            })
        }
        Err(err) => Err(err),
    }
}

fn from_listing(coordinate: &Coordinate, listing: Vec<RemoteVersion>) -> Vec<ResolvedVersion> {
    let pin = |r: RemoteVersion| {
        ResolvedVersion::new(coordinate.with_version(&r.version), r.version, r.locator)
    };
    match coordinate.version {
        VersionSpec::Latest => listing
            .into_iter()
            .max_by(|a, b| {
                compare_versions(&a.version, &b.version).then_with(|| a.published_at.cmp(&b.published_at))
            })
            .map(pin)
            .into_iter()
            .collect(),
        _ => {
            let mut listing = listing;
            // Duplicates keep the most recently published entry.
            listing.sort_by(|a, b| match compare_versions(&a.version, &b.version) {
                Ordering::Equal => b.published_at.cmp(&a.published_at),
                other => other,
            });
            listing.dedup_by(|later, earlier| later.version == earlier.version);
            listing.into_iter().map(pin).collect()
        }
    }
}

fn from_cache(coordinate: &Coordinate, cache: &ArtifactCache) -> Result<Vec<ResolvedVersion>> {
    let mut cached = cache.versions(coordinate)?;
    sort_versions(&mut cached);
    if coordinate.version == VersionSpec::Latest {
        cached = cached.pop().into_iter().collect();
    }
    Ok(cached
        .into_iter()
        .map(|v| ResolvedVersion::new(coordinate.with_version(&v), v, None))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::cache::CacheKey;
    use crate::test_support::ScriptedTransport;
    use crate::transport::{RetryPolicy, TransportError};

    fn coord(text: &str) -> Coordinate {
        Coordinate::parse(text).unwrap()
    }

    fn no_wait(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::ZERO)
    }

    fn versions_of(res: &Resolution) -> Vec<&str> {
        res.versions.iter().map(|v| v.version()).collect()
    }

    fn cache_with(dir: &std::path::Path, c: &Coordinate, versions: &[&str]) -> ArtifactCache {
        let cache = ArtifactCache::new(dir);
        cache.init().unwrap();
        for v in versions {
            let key = CacheKey::new(c, v);
            cache
                .store(&key, "obj.bin", &mut &b"payload"[..])
                .unwrap();
        }
        cache
    }

    #[test]
    fn test_exact_needs_no_server() {
        let t = ScriptedTransport::new();
        let rt = RetryingTransport::new(&t, no_wait(3), false);
        let res = resolve(&coord("g:a:1.2.3"), &rt, &ArtifactCache::disabled()).unwrap();
        assert_eq!(res.mode, Mode::Online);
        assert_eq!(versions_of(&res), ["1.2.3"]);
        assert_eq!(t.total_calls(), 0);
    }

    #[test]
    fn test_latest_is_max_of_all() {
        let t = ScriptedTransport::new().with_versions(&["1.10", "2.0", "1.9", "1.2"]);
        let rt = RetryingTransport::new(&t, no_wait(1), false);
        let cache = ArtifactCache::disabled();

        let all = resolve(&coord("g:a:*"), &rt, &cache).unwrap();
        assert_eq!(versions_of(&all), ["1.2", "1.9", "1.10", "2.0"]);

        let latest = resolve(&coord("g:a:+"), &rt, &cache).unwrap();
        assert_eq!(versions_of(&latest), ["2.0"]);
        assert_eq!(latest.versions[0].coordinate().to_string(), "g:a:2.0");
        assert_eq!(
            latest.versions[0].version(),
            all.versions.last().unwrap().version()
        );
    }

    #[test]
    fn test_latest_tie_prefers_newest_publish() {
        let t = ScriptedTransport::new();
        t.push_remote(RemoteVersion {
            version: "3.0".into(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            locator: Some("old".into()),
        });
        t.push_remote(RemoteVersion {
            version: "3.0".into(),
            published_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            locator: Some("new".into()),
        });
        let rt = RetryingTransport::new(&t, no_wait(1), false);

        let latest = resolve(&coord("g:a:+"), &rt, &ArtifactCache::disabled()).unwrap();
        assert_eq!(latest.versions[0].locator(), Some("new"));

        let all = resolve(&coord("g:a:*"), &rt, &ArtifactCache::disabled()).unwrap();
        assert_eq!(versions_of(&all), ["3.0"]);
        assert_eq!(all.versions[0].locator(), Some("new"));
    }

    #[test]
    fn test_empty_listing_is_not_found() {
        let t = ScriptedTransport::new();
        let rt = RetryingTransport::new(&t, no_wait(1), false);
        let err = resolve(&coord("g:a:+"), &rt, &ArtifactCache::disabled()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_force_offline_uses_cache_only() {
        let dir = tempfile::tempdir().unwrap();
        let c = coord("g:a:+");
        let cache = cache_with(dir.path(), &c, &["1.0", "1.10", "1.9"]);
        let t = ScriptedTransport::new().with_versions(&["9.0"]);
        let rt = RetryingTransport::new(&t, no_wait(3), true);

        let latest = resolve(&c, &rt, &cache).unwrap();
        assert_eq!(latest.mode, Mode::ForceOffline);
        assert_eq!(versions_of(&latest), ["1.10"]);

        let all = resolve(&coord("g:a:*"), &rt, &cache).unwrap();
        assert_eq!(versions_of(&all), ["1.0", "1.9", "1.10"]);
        assert_eq!(t.total_calls(), 0);
    }

    #[test]
    fn test_force_offline_empty_cache_is_unresolvable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        cache.init().unwrap();
        let t = ScriptedTransport::new().with_versions(&["1.0"]);
        let rt = RetryingTransport::new(&t, no_wait(3), true);

        let err = resolve(&coord("g:a:+"), &rt, &cache).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unresolvable);

        let err = resolve(&coord("g:a:*"), &rt, &ArtifactCache::disabled()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unresolvable);
        assert_eq!(t.total_calls(), 0);
    }

    #[test]
    fn test_unreachable_server_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let c = coord("g:a:+");
        let cache = cache_with(dir.path(), &c, &["4.1"]);
        let t = ScriptedTransport::new().with_versions(&["5.0"]);
        t.fail_list_times(10, TransportError::Connection("refused".into()));
        let rt = RetryingTransport::new(&t, no_wait(2), false);

        let res = resolve(&c, &rt, &cache).unwrap();
        assert_eq!(res.mode, Mode::Offline);
        assert_eq!(versions_of(&res), ["4.1"]);
        assert_eq!(t.list_calls(), 2);
    }

    #[test]
    fn test_unreachable_server_without_cache_fails() {
        let t = ScriptedTransport::new();
        t.fail_list_times(10, TransportError::Timeout("slow".into()));
        let rt = RetryingTransport::new(&t, no_wait(2), false);

        let err = resolve(&coord("g:a:*"), &rt, &ArtifactCache::disabled()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
    }

    #[test]
    fn test_auth_failure_does_not_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let c = coord("g:a:+");
        let cache = cache_with(dir.path(), &c, &["1.0"]);
        let t = ScriptedTransport::new();
        t.fail_list_times(1, TransportError::Status { code: 401, url: "u".into() });
        let rt = RetryingTransport::new(&t, no_wait(3), false);

        let err = resolve(&c, &rt, &cache).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
