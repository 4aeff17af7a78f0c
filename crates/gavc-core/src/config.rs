//! String-keyed parameters with environment fallback, and the typed config built from them.
//! Explicit values win over the environment; the environment wins over defaults.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::ArtifactCache;
use crate::error::{GavcError, Result};
use crate::transport::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_TIMEOUT_SECS};
use crate::version::VersionRange;

/// Every configuration key known to any surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Token,
    Server,
    Repository,
    CachePath,
    Download,
    Delete,
    DeleteVersions,
    Output,
    DisableCache,
    MaxAttempts,
    RetryTimeout,
    ForceOffline,
    FileList,
}

impl Param {
    pub const ALL: [Param; 13] = [
        Param::Token,
        Param::Server,
        Param::Repository,
        Param::CachePath,
        Param::Download,
        Param::Delete,
        Param::DeleteVersions,
        Param::Output,
        Param::DisableCache,
        Param::MaxAttempts,
        Param::RetryTimeout,
        Param::ForceOffline,
        Param::FileList,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Param::Token => "token",
            Param::Server => "server",
            Param::Repository => "repository",
            Param::CachePath => "cache-path",
            Param::Download => "download",
            Param::Delete => "delete",
            Param::DeleteVersions => "delete-versions",
            Param::Output => "output",
            Param::DisableCache => "disable-cache",
            Param::MaxAttempts => "max-attempts",
            Param::RetryTimeout => "retry-timeout",
            Param::ForceOffline => "force-offline",
            Param::FileList => "filelist",
        }
    }

    /// Environment variable consulted when the key was never set.
    pub fn env_var(self) -> &'static str {
        match self {
            Param::Token => "GAVC_SERVER_API_ACCESS_TOKEN",
            Param::Server => "GAVC_SERVER_URL",
            Param::Repository => "GAVC_SERVER_REPOSITORY",
            Param::CachePath => "GAVC_CACHE",
            Param::Download => "GAVC_DOWNLOAD",
            Param::Delete => "GAVC_DELETE",
            Param::DeleteVersions => "GAVC_DELETE_VERSIONS",
            Param::Output => "GAVC_OUTPUT",
            Param::DisableCache => "GAVC_DISABLE_CACHE",
            Param::MaxAttempts => "GAVC_MAX_ATTEMPTS",
            Param::RetryTimeout => "GAVC_RETRY_TIMEOUT",
            Param::ForceOffline => "GAVC_FORCE_OFFLINE",
            Param::FileList => "GAVC_FILELIST",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Param {
    type Err = GavcError;

    fn from_str(s: &str) -> Result<Self> {
        Param::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| GavcError::UnsupportedParameter {
                param: s.to_string(),
            })
    }
}

/// Which operation set a [`Params`] belongs to; each accepts a subset of keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Gavc,
    Cache,
    Upload,
}

impl Surface {
    pub fn supports(self, param: Param) -> bool {
        match self {
            Surface::Gavc => param != Param::FileList,
            Surface::Cache => param == Param::CachePath,
            Surface::Upload => matches!(
                param,
                Param::Token
                    | Param::Server
                    | Param::Repository
                    | Param::FileList
                    | Param::MaxAttempts
                    | Param::RetryTimeout
                    | Param::ForceOffline
            ),
        }
    }
}

/// `""`, `"0"`, `"false"` and `"False"` are false; anything else is true.
pub fn string_to_bool(value: &str) -> bool {
    !matches!(value, "" | "0" | "false" | "False")
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Key/value store for one surface.
pub struct Params {
    surface: Surface,
    values: HashMap<Param, String>,
    env: EnvLookup,
}

impl Params {
    /// Params backed by the process environment.
    pub fn new(surface: Surface) -> Self {
        Params::with_env(surface, |name| std::env::var(name).ok())
    }

    /// Params with an injected environment (tests, embedding).
    pub fn with_env<F>(surface: Surface, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Params {
            surface,
            values: HashMap::new(),
            env: Box::new(lookup),
        }
    }

    /// Set `key`. Unknown keys and keys this surface does not support fail
    /// with `UnsupportedParameter` and are not stored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let param = self.supported(key)?;
        self.values.insert(param, value.to_string());
        Ok(())
    }

    /// Current value of `key`, from an explicit set or the environment.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let param = self.supported(key)?;
        Ok(self.value(param))
    }

    /// Value of a known parameter regardless of surface.
    pub fn value(&self, param: Param) -> Option<String> {
        self.values
            .get(&param)
            .cloned()
            .or_else(|| (self.env)(param.env_var()))
    }

    fn supported(&self, key: &str) -> Result<Param> {
        let param: Param = key.parse()?;
        if !self.surface.supports(param) {
            return Err(GavcError::UnsupportedParameter {
                param: key.to_string(),
            });
        }
        Ok(param)
    }

    /// Like [`Params::value`], but keys foreign to this surface read as unset.
    fn scoped(&self, param: Param) -> Option<String> {
        if self.surface.supports(param) {
            self.value(param)
        } else {
            None
        }
    }

    fn text(&self, param: Param) -> Option<String> {
        self.scoped(param).filter(|v| !v.trim().is_empty())
    }

    fn flag(&self, param: Param) -> bool {
        self.scoped(param).map_or(false, |v| string_to_bool(&v))
    }

    fn number<T: FromStr>(&self, param: Param) -> Result<Option<T>> {
        match self.text(param) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| GavcError::InvalidParameter {
                param: param.as_str().to_string(),
                value: raw,
            }),
        }
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the token.
        let keys: Vec<&str> = self.values.keys().map(|p| p.as_str()).collect();
        f.debug_struct("Params")
            .field("surface", &self.surface)
            .field("keys", &keys)
            .finish()
    }
}

/// Typed view of a [`Params`] snapshot.
#[derive(Debug, Clone)]
pub struct GavcConfig {
    pub token: Option<String>,
    pub server: Option<String>,
    pub repository: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub download: bool,
    pub delete: bool,
    pub delete_versions: Option<VersionRange>,
    pub output: Option<PathBuf>,
    pub disable_cache: bool,
    pub retry: RetryPolicy,
    pub force_offline: bool,
    pub filelist: Option<String>,
}

impl GavcConfig {
    /// Build from `params`; malformed numbers and ranges fail with `InvalidParameter`.
    pub fn from_params(params: &Params) -> Result<Self> {
        let max_attempts = params
            .number::<u32>(Param::MaxAttempts)?
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(GavcError::InvalidParameter {
                param: Param::MaxAttempts.as_str().to_string(),
                value: "0".to_string(),
            });
        }
        let retry_secs = params
            .number::<u64>(Param::RetryTimeout)?
            .unwrap_or(DEFAULT_RETRY_TIMEOUT_SECS);
        let delete_versions = params
            .text(Param::DeleteVersions)
            .map(|r| VersionRange::parse(&r))
            .transpose()?;

        Ok(GavcConfig {
            token: params.text(Param::Token),
            server: params.text(Param::Server),
            repository: params.text(Param::Repository),
            cache_path: params.text(Param::CachePath).map(PathBuf::from),
            download: params.flag(Param::Download),
            delete: params.flag(Param::Delete),
            delete_versions,
            output: params.text(Param::Output).map(PathBuf::from),
            disable_cache: params.flag(Param::DisableCache),
            retry: RetryPolicy::new(max_attempts, Duration::from_secs(retry_secs)),
            force_offline: params.flag(Param::ForceOffline),
            filelist: params.text(Param::FileList),
        })
    }

    /// Cache handle for this config: disabled, the configured path, or the default root.
    pub fn cache(&self) -> Result<ArtifactCache> {
        if self.disable_cache {
            return Ok(ArtifactCache::disabled());
        }
        match &self.cache_path {
            Some(p) => Ok(ArtifactCache::new(p)),
            None => ArtifactCache::default_root()
                .map(ArtifactCache::new)
                .ok_or_else(|| GavcError::cache_unavailable("", "no cache-path and no home directory")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn no_env() -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        |_| None
    }

    #[test]
    fn test_param_names_round_trip() {
        for p in Param::ALL {
            assert_eq!(p.as_str().parse::<Param>().unwrap(), p);
        }
        assert_eq!("bogus".parse::<Param>().unwrap_err().kind(), ErrorKind::UnsupportedParameter);
    }

    #[test]
    fn test_string_to_bool() {
        for f in ["", "0", "false", "False"] {
            assert!(!string_to_bool(f), "{f:?}");
        }
        for t in ["1", "true", "yes", "FALSE", "anything"] {
            assert!(string_to_bool(t), "{t:?}");
        }
    }

    #[test]
    fn test_unsupported_key_set_and_get() {
        let mut cache = Params::with_env(Surface::Cache, no_env());
        assert_eq!(
            cache.set("server", "http://x").unwrap_err().kind(),
            ErrorKind::UnsupportedParameter
        );
        assert_eq!(cache.get("server").unwrap_err().kind(), ErrorKind::UnsupportedParameter);
        assert_eq!(cache.get("no-such-key").unwrap_err().kind(), ErrorKind::UnsupportedParameter);

        let mut gavc = Params::with_env(Surface::Gavc, no_env());
        assert!(gavc.set("filelist", "a:b").is_err());
        assert!(gavc.get("filelist").is_err());

        let mut upload = Params::with_env(Surface::Upload, no_env());
        assert!(upload.set("download", "1").is_err());
        upload.set("filelist", "bin:/tmp/x").unwrap();
        assert_eq!(upload.get("filelist").unwrap().as_deref(), Some("bin:/tmp/x"));
    }

    #[test]
    fn test_env_fallback_and_override() {
        let mut p = Params::with_env(Surface::Gavc, |name| match name {
            "GAVC_SERVER_URL" => Some("http://env".to_string()),
            "GAVC_MAX_ATTEMPTS" => Some("7".to_string()),
            _ => None,
        });
        assert_eq!(p.get("server").unwrap().as_deref(), Some("http://env"));
        p.set("server", "http://explicit").unwrap();
        assert_eq!(p.get("server").unwrap().as_deref(), Some("http://explicit"));
        assert_eq!(p.get("token").unwrap(), None);

        let cfg = GavcConfig::from_params(&p).unwrap();
        assert_eq!(cfg.retry.max_attempts, 7);
        assert_eq!(cfg.retry.retry_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_config_defaults() {
        let p = Params::with_env(Surface::Gavc, no_env());
        let cfg = GavcConfig::from_params(&p).unwrap();
        assert!(!cfg.download && !cfg.delete && !cfg.force_offline && !cfg.disable_cache);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert!(cfg.delete_versions.is_none());
        assert!(cfg.output.is_none());
    }

    #[test]
    fn test_config_rejects_bad_numbers() {
        let mut p = Params::with_env(Surface::Gavc, no_env());
        p.set("max-attempts", "three").unwrap();
        assert_eq!(GavcConfig::from_params(&p).unwrap_err().kind(), ErrorKind::InvalidParameter);
        p.set("max-attempts", "0").unwrap();
        assert_eq!(GavcConfig::from_params(&p).unwrap_err().kind(), ErrorKind::InvalidParameter);
        p.set("max-attempts", "2").unwrap();
        p.set("retry-timeout", "-1").unwrap();
        assert_eq!(GavcConfig::from_params(&p).unwrap_err().kind(), ErrorKind::InvalidParameter);
        p.set("retry-timeout", "0").unwrap();
        p.set("delete-versions", "9,1").unwrap();
        assert_eq!(GavcConfig::from_params(&p).unwrap_err().kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_disable_cache_yields_disabled_handle() {
        let mut p = Params::with_env(Surface::Gavc, no_env());
        p.set("disable-cache", "1").unwrap();
        p.set("cache-path", "/nonexistent").unwrap();
        let cfg = GavcConfig::from_params(&p).unwrap();
        assert!(cfg.cache().unwrap().is_disabled());
    }
}
