//! Embedding surfaces: string parameters in, integer result codes out.
//!
//! `Gavc`, `Cache` and `Upload` are independent; each owns its `Params` and
//! remembers the error of its last call. Nothing here panics or exits.

use std::path::PathBuf;

use crate::cache::ArtifactCache;
use crate::config::{GavcConfig, Param, Params, Surface};
use crate::error::{GavcError, Result, OK};
use crate::gavc::{GavcEngine, GavcOutcome};
use crate::http_client::HttpTransport;
use crate::transport::Transport;
use crate::upload::{UploadEngine, UploadOutcome};

fn code_of<T>(res: &Result<T>) -> i32 {
    match res {
        Ok(_) => OK,
        Err(e) => e.code(),
    }
}

fn http_for(config: &GavcConfig) -> HttpTransport {
    HttpTransport::new(
        config.server.as_deref().unwrap_or(""),
        config.repository.as_deref(),
        config.token.as_deref(),
    )
}

/// Query, download and delete.
pub struct Gavc {
    params: Params,
    transport: Option<Box<dyn Transport>>,
    outcome: Option<GavcOutcome>,
    last_error: Option<GavcError>,
}

impl Default for Gavc {
    fn default() -> Self {
        Gavc::new()
    }
}

impl Gavc {
    pub fn new() -> Self {
        Gavc::from_params(Params::new(Surface::Gavc))
    }

    pub fn with_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Gavc::from_params(Params::with_env(Surface::Gavc, lookup))
    }

    fn from_params(params: Params) -> Self {
        Gavc {
            params,
            transport: None,
            outcome: None,
            last_error: None,
        }
    }

    /// Use `transport` instead of the HTTP client built from `server`/`token`.
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn set_param(&mut self, key: &str, value: &str) -> i32 {
        let res = self.params.set(key, value);
        self.record(res)
    }

    pub fn get_param(&self, key: &str) -> Result<Option<String>> {
        self.params.get(key)
    }

    pub fn perform(&mut self, coordinate_text: &str) -> i32 {
        self.outcome = None;
        let res = self.run(coordinate_text);
        let code = code_of(&res);
        match res {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                self.last_error = None;
            }
            Err(e) => {
                tracing::debug!(target: "gavc::surface", query = coordinate_text, code, error = %e, "gavc failed");
                self.last_error = Some(e);
            }
        }
        code
    }

    fn run(&self, coordinate_text: &str) -> Result<GavcOutcome> {
        let config = GavcConfig::from_params(&self.params)?;
        match &self.transport {
            Some(t) => GavcEngine::new(&config, t.as_ref()).perform(coordinate_text),
            None => {
                let http = http_for(&config);
                GavcEngine::new(&config, &http).perform(coordinate_text)
            }
        }
    }

    /// Versions resolved by the last successful `perform`.
    pub fn versions(&self) -> Vec<String> {
        self.outcome
            .as_ref()
            .map(|o| o.versions.clone())
            .unwrap_or_default()
    }

    pub fn outcome(&self) -> Option<&GavcOutcome> {
        self.outcome.as_ref()
    }

    pub fn last_error(&self) -> Option<&GavcError> {
        self.last_error.as_ref()
    }

    fn record(&mut self, res: Result<()>) -> i32 {
        let code = code_of(&res);
        self.last_error = res.err();
        code
    }
}

/// Cache maintenance.
pub struct Cache {
    params: Params,
    removed: usize,
    last_error: Option<GavcError>,
}

impl Default for Cache {
    fn default() -> Self {
        Cache::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Cache::from_params(Params::new(Surface::Cache))
    }

    pub fn with_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Cache::from_params(Params::with_env(Surface::Cache, lookup))
    }

    fn from_params(params: Params) -> Self {
        Cache {
            params,
            removed: 0,
            last_error: None,
        }
    }

    pub fn set_param(&mut self, key: &str, value: &str) -> i32 {
        let res = self.params.set(key, value);
        let code = code_of(&res);
        self.last_error = res.err();
        code
    }

    pub fn get_param(&self, key: &str) -> Result<Option<String>> {
        self.params.get(key)
    }

    pub fn init(&mut self) -> i32 {
        let res = self.cache().and_then(|c| c.init());
        let code = code_of(&res);
        self.last_error = res.err();
        code
    }

    /// Remove entries older than `max_age_days`; see [`Cache::removed`].
    pub fn clean(&mut self, max_age_days: u32) -> i32 {
        self.removed = 0;
        let res = self.cache().and_then(|c| c.clean(max_age_days));
        let code = code_of(&res);
        match res {
            Ok(n) => {
                self.removed = n;
                self.last_error = None;
            }
            Err(e) => self.last_error = Some(e),
        }
        code
    }

    /// Entries removed by the last `clean`.
    pub fn removed(&self) -> usize {
        self.removed
    }

    pub fn last_error(&self) -> Option<&GavcError> {
        self.last_error.as_ref()
    }

    fn cache(&self) -> Result<ArtifactCache> {
        match self.params.value(Param::CachePath).filter(|p| !p.trim().is_empty()) {
            Some(p) => Ok(ArtifactCache::new(PathBuf::from(p))),
            None => ArtifactCache::default_root()
                .map(ArtifactCache::new)
                .ok_or_else(|| GavcError::cache_unavailable("", "no cache-path and no home directory")),
        }
    }
}

/// Multi-file upload.
pub struct Upload {
    params: Params,
    transport: Option<Box<dyn Transport>>,
    outcome: Option<UploadOutcome>,
    last_error: Option<GavcError>,
}

impl Default for Upload {
    fn default() -> Self {
        Upload::new()
    }
}

impl Upload {
    pub fn new() -> Self {
        Upload::from_params(Params::new(Surface::Upload))
    }

    pub fn with_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Upload::from_params(Params::with_env(Surface::Upload, lookup))
    }

    fn from_params(params: Params) -> Self {
        Upload {
            params,
            transport: None,
            outcome: None,
            last_error: None,
        }
    }

    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn set_param(&mut self, key: &str, value: &str) -> i32 {
        let res = self.params.set(key, value);
        let code = code_of(&res);
        self.last_error = res.err();
        code
    }

    pub fn get_param(&self, key: &str) -> Result<Option<String>> {
        self.params.get(key)
    }

    pub fn perform(&mut self, target_text: &str) -> i32 {
        self.outcome = None;
        let res = self.run(target_text);
        let code = code_of(&res);
        match res {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                self.last_error = None;
            }
            Err(e) => {
                tracing::debug!(target: "gavc::surface", target_coordinate = target_text, code, error = %e, "upload failed");
                self.last_error = Some(e);
            }
        }
        code
    }

    fn run(&self, target_text: &str) -> Result<UploadOutcome> {
        let config = GavcConfig::from_params(&self.params)?;
        match &self.transport {
            Some(t) => UploadEngine::new(&config, t.as_ref()).perform(target_text),
            None => {
                let http = http_for(&config);
                UploadEngine::new(&config, &http).perform(target_text)
            }
        }
    }

    pub fn outcome(&self) -> Option<&UploadOutcome> {
        self.outcome.as_ref()
    }

    pub fn last_error(&self) -> Option<&GavcError> {
        self.last_error.as_ref()
    }
}
