//! HTTP transport against an Artifactory-style server.
//!
//! One `ureq::Agent` per transport (connection reuse). Every method makes a
//! single attempt; retries belong to `RetryingTransport`.
//!
//! - list:   `GET {server}/api/search/gavc?g=&a=[&c=][&repos=]`
//! - fetch:  same search with `v=`, then `GET` of the hit's `downloadUri`
//! - delete: `DELETE {server}/{repo}/{group/path}/{artifact}/{version}/`, or the
//!   classifier object's `downloadUri`
//! - put:    `PUT {server}/{repo}/{group/path}/{artifact}/{version}/{name}`

use std::io::Read;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::coordinate::Coordinate;
use crate::integrity::sha256_hex;
use crate::resolver::ResolvedVersion;
use crate::transport::{FetchedObject, RemoteVersion, Transport, TransportError};

const REQUEST_TIMEOUT_MS: u64 = 60_000;
const SEARCH_PATH: &str = "/api/search/gavc";
const POM_SUFFIX: &str = ".pom";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    uri: String,
    download_uri: Option<String>,
    #[serde(default)]
    checksums: Checksums,
    created: Option<String>,
    last_modified: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Checksums {
    sha256: Option<String>,
}

impl SearchHit {
    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.last_modified
            .as_deref()
            .or(self.created.as_deref())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    fn file_name(&self) -> &str {
        self.uri.rsplit('/').next().unwrap_or("")
    }
}

/// Blocking HTTP client for one server/repository.
pub struct HttpTransport {
    agent: ureq::Agent,
    server: String,
    repository: Option<String>,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(server: &str, repository: Option<&str>, token: Option<&str>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build();
        HttpTransport {
            agent,
            server: server.trim_end_matches('/').to_string(),
            repository: repository.filter(|r| !r.is_empty()).map(str::to_string),
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
        }
    }

    fn server(&self) -> Result<&str, TransportError> {
        if self.server.is_empty() {
            return Err(TransportError::NotConfigured("server"));
        }
        Ok(&self.server)
    }

    fn repository(&self) -> Result<&str, TransportError> {
        self.repository
            .as_deref()
            .ok_or(TransportError::NotConfigured("repository"))
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let req = self.agent.request(method, url);
        match &self.token {
            Some(token) => req.set("Authorization", &format!("Bearer {}", token)),
            None => req,
        }
    }

    fn search(&self, coordinate: &Coordinate, version: Option<&str>) -> Result<Vec<SearchHit>, TransportError> {
        let url = format!("{}{}", self.server()?, SEARCH_PATH);
        let mut req = self
            .request("GET", &url)
            .set("X-Result-Detail", "info")
            .query("g", &coordinate.group)
            .query("a", &coordinate.artifact);
        if let Some(v) = version {
            req = req.query("v", v);
        }
        if let Some(c) = &coordinate.classifier {
            req = req.query("c", c);
        }
        if let Some(repo) = &self.repository {
            req = req.query("repos", repo);
        }
        tracing::debug!(target: "gavc::http", url = %url, query = %coordinate, "gavc search");
        let body = read_body(req.call().map_err(|e| map_error(&url, e))?)?;
        let parsed: SearchResponse = serde_json::from_slice(&body)
            .map_err(|e| TransportError::Protocol(format!("search response: {e}")))?;
        Ok(parsed.results)
    }

    fn locate(&self, version: &ResolvedVersion) -> Result<SearchHit, TransportError> {
        let coordinate = version.coordinate();
        let hits = self.search(coordinate, Some(version.version()))?;
        pick_object(&hits, coordinate, version.version())?
            .cloned()
            .ok_or_else(|| TransportError::Status {
                code: 404,
                url: format!("{}{}?{}", self.server, SEARCH_PATH, coordinate),
            })
    }

    fn version_url(&self, coordinate: &Coordinate, version: &str) -> Result<String, TransportError> {
        Ok(format!(
            "{}/{}/{}/{}/{}",
            self.server()?,
            self.repository()?,
            coordinate.group_path(),
            coordinate.artifact,
            version
        ))
    }
}

impl Transport for HttpTransport {
    fn list(&self, coordinate: &Coordinate) -> Result<Vec<RemoteVersion>, TransportError> {
        let hits = self.search(coordinate, None)?;
        Ok(hits
            .iter()
            .filter_map(|hit| {
                let version = version_from_uri(&hit.uri, coordinate)?;
                Some(RemoteVersion {
                    version,
                    published_at: hit.published_at(),
                    locator: None,
                })
            })
            .collect())
    }

    fn fetch(&self, version: &ResolvedVersion) -> Result<FetchedObject, TransportError> {
        let hit = self.locate(version)?;
        let url = hit
            .download_uri
            .clone()
            .ok_or_else(|| TransportError::Protocol(format!("no downloadUri for {}", hit.uri)))?;
        tracing::debug!(target: "gavc::http", url = %url, "download");
        let resp = self.request("GET", &url).call().map_err(|e| map_error(&url, e))?;
        let content = read_body(resp)?;
        Ok(FetchedObject {
            file_name: hit.file_name().to_string(),
            content,
            sha256: hit.checksums.sha256.clone(),
        })
    }

    fn delete(&self, version: &ResolvedVersion) -> Result<(), TransportError> {
        let coordinate = version.coordinate();
        let url = match &coordinate.classifier {
            None => format!("{}/", self.version_url(coordinate, version.version())?),
            Some(_) => match version.locator() {
                Some(locator) => locator.to_string(),
                None => self
                    .locate(version)?
                    .download_uri
                    .ok_or_else(|| TransportError::Protocol("no downloadUri to delete".into()))?,
            },
        };
        tracing::debug!(target: "gavc::http", url = %url, "delete");
        self.request("DELETE", &url)
            .call()
            .map(|_| ())
            .map_err(|e| map_error(&url, e))
    }

    fn put(&self, target: &Coordinate, remote_name: &str, content: &[u8]) -> Result<(), TransportError> {
        let version = target
            .exact_version()
            .ok_or_else(|| TransportError::Protocol(format!("upload target {target} has no exact version")))?;
        let url = format!("{}/{}", self.version_url(target, version)?, remote_name);
        tracing::debug!(target: "gavc::http", url = %url, bytes = content.len(), "upload");
        self.request("PUT", &url)
            .set("X-Checksum-Sha256", &sha256_hex(content))
            .send_bytes(content)
            .map(|_| ())
            .map_err(|e| map_error(&url, e))
    }
}

fn read_body(resp: ureq::Response) -> Result<Vec<u8>, TransportError> {
    let hint = resp
        .header("Content-Length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut buf = Vec::with_capacity(hint);
    resp.into_reader()
        .read_to_end(&mut buf)
        .map_err(|e| TransportError::Connection(format!("reading body: {e}")))?;
    Ok(buf)
}

fn map_error(url: &str, err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(code, _) => TransportError::Status {
            code,
            url: url.to_string(),
        },
        ureq::Error::Transport(t) => {
            let detail = format!("{url}: {t}");
            match t.kind() {
                ureq::ErrorKind::InvalidUrl
                | ureq::ErrorKind::UnknownScheme
                | ureq::ErrorKind::BadStatus
                | ureq::ErrorKind::BadHeader
                | ureq::ErrorKind::TooManyRedirects => TransportError::Protocol(detail),
                ureq::ErrorKind::Io if detail.contains("timed out") => TransportError::Timeout(detail),
                _ => TransportError::Connection(detail),
            }
        }
    }
}

/// Version folder of a search hit: the path segment right after
/// `/{group/path}/{artifact}/`.
fn version_from_uri(uri: &str, coordinate: &Coordinate) -> Option<String> {
    let marker = format!("/{}/{}/", coordinate.group_path(), coordinate.artifact);
    let start = uri.find(&marker)? + marker.len();
    let rest = &uri[start..];
    let (version, file) = rest.split_once('/')?;
    if version.is_empty() || file.is_empty() {
        return None;
    }
    Some(version.to_string())
}

/// The object a download refers to, never the POM. With a classifier it is
/// `{artifact}-{version}-{classifier}.*`. Without one it is the unclassified
/// `{artifact}-{version}.*`, or the only object of the version; several
/// classified objects and no unclassified one is ambiguous.
fn pick_object<'a>(
    hits: &'a [SearchHit],
    coordinate: &Coordinate,
    version: &str,
) -> Result<Option<&'a SearchHit>, TransportError> {
    let base = format!("{}-{}", coordinate.artifact, version);
    let objects: Vec<&SearchHit> = hits
        .iter()
        .filter(|h| version_from_uri(&h.uri, coordinate).as_deref() == Some(version))
        .filter(|h| !h.file_name().ends_with(POM_SUFFIX))
        .collect();
    let named = |stem: &str| {
        objects
            .iter()
            .copied()
            .find(|h| {
                let name = h.file_name();
                name == stem || name.strip_prefix(stem).is_some_and(|rest| rest.starts_with('.'))
            })
    };
    if let Some(c) = &coordinate.classifier {
        return Ok(named(&format!("{base}-{c}")));
    }
    if let Some(plain) = named(&base) {
        return Ok(Some(plain));
    }
    match objects.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        many => {
            let names: Vec<&str> = many.iter().map(|h| h.file_name()).collect();
            Err(TransportError::Ambiguous(format!(
                "{coordinate} matches {} objects ({}); add a classifier",
                many.len(),
                names.join(", ")
            )))
        }
    }
}
