//! Multi-file upload of one artifact version.
//!
//! The file list is `name:path[,name:path...]`. `name` is a classifier with an
//! optional extension (`linux-x64.tar.gz`); without one, the local file's
//! extension is used. Each file is published as
//! `{artifact}-{version}-{name}`, followed by a generated POM.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::GavcConfig;
use crate::coordinate::{check_segment, Coordinate};
use crate::error::{GavcError, Result};
use crate::transport::{RetryingTransport, Transport, UploadObject};

const PAIR_DELIMITER: char = ',';
const NAME_DELIMITER: char = ':';

/// One `name:path` pair of the file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    pub name: String,
    pub path: PathBuf,
}

impl UploadEntry {
    /// Remote object name under the target version.
    pub fn remote_name(&self, artifact: &str, version: &str) -> String {
        let (classifier, extension) = match self.name.split_once('.') {
            Some((c, e)) => (c, Some(e.to_string())),
            None => (
                self.name.as_str(),
                self.path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned()),
            ),
        };
        match extension {
            Some(ext) if !ext.is_empty() => format!("{artifact}-{version}-{classifier}.{ext}"),
            _ => format!("{artifact}-{version}-{classifier}"),
        }
    }
}

/// Ordered, duplicate-free list of files to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSpec {
    entries: Vec<UploadEntry>,
}

impl UploadSpec {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: String| GavcError::InvalidUploadSpec { reason };
        if text.trim().is_empty() {
            return Err(invalid("nothing to upload".to_string()));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for pair in text.split(PAIR_DELIMITER) {
            let pair = pair.trim();
            let (name, path) = pair
                .split_once(NAME_DELIMITER)
                .ok_or_else(|| invalid(format!("'{pair}' is not name:path")))?;
            let (name, path) = (name.trim(), path.trim());
            if path.is_empty() {
                return Err(invalid(format!("'{pair}' has no path")));
            }
            check_segment(name).map_err(|r| invalid(format!("name '{name}' {r}")))?;
            if name.split_once('.').map_or(false, |(c, _)| c.is_empty()) {
                return Err(invalid(format!("name '{name}' has no classifier")));
            }
            if !seen.insert(name.to_string()) {
                return Err(invalid(format!("duplicate name '{name}'")));
            }
            entries.push(UploadEntry {
                name: name.to_string(),
                path: PathBuf::from(path),
            });
        }
        Ok(UploadSpec { entries })
    }

    pub fn entries(&self) -> &[UploadEntry] {
        &self.entries
    }

    /// Read every file; a missing or unreadable file is an invalid filelist.
    pub fn load(&self, artifact: &str, version: &str) -> Result<Vec<UploadObject>> {
        self.entries
            .iter()
            .map(|e| {
                let content = read_local(&e.path)?;
                Ok(UploadObject {
                    remote_name: e.remote_name(artifact, version),
                    content,
                })
            })
            .collect()
    }
}

fn read_local(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(GavcError::InvalidUploadSpec {
            reason: format!("{} does not exist or is not a file", path.display()),
        });
    }
    fs::read(path).map_err(|e| GavcError::InvalidUploadSpec {
        reason: format!("{}: {e}", path.display()),
    })
}

/// Minimal Maven POM describing `group:artifact:version`.
pub fn generate_pom(group: &str, artifact: &str, version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://maven.apache.org/POM/4.0.0 http://maven.apache.org/xsd/maven-4.0.0.xsd">
  <modelVersion>4.0.0</modelVersion>
  <groupId>{}</groupId>
  <artifactId>{}</artifactId>
  <version>{}</version>
  <packaging>pom</packaging>
</project>
"#,
        xml_escape(group),
        xml_escape(artifact),
        xml_escape(version)
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Remote names in publish order, POM last.
    pub uploaded: Vec<String>,
}

pub struct UploadEngine<'a> {
    config: &'a GavcConfig,
    transport: &'a dyn Transport,
}

impl<'a> UploadEngine<'a> {
    pub fn new(config: &'a GavcConfig, transport: &'a dyn Transport) -> Self {
        UploadEngine { config, transport }
    }

    pub fn perform(&self, target_text: &str) -> Result<UploadOutcome> {
        let target = Coordinate::parse(target_text)?;
        let version = target.exact_version().ok_or_else(|| {
            GavcError::invalid_request(format!("upload target '{target}' needs an exact version"))
        })?;
        if target.classifier.is_some() {
            return Err(GavcError::invalid_request(
                "classifiers come from the file list, not the upload target",
            ));
        }
        let filelist = self.config.filelist.as_deref().ok_or_else(|| GavcError::InvalidUploadSpec {
            reason: "filelist is not set".to_string(),
        })?;
        let spec = UploadSpec::parse(filelist)?;
        let mut objects = spec.load(&target.artifact, version)?;
        objects.push(UploadObject {
            remote_name: format!("{}-{}.pom", target.artifact, version),
            content: generate_pom(&target.group, &target.artifact, version).into_bytes(),
        });

        let rt = RetryingTransport::new(self.transport, self.config.retry, self.config.force_offline);
        rt.put(&target, &objects)?;
        tracing::info!(target: "gavc::upload", coordinate = %target, objects = objects.len(), "upload complete");

        Ok(UploadOutcome {
            uploaded: objects.into_iter().map(|o| o.remote_name).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_keeps_order() {
        let spec = UploadSpec::parse("linux.tgz:/tmp/a.tgz, win:/tmp/b.zip").unwrap();
        let names: Vec<&str> = spec.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["linux.tgz", "win"]);
        assert_eq!(spec.entries()[1].path, PathBuf::from("/tmp/b.zip"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in [
            "",
            "  ",
            "nocolon",
            "name:",
            ":path",
            "a:/x,a:/y",
            "a b:/x",
            ".tgz:/x",
            "ok:/x,,",
        ] {
            let err = UploadSpec::parse(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidUploadSpec, "input {text:?}");
        }
    }

    #[test]
    fn test_remote_names() {
        let explicit = UploadEntry {
            name: "linux-x64.tar.gz".into(),
            path: PathBuf::from("/build/out.bin"),
        };
        assert_eq!(explicit.remote_name("tool", "1.2"), "tool-1.2-linux-x64.tar.gz");

        let from_path = UploadEntry {
            name: "docs".into(),
            path: PathBuf::from("/build/docs.zip"),
        };
        assert_eq!(from_path.remote_name("tool", "1.2"), "tool-1.2-docs.zip");

        let bare = UploadEntry {
            name: "raw".into(),
            path: PathBuf::from("/build/blob"),
        };
        assert_eq!(bare.remote_name("tool", "1.2"), "tool-1.2-raw");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.bin");
        fs::write(&present, b"data").unwrap();
        let text = format!(
            "a:{},b:{}",
            present.display(),
            dir.path().join("absent.bin").display()
        );
        let spec = UploadSpec::parse(&text).unwrap();
        assert_eq!(spec.load("x", "1").unwrap_err().kind(), ErrorKind::InvalidUploadSpec);
    }

    #[test]
    fn test_pom_mentions_coordinate() {
        let pom = generate_pom("org.acme", "tool", "1.0");
        assert!(pom.contains("<groupId>org.acme</groupId>"));
        assert!(pom.contains("<artifactId>tool</artifactId>"));
        assert!(pom.contains("<version>1.0</version>"));
        assert!(generate_pom("a&b", "t", "1").contains("a&amp;b"));
    }
}
