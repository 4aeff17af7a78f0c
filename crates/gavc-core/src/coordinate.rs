//! GAVC coordinate parsing: `group.with.dots:artifact:version[:classifier]`.
//!
//! The version token is `+` (latest), `*` (all) or a literal version. Parsing is
//! pure; every segment is checked so it can be used as a directory name in the
//! cache and as a URL path component on the server.

use std::fmt;
use std::str::FromStr;

use crate::error::{GavcError, Result};

pub const DELIMITER: char = ':';
pub const GROUP_DELIMITER: char = '.';
pub const LATEST_VERSION: &str = "+";
pub const ALL_VERSIONS: &str = "*";

/// Version part of a coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSpec {
    Exact(String),
    Latest,
    All,
}

impl VersionSpec {
    pub fn is_exact(&self) -> bool {
        matches!(self, VersionSpec::Exact(_))
    }

    /// True when the spec can only ever name one version.
    pub fn is_single(&self) -> bool {
        !matches!(self, VersionSpec::All)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Exact(v) => f.write_str(v),
            VersionSpec::Latest => f.write_str(LATEST_VERSION),
            VersionSpec::All => f.write_str(ALL_VERSIONS),
        }
    }
}

/// A parsed GAVC coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: VersionSpec,
    pub classifier: Option<String>,
}

impl Coordinate {
    /// Parse and validate a coordinate string.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: &str| GavcError::InvalidCoordinate {
            input: text.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = text.split(DELIMITER).collect();
        if parts.len() < 3 || parts.len() > 4 {
            return Err(invalid(
                "expected group:artifact:version[:classifier]",
            ));
        }

        let group = parts[0];
        if group.is_empty() {
            return Err(invalid("group is empty"));
        }
        for segment in group.split(GROUP_DELIMITER) {
            check_segment(segment).map_err(|r| invalid(&format!("group segment '{segment}' {r}")))?;
        }

        let artifact = parts[1];
        if artifact.is_empty() {
            return Err(invalid("artifact is empty"));
        }
        check_segment(artifact).map_err(|r| invalid(&format!("artifact {r}")))?;

        let version = parse_version_token(parts[2]).map_err(|r| invalid(r))?;

        let classifier = match parts.get(3) {
            None => None,
            Some(c) if c.is_empty() => return Err(invalid("classifier is empty")),
            Some(c) if c.contains(',') => {
                return Err(invalid("classifier lists are not supported; query one classifier"))
            }
            Some(c) => {
                check_segment(c).map_err(|r| invalid(&format!("classifier {r}")))?;
                Some(c.to_string())
            }
        };

        Ok(Coordinate {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version,
            classifier,
        })
    }

    /// Group as a path: `org.example` -> `org/example`.
    pub fn group_path(&self) -> String {
        self.group.replace(GROUP_DELIMITER, "/")
    }

    /// Same coordinate pinned to a concrete version.
    pub fn with_version(&self, version: &str) -> Coordinate {
        Coordinate {
            version: VersionSpec::Exact(version.to_string()),
            ..self.clone()
        }
    }

    pub fn exact_version(&self) -> Option<&str> {
        match &self.version {
            VersionSpec::Exact(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{c}")?;
        }
        Ok(())
    }
}

impl FromStr for Coordinate {
    type Err = GavcError;

    fn from_str(s: &str) -> Result<Self> {
        Coordinate::parse(s)
    }
}

fn parse_version_token(token: &str) -> std::result::Result<VersionSpec, &'static str> {
    match token {
        "" => Err("version is empty"),
        LATEST_VERSION => Ok(VersionSpec::Latest),
        ALL_VERSIONS => Ok(VersionSpec::All),
        literal => {
            if literal.contains(['+', '*']) {
                return Err("version mixes query operators with a literal");
            }
            if literal.contains(['[', ']', '(', ')', ',']) {
                return Err("version ranges are not supported in coordinates");
            }
            check_segment(literal).map_err(|_| "version contains invalid characters")?;
            Ok(VersionSpec::Exact(literal.to_string()))
        }
    }
}

/// Segments end up as directory names and URL path parts.
pub(crate) fn check_segment(segment: &str) -> std::result::Result<(), &'static str> {
    if segment.is_empty() {
        return Err("is empty");
    }
    if segment.starts_with('.') {
        return Err("must not start with '.'");
    }
    if segment
        .chars()
        .any(|c| c == '/' || c == '\\' || c == DELIMITER || c.is_whitespace() || c.is_control())
    {
        return Err("contains a forbidden character");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_latest() {
        let c = Coordinate::parse("org.example.tools:widget:+").unwrap();
        assert_eq!(c.group, "org.example.tools");
        assert_eq!(c.artifact, "widget");
        assert_eq!(c.version, VersionSpec::Latest);
        assert_eq!(c.classifier, None);
        assert_eq!(c.group_path(), "org/example/tools");
    }

    #[test]
    fn test_parse_exact_with_classifier() {
        let c = Coordinate::parse("g.a:artifact:1.2.3-rc1:linux-x64").unwrap();
        assert_eq!(c.version, VersionSpec::Exact("1.2.3-rc1".into()));
        assert_eq!(c.classifier.as_deref(), Some("linux-x64"));
        assert_eq!(c.exact_version(), Some("1.2.3-rc1"));
    }

    #[test]
    fn test_parse_all() {
        let c = Coordinate::parse("g:a:*").unwrap();
        assert_eq!(c.version, VersionSpec::All);
        assert!(!c.version.is_single());
    }

    #[test]
    fn test_round_trip_canonical() {
        for text in [
            "g.a:artifact:+",
            "g.a:artifact:*",
            "zodiac.aosp.oemsdk.release:aosp:1.10.2",
            "g:a:2.0:debug",
            "com.acme:core:1.0-SNAPSHOT:sources",
        ] {
            let c = Coordinate::parse(text).unwrap();
            assert_eq!(c.to_string(), text);
            assert_eq!(Coordinate::parse(&c.to_string()).unwrap(), c);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        for text in [
            "",
            "g",
            "g:a",
            ":a:1",
            "g::1",
            "g:a:",
            "g:a:1:",
            "g:a:1:c:extra",
            "g..a:b:1",
            "g:a:1.+",
            "g:a:[1,2]",
            "g:a b:1",
            "g:../etc:1",
            "g/x:a:1",
            "g:a:1:linux,win",
        ] {
            let err = Coordinate::parse(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidCoordinate, "input {text:?}");
        }
    }

    #[test]
    fn test_with_version() {
        let c = Coordinate::parse("g:a:+:bin").unwrap();
        let pinned = c.with_version("3.1");
        assert_eq!(pinned.to_string(), "g:a:3.1:bin");
        assert!(pinned.version.is_exact());
    }
}
