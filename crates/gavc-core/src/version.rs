//! Version ordering: numeric-segment-aware comparison, plus inclusive ranges.
//!
//! `1.9 < 1.10 < 2.0`. Versions are split into runs of digits and runs of other
//! alphanumerics; any other character is a separator. Numeric runs compare by
//! value, text runs lexicographically, and a missing trailing run counts as `0`.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{GavcError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Num(&'a str),
    Text(&'a str),
}

impl Segment<'_> {
    fn raw(&self) -> &str {
        match self {
            Segment::Num(s) | Segment::Text(s) => s,
        }
    }
}

fn segments(version: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    // (start index, numeric run?)
    let mut run: Option<(usize, bool)> = None;
    for (i, c) in version.char_indices() {
        let class = if c.is_ascii_digit() {
            Some(true)
        } else if c.is_alphanumeric() {
            Some(false)
        } else {
            None
        };
        if let Some((start, numeric)) = run {
            if class == Some(numeric) {
                continue;
            }
            out.push(make_segment(&version[start..i], numeric));
        }
        run = class.map(|numeric| (i, numeric));
    }
    if let Some((start, numeric)) = run {
        out.push(make_segment(&version[start..], numeric));
    }
    out
}

fn make_segment(s: &str, numeric: bool) -> Segment<'_> {
    if numeric {
        Segment::Num(s)
    } else {
        Segment::Text(s)
    }
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_segment(a: Segment<'_>, b: Segment<'_>) -> Ordering {
    match (a, b) {
        (Segment::Num(x), Segment::Num(y)) => compare_numeric(x, y),
        _ => a.raw().cmp(b.raw()),
    }
}

/// Total order over version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let sa = segments(a);
    let sb = segments(b);
    let pad = Segment::Num("0");
    for i in 0..sa.len().max(sb.len()) {
        let x = sa.get(i).copied().unwrap_or(pad);
        let y = sb.get(i).copied().unwrap_or(pad);
        match compare_segment(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    // "1.0" and "1" are equal segment-wise; keep the order total.
    a.cmp(b)
}

/// Sort ascending by the version comparator and drop duplicates.
pub fn sort_versions(versions: &mut Vec<String>) {
    versions.sort_by(|a, b| compare_versions(a, b));
    versions.dedup();
}

/// Inclusive version range used by `delete-versions`: `low,high`.
///
/// Either bound may be left empty for an open end; surrounding `[` `]` are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub low: Option<String>,
    pub high: Option<String>,
}

impl VersionRange {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || GavcError::InvalidParameter {
            param: "delete-versions".to_string(),
            value: text.to_string(),
        };
        let inner = text.trim();
        let inner = inner
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(inner);
        let (low, high) = inner.split_once(',').ok_or_else(invalid)?;
        if high.contains(',') {
            return Err(invalid());
        }
        let bound = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        let range = VersionRange {
            low: bound(low),
            high: bound(high),
        };
        if let (Some(l), Some(h)) = (&range.low, &range.high) {
            if compare_versions(l, h) == Ordering::Greater {
                return Err(invalid());
            }
        }
        Ok(range)
    }

    pub fn contains(&self, version: &str) -> bool {
        let above_low = self
            .low
            .as_deref()
            .map_or(true, |l| compare_versions(version, l) != Ordering::Less);
        let below_high = self
            .high
            .as_deref()
            .map_or(true, |h| compare_versions(version, h) != Ordering::Greater);
        above_low && below_high
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{}]",
            self.low.as_deref().unwrap_or(""),
            self.high.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_segments() {
        assert_eq!(compare_versions("1.9", "1.10"), Ordering::Less);
        assert_eq!(compare_versions("1.10", "2.0"), Ordering::Less);
        assert_eq!(compare_versions("1.9", "2.0"), Ordering::Less);
        assert_eq!(compare_versions("10.0", "9.99"), Ordering::Greater);
        assert_eq!(compare_versions("1.002", "1.2"), Ordering::Less);
    }

    #[test]
    fn test_zero_padding() {
        assert_eq!(compare_versions("1.0.1", "1.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0.1"), Ordering::Less);
        // Equal segment-wise, ordered by raw text so the order stays total.
        assert_eq!(compare_versions("1", "1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn test_text_segments() {
        assert_eq!(compare_versions("1.0-alpha", "1.0-beta"), Ordering::Less);
        assert_eq!(compare_versions("1.0-rc2", "1.0-rc10"), Ordering::Less);
        assert_eq!(compare_versions("build-7", "build-12"), Ordering::Less);
    }

    #[test]
    fn test_huge_numbers_do_not_overflow() {
        assert_eq!(
            compare_versions("1.123456789012345678901234567890", "1.99"),
            Ordering::Greater
        );
    }

    #[test]
    fn test_sort_versions_dedups() {
        let mut v = vec!["3".to_string(), "1".into(), "3".into(), "2".into()];
        sort_versions(&mut v);
        assert_eq!(v, ["1", "2", "3"]);
    }

    #[test]
    fn test_range_parse_and_contains() {
        let r = VersionRange::parse("1.2,1.10").unwrap();
        assert!(r.contains("1.2"));
        assert!(r.contains("1.9"));
        assert!(r.contains("1.10"));
        assert!(!r.contains("1.1"));
        assert!(!r.contains("1.11"));

        let open = VersionRange::parse("[2.0,]").unwrap();
        assert_eq!(open.high, None);
        assert!(open.contains("15.0"));
        assert!(!open.contains("1.99"));
        assert_eq!(open.to_string(), "[2.0,]");
    }

    #[test]
    fn test_range_rejects_garbage() {
        assert!(VersionRange::parse("1.0").is_err());
        assert!(VersionRange::parse("1,2,3").is_err());
        assert!(VersionRange::parse("2.0,1.0").is_err());
    }
}
