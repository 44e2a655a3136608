//! Version schemes and range selection.
//!
//! Each scheme decides what counts as a range in its own grammar. Anything
//! that is not a range (including `=1.2`) is an exact version and never goes
//! through range selection.

use crate::error::{ProviderError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// How a provider orders and matches version strings.
pub trait VersionScheme: Send + Sync + fmt::Debug {
    /// Scheme name, for logs.
    fn name(&self) -> &'static str;

    /// Total order over version strings.
    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// Check whether `version` satisfies a range expression.
    ///
    /// Returns `Err` with a message when the range cannot be parsed.
    fn satisfies(&self, version: &str, range: &str) -> std::result::Result<bool, String>;

    /// Check whether two versions are equal in this scheme.
    fn same(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    /// Check whether a should-version is a range expression.
    ///
    /// Only comparators (`>=`, `<=`, `>`, `<`, `!=`) at the start or after
    /// a comma or space count, so `2.0~rc1-1` and `1:2.3+dfsg-1` stay exact.
    fn is_range(&self, version: &str) -> bool {
        has_comparator(version)
    }
}

/// Check for a comparator opening the string or one of its comma/space
/// separated parts.
pub fn has_comparator(version: &str) -> bool {
    version
        .split(|c: char| c == ',' || c.is_whitespace())
        .any(|part| part.starts_with(['<', '>']) || part.starts_with("!="))
}

/// Strip an exact-match prefix (`=1.2` → `1.2`).
pub fn exact(version: &str) -> &str {
    version.trim().trim_start_matches('=').trim()
}

/// Select the greatest candidate satisfying `range`.
pub fn select_best(
    scheme: &dyn VersionScheme,
    resource: &str,
    range: &str,
    candidates: &[String],
) -> Result<String> {
    let mut best: Option<&String> = None;
    for candidate in candidates {
        let ok = scheme
            .satisfies(candidate, range)
            .map_err(|message| ProviderError::InvalidValue {
                attribute: "ensure".to_string(),
                message,
            })?;
        if ok && best.is_none_or(|b| scheme.compare(candidate, b) == Ordering::Greater) {
            best = Some(candidate);
        }
    }

    match best {
        Some(version) => {
            log::debug!(
                "{}: range {} selected {} ({} scheme)",
                resource,
                range,
                version,
                scheme.name()
            );
            Ok(version.clone())
        }
        None => Err(ProviderError::VersionRangeUnsatisfiable {
            resource: resource.to_string(),
            range: range.to_string(),
        }),
    }
}

/// Semantic versions, leniently parsed.
///
/// Missing minor/patch components are padded with zero and a leading `v` is
/// ignored, so `1.0` compares as `1.0.0`. Ranges use `semver::VersionReq`
/// syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct SemverScheme;

impl SemverScheme {
    fn parse(version: &str) -> Option<semver::Version> {
        let version = exact(version).trim_start_matches('v');
        let split = version.find(['-', '+']).unwrap_or(version.len());
        let (core, rest) = version.split_at(split);

        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
            return None;
        }
        let mut padded = parts.join(".");
        for _ in parts.len()..3 {
            padded.push_str(".0");
        }
        semver::Version::parse(&format!("{padded}{rest}")).ok()
    }
}

impl VersionScheme for SemverScheme {
    fn name(&self) -> &'static str {
        "semver"
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        match (Self::parse(a), Self::parse(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => SegmentScheme.compare(a, b),
        }
    }

    fn satisfies(&self, version: &str, range: &str) -> std::result::Result<bool, String> {
        let req = semver::VersionReq::parse(range.trim())
            .map_err(|e| format!("invalid version range '{range}': {e}"))?;
        Ok(Self::parse(version).is_some_and(|v| req.matches(&v)))
    }

    fn is_range(&self, version: &str) -> bool {
        let version = version.trim();
        has_comparator(version) || version.starts_with(['^', '~']) || version.contains([',', '*'])
    }
}

/// Python package versions (PEP 440).
///
/// Ranges are specifier sets such as `~=1.4`, `>=1.0,!=1.3` or `==2.*`.
/// Post and dev releases order the way pip orders them, and pre-releases
/// only satisfy a range that mentions one.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pep440Scheme;

impl Pep440Scheme {
    fn parse(version: &str) -> Option<pep440_rs::Version> {
        pep440_rs::Version::from_str(exact(version)).ok()
    }
}

impl VersionScheme for Pep440Scheme {
    fn name(&self) -> &'static str {
        "pep440"
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        match (Self::parse(a), Self::parse(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => SegmentScheme.compare(a, b),
        }
    }

    fn satisfies(&self, version: &str, range: &str) -> std::result::Result<bool, String> {
        let specifiers = pep440_rs::VersionSpecifiers::from_str(range.trim())
            .map_err(|e| format!("invalid version range '{range}': {e}"))?;
        let Some(version) = Self::parse(version) else {
            return Ok(false);
        };
        // pre-releases only match when a specifier names one
        if version.any_prerelease()
            && !specifiers.iter().any(|spec| spec.version().any_prerelease())
        {
            return Ok(false);
        }
        Ok(specifiers.contains(&version))
    }

    fn is_range(&self, version: &str) -> bool {
        let version = version.trim();
        has_comparator(version)
            || version.starts_with("~=")
            || version.contains(',')
            || (version.starts_with("==") && version.ends_with(".*"))
    }
}

/// Segment-wise comparison for distribution package versions.
///
/// Handles `epoch:version-release`. Versions are split into runs of digits
/// and letters; digit runs compare numerically and beat letter runs, and
/// `~` sorts before everything (pre-releases). Ranges are
/// whitespace/comma separated comparators such as `>= 1.2, < 2.0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SegmentScheme;

impl SegmentScheme {
    fn split_evr(version: &str) -> (u64, &str, Option<&str>) {
        let version = exact(version);
        let (epoch, rest) = match version.split_once(':') {
            Some((e, rest)) if e.chars().all(|c| c.is_ascii_digit()) => {
                (e.parse().unwrap_or(0), rest)
            }
            _ => (0, version),
        };
        match rest.rsplit_once('-') {
            Some((v, r)) => (epoch, v, Some(r)),
            None => (epoch, rest, None),
        }
    }

    fn compare_segments(a: &str, b: &str) -> Ordering {
        let mut a = a;
        let mut b = b;
        loop {
            a = a.trim_start_matches(|c: char| !c.is_ascii_alphanumeric() && c != '~');
            b = b.trim_start_matches(|c: char| !c.is_ascii_alphanumeric() && c != '~');

            match (a.strip_prefix('~'), b.strip_prefix('~')) {
                (Some(ra), Some(rb)) => {
                    a = ra;
                    b = rb;
                    continue;
                }
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => {}
            }

            match (a.is_empty(), b.is_empty()) {
                (true, true) => return Ordering::Equal,
                (true, false) => return Ordering::Less,
                (false, true) => return Ordering::Greater,
                (false, false) => {}
            }

            let (seg_a, rest_a, num_a) = take_segment(a);
            let (seg_b, rest_b, num_b) = take_segment(b);

            let ord = match (num_a, num_b) {
                (true, true) => {
                    let sa = seg_a.trim_start_matches('0');
                    let sb = seg_b.trim_start_matches('0');
                    sa.len().cmp(&sb.len()).then_with(|| sa.cmp(sb))
                }
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => seg_a.cmp(seg_b),
            };
            if ord != Ordering::Equal {
                return ord;
            }
            a = rest_a;
            b = rest_b;
        }
    }

    fn comparators(range: &str) -> std::result::Result<Vec<(&'static str, String)>, String> {
        const OPS: [&str; 7] = [">=", "<=", "!=", "==", ">", "<", "="];
        let mut out = Vec::new();
        let mut rest = range.trim();

        loop {
            rest = rest.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
            if rest.is_empty() {
                break;
            }
            let (op, after) = OPS
                .iter()
                .find_map(|op| rest.strip_prefix(op).map(|after| (*op, after)))
                .unwrap_or(("=", rest));
            let after = after.trim_start();
            let end = after
                .find(|c: char| c == ',' || c.is_whitespace() || matches!(c, '<' | '>' | '=' | '!'))
                .unwrap_or(after.len());
            if end == 0 {
                return Err(format!("invalid version range '{range}': missing version after {op}"));
            }
            out.push((op, after[..end].to_string()));
            rest = &after[end..];
        }

        if out.is_empty() {
            return Err(format!("invalid version range '{range}': empty"));
        }
        Ok(out)
    }
}

fn take_segment(s: &str) -> (&str, &str, bool) {
    let numeric = s.starts_with(|c: char| c.is_ascii_digit());
    let end = s
        .find(|c: char| {
            if numeric {
                !c.is_ascii_digit()
            } else {
                !c.is_ascii_alphabetic()
            }
        })
        .unwrap_or(s.len());
    (&s[..end], &s[end..], numeric)
}

impl VersionScheme for SegmentScheme {
    fn name(&self) -> &'static str {
        "segment"
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        let (ea, va, ra) = Self::split_evr(a);
        let (eb, vb, rb) = Self::split_evr(b);
        ea.cmp(&eb)
            .then_with(|| Self::compare_segments(va, vb))
            .then_with(|| match (ra, rb) {
                (Some(ra), Some(rb)) => Self::compare_segments(ra, rb),
                _ => Ordering::Equal,
            })
    }

    fn satisfies(&self, version: &str, range: &str) -> std::result::Result<bool, String> {
        for (op, bound) in Self::comparators(range)? {
            let ord = self.compare(version, &bound);
            let ok = match op {
                ">=" => ord != Ordering::Less,
                "<=" => ord != Ordering::Greater,
                ">" => ord == Ordering::Greater,
                "<" => ord == Ordering::Less,
                "!=" => ord != Ordering::Equal,
                _ => ord == Ordering::Equal,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<String> {
        ["1.0", "1.2.3", "1.2.5", "2.0"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_range() {
        assert!(SemverScheme.is_range(">=1.2.0,<2.0"));
        assert!(SemverScheme.is_range("~1.2"));
        assert!(!SemverScheme.is_range("1.2.3"));
        assert!(!SemverScheme.is_range("=1.2.3"));
        assert_eq!(exact("=1.2.3"), "1.2.3");
    }

    #[test]
    fn test_debian_versions_are_exact() {
        let s = SegmentScheme;
        assert!(!s.is_range("2.0~rc1-1"));
        assert!(!s.is_range("1:2.3+dfsg-1"));
        assert!(!s.is_range("=2.0~rc1-1"));
        assert!(s.is_range(">= 1.2 < 2.0"));
        assert!(s.is_range("1.0, !=1.3"));
        assert!(s.is_range("<2"));
    }

    #[test]
    fn test_pep440_ranges() {
        let s = Pep440Scheme;
        assert!(s.is_range("~=1.4"));
        assert!(s.is_range(">=1.0,!=1.3"));
        assert!(s.is_range("==2.*"));
        assert!(!s.is_range("==2.1"));
        assert!(!s.is_range("1.0.post1"));

        assert_eq!(s.satisfies("1.4.2", "~=1.4"), Ok(true));
        assert_eq!(s.satisfies("2.0", "~=1.4"), Ok(false));
        assert_eq!(s.satisfies("1.3", ">=1.0,!=1.3"), Ok(false));
        assert_eq!(s.satisfies("1.0.post1", ">=1.0"), Ok(true));
        assert_eq!(s.satisfies("1.5.0rc1", ">=1.4"), Ok(false));
        assert_eq!(s.satisfies("1.5.0rc1", ">=1.5.0rc1"), Ok(true));
        assert!(s.satisfies("1.0", ">=banana").is_err());
    }

    #[test]
    fn test_pep440_selection() {
        let s = Pep440Scheme;
        let candidates: Vec<String> = ["1.0", "1.0.post1", "1.3", "1.4.2", "1.5.0rc1", "2.0"]
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(select_best(&s, "pkg", "~=1.4", &candidates).unwrap(), "1.4.2");
        assert_eq!(select_best(&s, "pkg", ">=1.0,!=1.3,<1.4", &candidates).unwrap(), "1.0.post1");
        assert_eq!(s.compare("1.0.post1", "1.0"), Ordering::Greater);
        assert_eq!(s.compare("1.5.0rc1", "1.5.0"), Ordering::Less);
    }

    #[test]
    fn test_select_best_semver() {
        let best = select_best(&SemverScheme, "pkg", ">=1.2.0,<2.0", &candidates()).unwrap();
        assert_eq!(best, "1.2.5");
    }

    #[test]
    fn test_select_best_unsatisfiable() {
        let err = select_best(&SemverScheme, "pkg", ">=3.0", &candidates()).unwrap_err();
        assert!(matches!(err, ProviderError::VersionRangeUnsatisfiable { .. }));
    }

    #[test]
    fn test_select_best_segment() {
        let best = select_best(&SegmentScheme, "pkg", ">= 1.2.0 < 2.0", &candidates()).unwrap();
        assert_eq!(best, "1.2.5");
    }

    #[test]
    fn test_malformed_range_is_invalid() {
        let err = select_best(&SemverScheme, "pkg", ">=banana", &candidates()).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidValue { .. }));
    }

    #[test]
    fn test_semver_lenient_compare() {
        assert_eq!(SemverScheme.compare("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(SemverScheme.compare("v1.10", "1.9"), Ordering::Greater);
        assert_eq!(SemverScheme.compare("2.0.0-rc1", "2.0.0"), Ordering::Less);
    }

    #[test]
    fn test_segment_compare() {
        let s = SegmentScheme;
        assert_eq!(s.compare("1.10", "1.9"), Ordering::Greater);
        assert_eq!(s.compare("1:1.0", "2.0"), Ordering::Greater);
        assert_eq!(s.compare("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(s.compare("1.0-1.el7", "1.0-2.el7"), Ordering::Less);
        assert_eq!(s.compare("1.0", "1.0-5"), Ordering::Equal);
        assert_eq!(s.compare("1.0a", "1.0"), Ordering::Greater);
        assert_eq!(s.compare("007", "7"), Ordering::Equal);
    }

    #[test]
    fn test_segment_satisfies() {
        let s = SegmentScheme;
        assert_eq!(s.satisfies("1.5", "> 1.0, < 2.0"), Ok(true));
        assert_eq!(s.satisfies("2.0", "> 1.0 < 2.0"), Ok(false));
        assert_eq!(s.satisfies("1.0", "!=1.0"), Ok(false));
        assert!(s.satisfies("1.0", ">=").is_err());
    }
}
