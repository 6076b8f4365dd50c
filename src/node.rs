use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ZiError;

/// A validated, normalized path into the data server's parameter tree.
///
/// Paths are slash-delimited and case-insensitive on the wire; this type
/// stores them lowercase with a single leading slash and no empty
/// segments, e.g. `/dev2006/demods/0/sample`. A segment may be the
/// wildcard `*`, which matches exactly one segment, except in trailing
/// position where it matches the rest of the path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath(String);

impl NodePath {
    /// Parse and normalize a path string.
    pub fn parse(raw: &str) -> Result<Self, ZiError> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(ZiError::InvalidPath(format!("empty path: {raw:?}")));
        }
        let mut normalized = String::with_capacity(trimmed.len() + 1);
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(ZiError::InvalidPath(format!(
                    "empty segment in path: {raw:?}"
                )));
            }
            let valid = segment == "*"
                || segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
            if !valid {
                return Err(ZiError::InvalidPath(format!(
                    "invalid segment {segment:?} in path {raw:?}"
                )));
            }
            normalized.push('/');
            normalized.push_str(&segment.to_ascii_lowercase());
        }
        Ok(NodePath(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First segment of the path, i.e. the device serial for device nodes.
    pub fn device(&self) -> &str {
        self.segments().next().unwrap_or("")
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Append further segments, validating the result.
    pub fn join(&self, tail: &str) -> Result<Self, ZiError> {
        Self::parse(&format!("{}/{}", self.0, tail))
    }

    pub fn is_wildcard(&self) -> bool {
        self.segments().any(|s| s == "*")
    }

    /// Whether `self` (possibly containing wildcards) matches the concrete
    /// path `other`. A trailing `*` matches any remaining segments.
    pub fn matches(&self, other: &NodePath) -> bool {
        let mut pattern = self.segments().peekable();
        let mut concrete = other.segments();
        loop {
            match (pattern.next(), concrete.next()) {
                (None, None) => return true,
                (Some("*"), _) if pattern.peek().is_none() => return true,
                (Some("*"), Some(_)) => {}
                (Some(p), Some(c)) => {
                    if p != c {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for NodePath {
    type Err = ZiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodePath {
    type Error = ZiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for NodePath {
    type Error = ZiError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_slashes() {
        let path = NodePath::parse("DEV2006/Demods/0/Sample/").unwrap();
        assert_eq!(path.as_str(), "/dev2006/demods/0/sample");
        assert_eq!(path.device(), "dev2006");
        assert_eq!(path.depth(), 4);
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        assert!(NodePath::parse("").is_err());
        assert!(NodePath::parse("//").is_err());
        assert!(NodePath::parse("/dev2006//sample").is_err());
        assert!(NodePath::parse("/dev2006/dem ods").is_err());
    }

    #[test]
    fn display_round_trips() {
        let path = NodePath::parse("/dev2006/oscs/0/freq").unwrap();
        let again = NodePath::parse(&path.to_string()).unwrap();
        assert_eq!(path, again);
    }

    #[test]
    fn join_extends_the_path() {
        let base = NodePath::parse("/dev2006/demods/0").unwrap();
        let full = base.join("sample").unwrap();
        assert_eq!(full.as_str(), "/dev2006/demods/0/sample");
    }

    #[test]
    fn single_segment_wildcard_matches_one_segment() {
        let pattern = NodePath::parse("/dev2006/demods/*/enable").unwrap();
        assert!(pattern.matches(&NodePath::parse("/dev2006/demods/3/enable").unwrap()));
        assert!(!pattern.matches(&NodePath::parse("/dev2006/demods/3/rate").unwrap()));
        assert!(!pattern.matches(&NodePath::parse("/dev2006/demods/enable").unwrap()));
    }

    #[test]
    fn trailing_wildcard_matches_the_rest() {
        let pattern = NodePath::parse("/dev2006/sigouts/0/*").unwrap();
        assert!(pattern.matches(&NodePath::parse("/dev2006/sigouts/0/amplitudes/1").unwrap()));
        assert!(pattern.matches(&NodePath::parse("/dev2006/sigouts/0/on").unwrap()));
        assert!(!pattern.matches(&NodePath::parse("/dev2006/sigouts/1/on").unwrap()));
    }

    #[test]
    fn bare_wildcard_matches_everything() {
        let pattern = NodePath::parse("*").unwrap();
        assert!(pattern.matches(&NodePath::parse("/dev2006/demods/0/sample").unwrap()));
    }
}
