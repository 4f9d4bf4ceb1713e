use std::fmt;

use serde::de::Error as _;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

static MAX_PATH_BYTES: usize = 4096; // Bytes

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PathError {
    #[error("The path is invalid {path:?}: {message}")]
    PathStringInvalid { path: String, message: String },
    #[error("Path segment at position #{position} ({segment}) is not allowed: {message}")]
    SegmentInvalid {
        segment: String,
        position: usize,
        message: String,
    },
}

/// A `NodePath` names a node in the property tree.
///
/// Segments are the slash-separated names from the store root down to the node.  Each node maps
/// onto a directory on disk and, optionally, onto a `<segment>.yaml` document next to that
/// directory.  The empty path is the store root itself.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodePath {
    pub segments: Vec<String>,
}

impl Serialize for NodePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}", self))
    }
}

impl<'de> Deserialize<'de> for NodePath {
    fn deserialize<D>(deserializer: D) -> Result<NodePath, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;

        NodePath::parse(&s).map_err(D::Error::custom)
    }
}

impl NodePath {
    /// Parse a slash-delimited path.
    ///
    /// Empty segments are dropped, so `/team//web/` and `team/web` name the same node.  The
    /// relative segments `.` and `..` are rejected: a node path can never leave the store root.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.len() >= MAX_PATH_BYTES {
            return Err(PathError::PathStringInvalid {
                path: path.to_string(),
                message: format!("Path length exceeds max of {} bytes", MAX_PATH_BYTES),
            });
        }

        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(std::borrow::ToOwned::to_owned)
            .collect();

        for (position, segment) in segments.iter().enumerate() {
            Self::validate_segment(segment, position)?;
        }

        Ok(NodePath { segments })
    }

    fn validate_segment(segment: &str, position: usize) -> Result<(), PathError> {
        if segment == "." || segment == ".." {
            return Err(PathError::SegmentInvalid {
                segment: segment.to_string(),
                position,
                message: "relative segments are not allowed".to_string(),
            });
        }

        if segment.contains('\\') || segment.contains('\0') {
            return Err(PathError::SegmentInvalid {
                segment: segment.to_string(),
                position,
                message: "segment contains a forbidden character".to_string(),
            });
        }

        Ok(())
    }

    pub fn root() -> Self {
        NodePath::default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.segments.iter()
    }

    /// Last segment, i.e. the node's own name.  `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    #[must_use]
    pub fn join(&self, segment: &str) -> NodePath {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        NodePath { segments }
    }

    /// Every non-empty prefix of this path, shallowest first.
    ///
    /// `a/b/c` yields `a`, `a/b`, `a/b/c`.  This is the ancestor chain walked by resolution.
    pub fn ancestors(&self) -> impl Iterator<Item = NodePath> + '_ {
        (1..=self.segments.len()).map(move |end| NodePath {
            segments: self.segments[..end].to_vec(),
        })
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl std::ops::Index<usize> for NodePath {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.segments[i]
    }
}

#[cfg(test)]
mod path_tests {
    use super::*;

    #[test]
    fn parse_normalizes_slashes() {
        assert_eq!(
            NodePath::parse("/team//web/").unwrap(),
            NodePath::parse("team/web").unwrap()
        );
        assert!(NodePath::parse("").unwrap().is_empty());
        assert!(NodePath::parse("///").unwrap().is_empty());
    }

    #[test]
    fn dots_alone_disallowed() {
        assert_eq!(
            NodePath::parse("foo/../bar"),
            Err(PathError::SegmentInvalid {
                segment: "..".to_string(),
                position: 1,
                message: "relative segments are not allowed".to_string(),
            })
        );
        assert!(NodePath::parse("./foo").is_err());
        // Dots inside a segment are fine.
        assert!(NodePath::parse("web.example.com/..hidden").is_ok());
    }

    #[test]
    fn overlong_paths_rejected() {
        let long = "a/".repeat(MAX_PATH_BYTES);
        assert!(matches!(
            NodePath::parse(&long),
            Err(PathError::PathStringInvalid { .. })
        ));
    }

    #[test]
    fn ancestors_are_shallowest_first() {
        let path = NodePath::parse("a/b/c").unwrap();
        let ancestors: Vec<String> = path.ancestors().map(|p| p.to_string()).collect();
        assert_eq!(ancestors, vec!["a", "a/b", "a/b/c"]);
        assert_eq!(NodePath::root().ancestors().count(), 0);
    }

    #[test]
    fn name_and_join() {
        let path = NodePath::parse("org/team").unwrap();
        assert_eq!(path.name(), Some("team"));
        assert_eq!(path.join("web").to_string(), "org/team/web");
        assert_eq!(NodePath::root().name(), None);
        assert_eq!(path[0], "org");
    }

    #[test]
    fn serde_round_trips_as_string() {
        let path = NodePath::parse("org/team").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"org/team\"");
        let back: NodePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
