//! Logical paths into a document.
//!
//! A path is a sequence of segments: a string segment indexes a map, a
//! non-negative integer segment indexes an array.

use std::fmt;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Map key.
    Key(String),
    /// Array index.
    Index(u32),
}

impl Segment {
    /// Segment kind name for error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Segment::Key(_) => "key",
            Segment::Index(_) => "index",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{k:?}"),
            Segment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for Segment {
    fn from(k: &str) -> Self {
        Segment::Key(k.to_string())
    }
}

impl From<String> for Segment {
    fn from(k: String) -> Self {
        Segment::Key(k)
    }
}

impl From<u32> for Segment {
    fn from(i: u32) -> Self {
        Segment::Index(i)
    }
}

impl From<usize> for Segment {
    fn from(i: usize) -> Self {
        Segment::Index(i as u32)
    }
}

/// Build a path from mixed key/index literals.
///
/// ```
/// use tron::path::Segment;
///
/// let p = tron::path!["features", 0u32, "elevation"];
/// assert_eq!(p[1], Segment::Index(0));
/// ```
#[macro_export]
macro_rules! path {
    ($($seg:expr),* $(,)?) => {
        vec![$($crate::path::Segment::from($seg)),*]
    };
}
