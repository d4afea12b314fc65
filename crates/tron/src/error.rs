//! Error types for TRON operations.

use thiserror::Error;

/// Result type alias for TRON operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for TRON operations.
///
/// Every variant maps to a stable short mnemonic (see [`Error::mnemonic`])
/// so callers can classify failures without matching on the full variant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Document does not start with the `TRON` magic bytes.
    #[error("invalid magic: expected TRON")]
    Magic,

    /// Buffer ends before a required field.
    #[error("buffer too short: need {needed} bytes, have {have}")]
    Short { needed: usize, have: usize },

    /// Malformed node or payload length field.
    #[error("malformed length field at {addr:#x}")]
    Len { addr: u32 },

    /// Tag byte cannot be interpreted (e.g. an extended length byte count
    /// outside 1..=8).
    #[error("unreadable tag {tag:#04x} at {addr:#x}")]
    Tag { tag: u8, addr: u32 },

    /// Expected one type but found another.
    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    /// Offset points outside the buffer.
    #[error("offset {addr:#x} out of bounds (len={len})")]
    Offset { addr: u32, len: usize },

    /// i64 outside the safe number range under strict number mode.
    #[error("integer {0} outside the safe number range")]
    Range(i64),

    /// Non-finite f64 cannot be encoded.
    #[error("non-finite float {0} is not encodable")]
    NonFinite(f64),

    /// Path segment of the wrong kind for the container at that level.
    #[error("{segment} segment does not apply to {container}")]
    Path {
        segment: &'static str,
        container: &'static str,
    },

    /// A hash-trie branch chain ran deeper than the hash provides nibbles
    /// for. Valid encoders never produce this; it indicates corruption.
    #[error("hash trie depth exceeded")]
    Depth,

    /// Bytes remain after a scalar document's sole value.
    #[error("trailing bytes after scalar value")]
    Extra,

    /// Text value contains invalid UTF-8.
    #[error("invalid UTF-8 in text value")]
    Utf8,

    /// Key not found in map (low-level lookup API).
    #[error("key not found")]
    KeyNotFound,

    /// Array index out of bounds (low-level lookup API).
    #[error("index {index} out of bounds (length={length})")]
    IndexOutOfBounds { index: u32, length: u32 },

    /// Failed to parse JSON input.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Failed to serialize to JSON.
    #[error("JSON serialize error: {0}")]
    JsonSerialize(String),
}

impl Error {
    /// Stable short mnemonic for error classification.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Error::Magic => "magic",
            Error::Short { .. } => "short",
            Error::Len { .. } => "len",
            Error::Tag { .. } => "tag",
            Error::Type { .. } | Error::Utf8 => "type",
            Error::Offset { .. } => "off",
            Error::Range(_) => "range",
            Error::NonFinite(_) => "num",
            Error::Path { .. } => "path",
            Error::Depth => "depth",
            Error::Extra => "extra",
            Error::KeyNotFound => "key",
            Error::IndexOutOfBounds { .. } => "index",
            Error::JsonParse(_) | Error::JsonSerialize(_) => "json",
        }
    }
}
