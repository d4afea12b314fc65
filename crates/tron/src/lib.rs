//! TRON: a self-describing binary container for structured values.
//!
//! A TRON document is one byte buffer holding the JSON data model extended
//! with 64-bit integers and byte strings. Unlike JSON it is random-access:
//! the root is found via a fixed footer, maps are hash tries, arrays are
//! radix-16 tries, and every child reference is a byte offset into the same
//! buffer. That buys two things:
//!
//! - **zero-copy lazy reads**: resolving one leaf touches only the nodes on
//!   its path ([`View`], [`Document::read_path`]);
//! - **copy-on-write updates**: installing one leaf appends a fresh path
//!   and a new footer, leaving the previous version readable in place
//!   ([`Document::set_path`]).
//!
//! [`vacuum`] strips accumulated history by copying only reachable nodes;
//! [`canonical`] re-encodes into the reference shape.
//!
//! ```
//! use tron::{Document, TronValue, path};
//!
//! let doc = Document::encode(&TronValue::map([
//!     ("name", TronValue::from("amy")),
//!     ("scores", TronValue::arr([1.into(), 2.into()])),
//! ]))?;
//!
//! let doc2 = doc.set_path(&path!["scores", 2u32], &TronValue::from(3))?;
//! assert_eq!(doc2.read_path(&path!["scores", 2u32])?, Some(TronValue::I64(3)));
//! // the previous version is still intact
//! assert_eq!(doc.read_path(&path!["scores"])?,
//!            Some(TronValue::arr([1.into(), 2.into()])));
//! # Ok::<(), tron::Error>(())
//! ```

pub mod arr;
pub mod compact;
pub mod decode;
pub mod document;
pub mod encode;
pub mod error;
pub mod hash;
pub mod json;
pub mod map;
pub mod model;
pub mod path;
pub mod tag;
pub mod value;
pub mod view;

pub use compact::{canonical, vacuum};
pub use decode::decode_value;
pub use document::{Document, DocumentKind, detect_kind};
pub use error::{Error, Result};
pub use json::{from_json, to_json};
pub use model::TronValue;
pub use path::Segment;
pub use value::{TypedValue, Value};
pub use view::{I64Mode, SubView, View, ViewOptions};
