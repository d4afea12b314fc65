//! TRON document frame.
//!
//! A document is one byte buffer: the 4-byte `TRON` magic, value nodes, and
//! an 8-byte footer holding the current and previous root offsets. Buffers
//! are immutable once returned; every write operation yields a fresh buffer
//! whose footer links back to the input's root.

use std::borrow::Cow;

use tracing::{debug, trace};

use crate::arr;
use crate::decode::decode_value;
use crate::encode::{
    Builder, encode_arr_branch, encode_arr_leaf, encode_map_leaf, encode_txt,
};
use crate::error::{Error, Result};
use crate::map;
use crate::model::TronValue;
use crate::path::Segment;
use crate::tag::ValueType;
use crate::value::{TypedValue, Value};

/// Header size in bytes (magic `TRON`).
pub(crate) const HEADER_SIZE: usize = 4;

/// Footer size in bytes (`root_offset` + `prev_root_offset`).
pub(crate) const FOOTER_SIZE: usize = 8;

/// Minimum document size: header + 1-byte nil value + footer.
const MIN_DOCUMENT_SIZE: usize = 13;

/// Magic bytes at the start of every TRON document.
const MAGIC: &[u8; 4] = b"TRON";

/// Document shape: a scalar wrapper or a container tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Scalar,
    Tree,
}

/// Detect the shape of a document without keeping it around.
///
/// # Errors
///
/// Same validation as [`Document::from_slice`].
pub fn detect_kind(data: &[u8]) -> Result<DocumentKind> {
    Document::from_slice(data).map(|doc| doc.kind())
}

/// A TRON document with zero-copy reading and copy-on-write updates.
pub struct Document<'a> {
    /// The document buffer; borrowed for reads, owned after any write op.
    data: Cow<'a, [u8]>,
    root_addr: u32,
    prev_root_addr: u32,
}

impl<'a> Document<'a> {
    /// Open an existing TRON document from a byte slice (zero-copy).
    ///
    /// Validates the magic, the footer, that the root offset lies strictly
    /// between header and footer and points at a readable value, and that a
    /// history-free scalar document carries exactly one value.
    ///
    /// # Errors
    ///
    /// `short` below the 13-byte minimum, `magic` for a bad marker, `off`
    /// for a root outside the node region, `extra` for trailing bytes after
    /// a scalar's sole value, plus any node-level error at the root.
    pub fn from_slice(data: &'a [u8]) -> Result<Self> {
        if data.len() < MIN_DOCUMENT_SIZE {
            return Err(Error::Short {
                needed: MIN_DOCUMENT_SIZE,
                have: data.len(),
            });
        }
        if &data[..HEADER_SIZE] != MAGIC {
            return Err(Error::Magic);
        }

        let footer_start = data.len() - FOOTER_SIZE;
        let root_addr = u32::from_le_bytes([
            data[footer_start],
            data[footer_start + 1],
            data[footer_start + 2],
            data[footer_start + 3],
        ]);
        let prev_root_addr = u32::from_le_bytes([
            data[footer_start + 4],
            data[footer_start + 5],
            data[footer_start + 6],
            data[footer_start + 7],
        ]);

        if (root_addr as usize) < HEADER_SIZE || root_addr as usize >= footer_start {
            return Err(Error::Offset {
                addr: root_addr,
                len: data.len(),
            });
        }

        let root = Value::new(data, root_addr)?;
        let typed = root.typed()?;
        if !matches!(typed, TypedValue::Arr(_) | TypedValue::Map(_)) && prev_root_addr == 0 {
            // A history-free scalar document holds exactly one value.
            if root_addr as usize + root.node_size()? != footer_start {
                return Err(Error::Extra);
            }
        }

        Ok(Self {
            data: Cow::Borrowed(data),
            root_addr,
            prev_root_addr,
        })
    }

    /// Encode a logical value into a fresh history-free document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonFinite`] for NaN or infinite floats anywhere in
    /// the value. No buffer is returned on failure.
    pub fn encode(value: &TronValue) -> Result<Document<'static>> {
        let mut b = Builder::document();
        let root = b.append_value(value)?;
        let data = b.finish(root, 0);
        debug!(bytes = data.len(), kind = value.type_name(), "encoded document");
        Ok(Document {
            data: Cow::Owned(data),
            root_addr: root,
            prev_root_addr: 0,
        })
    }

    /// Assemble a document from builder output. The caller guarantees the
    /// parts describe a well-formed buffer.
    pub(crate) fn from_parts(data: Vec<u8>, root_addr: u32, prev_root_addr: u32) -> Document<'static> {
        Document {
            data: Cow::Owned(data),
            root_addr,
            prev_root_addr,
        }
    }

    // --- reading ---

    /// Materialize the current root into an owned logical value.
    ///
    /// # Errors
    ///
    /// Surfaces wire-level errors from any node reachable from the root.
    pub fn decode(&self) -> Result<TronValue> {
        decode_value(self.as_bytes(), self.root_addr)
    }

    /// Document shape, from the root value's tag.
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        // root_addr was bounds-checked on construction
        match Value::new(self.as_bytes(), self.root_addr).map(|v| v.value_type()) {
            Ok(ValueType::Arr | ValueType::Map) => DocumentKind::Tree,
            _ => DocumentKind::Scalar,
        }
    }

    /// The root value view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offset`] only for a corrupted in-memory state; the
    /// root offset is validated on construction.
    pub fn root(&self) -> Result<Value<'_>> {
        Value::new(self.as_bytes(), self.root_addr)
    }

    /// A value view at an arbitrary address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offset`] if the address is outside the document.
    pub fn value_at(&self, addr: u32) -> Result<Value<'_>> {
        Value::new(self.as_bytes(), addr)
    }

    /// Resolve a path and materialize the value there.
    ///
    /// `Ok(None)` means absent: a missing key or an index past the array
    /// length. A sparse in-bounds array slot reads as present nil.
    ///
    /// # Errors
    ///
    /// `path` for a segment of the wrong kind, `type` when a scalar sits
    /// where a container is required, plus wire-level errors.
    pub fn read_path(&self, path: &[Segment]) -> Result<Option<TronValue>> {
        match resolve_path(self.as_bytes(), self.root_addr, path)? {
            Resolved::Absent => Ok(None),
            Resolved::Nil => Ok(Some(TronValue::Nil)),
            Resolved::At(addr) => Ok(Some(decode_value(self.as_bytes(), addr)?)),
        }
    }

    /// Raw document bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Current root offset.
    #[inline]
    #[must_use]
    pub fn root_addr(&self) -> u32 {
        self.root_addr
    }

    /// Previous root offset; 0 when the document has no history.
    #[inline]
    #[must_use]
    pub fn prev_root_addr(&self) -> u32 {
        self.prev_root_addr
    }

    /// Document length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Never true for a validated document.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Convert into an owned document with `'static` lifetime.
    #[must_use]
    pub fn into_owned(self) -> Document<'static> {
        Document {
            data: Cow::Owned(self.data.into_owned()),
            root_addr: self.root_addr,
            prev_root_addr: self.prev_root_addr,
        }
    }

    // --- writing (copy-on-write) ---

    /// Produce a new document with `value` installed at `path`.
    ///
    /// The output starts with this document's bytes minus the footer; only
    /// the nodes along the path are re-appended, every sibling subtree is
    /// referenced by its existing offset. The new footer links back to this
    /// document's root, so the previous version stays readable in place.
    ///
    /// An empty path replaces the root outright; a scalar value then turns
    /// the document into a scalar document.
    ///
    /// # Errors
    ///
    /// Everything [`Document::encode`] rejects, `path` for a segment of the
    /// wrong kind, and `type` when a scalar blocks the path. The input
    /// buffer is never touched; no buffer is returned on failure.
    pub fn set_path(&self, path: &[Segment], value: &TronValue) -> Result<Document<'static>> {
        let head = &self.data[..self.data.len() - FOOTER_SIZE];
        let mut b = Builder::resume(head);
        let new_root = if path.is_empty() {
            b.append_value(value)?
        } else {
            set_in(&mut b, self.root_addr, path, value)?
        };
        let data = b.finish(new_root, self.root_addr);
        trace!(
            ?path,
            grew = data.len() - self.data.len(),
            "set_path appended new root path"
        );
        Ok(Document::from_parts(data, new_root, self.root_addr))
    }
}

impl std::fmt::Debug for Document<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("len", &self.data.len())
            .field("root_addr", &format_args!("{:#x}", self.root_addr))
            .field("prev_root_addr", &format_args!("{:#x}", self.prev_root_addr))
            .field("kind", &self.kind())
            .finish()
    }
}

/// Outcome of resolving a path: nothing there, an implicit nil (sparse
/// in-bounds array slot), or a value at an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
    Absent,
    Nil,
    At(u32),
}

/// Resolve one segment against the container at `addr`.
pub(crate) fn resolve_step(data: &[u8], addr: u32, seg: &Segment) -> Result<Resolved> {
    match (Value::new(data, addr)?.typed()?, seg) {
        (TypedValue::Map(node), Segment::Key(key)) => {
            Ok(match map::get(data, node.addr(), key)? {
                Some(a) => Resolved::At(a),
                None => Resolved::Absent,
            })
        }
        (TypedValue::Arr(node), Segment::Index(index)) => {
            match arr::get(data, node.addr(), *index) {
                Ok(Some(a)) => Ok(Resolved::At(a)),
                Ok(None) => Ok(Resolved::Nil),
                Err(Error::IndexOutOfBounds { .. }) => Ok(Resolved::Absent),
                Err(e) => Err(e),
            }
        }
        (TypedValue::Map(_), Segment::Index(_)) => Err(Error::Path {
            segment: "index",
            container: "map",
        }),
        (TypedValue::Arr(_), Segment::Key(_)) => Err(Error::Path {
            segment: "key",
            container: "arr",
        }),
        (other, _) => Err(Error::Type {
            expected: "container",
            found: other.type_name(),
        }),
    }
}

/// Walk a whole path from `root`, touching only the nodes on it.
pub(crate) fn resolve_path(data: &[u8], root: u32, path: &[Segment]) -> Result<Resolved> {
    let mut addr = root;
    for (i, seg) in path.iter().enumerate() {
        addr = match resolve_step(data, addr, seg)? {
            Resolved::At(a) => a,
            Resolved::Nil => {
                return if i + 1 == path.len() {
                    Ok(Resolved::Nil)
                } else {
                    Err(Error::Type {
                        expected: "container",
                        found: "nil",
                    })
                };
            }
            Resolved::Absent => return Ok(Resolved::Absent),
        };
    }
    Ok(Resolved::At(addr))
}

/// Recursive step of the copy-on-write updater: install the value below
/// `node_addr` and return the replacement node's address.
fn set_in(b: &mut Builder, node_addr: u32, path: &[Segment], value: &TronValue) -> Result<u32> {
    let seg = &path[0];
    let rest = &path[1..];
    let node_type = Value::new(b.bytes(), node_addr)?.value_type();

    match (node_type, seg) {
        (ValueType::Map, Segment::Key(key)) => {
            let child_value = if rest.is_empty() {
                b.append_value(value)?
            } else {
                match descent_target(b.bytes(), map::get(b.bytes(), node_addr, key)?)? {
                    Some(child) => set_in(b, child, rest, value)?,
                    None => build_chain(b, rest, value)?,
                }
            };
            map::set(b, node_addr, key, child_value)
        }
        (ValueType::Arr, Segment::Index(index)) => {
            let child_value = if rest.is_empty() {
                b.append_value(value)?
            } else {
                let slot = match arr::get(b.bytes(), node_addr, *index) {
                    Ok(opt) => opt,
                    Err(Error::IndexOutOfBounds { .. }) => None,
                    Err(e) => return Err(e),
                };
                match descent_target(b.bytes(), slot)? {
                    Some(child) => set_in(b, child, rest, value)?,
                    None => build_chain(b, rest, value)?,
                }
            };
            arr::set(b, node_addr, *index, child_value)
        }
        (ValueType::Map, Segment::Index(_)) => Err(Error::Path {
            segment: "index",
            container: "map",
        }),
        (ValueType::Arr, Segment::Key(_)) => Err(Error::Path {
            segment: "key",
            container: "arr",
        }),
        (other, _) => Err(Error::Type {
            expected: "container",
            found: other.name(),
        }),
    }
}

/// A child usable for descent: a container address, or `None` when the
/// slot is missing or holds nil (both get a freshly built chain).
fn descent_target(data: &[u8], resolved: Option<u32>) -> Result<Option<u32>> {
    let Some(addr) = resolved else {
        return Ok(None);
    };
    match Value::new(data, addr)?.typed()? {
        TypedValue::Arr(_) | TypedValue::Map(_) => Ok(Some(addr)),
        TypedValue::Nil => Ok(None),
        other => Err(Error::Type {
            expected: "container",
            found: other.type_name(),
        }),
    }
}

/// Build the containers for the remaining path bottom-up: the innermost
/// node is the value itself, each segment above wraps it in a single-entry
/// container of the kind the segment implies.
fn build_chain(b: &mut Builder, path: &[Segment], value: &TronValue) -> Result<u32> {
    let mut addr = b.append_value(value)?;
    for seg in path.iter().rev() {
        addr = match seg {
            Segment::Key(key) => {
                let key_addr = b.append(&encode_txt(key));
                b.append(&encode_map_leaf(&[(key_addr, addr)]))
            }
            Segment::Index(index) => wrap_index(b, *index, addr)?,
        };
    }
    Ok(addr)
}

/// A fresh root array of length `index + 1` with only that slot populated.
fn wrap_index(b: &mut Builder, index: u32, value_addr: u32) -> Result<u32> {
    let length = index.checked_add(1).ok_or(Error::IndexOutOfBounds {
        index,
        length: u32::MAX,
    })?;
    let shift = arr::required_shift(length);
    if shift == 0 {
        let bitmap = 1u16 << index;
        Ok(b.append(&encode_arr_leaf(true, 0, bitmap, Some(length), &[value_addr])))
    } else {
        let child = arr::make_path(b, shift - 4, index, value_addr);
        let bitmap = 1u16 << arr::slot(index, shift);
        Ok(b.append(&encode_arr_branch(true, shift, bitmap, Some(length), &[child])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn minimal_nil_document() {
        let data = [
            b'T', b'R', b'O', b'N', // magic
            0x00, // nil @4
            0x04, 0x00, 0x00, 0x00, // root_offset = 4
            0x00, 0x00, 0x00, 0x00, // prev_root_offset = 0
        ];
        let doc = Document::from_slice(&data).unwrap();
        assert_eq!(doc.len(), MIN_DOCUMENT_SIZE);
        assert_eq!(doc.kind(), DocumentKind::Scalar);
        assert_eq!(doc.decode().unwrap(), TronValue::Nil);
    }

    #[test]
    fn rejects_bad_magic() {
        let data = [
            b'N', b'O', b'P', b'E', 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert!(matches!(Document::from_slice(&data), Err(Error::Magic)));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let data = [0x00, 0x01, 0x02];
        assert!(matches!(
            Document::from_slice(&data),
            Err(Error::Short { needed: 13, have: 3 })
        ));
    }

    #[test]
    fn rejects_root_outside_node_region() {
        let mut data = vec![b'T', b'R', b'O', b'N', 0x00];
        data.extend_from_slice(&20u32.to_le_bytes()); // root past footer
        data.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            Document::from_slice(&data),
            Err(Error::Offset { .. })
        ));
    }

    #[test]
    fn rejects_trailing_bytes_after_scalar() {
        let data = [
            b'T', b'R', b'O', b'N', // magic
            0x00, 0x00, // nil + one stray byte
            0x04, 0x00, 0x00, 0x00, // root_offset = 4
            0x00, 0x00, 0x00, 0x00, // prev_root_offset = 0
        ];
        assert!(matches!(Document::from_slice(&data), Err(Error::Extra)));
    }

    #[test]
    fn encode_i64_wire_bytes() {
        let doc = Document::encode(&TronValue::I64(42)).unwrap();
        assert_eq!(
            doc.as_bytes(),
            &[
                b'T', b'R', b'O', b'N', // magic
                0x02, 0x2A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // i64(42)
                0x04, 0x00, 0x00, 0x00, // root_offset = 4
                0x00, 0x00, 0x00, 0x00, // prev_root_offset = 0
            ]
        );
        assert_eq!(doc.kind(), DocumentKind::Scalar);
        assert_eq!(doc.decode().unwrap(), TronValue::I64(42));
        // the encoded bytes reopen cleanly
        let reopened = Document::from_slice(doc.as_bytes()).unwrap();
        assert_eq!(reopened.root_addr(), 4);
        assert_eq!(reopened.prev_root_addr(), 0);
    }

    #[test]
    fn detect_kind_covers_both_shapes() {
        let scalar = Document::encode(&TronValue::from("hi")).unwrap();
        assert_eq!(detect_kind(scalar.as_bytes()).unwrap(), DocumentKind::Scalar);

        let tree = Document::encode(&TronValue::arr([TronValue::Nil])).unwrap();
        assert_eq!(detect_kind(tree.as_bytes()).unwrap(), DocumentKind::Tree);
    }

    #[test]
    fn set_path_links_history() {
        let doc = Document::encode(&TronValue::map([("a", TronValue::from(1))])).unwrap();
        let doc2 = doc.set_path(&path!["a"], &TronValue::from(2)).unwrap();

        assert_eq!(doc2.prev_root_addr(), doc.root_addr());
        assert_eq!(
            doc2.read_path(&path!["a"]).unwrap(),
            Some(TronValue::I64(2))
        );
        // the input buffer still decodes to the old value
        assert_eq!(
            doc.read_path(&path!["a"]).unwrap(),
            Some(TronValue::I64(1))
        );
    }

    #[test]
    fn set_path_empty_path_replaces_root() {
        let doc = Document::encode(&TronValue::map([("a", TronValue::from(1))])).unwrap();
        let doc2 = doc.set_path(&[], &TronValue::from(7)).unwrap();
        assert_eq!(doc2.kind(), DocumentKind::Scalar);
        assert_eq!(doc2.decode().unwrap(), TronValue::I64(7));
        assert_eq!(doc2.prev_root_addr(), doc.root_addr());
    }

    #[test]
    fn set_path_creates_missing_containers() {
        let doc = Document::encode(&TronValue::map::<&str, _>([])).unwrap();
        let doc2 = doc
            .set_path(&path!["a", 1u32, "b"], &TronValue::from("deep"))
            .unwrap();
        assert_eq!(
            doc2.read_path(&path!["a", 1u32, "b"]).unwrap(),
            Some(TronValue::from("deep"))
        );
        // the implied array got length 2 with a nil hole at 0
        assert_eq!(
            doc2.read_path(&path!["a", 0u32]).unwrap(),
            Some(TronValue::Nil)
        );
    }

    #[test]
    fn set_path_rejects_segment_kind_mismatch() {
        let doc = Document::encode(&TronValue::map([("a", TronValue::from(1))])).unwrap();
        let err = doc.set_path(&path![0u32], &TronValue::Nil).unwrap_err();
        assert_eq!(err.mnemonic(), "path");

        let doc = Document::encode(&TronValue::arr([TronValue::Nil])).unwrap();
        let err = doc.set_path(&path!["a"], &TronValue::Nil).unwrap_err();
        assert_eq!(err.mnemonic(), "path");
    }

    #[test]
    fn set_path_rejects_scalar_in_the_way() {
        let doc = Document::encode(&TronValue::map([("a", TronValue::from(1))])).unwrap();
        let err = doc
            .set_path(&path!["a", "b"], &TronValue::Nil)
            .unwrap_err();
        assert_eq!(err.mnemonic(), "type");
    }

    #[test]
    fn read_path_distinguishes_absent_and_nil() {
        let doc = Document::encode(&TronValue::map([(
            "xs",
            TronValue::arr([TronValue::I64(1), TronValue::I64(2)]),
        )]))
        .unwrap();
        assert_eq!(doc.read_path(&path!["missing"]).unwrap(), None);
        assert_eq!(doc.read_path(&path!["xs", 5u32]).unwrap(), None);

        // sparse hole inside bounds reads as nil
        let doc2 = doc.set_path(&path!["xs", 9u32], &TronValue::from(3)).unwrap();
        assert_eq!(
            doc2.read_path(&path!["xs", 4u32]).unwrap(),
            Some(TronValue::Nil)
        );
    }
}
