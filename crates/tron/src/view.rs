//! Lazy navigation over a document buffer.
//!
//! A [`View`] answers path lookups by reading only the nodes on the path,
//! memoizing key hashes, resolved container offsets, and per-container
//! slot results along the way. Writes go through the copy-on-write updater
//! and swap the view's buffer for the result; a version counter bump
//! invalidates every cache entry lazily.
//!
//! Views are single-threaded by design: sub-views share one buffer and one
//! cache store through `Rc<RefCell<…>>`. Independent readers of the same
//! bytes should each open their own view.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::arr;
use crate::decode::decode_value;
use crate::document::{Document, DocumentKind, Resolved};
use crate::error::{Error, Result};
use crate::hash::{MAX_DEPTH, key_hash};
use crate::map;
use crate::model::TronValue;
use crate::path::Segment;
use crate::value::{MapNode, TypedValue, Value};

/// Largest integer magnitude faithfully representable in an IEEE-754
/// double.
const SAFE_INT_MAX: u64 = (1 << 53) - 1;

/// How i64 payloads outside the 53-bit safe range surface on reads.
///
/// Hosts whose numbers are doubles need the distinction; here the integer
/// type is natively 64-bit, so `Auto` and `Bigint` both pass the full
/// value through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum I64Mode {
    /// Out-of-range integers surface as big integers.
    #[default]
    Auto,
    /// Strict double semantics: out-of-range integers fail with `range`.
    Number,
    /// Big-integer semantics.
    Bigint,
}

/// View construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewOptions {
    pub i64_mode: I64Mode,
}

/// Per-container cache: the resolved address of the container at one
/// logical path, plus the outcome of each slot navigated from it.
#[derive(Debug)]
struct NodeCache {
    version: u64,
    addr: u32,
    slots: HashMap<Segment, Resolved>,
}

#[derive(Debug)]
struct Shared {
    doc: Document<'static>,
    version: u64,
    key_hashes: HashMap<String, u32>,
    nodes: HashMap<Vec<Segment>, NodeCache>,
}

impl Shared {
    /// Resolve a path against the current buffer through the caches.
    fn resolve(&mut self, path: &[Segment]) -> Result<Resolved> {
        let Shared {
            doc,
            version,
            key_hashes,
            nodes,
        } = self;
        let data = doc.as_bytes();
        let mut addr = doc.root_addr();

        for (i, seg) in path.iter().enumerate() {
            let cache = nodes
                .entry(path[..i].to_vec())
                .or_insert_with(|| NodeCache {
                    version: *version,
                    addr,
                    slots: HashMap::new(),
                });
            if cache.version != *version || cache.addr != addr {
                // stale after a write; wipe on first use
                cache.version = *version;
                cache.addr = addr;
                cache.slots.clear();
            }
            let resolved = if let Some(r) = cache.slots.get(seg) {
                *r
            } else {
                let r = resolve_slot(data, addr, seg, key_hashes)?;
                cache.slots.insert(seg.clone(), r);
                r
            };
            addr = match resolved {
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
}

/// One navigation step with the key-hash memo applied.
fn resolve_slot(
    data: &[u8],
    addr: u32,
    seg: &Segment,
    key_hashes: &mut HashMap<String, u32>,
) -> Result<Resolved> {
    match (Value::new(data, addr)?.typed()?, seg) {
        (TypedValue::Map(node), Segment::Key(key)) => {
            let hash = *key_hashes
                .entry(key.clone())
                .or_insert_with(|| key_hash(key.as_bytes()));
            Ok(match map::get_hashed(data, node.addr(), key.as_bytes(), hash)? {
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

/// A lazy navigation handle over a document.
pub struct View {
    shared: Rc<RefCell<Shared>>,
    opts: ViewOptions,
}

impl View {
    /// Open a view over a document.
    #[must_use]
    pub fn open(doc: Document<'_>, opts: ViewOptions) -> View {
        View {
            shared: Rc::new(RefCell::new(Shared {
                doc: doc.into_owned(),
                version: 0,
                key_hashes: HashMap::new(),
                nodes: HashMap::new(),
            })),
            opts,
        }
    }

    /// Validate a buffer and open a view over it.
    ///
    /// # Errors
    ///
    /// Same validation as [`Document::from_slice`].
    pub fn from_slice(data: &[u8], opts: ViewOptions) -> Result<View> {
        Ok(Self::open(Document::from_slice(data)?, opts))
    }

    /// Resolve a path and materialize the value there.
    ///
    /// `Ok(None)` means absent; a sparse in-bounds array slot reads as
    /// present nil.
    ///
    /// # Errors
    ///
    /// `path`/`type` for mismatched paths, `range` under
    /// [`I64Mode::Number`] for integers past the safe range, plus
    /// wire-level errors.
    pub fn read(&self, path: &[Segment]) -> Result<Option<TronValue>> {
        read_at(&self.shared, &[], path, self.opts)
    }

    /// A lazy handle on the container at `path`; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// `type` when the path lands on a scalar, plus anything
    /// [`View::read`] can raise.
    pub fn get(&self, path: &[Segment]) -> Result<Option<SubView>> {
        get_at(&self.shared, &[], path, self.opts)
    }

    /// Install `value` at `path` through the copy-on-write updater and
    /// swap this view (and every sub-view) onto the new buffer.
    ///
    /// # Errors
    ///
    /// Same failures as [`Document::set_path`]; on error the view keeps
    /// its current buffer.
    pub fn write(&self, path: &[Segment], value: &TronValue) -> Result<()> {
        write_at(&self.shared, &[], path, value)
    }

    /// The current buffer.
    #[must_use]
    pub fn bytes(&self) -> Ref<'_, [u8]> {
        Ref::map(self.shared.borrow(), |s| s.doc.as_bytes())
    }

    /// Version counter; bumped by every write through this view family.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.shared.borrow().version
    }

    /// Shape of the current document.
    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.shared.borrow().doc.kind()
    }
}

/// A navigation handle bound to a container at a fixed logical path.
///
/// Sub-views share the parent view's buffer and caches; after a write
/// through any of them, all resolve against the new buffer.
#[derive(Debug)]
pub struct SubView {
    shared: Rc<RefCell<Shared>>,
    opts: ViewOptions,
    path: Vec<Segment>,
}

impl SubView {
    /// The logical path this handle is bound to.
    #[must_use]
    pub fn path(&self) -> &[Segment] {
        &self.path
    }

    /// Read relative to this container. An empty path materializes the
    /// container itself.
    ///
    /// # Errors
    ///
    /// Same as [`View::read`].
    pub fn read(&self, rel: &[Segment]) -> Result<Option<TronValue>> {
        read_at(&self.shared, &self.path, rel, self.opts)
    }

    /// A handle on a nested container.
    ///
    /// # Errors
    ///
    /// Same as [`View::get`].
    pub fn get(&self, rel: &[Segment]) -> Result<Option<SubView>> {
        get_at(&self.shared, &self.path, rel, self.opts)
    }

    /// Write relative to this container.
    ///
    /// # Errors
    ///
    /// Same as [`View::write`].
    pub fn write(&self, rel: &[Segment], value: &TronValue) -> Result<()> {
        write_at(&self.shared, &self.path, rel, value)
    }

    /// Array length. Fails with `type` on a map.
    ///
    /// # Errors
    ///
    /// `type` when this handle is not bound to an array.
    pub fn len(&self) -> Result<u32> {
        let mut s = self.shared.borrow_mut();
        let addr = self.require_addr(&mut s)?;
        match Value::new(s.doc.as_bytes(), addr)?.typed()? {
            TypedValue::Arr(node) => node.length().ok_or(Error::Type {
                expected: "root array node",
                found: "child array node",
            }),
            other => Err(Error::Type {
                expected: "arr",
                found: other.type_name(),
            }),
        }
    }

    /// Whether a bound array is empty.
    ///
    /// # Errors
    ///
    /// Same as [`SubView::len`].
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Own keys of a bound map, sorted. Fails with `type` on an array.
    ///
    /// # Errors
    ///
    /// `type` when this handle is not bound to a map.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut s = self.shared.borrow_mut();
        let addr = self.require_addr(&mut s)?;
        match Value::new(s.doc.as_bytes(), addr)?.typed()? {
            TypedValue::Map(_) => {
                let mut out = Vec::new();
                collect_keys(s.doc.as_bytes(), addr, &mut out, 0)?;
                out.sort();
                Ok(out)
            }
            other => Err(Error::Type {
                expected: "map",
                found: other.type_name(),
            }),
        }
    }

    fn require_addr(&self, s: &mut Shared) -> Result<u32> {
        match s.resolve(&self.path)? {
            Resolved::At(addr) => Ok(addr),
            Resolved::Nil | Resolved::Absent => Err(Error::KeyNotFound),
        }
    }
}

fn full_path(base: &[Segment], rel: &[Segment]) -> Vec<Segment> {
    base.iter().chain(rel.iter()).cloned().collect()
}

fn read_at(
    shared: &Rc<RefCell<Shared>>,
    base: &[Segment],
    rel: &[Segment],
    opts: ViewOptions,
) -> Result<Option<TronValue>> {
    let path = full_path(base, rel);
    let mut s = shared.borrow_mut();
    let out = match s.resolve(&path)? {
        Resolved::Absent => None,
        Resolved::Nil => Some(TronValue::Nil),
        Resolved::At(addr) => Some(decode_value(s.doc.as_bytes(), addr)?),
    };
    if opts.i64_mode == I64Mode::Number
        && let Some(value) = &out
    {
        check_safe_range(value)?;
    }
    Ok(out)
}

fn get_at(
    shared: &Rc<RefCell<Shared>>,
    base: &[Segment],
    rel: &[Segment],
    opts: ViewOptions,
) -> Result<Option<SubView>> {
    let path = full_path(base, rel);
    let mut s = shared.borrow_mut();
    let non_container = match s.resolve(&path)? {
        Resolved::Absent => return Ok(None),
        Resolved::Nil => Some("nil"),
        Resolved::At(addr) => match Value::new(s.doc.as_bytes(), addr)?.typed()? {
            TypedValue::Arr(_) | TypedValue::Map(_) => None,
            other => Some(other.type_name()),
        },
    };
    drop(s);
    match non_container {
        None => Ok(Some(SubView {
            shared: Rc::clone(shared),
            opts,
            path,
        })),
        Some(found) => Err(Error::Type {
            expected: "container",
            found,
        }),
    }
}

fn write_at(
    shared: &Rc<RefCell<Shared>>,
    base: &[Segment],
    rel: &[Segment],
    value: &TronValue,
) -> Result<()> {
    let path = full_path(base, rel);
    let mut s = shared.borrow_mut();
    let new_doc = s.doc.set_path(&path, value)?;
    s.doc = new_doc;
    s.version += 1;
    trace!(version = s.version, "view swapped onto new buffer");
    Ok(())
}

/// Strict double-range check applied recursively under `I64Mode::Number`.
fn check_safe_range(value: &TronValue) -> Result<()> {
    match value {
        TronValue::I64(n) if n.unsigned_abs() > SAFE_INT_MAX => Err(Error::Range(*n)),
        TronValue::Arr(items) => items.iter().try_for_each(check_safe_range),
        TronValue::Map(entries) => entries.values().try_for_each(check_safe_range),
        _ => Ok(()),
    }
}

/// Collect map keys without materializing values.
fn collect_keys(data: &[u8], addr: u32, out: &mut Vec<String>, depth: u8) -> Result<()> {
    match MapNode::parse(data, addr)? {
        MapNode::Leaf(leaf) => {
            for (key_addr, _) in leaf.pairs() {
                match Value::new(data, key_addr)?.typed()? {
                    TypedValue::Str(s) => out.push(s.to_string()),
                    other => {
                        return Err(Error::Type {
                            expected: "txt key",
                            found: other.type_name(),
                        });
                    }
                }
            }
        }
        MapNode::Branch(branch) => {
            if depth >= MAX_DEPTH {
                return Err(Error::Depth);
            }
            for child in branch.child_addrs() {
                collect_keys(data, child, out, depth + 1)?;
            }
        }
    }
    Ok(())
}
