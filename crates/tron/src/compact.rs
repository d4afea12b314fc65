//! History stripping and canonical re-encoding.
//!
//! `vacuum` copies only the nodes reachable from the current root into a
//! fresh buffer, patching the offset fields inside container nodes and
//! nothing else. `canonical` is the heavyweight variant: a full decode
//! followed by a reference re-encode.

use std::collections::HashMap;

use tracing::debug;

use crate::document::Document;
use crate::encode::{
    Builder, encode_arr_branch, encode_arr_leaf, encode_map_branch, encode_map_leaf,
};
use crate::error::{Error, Result};
use crate::value::{MapNode, TypedValue, Value};

/// Produce an equivalent document containing only the nodes reachable from
/// the current root, with the previous-root link zeroed.
///
/// Node bytes are copied verbatim except for the child-offset fields of
/// container nodes; a node reached twice is copied once and shared.
/// The output is a fixed point: vacuuming it again reproduces it
/// byte-for-byte.
///
/// # Errors
///
/// Surfaces wire-level errors (`off`, `len`, `short`, `tag`) from any
/// reachable node.
pub fn vacuum(doc: &Document<'_>) -> Result<Document<'static>> {
    let mut b = Builder::document();
    let mut memo: HashMap<u32, u32> = HashMap::new();
    let root = copy_node(doc.as_bytes(), doc.root_addr(), &mut b, &mut memo)?;
    let data = b.finish(root, 0);
    debug!(
        before = doc.len(),
        after = data.len(),
        nodes = memo.len(),
        "vacuumed document"
    );
    Ok(Document::from_parts(data, root, 0))
}

/// Copy one node and its descendants, post-order, memoizing old → new
/// addresses.
fn copy_node(
    src: &[u8],
    addr: u32,
    b: &mut Builder,
    memo: &mut HashMap<u32, u32>,
) -> Result<u32> {
    if let Some(&new_addr) = memo.get(&addr) {
        return Ok(new_addr);
    }
    let value = Value::new(src, addr)?;
    let new_addr = match value.typed()? {
        TypedValue::Nil
        | TypedValue::Bool(_)
        | TypedValue::I64(_)
        | TypedValue::F64(_)
        | TypedValue::Str(_)
        | TypedValue::Bytes(_) => {
            let size = value.node_size()?;
            let start = addr as usize;
            let bytes = src.get(start..start + size).ok_or(Error::Short {
                needed: start + size,
                have: src.len(),
            })?;
            b.append(bytes)
        }
        TypedValue::Arr(node) => {
            let entries: Vec<u32> = node.entry_addrs().collect();
            let mut new_entries = Vec::with_capacity(entries.len());
            for entry in entries {
                new_entries.push(copy_node(src, entry, b, memo)?);
            }
            let encoded = if node.is_leaf() {
                encode_arr_leaf(node.is_root(), node.shift(), node.bitmap(), node.length(), &new_entries)
            } else {
                encode_arr_branch(node.is_root(), node.shift(), node.bitmap(), node.length(), &new_entries)
            };
            b.append(&encoded)
        }
        TypedValue::Map(MapNode::Leaf(leaf)) => {
            let pairs: Vec<(u32, u32)> = leaf.pairs().collect();
            let mut new_pairs = Vec::with_capacity(pairs.len());
            for (key_addr, value_addr) in pairs {
                let new_key = copy_node(src, key_addr, b, memo)?;
                let new_value = copy_node(src, value_addr, b, memo)?;
                new_pairs.push((new_key, new_value));
            }
            b.append(&encode_map_leaf(&new_pairs))
        }
        TypedValue::Map(MapNode::Branch(branch)) => {
            let children: Vec<u32> = branch.child_addrs().collect();
            let mut new_children = Vec::with_capacity(children.len());
            for child in children {
                new_children.push(copy_node(src, child, b, memo)?);
            }
            b.append(&encode_map_branch(branch.bitmap(), &new_children))
        }
    };
    memo.insert(addr, new_addr);
    Ok(new_addr)
}

/// Decode the current root and re-encode it with the reference encoder.
///
/// The output is byte-identical to `Document::encode(&doc.decode()?)`:
/// history gone, trees rebalanced into the encoder's canonical shape.
///
/// # Errors
///
/// Anything `decode` or `encode` rejects, including non-finite floats that
/// made it into the input.
pub fn canonical(doc: &Document<'_>) -> Result<Document<'static>> {
    let value = doc.decode()?;
    let out = Document::encode(&value)?;
    debug!(before = doc.len(), after = out.len(), "canonicalized document");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TronValue;
    use crate::path;

    fn sample_doc() -> Document<'static> {
        Document::encode(&TronValue::map([
            ("a", TronValue::arr([1.into(), 2.into(), 3.into()])),
            ("b", TronValue::map([("c", TronValue::from("ok"))])),
        ]))
        .unwrap()
    }

    #[test]
    fn vacuum_strips_history() {
        let doc = sample_doc();
        let doc = doc.set_path(&path!["a", 1u32], &TronValue::from(9)).unwrap();
        let doc = doc.set_path(&path!["b", "c"], &TronValue::from("new")).unwrap();
        assert_ne!(doc.prev_root_addr(), 0);

        let clean = vacuum(&doc).unwrap();
        assert_eq!(clean.prev_root_addr(), 0);
        assert!(clean.len() < doc.len());
        assert_eq!(clean.decode().unwrap(), doc.decode().unwrap());
    }

    #[test]
    fn vacuum_is_idempotent() {
        let doc = sample_doc();
        let doc = doc.set_path(&path!["a", 0u32], &TronValue::from(7)).unwrap();
        let once = vacuum(&doc).unwrap();
        let twice = vacuum(&once).unwrap();
        assert_eq!(once.as_bytes(), twice.as_bytes());
    }

    #[test]
    fn vacuum_of_scalar_document() {
        let doc = Document::encode(&TronValue::from(5)).unwrap();
        let doc = doc.set_path(&[], &TronValue::from(6)).unwrap();
        let clean = vacuum(&doc).unwrap();
        assert_eq!(clean.decode().unwrap(), TronValue::I64(6));
        assert_eq!(clean.prev_root_addr(), 0);
        // reopens cleanly, including the scalar trailing-bytes check
        Document::from_slice(clean.as_bytes()).unwrap();
    }

    #[test]
    fn canonical_equals_reencode() {
        let doc = sample_doc();
        let doc = doc.set_path(&path!["a", 2u32], &TronValue::from(42)).unwrap();

        let canon = canonical(&doc).unwrap();
        let reencoded = Document::encode(&doc.decode().unwrap()).unwrap();
        assert_eq!(canon.as_bytes(), reencoded.as_bytes());
        assert_eq!(canon.prev_root_addr(), 0);
    }

    #[test]
    fn canonical_is_idempotent() {
        let doc = sample_doc();
        let doc = doc.set_path(&path!["b", "d"], &TronValue::from(1)).unwrap();
        let once = canonical(&doc).unwrap();
        let twice = canonical(&once).unwrap();
        assert_eq!(once.as_bytes(), twice.as_bytes());
    }

    #[test]
    fn vacuum_and_canonical_agree_on_content() {
        let doc = sample_doc();
        let doc = doc.set_path(&path!["a", 5u32], &TronValue::from(50)).unwrap();
        let vacuumed = vacuum(&doc).unwrap();
        let canon = canonical(&doc).unwrap();
        assert_eq!(vacuumed.decode().unwrap(), canon.decode().unwrap());
    }
}
