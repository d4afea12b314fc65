//! Hash-trie operations for TRON maps.
//!
//! Entries are placed by xxh32 of the key bytes, 4 bits per level. Lookup
//! touches only the nodes on the hash path and stops at the first
//! byte-equal key in the reached leaf. The write half re-appends the path
//! from root to the affected leaf; sibling offsets are reused verbatim.

use std::collections::BTreeMap;

use crate::encode::{Builder, encode_map_branch, encode_map_leaf, encode_txt};
use crate::error::{Error, Result};
use crate::hash::{MAX_DEPTH, key_hash, nibble};
use crate::value::{MapNode, TypedValue, Value};

/// Raw bytes of a key node. Map keys must be txt.
fn key_bytes(data: &[u8], key_addr: u32) -> Result<&[u8]> {
    match Value::new(data, key_addr)?.typed()? {
        TypedValue::Str(s) => Ok(s.as_bytes()),
        other => Err(Error::Type {
            expected: "txt key",
            found: other.type_name(),
        }),
    }
}

/// Look up the value address for `key`.
///
/// # Errors
///
/// Returns `off`/`len` errors for malformed nodes, `type` for a non-txt
/// key node, and `depth` when a branch chain outruns the hash.
pub fn get(data: &[u8], node_addr: u32, key: &str) -> Result<Option<u32>> {
    get_hashed(data, node_addr, key.as_bytes(), key_hash(key.as_bytes()))
}

/// Hash-supplied variant of [`get`], for callers that memoize key hashes.
pub(crate) fn get_hashed(
    data: &[u8],
    node_addr: u32,
    key: &[u8],
    hash: u32,
) -> Result<Option<u32>> {
    let mut addr = node_addr;
    let mut depth = 0u8;
    loop {
        match MapNode::parse(data, addr)? {
            MapNode::Branch(branch) => {
                if depth >= MAX_DEPTH {
                    return Err(Error::Depth);
                }
                let s = nibble(hash, depth);
                if !branch.has_slot(s) {
                    return Ok(None);
                }
                addr = branch
                    .child_addr(branch.rank(s))
                    .ok_or(Error::Len { addr })?;
                depth += 1;
            }
            MapNode::Leaf(leaf) => {
                for (key_addr, value_addr) in leaf.pairs() {
                    if key_bytes(data, key_addr)? == key {
                        return Ok(Some(value_addr));
                    }
                }
                return Ok(None);
            }
        }
    }
}

/// Install `value_addr` under `key`, returning the new map root address.
pub(crate) fn set(b: &mut Builder, node_addr: u32, key: &str, value_addr: u32) -> Result<u32> {
    set_in(b, node_addr, key, key_hash(key.as_bytes()), value_addr, 0)
}

enum Snapshot {
    Branch { bitmap: u32, children: Vec<u32> },
    Leaf { pairs: Vec<(u32, u32)> },
}

fn set_in(
    b: &mut Builder,
    node_addr: u32,
    key: &str,
    hash: u32,
    value_addr: u32,
    depth: u8,
) -> Result<u32> {
    // Snapshot the node before the builder grows underneath it.
    let snapshot = match MapNode::parse(b.bytes(), node_addr)? {
        MapNode::Branch(branch) => Snapshot::Branch {
            bitmap: branch.bitmap(),
            children: branch.child_addrs().collect(),
        },
        MapNode::Leaf(leaf) => Snapshot::Leaf {
            pairs: leaf.pairs().collect(),
        },
    };

    match snapshot {
        Snapshot::Branch {
            bitmap,
            mut children,
        } => {
            if depth >= MAX_DEPTH {
                return Err(Error::Depth);
            }
            let s = nibble(hash, depth);
            if (bitmap >> s) & 1 == 1 {
                let idx = (bitmap & ((1u32 << s) - 1)).count_ones() as usize;
                let new_child = set_in(b, children[idx], key, hash, value_addr, depth + 1)?;
                children[idx] = new_child;
                Ok(b.append(&encode_map_branch(bitmap, &children)))
            } else {
                // Empty slot: a fresh single-entry leaf one level down.
                let key_addr = b.append(&encode_txt(key));
                let leaf = b.append(&encode_map_leaf(&[(key_addr, value_addr)]));
                let new_bitmap = bitmap | (1u32 << s);
                let idx = (new_bitmap & ((1u32 << s) - 1)).count_ones() as usize;
                children.insert(idx, leaf);
                Ok(b.append(&encode_map_branch(new_bitmap, &children)))
            }
        }
        Snapshot::Leaf { mut pairs } => {
            let mut existing = None;
            for (i, (key_addr, _)) in pairs.iter().enumerate() {
                if key_bytes(b.bytes(), *key_addr)? == key.as_bytes() {
                    existing = Some(i);
                    break;
                }
            }
            if let Some(i) = existing {
                // Same key: the key offset is reused, only the value moves.
                pairs[i].1 = value_addr;
                return Ok(b.append(&encode_map_leaf(&pairs)));
            }
            if pairs.is_empty() {
                let key_addr = b.append(&encode_txt(key));
                return Ok(b.append(&encode_map_leaf(&[(key_addr, value_addr)])));
            }
            // New key joins an occupied leaf: rebuild this subtree from the
            // full entry set, reusing existing key and value offsets.
            let mut entries = Vec::with_capacity(pairs.len() + 1);
            for (key_addr, val_addr) in pairs {
                let bytes = key_bytes(b.bytes(), key_addr)?.to_vec();
                let hash = key_hash(&bytes);
                entries.push(Entry {
                    bytes,
                    hash,
                    key_addr,
                    value_addr: val_addr,
                });
            }
            let key_addr = b.append(&encode_txt(key));
            entries.push(Entry {
                bytes: key.as_bytes().to_vec(),
                hash,
                key_addr,
                value_addr,
            });
            rebuild(b, entries, depth)
        }
    }
}

/// An already-encoded map entry carried through a subtree rebuild.
struct Entry {
    bytes: Vec<u8>,
    hash: u32,
    key_addr: u32,
    value_addr: u32,
}

/// Rebuild a subtree over already-encoded entries, mirroring the canonical
/// builder's shape rules.
fn rebuild(b: &mut Builder, mut entries: Vec<Entry>, depth: u8) -> Result<u32> {
    if entries.len() <= 1 || depth >= MAX_DEPTH {
        entries.sort_by(|a, b| a.bytes.cmp(&b.bytes));
        let pairs: Vec<(u32, u32)> = entries.iter().map(|e| (e.key_addr, e.value_addr)).collect();
        return Ok(b.append(&encode_map_leaf(&pairs)));
    }
    let mut slots: BTreeMap<u32, Vec<Entry>> = BTreeMap::new();
    for entry in entries {
        slots.entry(nibble(entry.hash, depth)).or_default().push(entry);
    }
    let mut bitmap = 0u32;
    let mut children = Vec::with_capacity(slots.len());
    for (slot, bucket) in slots {
        bitmap |= 1u32 << slot;
        children.push(rebuild(b, bucket, depth + 1)?);
    }
    Ok(b.append(&encode_map_branch(bitmap, &children)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TronValue;
    use crate::value::{TypedValue, Value};

    fn map_builder(entries: &[(&str, i64)]) -> (Builder, u32) {
        let mut b = Builder::document();
        let value = TronValue::map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), TronValue::I64(*v))),
        );
        let root = b.append_value(&value).unwrap();
        (b, root)
    }

    fn read_i64(data: &[u8], addr: u32) -> i64 {
        match Value::new(data, addr).unwrap().typed().unwrap() {
            TypedValue::I64(n) => n,
            other => panic!("expected i64, got {other:?}"),
        }
    }

    #[test]
    fn get_finds_every_key() {
        let entries: Vec<(String, i64)> = (0..50).map(|i| (format!("key{i}"), i)).collect();
        let refs: Vec<(&str, i64)> = entries.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let (b, root) = map_builder(&refs);

        for (k, v) in &refs {
            let addr = get(b.bytes(), root, k).unwrap().unwrap_or_else(|| panic!("missing {k}"));
            assert_eq!(read_i64(b.bytes(), addr), *v);
        }
        assert_eq!(get(b.bytes(), root, "absent").unwrap(), None);
    }

    #[test]
    fn get_on_empty_map() {
        let (b, root) = map_builder(&[]);
        assert_eq!(get(b.bytes(), root, "anything").unwrap(), None);
    }

    #[test]
    fn set_into_empty_map() {
        let (mut b, root) = map_builder(&[]);
        let val = b.append(&crate::encode::encode_i64(1));
        let new_root = set(&mut b, root, "a", val).unwrap();

        let addr = get(b.bytes(), new_root, "a").unwrap().unwrap();
        assert_eq!(read_i64(b.bytes(), addr), 1);
        // original root unchanged
        assert_eq!(get(b.bytes(), root, "a").unwrap(), None);
    }

    #[test]
    fn set_replaces_value_keeping_key_offset() {
        let (mut b, root) = map_builder(&[("a", 1), ("b", 2)]);
        let old_a = get(b.bytes(), root, "a").unwrap().unwrap();
        let val = b.append(&crate::encode::encode_i64(99));
        let new_root = set(&mut b, root, "a", val).unwrap();

        let addr = get(b.bytes(), new_root, "a").unwrap().unwrap();
        assert_eq!(read_i64(b.bytes(), addr), 99);
        let addr = get(b.bytes(), new_root, "b").unwrap().unwrap();
        assert_eq!(read_i64(b.bytes(), addr), 2);
        // the old value is still reachable through the old root
        assert_eq!(read_i64(b.bytes(), old_a), 1);
    }

    #[test]
    fn set_accumulates_many_keys() {
        let (mut b, mut root) = map_builder(&[]);
        for i in 0..40i64 {
            let key = format!("k{i}");
            let val = b.append(&crate::encode::encode_i64(i));
            root = set(&mut b, root, &key, val).unwrap();
        }
        for i in 0..40i64 {
            let key = format!("k{i}");
            let addr = get(b.bytes(), root, &key).unwrap().unwrap_or_else(|| panic!("missing {key}"));
            assert_eq!(read_i64(b.bytes(), addr), i);
        }
    }

    #[test]
    fn rebuild_at_max_depth_sorts_by_key_bytes() {
        let mut b = Builder::document();
        let ka = b.append(&encode_txt("zz"));
        let va = b.append(&crate::encode::encode_i64(1));
        let kb = b.append(&encode_txt("aa"));
        let vb = b.append(&crate::encode::encode_i64(2));
        let kc = b.append(&encode_txt("a")); // prefix of "aa", sorts first
        let vc = b.append(&crate::encode::encode_i64(3));
        let entries = vec![
            Entry { bytes: b"zz".to_vec(), hash: key_hash(b"zz"), key_addr: ka, value_addr: va },
            Entry { bytes: b"aa".to_vec(), hash: key_hash(b"aa"), key_addr: kb, value_addr: vb },
            Entry { bytes: b"a".to_vec(), hash: key_hash(b"a"), key_addr: kc, value_addr: vc },
        ];
        let leaf_addr = rebuild(&mut b, entries, MAX_DEPTH).unwrap();
        match MapNode::parse(b.bytes(), leaf_addr).unwrap() {
            MapNode::Leaf(leaf) => {
                let pairs: Vec<_> = leaf.pairs().collect();
                assert_eq!(pairs, vec![(kc, vc), (kb, vb), (ka, va)]);
            }
            MapNode::Branch(_) => panic!("expected collision leaf"),
        }
    }
}
