//! Materialize buffer contents into owned logical values.
//!
//! Decoding walks the whole subtree below an address; it is the full-eager
//! counterpart of the lazy view and the read half of `canonical`.

use std::collections::BTreeMap;

use crate::arr::{has_slot, rank};
use crate::error::{Error, Result};
use crate::hash::MAX_DEPTH;
use crate::model::TronValue;
use crate::value::{ArrNode, MapNode, TypedValue, Value};

/// Decode the value at `addr` into an owned [`TronValue`].
///
/// # Errors
///
/// Surfaces any wire-level error from the nodes reached, `type` for
/// non-txt map keys, and `depth` for over-deep hash branches.
pub fn decode_value(data: &[u8], addr: u32) -> Result<TronValue> {
    match Value::new(data, addr)?.typed()? {
        TypedValue::Nil => Ok(TronValue::Nil),
        TypedValue::Bool(b) => Ok(TronValue::Bool(b)),
        TypedValue::I64(n) => Ok(TronValue::I64(n)),
        TypedValue::F64(f) => Ok(TronValue::F64(f)),
        TypedValue::Str(s) => Ok(TronValue::Txt(s.to_string())),
        TypedValue::Bytes(b) => Ok(TronValue::Bin(b.to_vec())),
        TypedValue::Arr(node) => decode_arr(data, &node),
        TypedValue::Map(node) => {
            let mut out = BTreeMap::new();
            collect_map(data, &node, &mut out, 0)?;
            Ok(TronValue::Map(out))
        }
    }
}

fn decode_arr(data: &[u8], node: &ArrNode) -> Result<TronValue> {
    let length = node.length().ok_or(Error::Type {
        expected: "root array node",
        found: "child array node",
    })? as usize;
    let mut slots: Vec<Option<u32>> = vec![None; length];
    collect_arr(data, node, 0, &mut slots)?;

    let mut items = Vec::with_capacity(length);
    for slot in slots {
        items.push(match slot {
            Some(addr) => decode_value(data, addr)?,
            // sparse regions read as nil
            None => TronValue::Nil,
        });
    }
    Ok(TronValue::Arr(items))
}

/// Collect value addresses by logical index from an array subtree.
fn collect_arr(
    data: &[u8],
    node: &ArrNode,
    base: u32,
    slots: &mut [Option<u32>],
) -> Result<()> {
    let shift = node.shift();
    let bitmap = node.bitmap();
    for s in 0..16u32 {
        if !has_slot(bitmap, s) {
            continue;
        }
        let addr = node
            .entry_addr(rank(bitmap, s))
            .ok_or(Error::Len { addr: node.addr() })?;
        let index = base + (s << shift);
        if node.is_leaf() {
            // indices past the declared length are unreachable by contract
            if let Some(slot) = slots.get_mut(index as usize) {
                *slot = Some(addr);
            }
        } else {
            let child = ArrNode::parse(data, addr)?;
            collect_arr(data, &child, index, slots)?;
        }
    }
    Ok(())
}

/// Collect every `(key, value)` from a map subtree.
fn collect_map(
    data: &[u8],
    node: &MapNode,
    out: &mut BTreeMap<String, TronValue>,
    depth: u8,
) -> Result<()> {
    match node {
        MapNode::Leaf(leaf) => {
            for (key_addr, value_addr) in leaf.pairs() {
                let key = match Value::new(data, key_addr)?.typed()? {
                    TypedValue::Str(s) => s.to_string(),
                    other => {
                        return Err(Error::Type {
                            expected: "txt key",
                            found: other.type_name(),
                        });
                    }
                };
                out.insert(key, decode_value(data, value_addr)?);
            }
        }
        MapNode::Branch(branch) => {
            if depth >= MAX_DEPTH {
                return Err(Error::Depth);
            }
            for child_addr in branch.child_addrs() {
                let child = MapNode::parse(data, child_addr)?;
                collect_map(data, &child, out, depth + 1)?;
            }
        }
    }
    Ok(())
}
