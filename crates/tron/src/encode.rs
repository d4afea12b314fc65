//! Encoding: node serializers and the append-only document builder.
//!
//! The free functions serialize single nodes; [`Builder`] assembles whole
//! documents, appending descendants before parents so every parent can
//! reference its children by their final offsets.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::hash::{MAX_DEPTH, key_hash, nibble};
use crate::model::TronValue;
use crate::tag::{Tag, node_len_field, uint_le_bytes};

/// Encode a nil value (1 byte).
#[inline]
#[must_use]
pub fn encode_nil() -> [u8; 1] {
    [Tag::nil()]
}

/// Encode a boolean value (1 byte).
#[inline]
#[must_use]
pub fn encode_bool(value: bool) -> [u8; 1] {
    [Tag::bit(value)]
}

/// Encode an i64 value (9 bytes).
#[inline]
#[must_use]
pub fn encode_i64(value: i64) -> [u8; 9] {
    let mut buf = [0u8; 9];
    buf[0] = Tag::i64();
    buf[1..9].copy_from_slice(&value.to_le_bytes());
    buf
}

/// Encode an f64 value (9 bytes). Finiteness is enforced where arbitrary
/// values enter the builder, not here.
#[inline]
#[must_use]
pub fn encode_f64(value: f64) -> [u8; 9] {
    let mut buf = [0u8; 9];
    buf[0] = Tag::f64();
    buf[1..9].copy_from_slice(&value.to_le_bytes());
    buf
}

/// Encode a text value. Packed for payloads up to 15 bytes.
#[must_use]
pub fn encode_txt(s: &str) -> Vec<u8> {
    encode_blob(s.as_bytes(), true)
}

/// Encode a binary value. Packed for payloads up to 15 bytes.
#[must_use]
pub fn encode_bin(data: &[u8]) -> Vec<u8> {
    encode_blob(data, false)
}

fn encode_blob(data: &[u8], is_txt: bool) -> Vec<u8> {
    let len = data.len();
    if len <= 15 {
        let mut out = Vec::with_capacity(1 + len);
        out.push(Tag::blob_packed(is_txt, len as u8));
        out.extend_from_slice(data);
        out
    } else {
        let (n, len_bytes) = uint_le_bytes(len as u64);
        let mut out = Vec::with_capacity(1 + n + len);
        out.push(Tag::blob_extended(is_txt, n as u8));
        out.extend_from_slice(&len_bytes[..n]);
        out.extend_from_slice(data);
        out
    }
}

/// Encode a map leaf node from `(key_addr, value_addr)` pairs.
#[must_use]
pub fn encode_map_leaf(pairs: &[(u32, u32)]) -> Vec<u8> {
    let (mm, total) = node_len_field(pairs.len() * 8);
    let mut out = Vec::with_capacity(total as usize);
    out.push(Tag::map(true, (mm - 1) as u8));
    out.extend_from_slice(&total.to_le_bytes()[..mm]);
    for (key_addr, value_addr) in pairs {
        out.extend_from_slice(&key_addr.to_le_bytes());
        out.extend_from_slice(&value_addr.to_le_bytes());
    }
    out
}

/// Encode a map branch node from a slot bitmap and child addresses in rank
/// order.
#[must_use]
pub fn encode_map_branch(bitmap: u32, children: &[u32]) -> Vec<u8> {
    let (mm, total) = node_len_field(4 + children.len() * 4);
    let mut out = Vec::with_capacity(total as usize);
    out.push(Tag::map(false, (mm - 1) as u8));
    out.extend_from_slice(&total.to_le_bytes()[..mm]);
    out.extend_from_slice(&bitmap.to_le_bytes());
    for addr in children {
        out.extend_from_slice(&addr.to_le_bytes());
    }
    out
}

/// Encode an array leaf node. `length` must be given iff `is_root`.
#[must_use]
pub fn encode_arr_leaf(
    is_root: bool,
    shift: u8,
    bitmap: u16,
    length: Option<u32>,
    values: &[u32],
) -> Vec<u8> {
    encode_arr_node(is_root, true, shift, bitmap, length, values)
}

/// Encode an array branch node. `length` must be given iff `is_root`.
#[must_use]
pub fn encode_arr_branch(
    is_root: bool,
    shift: u8,
    bitmap: u16,
    length: Option<u32>,
    children: &[u32],
) -> Vec<u8> {
    encode_arr_node(is_root, false, shift, bitmap, length, children)
}

fn encode_arr_node(
    is_root: bool,
    is_leaf: bool,
    shift: u8,
    bitmap: u16,
    length: Option<u32>,
    addrs: &[u32],
) -> Vec<u8> {
    let length_bytes = if is_root { 4 } else { 0 };
    let (mm, total) = node_len_field(1 + 2 + length_bytes + addrs.len() * 4);
    let mut out = Vec::with_capacity(total as usize);
    out.push(Tag::arr(is_root, is_leaf, (mm - 1) as u8));
    out.extend_from_slice(&total.to_le_bytes()[..mm]);
    out.push(shift);
    out.extend_from_slice(&bitmap.to_le_bytes());
    if is_root {
        out.extend_from_slice(&length.unwrap_or(0).to_le_bytes());
    }
    for addr in addrs {
        out.extend_from_slice(&addr.to_le_bytes());
    }
    out
}

/// Append-only document builder.
///
/// Owns the growing byte vector; offsets handed out by [`Builder::append`]
/// are final. [`Builder::finish`] seals the buffer with a footer.
#[derive(Debug)]
pub struct Builder {
    buf: Vec<u8>,
}

impl Builder {
    /// Start a fresh document: magic header only.
    #[must_use]
    pub fn document() -> Self {
        Self {
            buf: b"TRON".to_vec(),
        }
    }

    /// Continue an existing buffer (the caller strips the old footer).
    /// Offsets of nodes already in `head` remain valid.
    #[must_use]
    pub fn resume(head: &[u8]) -> Self {
        Self { buf: head.to_vec() }
    }

    /// Next append address.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Bytes written so far (no footer).
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append raw node bytes, returning their start address.
    pub fn append(&mut self, bytes: &[u8]) -> u32 {
        let addr = self.addr();
        self.buf.extend_from_slice(bytes);
        addr
    }

    /// Seal the buffer with a footer and return it.
    #[must_use]
    pub fn finish(mut self, root: u32, prev_root: u32) -> Vec<u8> {
        self.buf.extend_from_slice(&root.to_le_bytes());
        self.buf.extend_from_slice(&prev_root.to_le_bytes());
        self.buf
    }

    /// Append the canonical encoding of a value, returning its address.
    ///
    /// Containers are built bottom-up: for arrays, element values first,
    /// then the radix tree; for maps, keys and values first, then the hash
    /// tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonFinite`] for NaN or infinite f64 payloads. No
    /// buffer is ever returned for a failed encode.
    pub fn append_value(&mut self, value: &TronValue) -> Result<u32> {
        match value {
            TronValue::Nil => Ok(self.append(&encode_nil())),
            TronValue::Bool(b) => Ok(self.append(&encode_bool(*b))),
            TronValue::I64(n) => Ok(self.append(&encode_i64(*n))),
            TronValue::F64(f) => {
                if !f.is_finite() {
                    return Err(Error::NonFinite(*f));
                }
                Ok(self.append(&encode_f64(*f)))
            }
            TronValue::Txt(s) => Ok(self.append(&encode_txt(s))),
            TronValue::Bin(b) => Ok(self.append(&encode_bin(b))),
            TronValue::Arr(items) => self.build_arr(items),
            TronValue::Map(entries) => self.build_map(entries),
        }
    }

    fn build_arr(&mut self, items: &[TronValue]) -> Result<u32> {
        if items.is_empty() {
            return Ok(self.append(&encode_arr_leaf(true, 0, 0, Some(0), &[])));
        }
        let length = items.len() as u32;
        let shift = crate::arr::required_shift(length);
        let mut addrs = Vec::with_capacity(items.len());
        for item in items {
            addrs.push(self.append_value(item)?);
        }
        Ok(self.build_arr_tree(true, shift, &addrs, 0, length))
    }

    /// Build the radix tree over already-appended values covering the dense
    /// index range starting at `base`.
    fn build_arr_tree(
        &mut self,
        is_root: bool,
        shift: u8,
        addrs: &[u32],
        base: u32,
        length: u32,
    ) -> u32 {
        // Consecutive indices bucket into runs per slot at this level.
        let mut buckets: Vec<(u32, Vec<u32>)> = Vec::new();
        for (i, &addr) in addrs.iter().enumerate() {
            let slot = ((base + i as u32) >> shift) & 0xF;
            match buckets.last_mut() {
                Some((s, run)) if *s == slot => run.push(addr),
                _ => buckets.push((slot, vec![addr])),
            }
        }
        let bitmap: u16 = buckets.iter().fold(0, |b, (s, _)| b | (1 << s));
        let len = is_root.then_some(length);

        if shift == 0 {
            let entries: Vec<u32> = buckets.iter().map(|(_, run)| run[0]).collect();
            self.append(&encode_arr_leaf(is_root, 0, bitmap, len, &entries))
        } else {
            let mut children = Vec::with_capacity(buckets.len());
            for (slot, run) in &buckets {
                let child_base = base + (slot << shift);
                children.push(self.build_arr_tree(false, shift - 4, run, child_base, length));
            }
            self.append(&encode_arr_branch(is_root, shift, bitmap, len, &children))
        }
    }

    fn build_map(&mut self, map: &BTreeMap<String, TronValue>) -> Result<u32> {
        if map.is_empty() {
            return Ok(self.append(&encode_map_leaf(&[])));
        }
        let entries: Vec<(&str, u32, &TronValue)> = map
            .iter()
            .map(|(k, v)| (k.as_str(), key_hash(k.as_bytes()), v))
            .collect();
        self.build_map_tree(&entries, 0)
    }

    /// Build a hash-trie node over the given entries.
    ///
    /// A single entry (or any set at maximum depth) becomes a leaf sorted
    /// by raw key bytes; otherwise entries group by the hash nibble at this
    /// depth into a branch, one child per occupied slot. A lone occupied
    /// slot still produces a one-slot branch.
    fn build_map_tree(&mut self, entries: &[(&str, u32, &TronValue)], depth: u8) -> Result<u32> {
        if entries.len() <= 1 || depth >= MAX_DEPTH {
            let mut sorted = entries.to_vec();
            sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            let mut pairs = Vec::with_capacity(sorted.len());
            for (key, _, value) in sorted {
                let key_addr = self.append(&encode_txt(key));
                let value_addr = self.append_value(value)?;
                pairs.push((key_addr, value_addr));
            }
            return Ok(self.append(&encode_map_leaf(&pairs)));
        }

        let mut slots: BTreeMap<u32, Vec<(&str, u32, &TronValue)>> = BTreeMap::new();
        for entry in entries {
            slots.entry(nibble(entry.1, depth)).or_default().push(*entry);
        }
        let mut bitmap = 0u32;
        let mut children = Vec::with_capacity(slots.len());
        for (slot, bucket) in &slots {
            bitmap |= 1 << slot;
            children.push(self.build_map_tree(bucket, depth + 1)?);
        }
        Ok(self.append(&encode_map_branch(bitmap, &children)))
    }
}
