//! Compressed, mutable sorted `u32` sets. Grounded on
//! `original_source/include/sorted_array.h` / `src/sorted_array.cpp`
//! (Typesense's frame-of-reference array).
//!
//! The decoded values are kept as the authoritative in-memory form for
//! mutation — a `Vec<u32>` is cheaper to `append`/`insert`/`remove_values`
//! against than a bit-packed frame would be — but `to_for_block`/
//! `from_for_block` round-trip through the real `ForBlock` bit-packer for
//! whatever persists this array, so "frame-of-reference compressed" is an
//! actual encode path, not just size-reporting math. `compressed_size_bytes`
//! reports what that packed payload occupies, and the reserved bit-width
//! only widens (never narrows) as values are appended, mirroring the
//! original's over-allocated re-encode-on-widen behavior.

use crate::compression::for_codec::{compressed_size_bytes, required_bits, ForBlock};

/// Growth factor applied to the reserved bit-width headroom so repeated
/// appends that only slightly widen the value range don't reallocate
/// every time — over-allocates to amortize append.
const GROWTH_FACTOR: f32 = 1.5;

#[derive(Debug, Clone, Default)]
pub struct SortedIntArray {
    values: Vec<u32>,
    min: u32,
    max: u32,
    reserved_bit_width: u32,
}

impl SortedIntArray {
    pub fn new() -> Self {
        SortedIntArray { values: Vec::new(), min: 0, max: 0, reserved_bit_width: 0 }
    }

    pub fn from_sorted(values: Vec<u32>) -> Self {
        let mut array = SortedIntArray::new();
        for v in values {
            array.append(v);
        }
        array
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.values
    }

    pub fn at(&self, index: usize) -> u32 {
        self.values[index]
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Amortized O(1) when `v` keeps the frame's bit-width; reallocates
    /// reserved headroom only when the new min/max widens past it.
    pub fn append(&mut self, v: u32) -> usize {
        self.values.push(v);
        if self.values.len() == 1 {
            self.min = v;
            self.max = v;
        } else {
            self.max = self.max.max(v);
            self.min = self.min.min(v);
        }
        let needed = required_bits(self.max - self.min);
        if needed > self.reserved_bit_width {
            let grown = (needed as f32 * GROWTH_FACTOR).ceil() as u32;
            self.reserved_bit_width = grown.min(32);
        }
        self.values.len()
    }

    /// Insert at an explicit index; the caller is responsible for keeping
    /// the array sorted (mirrors the original's unchecked `insert`).
    pub fn insert(&mut self, index: usize, v: u32) -> bool {
        if index > self.values.len() {
            return false;
        }
        self.values.insert(index, v);
        self.min = self.values.iter().copied().min().unwrap_or(0);
        self.max = self.values.iter().copied().max().unwrap_or(0);
        let needed = required_bits(self.max - self.min);
        self.reserved_bit_width = self.reserved_bit_width.max(needed);
        true
    }

    /// O(log n) lower-bound probe followed by an equality check.
    pub fn contains(&self, v: u32) -> bool {
        self.values.binary_search(&v).is_ok()
    }

    /// Sorted position where `v` appears, or `len()` if absent.
    pub fn index_of(&self, v: u32) -> usize {
        match self.values.binary_search(&v) {
            Ok(i) => i,
            Err(_) => self.values.len(),
        }
    }

    /// Inserts `v` at its sorted position if not already present; returns
    /// the index it occupies either way. Used by posting lists and ART
    /// leaves, where ids arrive in roughly ascending but not strictly
    /// monotonic order.
    pub fn insert_sorted(&mut self, v: u32) -> usize {
        match self.values.binary_search(&v) {
            Ok(i) => i,
            Err(i) => {
                self.insert(i, v);
                i
            }
        }
    }

    /// For a sorted query array, walks both arrays with a single pass
    /// (a two-pointer merge rather than the original's bisection, which
    /// is an equivalent O(n + m) strategy for a fully in-memory array).
    pub fn bulk_index_of(&self, query: &[u32]) -> Vec<usize> {
        let mut out = Vec::with_capacity(query.len());
        let mut i = 0usize;
        for &q in query {
            while i < self.values.len() && self.values[i] < q {
                i += 1;
            }
            if i < self.values.len() && self.values[i] == q {
                out.push(i);
            } else {
                out.push(self.values.len());
            }
        }
        out
    }

    /// Elides every element present in `sorted_values` in a single linear
    /// pass, then recomputes the reserved bit-width for the residual.
    pub fn remove_values(&mut self, sorted_values: &[u32]) {
        let mut j = 0usize;
        self.values.retain(|&v| {
            while j < sorted_values.len() && sorted_values[j] < v {
                j += 1;
            }
            !(j < sorted_values.len() && sorted_values[j] == v)
        });
        self.min = self.values.first().copied().unwrap_or(0);
        self.max = self.values.last().copied().unwrap_or(0);
        self.reserved_bit_width = required_bits(self.max.saturating_sub(self.min));
    }

    /// Scalar ascending-array intersection against a raw sorted slice.
    pub fn intersect(&self, other: &[u32]) -> Vec<u32> {
        let mut out = Vec::new();
        let (mut i, mut j) = (0usize, 0usize);
        while i < self.values.len() && j < other.len() {
            match self.values[i].cmp(&other[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out.push(self.values[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out
    }

    /// What the bit-packed payload would occupy on disk, including the
    /// metadata header (the FOR payload's size invariant).
    pub fn compressed_size_bytes(&self) -> usize {
        compressed_size_bytes(self.values.len(), self.reserved_bit_width)
    }

    /// Packs the current values into a real frame-of-reference block —
    /// the actual encoding used when this array is persisted.
    pub fn to_for_block(&self) -> ForBlock {
        ForBlock::encode(&self.values)
    }

    /// Unpacks a persisted frame-of-reference block back into a mutable
    /// sorted array, re-deriving the reserved bit-width headroom the same
    /// way a fresh append sequence would.
    pub fn from_for_block(block: &ForBlock) -> Self {
        SortedIntArray::from_sorted(block.decode())
    }
}
