// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::io::Cursor;
use std::io::Read;

use byteorder::ReadBytesExt;
use byteorder::LE;

use crate::codec::truncated;
use crate::codec::Family;
use crate::codec::SketchBytes;
use crate::error::Error;
use crate::hash;
use crate::hash::DEFAULT_UPDATE_SEED;

const PREAMBLE_LONGS: u8 = 4;
const SERIAL_VERSION: u8 = 1;

// The check hash must be independent of the index pair, which burns
// seed and seed + 1.
const CHECK_HASH_SEED_TWEAK: u64 = 2;

const MAX_NUM_CELLS: u64 = 1u64 << 28;
const MAX_ELEM_LEN: u32 = 1u32 << 16;

/// Membership verdict of an IBLT lookup.
///
/// Unlike a Bloom filter, an IBLT can sometimes prove presence (a pure
/// cell naming the element) or absence (a cell the element hashes to that
/// holds nothing), but cells shared with other elements leave it undecided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// A pure cell names exactly this element.
    Present,
    /// Some cell the element hashes to cannot contain it.
    Absent,
    /// The hashed cells are shared; no verdict.
    Maybe,
}

/// Outcome of decoding a subtracted table.
///
/// Decoding is best effort: `success` is true when every cell was peeled
/// to zero, otherwise the vectors hold whatever could be recovered before
/// the peeling stalled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeResult {
    /// True when the whole table decoded to zero.
    pub success: bool,
    /// Elements present in the left operand of the subtraction only.
    pub additional: Vec<Vec<u8>>,
    /// Elements present in the right operand of the subtraction only.
    pub missing: Vec<Vec<u8>>,
}

/// Outcome of listing the entries of a table in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResult {
    /// True when every cell was peeled to zero.
    pub success: bool,
    /// The recovered elements.
    pub entries: Vec<Vec<u8>>,
}

/// An invertible Bloom lookup table over fixed-length byte elements.
///
/// Every element is XOR-accumulated into `k` distinct cells of `m`, each
/// cell tracking a signed count, the XOR of element bytes, and the XOR of
/// a per-element check hash. Insertion and removal are exact inverses, and
/// two tables of identical shape subtract cell-wise into a table of their
/// set difference.
#[derive(Debug, Clone, PartialEq)]
pub struct InvertibleBloomFilter {
    seed: u64,
    /// Cells per element (k).
    num_hashes: u8,
    /// Cell count (m).
    num_cells: u64,
    /// Fixed element length in bytes (L).
    elem_len: u32,
    counts: Vec<i32>,
    hash_sums: Vec<u32>,
    /// Flat `m * L` XOR accumulator of element bytes.
    id_sums: Vec<u8>,
}

impl InvertibleBloomFilter {
    /// Creates a table with `num_cells` cells, `num_hashes` cells per
    /// element, and a fixed element length of `elem_len` bytes.
    ///
    /// For reconciliation, size the table at 1.5x or more of the expected
    /// symmetric difference and use at least 3 hashes.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if any dimension is 0, `num_hashes` exceeds `num_cells`, or the
    /// table exceeds the supported size.
    pub fn new(num_cells: u64, num_hashes: u8, elem_len: u32) -> Result<Self, Error> {
        Self::with_seed(num_cells, num_hashes, elem_len, DEFAULT_UPDATE_SEED)
    }

    /// Creates a table with a custom seed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`new`](Self::new).
    pub fn with_seed(
        num_cells: u64,
        num_hashes: u8,
        elem_len: u32,
        seed: u64,
    ) -> Result<Self, Error> {
        validate_shape(num_cells, num_hashes, elem_len)?;
        Ok(InvertibleBloomFilter {
            seed,
            num_hashes,
            num_cells,
            elem_len,
            counts: vec![0i32; num_cells as usize],
            hash_sums: vec![0u32; num_cells as usize],
            id_sums: vec![0u8; (num_cells * elem_len as u64) as usize],
        })
    }

    // ========================================================================
    // Update Operations
    // ========================================================================

    /// Inserts an element.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if the element length differs from the declared length.
    pub fn insert(&mut self, item: impl AsRef<[u8]>) -> Result<(), Error> {
        let item = self.checked_item(item.as_ref())?;
        self.apply_everywhere(&item, 1);
        Ok(())
    }

    /// Removes an element: the exact XOR inverse of [`insert`](Self::insert),
    /// whether or not the element was ever inserted. Removing an absent
    /// element drives its cells negative, which is what records "missing"
    /// elements during reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if the element length differs from the declared length.
    pub fn remove(&mut self, item: impl AsRef<[u8]>) -> Result<(), Error> {
        let item = self.checked_item(item.as_ref())?;
        self.apply_everywhere(&item, -1);
        Ok(())
    }

    fn checked_item(&self, item: &[u8]) -> Result<Vec<u8>, Error> {
        if item.len() != self.elem_len as usize {
            return Err(Error::invalid_argument("element length differs from the table's")
                .with_context("expected", self.elem_len)
                .with_context("actual", item.len()));
        }
        Ok(item.to_vec())
    }

    /// XORs `item` into (or out of) each of its hashed cells, adjusting
    /// counts by `delta`.
    fn apply_everywhere(&mut self, item: &[u8], delta: i32) {
        let check = self.check_hash(item);
        for cell in self.cell_indices(item) {
            self.apply(cell as usize, item, check, delta);
        }
    }

    fn apply(&mut self, cell: usize, item: &[u8], check: u32, delta: i32) {
        self.counts[cell] = self.counts[cell].wrapping_add(delta);
        self.hash_sums[cell] ^= check;
        let start = cell * self.elem_len as usize;
        for (accumulated, byte) in self.id_sums[start..start + self.elem_len as usize]
            .iter_mut()
            .zip(item)
        {
            *accumulated ^= byte;
        }
    }

    fn cell_indices(&self, item: &[u8]) -> Vec<u64> {
        let (h1, h2) = hash::hash_twice(item, self.seed);
        hash::distinct_indices(h1, h2, self.num_cells, self.num_hashes as usize)
    }

    fn check_hash(&self, item: &[u8]) -> u32 {
        hash::xxhash64(item, self.seed.wrapping_add(CHECK_HASH_SEED_TWEAK)) as u32
    }

    // ========================================================================
    // Query Operations
    // ========================================================================

    /// Looks up an element.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if the element length differs from the declared length.
    pub fn membership(&self, item: impl AsRef<[u8]>) -> Result<Membership, Error> {
        let item = self.checked_item(item.as_ref())?;
        let cells = self.cell_indices(&item);

        let all_zero = cells.iter().all(|&cell| self.cell_is_zero(cell as usize));
        if all_zero {
            return Ok(Membership::Absent);
        }
        if cells
            .iter()
            .any(|&cell| self.is_pure(cell as usize) && self.id_sum_at(cell as usize) == item.as_slice())
        {
            return Ok(Membership::Present);
        }
        if cells.iter().any(|&cell| self.counts[cell as usize] == 0) {
            return Ok(Membership::Absent);
        }
        Ok(Membership::Maybe)
    }

    /// Returns true when every cell is zero.
    pub fn is_empty(&self) -> bool {
        (0..self.num_cells as usize).all(|cell| self.cell_is_zero(cell))
    }

    fn cell_is_zero(&self, cell: usize) -> bool {
        self.counts[cell] == 0
            && self.hash_sums[cell] == 0
            && self.id_sum_at(cell).iter().all(|&byte| byte == 0)
    }

    /// A pure cell holds exactly one element: unit count and a matching
    /// check hash.
    fn is_pure(&self, cell: usize) -> bool {
        let count = self.counts[cell];
        (count == 1 || count == -1) && self.check_hash(self.id_sum_at(cell)) == self.hash_sums[cell]
    }

    fn id_sum_at(&self, cell: usize) -> &[u8] {
        let start = cell * self.elem_len as usize;
        &self.id_sums[start..start + self.elem_len as usize]
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Subtracts another table cell-wise into a new table.
    ///
    /// The result encodes the set difference: elements only in `self` sit
    /// at positive counts, elements only in `other` at negative counts.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Incompatible`](crate::error::ErrorKind::Incompatible)
    /// if the tables differ in cell count, hash count, element length, or
    /// seed.
    pub fn subtract(&self, other: &InvertibleBloomFilter) -> Result<InvertibleBloomFilter, Error> {
        if !self.is_compatible(other) {
            return Err(Error::incompatible("table shapes or seeds differ")
                .with_context("num_cells", format!("{} vs {}", self.num_cells, other.num_cells))
                .with_context(
                    "num_hashes",
                    format!("{} vs {}", self.num_hashes, other.num_hashes),
                )
                .with_context("elem_len", format!("{} vs {}", self.elem_len, other.elem_len))
                .with_context("seed", format!("{} vs {}", self.seed, other.seed)));
        }

        let mut result = self.clone();
        for (dst, src) in result.counts.iter_mut().zip(other.counts.iter()) {
            *dst = dst.wrapping_sub(*src);
        }
        for (dst, src) in result.hash_sums.iter_mut().zip(other.hash_sums.iter()) {
            *dst ^= src;
        }
        for (dst, src) in result.id_sums.iter_mut().zip(other.id_sums.iter()) {
            *dst ^= src;
        }
        Ok(result)
    }

    /// Decodes a subtracted table by peeling pure cells.
    ///
    /// Every peel removes one recovered element from all of its cells,
    /// which can turn further cells pure; the loop runs until no pure cell
    /// remains. Peeling commutes, so any processing order recovers the
    /// same elements.
    ///
    /// Returns the recovered symmetric difference. On a table too small
    /// for the true difference `success` is false and the vectors hold the
    /// partial recovery.
    pub fn decode(&self) -> DecodeResult {
        let mut work = self.clone();
        let mut additional = Vec::new();
        let mut missing = Vec::new();

        let mut pending: Vec<usize> =
            (0..work.num_cells as usize).filter(|&cell| work.is_pure(cell)).collect();

        while let Some(cell) = pending.pop() {
            // A peel may have consumed this cell since it was queued.
            if !work.is_pure(cell) {
                continue;
            }

            let count = work.counts[cell];
            let item = work.id_sum_at(cell).to_vec();
            if count == 1 {
                additional.push(item.clone());
            } else {
                missing.push(item.clone());
            }

            let check = work.check_hash(&item);
            for touched in work.cell_indices(&item) {
                work.apply(touched as usize, &item, check, -count);
                if work.is_pure(touched as usize) {
                    pending.push(touched as usize);
                }
            }
        }

        DecodeResult {
            success: work.is_empty(),
            additional,
            missing,
        }
    }

    /// Lists the elements of the table by peeling it in place.
    ///
    /// Returns the recovered elements; `success` is false when cells
    /// remained that could not be peeled, in which case the listing is
    /// partial.
    pub fn list_entries(&self) -> ListResult {
        let decoded = self.decode();
        ListResult {
            success: decoded.success,
            entries: decoded.additional,
        }
    }

    // ========================================================================
    // Statistics and Properties
    // ========================================================================

    /// Returns the cell count (m).
    pub fn num_cells(&self) -> u64 {
        self.num_cells
    }

    /// Returns the number of cells each element hashes to (k).
    pub fn num_hashes(&self) -> u8 {
        self.num_hashes
    }

    /// Returns the fixed element length in bytes (L).
    pub fn elem_len(&self) -> u32 {
        self.elem_len
    }

    /// Returns the hash seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Replaces the hash seed.
    ///
    /// Reseeding an occupied table invalidates its contents.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Checks if two tables are comparable: same shape and seed.
    pub fn is_compatible(&self, other: &InvertibleBloomFilter) -> bool {
        self.num_cells == other.num_cells
            && self.num_hashes == other.num_hashes
            && self.elem_len == other.elem_len
            && self.seed == other.seed
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serializes the table to a byte vector: the three cell arrays are
    /// written in parallel, counts first.
    pub fn serialize(&self) -> Vec<u8> {
        let payload = self.counts.len() * 4 + self.hash_sums.len() * 4 + self.id_sums.len();
        let mut bytes = SketchBytes::with_capacity(8 * PREAMBLE_LONGS as usize + payload);

        bytes.write_u8(PREAMBLE_LONGS);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::IBLT.id);
        bytes.write_u8(0); // flags unused
        bytes.write_u8(self.num_hashes);
        bytes.write_u8(0); // reserved
        bytes.write_u16_le(0); // reserved
        bytes.write_u32_le(self.elem_len);
        bytes.write_u32_le(0); // reserved
        bytes.write_u64_le(self.num_cells);
        bytes.write_u64_le(self.seed);

        for &count in &self.counts {
            bytes.write_i32_le(count);
        }
        for &hash_sum in &self.hash_sums {
            bytes.write_u32_le(hash_sum);
        }
        bytes.write(&self.id_sums);

        bytes.into_bytes()
    }

    /// Deserializes a table from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidData`](crate::error::ErrorKind::InvalidData)
    /// if the data is truncated, carries another family's tag, or declares
    /// an unsupported version or shape.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = Cursor::new(bytes);
        let preamble_longs = cursor.read_u8().map_err(truncated("preamble_longs"))?;
        let serial_version = cursor.read_u8().map_err(truncated("serial_version"))?;
        let family_id = cursor.read_u8().map_err(truncated("family_id"))?;
        cursor.read_u8().map_err(truncated("flags"))?;

        Family::IBLT.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        if preamble_longs != PREAMBLE_LONGS {
            return Err(Error::invalid_preamble_longs(PREAMBLE_LONGS, preamble_longs));
        }

        let num_hashes = cursor.read_u8().map_err(truncated("num_hashes"))?;
        cursor.read_u8().map_err(truncated("reserved"))?;
        cursor.read_u16::<LE>().map_err(truncated("reserved"))?;
        let elem_len = cursor.read_u32::<LE>().map_err(truncated("elem_len"))?;
        cursor.read_u32::<LE>().map_err(truncated("reserved"))?;
        let num_cells = cursor.read_u64::<LE>().map_err(truncated("num_cells"))?;
        let seed = cursor.read_u64::<LE>().map_err(truncated("seed"))?;

        validate_shape(num_cells, num_hashes, elem_len).map_err(|err| {
            Error::deserial(format!("invalid table shape: {}", err.message()))
        })?;

        let mut table = Self::with_seed(num_cells, num_hashes, elem_len, seed)?;
        for count in table.counts.iter_mut() {
            *count = cursor.read_i32::<LE>().map_err(truncated("counts"))?;
        }
        for hash_sum in table.hash_sums.iter_mut() {
            *hash_sum = cursor.read_u32::<LE>().map_err(truncated("hash_sums"))?;
        }
        cursor
            .read_exact(&mut table.id_sums)
            .map_err(truncated("id_sums"))?;

        Ok(table)
    }
}

fn validate_shape(num_cells: u64, num_hashes: u8, elem_len: u32) -> Result<(), Error> {
    if num_cells == 0 {
        return Err(Error::invalid_argument("num_cells must be at least 1"));
    }
    if num_cells > MAX_NUM_CELLS {
        return Err(Error::invalid_argument("num_cells exceeds the supported limit")
            .with_context("num_cells", num_cells)
            .with_context("max", MAX_NUM_CELLS));
    }
    if num_hashes == 0 {
        return Err(Error::invalid_argument("num_hashes must be at least 1"));
    }
    if num_hashes as u64 > num_cells {
        return Err(
            Error::invalid_argument("num_hashes must not exceed num_cells")
                .with_context("num_hashes", num_hashes)
                .with_context("num_cells", num_cells),
        );
    }
    if elem_len == 0 {
        return Err(Error::invalid_argument("elem_len must be at least 1"));
    }
    if elem_len > MAX_ELEM_LEN {
        return Err(Error::invalid_argument("elem_len exceeds the supported limit")
            .with_context("elem_len", elem_len)
            .with_context("max", MAX_ELEM_LEN));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> InvertibleBloomFilter {
        InvertibleBloomFilter::new(50, 3, 8).unwrap()
    }

    #[test]
    fn test_insert_remove_is_involutive() {
        let mut iblt = table();
        let before = iblt.clone();

        iblt.insert(b"alice---").unwrap();
        assert_ne!(iblt, before);

        iblt.remove(b"alice---").unwrap();
        assert_eq!(iblt, before);
        assert!(iblt.is_empty());
    }

    #[test]
    fn test_membership_verdicts() {
        let mut iblt = table();
        iblt.insert(b"alice---").unwrap();

        assert_eq!(iblt.membership(b"alice---").unwrap(), Membership::Present);
        assert_eq!(iblt.membership(b"zzzzzzzz").unwrap(), Membership::Absent);
    }

    #[test]
    fn test_membership_rejects_wrong_length() {
        let iblt = table();
        let err = iblt.membership(b"short").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_insert_rejects_wrong_length() {
        let mut iblt = table();
        assert!(iblt.insert(b"way-too-long-element").is_err());
        assert!(iblt.is_empty());
    }

    #[test]
    fn test_list_entries() {
        let mut iblt = table();
        iblt.insert(b"alice---").unwrap();
        iblt.insert(b"bob-----").unwrap();
        iblt.insert(b"carole--").unwrap();

        let listed = iblt.list_entries();
        assert!(listed.success);

        let mut entries = listed.entries;
        entries.sort();
        assert_eq!(
            entries,
            vec![
                b"alice---".to_vec(),
                b"bob-----".to_vec(),
                b"carole--".to_vec()
            ]
        );
    }

    #[test]
    fn test_subtract_and_decode() {
        let mut local = table();
        let mut remote = table();

        for item in [b"alice---", b"help----", b"meow----", b"json----"] {
            local.insert(item).unwrap();
        }
        for item in [b"alice---", b"car-----", b"meow----", b"help----"] {
            remote.insert(item).unwrap();
        }

        let decoded = local.subtract(&remote).unwrap().decode();
        assert!(decoded.success);
        assert_eq!(decoded.additional, vec![b"json----".to_vec()]);
        assert_eq!(decoded.missing, vec![b"car-----".to_vec()]);
    }

    #[test]
    fn test_subtract_of_equal_tables_is_empty() {
        let mut a = table();
        let mut b = table();
        a.insert(b"alice---").unwrap();
        b.insert(b"alice---").unwrap();

        let difference = a.subtract(&b).unwrap();
        assert!(difference.is_empty());

        let decoded = difference.decode();
        assert!(decoded.success);
        assert!(decoded.additional.is_empty());
        assert!(decoded.missing.is_empty());
    }

    #[test]
    fn test_subtract_incompatible_shapes() {
        let a = table();
        let b = InvertibleBloomFilter::new(40, 3, 8).unwrap();
        let err = a.subtract(&b).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Incompatible);

        let c = InvertibleBloomFilter::with_seed(50, 3, 8, 999).unwrap();
        assert!(a.subtract(&c).is_err());
    }

    #[test]
    fn test_decode_is_best_effort_when_undersized() {
        // 4 cells cannot absorb 40 distinct elements; peeling must stall
        // but still terminate with a partial listing.
        let mut iblt = InvertibleBloomFilter::new(4, 3, 8).unwrap();
        for i in 0..40u32 {
            iblt.insert(format!("item-{i:03}").as_bytes()).unwrap();
        }

        let listed = iblt.list_entries();
        assert!(!listed.success);
        assert!(listed.entries.len() < 40);
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut iblt = table();
        iblt.insert(b"alice---").unwrap();
        iblt.remove(b"ghost---").unwrap();

        let restored = InvertibleBloomFilter::deserialize(&iblt.serialize()).unwrap();
        assert_eq!(iblt, restored);
        assert_eq!(restored.membership(b"alice---").unwrap(), Membership::Present);
    }

    #[test]
    fn test_deserialize_rejects_wrong_family() {
        let mut bytes = table().serialize();
        bytes[2] = Family::COUNTMIN.id;
        assert!(InvertibleBloomFilter::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_deserialize_rejects_truncated_payload() {
        let bytes = table().serialize();
        assert!(InvertibleBloomFilter::deserialize(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(InvertibleBloomFilter::new(0, 3, 8).is_err());
        assert!(InvertibleBloomFilter::new(50, 0, 8).is_err());
        assert!(InvertibleBloomFilter::new(2, 3, 8).is_err());
        assert!(InvertibleBloomFilter::new(50, 3, 0).is_err());
    }
}
