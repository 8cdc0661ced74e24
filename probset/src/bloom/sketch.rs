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

use byteorder::ReadBytesExt;
use byteorder::LE;

use crate::codec::truncated;
use crate::codec::Family;
use crate::codec::SketchBytes;
use crate::common::BitVec;
use crate::error::Error;
use crate::hash;
use crate::hash::DEFAULT_UPDATE_SEED;

const PREAMBLE_LONGS: u8 = 4;
const SERIAL_VERSION: u8 = 1;
const FLAGS_IS_EMPTY: u8 = 1 << 0;

const MAX_NUM_BITS: u64 = (1u64 << 35) - 64; // ~32 GB - reasonable limit

/// A Bloom filter for probabilistic set membership testing.
///
/// Provides fast membership queries with:
/// - No false negatives (inserted items always return `true`)
/// - Tunable false positive rate
/// - Constant space usage
///
/// Items are hashed as raw bytes; anything implementing `AsRef<[u8]>` can be
/// inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct BloomFilter {
    /// Hash seed for all hash functions
    seed: u64,
    /// Number of hash functions to use (k)
    num_hashes: u16,
    /// Bit array (m bits)
    bits: BitVec,
    /// Number of insertions performed
    num_items: u64,
}

impl BloomFilter {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Creates a filter with optimal parameters for a target accuracy.
    ///
    /// Calculates the number of bits and hash functions to achieve the
    /// desired false positive probability at the given number of distinct
    /// items.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `capacity` is 0 or `fpp` is not in (0.0, 1.0).
    ///
    /// # Examples
    ///
    /// ```
    /// # use probset::bloom::BloomFilter;
    /// let filter = BloomFilter::with_capacity(10_000, 0.01).unwrap();
    /// assert!(filter.num_bits() > 90_000);
    /// ```
    pub fn with_capacity(capacity: u64, fpp: f64) -> Result<Self, Error> {
        Self::with_capacity_and_seed(capacity, fpp, DEFAULT_UPDATE_SEED)
    }

    /// Creates a filter sized for `(capacity, fpp)` with a custom seed.
    ///
    /// **Important**: filters with different seeds cannot be compared.
    ///
    /// # Errors
    ///
    /// Same conditions as [`with_capacity`](Self::with_capacity).
    pub fn with_capacity_and_seed(capacity: u64, fpp: f64, seed: u64) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::invalid_argument("capacity must be at least 1"));
        }
        if !(fpp > 0.0 && fpp < 1.0) {
            return Err(
                Error::invalid_argument("false positive rate must be in (0, 1) exclusive")
                    .with_context("fpp", fpp),
            );
        }

        let num_bits = Self::suggest_num_bits(capacity, fpp);
        let num_hashes = Self::suggest_num_hashes(capacity, num_bits);
        Self::with_size_and_seed(num_bits, num_hashes, seed)
    }

    /// Creates a filter with manual size specification.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `num_bits` is 0 or beyond the supported limit, `num_hashes` is 0,
    /// or `num_hashes` exceeds `num_bits` (more distinct indices than the
    /// bit array can supply).
    pub fn with_size(num_bits: u64, num_hashes: u16) -> Result<Self, Error> {
        Self::with_size_and_seed(num_bits, num_hashes, DEFAULT_UPDATE_SEED)
    }

    /// Creates a filter with manual size specification and a custom seed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`with_size`](Self::with_size).
    pub fn with_size_and_seed(num_bits: u64, num_hashes: u16, seed: u64) -> Result<Self, Error> {
        validate_params(num_bits, num_hashes)?;
        Ok(BloomFilter {
            seed,
            num_hashes,
            bits: BitVec::new(num_bits),
            num_items: 0,
        })
    }

    /// Builds a filter from the items of an iterator, sized for its length.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `fpp` is not in (0.0, 1.0).
    ///
    /// # Examples
    ///
    /// ```
    /// # use probset::bloom::BloomFilter;
    /// let filter = BloomFilter::from_items(["alice", "bob"], 0.01).unwrap();
    /// assert!(filter.contains("alice"));
    /// assert_eq!(filter.num_items(), 2);
    /// ```
    pub fn from_items<I, T>(items: I, fpp: f64) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let items: Vec<T> = items.into_iter().collect();
        let capacity = (items.len() as u64).max(1);
        let mut filter = Self::with_capacity(capacity, fpp)?;
        for item in &items {
            filter.insert(item);
        }
        Ok(filter)
    }

    // ========================================================================
    // Query and Update Operations
    // ========================================================================

    /// Inserts an item into the filter.
    ///
    /// After insertion, `contains(item)` will always return `true`.
    pub fn insert(&mut self, item: impl AsRef<[u8]>) {
        let (h1, h2) = hash::hash_twice(item.as_ref(), self.seed);
        for index in hash::distinct_indices(h1, h2, self.bits.num_bits(), self.num_hashes as usize)
        {
            self.bits.set(index);
        }
        self.num_items += 1;
    }

    /// Tests whether an item is possibly in the set.
    ///
    /// Returns:
    /// - `true`: Item was **possibly** inserted (or false positive)
    /// - `false`: Item was **definitely not** inserted
    pub fn contains(&self, item: impl AsRef<[u8]>) -> bool {
        if self.num_items == 0 {
            return false;
        }
        let (h1, h2) = hash::hash_twice(item.as_ref(), self.seed);
        hash::distinct_indices(h1, h2, self.bits.num_bits(), self.num_hashes as usize)
            .into_iter()
            .all(|index| self.bits.get(index))
    }

    // ========================================================================
    // Statistics and Properties
    // ========================================================================

    /// Returns whether the filter is empty (no items inserted).
    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    /// Returns the number of insertions performed.
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Returns the total number of bits in the filter.
    pub fn num_bits(&self) -> u64 {
        self.bits.num_bits()
    }

    /// Returns the number of hash functions used.
    pub fn num_hashes(&self) -> u16 {
        self.num_hashes
    }

    /// Returns the hash seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Replaces the hash seed.
    ///
    /// Reseeding an occupied filter invalidates its contents: previously
    /// inserted items will hash to different bits from now on.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Returns the current load factor (fraction of bits set).
    pub fn load_factor(&self) -> f64 {
        self.bits.num_set() as f64 / self.bits.num_bits() as f64
    }

    /// Estimates the current false positive probability.
    ///
    /// Based on the formula `(1 - e^(-k*n/m))^k` where k is the hash count,
    /// n the number of insertions, and m the bit count.
    pub fn estimated_fpp(&self) -> f64 {
        let k = self.num_hashes as f64;
        let n = self.num_items as f64;
        let m = self.bits.num_bits() as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    /// Checks if two filters are comparable: same bit count, hash count,
    /// and seed.
    pub fn is_compatible(&self, other: &BloomFilter) -> bool {
        self.bits.num_bits() == other.bits.num_bits()
            && self.num_hashes == other.num_hashes
            && self.seed == other.seed
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serializes the filter to a byte vector.
    ///
    /// # Examples
    ///
    /// ```
    /// # use probset::bloom::BloomFilter;
    /// let mut filter = BloomFilter::with_capacity(100, 0.01).unwrap();
    /// filter.insert("test");
    ///
    /// let bytes = filter.serialize();
    /// let restored = BloomFilter::deserialize(&bytes).unwrap();
    /// assert!(restored.contains("test"));
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let is_empty = self.num_items == 0;
        let payload = if is_empty {
            0
        } else {
            self.bits.words().len() * 8
        };
        let mut bytes = SketchBytes::with_capacity(8 * PREAMBLE_LONGS as usize + payload);

        bytes.write_u8(PREAMBLE_LONGS);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::BLOOM.id);
        bytes.write_u8(if is_empty { FLAGS_IS_EMPTY } else { 0 });
        bytes.write_u16_le(self.num_hashes);
        bytes.write_u16_le(0); // reserved
        bytes.write_u64_le(self.seed);
        bytes.write_u64_le(self.bits.num_bits());
        bytes.write_u64_le(self.num_items);

        if !is_empty {
            for &word in self.bits.words() {
                bytes.write_u64_le(word);
            }
        }

        bytes.into_bytes()
    }

    /// Deserializes a filter from bytes.
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
        let flags = cursor.read_u8().map_err(truncated("flags"))?;

        Family::BLOOM.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        if preamble_longs != PREAMBLE_LONGS {
            return Err(Error::invalid_preamble_longs(PREAMBLE_LONGS, preamble_longs));
        }

        let num_hashes = cursor.read_u16::<LE>().map_err(truncated("num_hashes"))?;
        cursor.read_u16::<LE>().map_err(truncated("reserved"))?;
        let seed = cursor.read_u64::<LE>().map_err(truncated("seed"))?;
        let num_bits = cursor.read_u64::<LE>().map_err(truncated("num_bits"))?;
        let num_items = cursor.read_u64::<LE>().map_err(truncated("num_items"))?;

        validate_params(num_bits, num_hashes).map_err(|err| {
            Error::deserial(format!("invalid filter shape: {}", err.message()))
        })?;

        let bits = if (flags & FLAGS_IS_EMPTY) != 0 {
            BitVec::new(num_bits)
        } else {
            let mut words = vec![0u64; BitVec::word_count(num_bits)];
            for word in &mut words {
                *word = cursor.read_u64::<LE>().map_err(truncated("bit_array"))?;
            }
            BitVec::from_words(num_bits, words)
        };

        Ok(BloomFilter {
            seed,
            num_hashes,
            bits,
            num_items,
        })
    }

    // ========================================================================
    // Sizing
    // ========================================================================

    /// Suggests the number of bits given max items and target false
    /// positive probability: `m = -n * ln(p) / (ln(2)^2)`.
    pub fn suggest_num_bits(capacity: u64, fpp: f64) -> u64 {
        let n = capacity as f64;
        let ln2_squared = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let bits = (-n * fpp.ln() / ln2_squared).ceil() as u64;
        bits.clamp(1, MAX_NUM_BITS)
    }

    /// Suggests the number of hash functions given max items and bit
    /// count: `k = (m/n) * ln(2)`.
    pub fn suggest_num_hashes(capacity: u64, num_bits: u64) -> u16 {
        let m = num_bits as f64;
        let n = capacity as f64;
        let k = (m / n * std::f64::consts::LN_2).ceil() as u64;
        k.clamp(1, u16::MAX as u64) as u16
    }
}

fn validate_params(num_bits: u64, num_hashes: u16) -> Result<(), Error> {
    if num_bits == 0 {
        return Err(Error::invalid_argument("num_bits must be at least 1"));
    }
    if num_bits > MAX_NUM_BITS {
        return Err(Error::invalid_argument("num_bits exceeds the supported limit")
            .with_context("num_bits", num_bits)
            .with_context("max", MAX_NUM_BITS));
    }
    if num_hashes == 0 {
        return Err(Error::invalid_argument("num_hashes must be at least 1"));
    }
    if num_hashes as u64 > num_bits {
        return Err(
            Error::invalid_argument("num_hashes must not exceed num_bits")
                .with_context("num_hashes", num_hashes)
                .with_context("num_bits", num_bits),
        );
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_capacity_sizing() {
        let filter = BloomFilter::with_capacity(1000, 0.01).unwrap();
        // m = ceil(-1000 * ln(0.01) / ln(2)^2) = 9586, k = ceil(m/n * ln 2) = 7
        assert!(filter.num_bits() >= 9000 && filter.num_bits() < 10_000);
        assert_eq!(filter.num_hashes(), 7);
        assert!(filter.is_empty());
    }

    #[test]
    fn test_with_size() {
        let filter = BloomFilter::with_size(1024, 5).unwrap();
        assert_eq!(filter.num_bits(), 1024);
        assert_eq!(filter.num_hashes(), 5);
    }

    #[test]
    fn test_insert_and_contains() {
        let mut filter = BloomFilter::with_capacity(100, 0.01).unwrap();

        assert!(!filter.contains("apple"));
        filter.insert("apple");
        assert!(filter.contains("apple"));
        assert!(!filter.is_empty());
        assert_eq!(filter.num_items(), 1);
    }

    #[test]
    fn test_no_false_negatives() {
        let mut filter = BloomFilter::with_capacity(500, 0.01).unwrap();
        for i in 0..500u32 {
            filter.insert(format!("item-{i}"));
        }
        for i in 0..500u32 {
            assert!(filter.contains(format!("item-{i}")));
        }
    }

    #[test]
    fn test_from_items() {
        let filter = BloomFilter::from_items(["alice", "bob", "carole"], 0.01).unwrap();
        assert!(filter.contains("alice"));
        assert!(filter.contains("bob"));
        assert!(filter.contains("carole"));
        assert_eq!(filter.num_items(), 3);
    }

    #[test]
    fn test_estimated_fpp_grows_with_load() {
        let mut filter = BloomFilter::with_capacity(100, 0.01).unwrap();
        assert_eq!(filter.estimated_fpp(), 0.0);
        for i in 0..100u32 {
            filter.insert(i.to_string());
        }
        let at_capacity = filter.estimated_fpp();
        assert!(at_capacity > 0.0 && at_capacity < 0.02);
    }

    #[test]
    fn test_is_compatible() {
        let f1 = BloomFilter::with_capacity_and_seed(100, 0.01, 123).unwrap();
        let f2 = BloomFilter::with_capacity_and_seed(100, 0.01, 123).unwrap();
        let f3 = BloomFilter::with_capacity_and_seed(100, 0.01, 456).unwrap();

        assert!(f1.is_compatible(&f2));
        assert!(!f1.is_compatible(&f3));
    }

    #[test]
    fn test_serialize_deserialize_empty() {
        let filter = BloomFilter::with_capacity(100, 0.01).unwrap();
        let bytes = filter.serialize();
        let restored = BloomFilter::deserialize(&bytes).unwrap();
        assert_eq!(filter, restored);
    }

    #[test]
    fn test_serialize_deserialize_with_data() {
        let mut filter = BloomFilter::with_capacity(100, 0.01).unwrap();
        filter.insert("test");
        filter.insert("42");

        let bytes = filter.serialize();
        let restored = BloomFilter::deserialize(&bytes).unwrap();

        assert_eq!(filter, restored);
        assert!(restored.contains("test"));
        assert!(restored.contains("42"));
        assert_eq!(restored.seed(), filter.seed());
    }

    #[test]
    fn test_deserialize_rejects_wrong_family() {
        let mut bytes = BloomFilter::with_capacity(100, 0.01).unwrap().serialize();
        bytes[2] = 99;
        let err = BloomFilter::deserialize(&bytes).unwrap_err();
        assert!(err.message().contains("invalid family"));
    }

    #[test]
    fn test_deserialize_rejects_truncated_payload() {
        let mut filter = BloomFilter::with_capacity(100, 0.01).unwrap();
        filter.insert("test");
        let bytes = filter.serialize();
        assert!(BloomFilter::deserialize(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(BloomFilter::with_capacity(0, 0.01).is_err());
    }

    #[test]
    fn test_invalid_fpp() {
        assert!(BloomFilter::with_capacity(100, 1.5).is_err());
        assert!(BloomFilter::with_capacity(100, 0.0).is_err());
    }

    #[test]
    fn test_more_hashes_than_bits_rejected() {
        assert!(BloomFilter::with_size(4, 5).is_err());
    }
}
