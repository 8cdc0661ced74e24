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

const PREAMBLE_LONGS: u8 = 5;
const SERIAL_VERSION: u8 = 1;
const FLAGS_IS_EMPTY: u8 = 1 << 0;

/// Saturation bound of each counter. A counter stuck at this value drops
/// further increments rather than wrapping.
const COUNTER_MAX: u8 = u8::MAX;
const COUNTER_WIDTH_BITS: u8 = 8;

const MAX_NUM_COUNTERS: u64 = 1u64 << 32;

/// A counting Bloom filter.
///
/// Behaves like the classic Bloom filter but each position is a small
/// saturating counter instead of a bit, so items can be removed. Removing
/// an item that was never inserted fails without mutating the filter,
/// though a false positive can still be "removed" and decrement counters
/// belonging to other items; callers needing exact semantics should only
/// remove items they previously inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct CountingBloomFilter {
    seed: u64,
    num_hashes: u16,
    counters: Vec<u8>,
    num_items: u64,
    /// Increments dropped because a counter had already saturated.
    num_saturated_updates: u64,
}

impl CountingBloomFilter {
    /// Creates a filter sized for `capacity` items at the target false
    /// positive probability, using the classic Bloom sizing formulas.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `capacity` is 0 or `fpp` is not in (0.0, 1.0).
    pub fn with_capacity(capacity: u64, fpp: f64) -> Result<Self, Error> {
        Self::with_capacity_and_seed(capacity, fpp, DEFAULT_UPDATE_SEED)
    }

    /// Creates a filter sized for `(capacity, fpp)` with a custom seed.
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

        let num_counters = crate::bloom::BloomFilter::suggest_num_bits(capacity, fpp);
        let num_hashes = crate::bloom::BloomFilter::suggest_num_hashes(capacity, num_counters);
        Self::with_size_and_seed(num_counters, num_hashes, seed)
    }

    /// Creates a filter with an explicit counter-array length and hash
    /// count.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if either dimension is 0, the array exceeds the supported size, or
    /// `num_hashes` exceeds `num_counters`.
    pub fn with_size(num_counters: u64, num_hashes: u16) -> Result<Self, Error> {
        Self::with_size_and_seed(num_counters, num_hashes, DEFAULT_UPDATE_SEED)
    }

    /// Creates a filter with explicit dimensions and a custom seed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`with_size`](Self::with_size).
    pub fn with_size_and_seed(num_counters: u64, num_hashes: u16, seed: u64) -> Result<Self, Error> {
        validate_params(num_counters, num_hashes)?;
        Ok(CountingBloomFilter {
            seed,
            num_hashes,
            counters: vec![0u8; num_counters as usize],
            num_items: 0,
            num_saturated_updates: 0,
        })
    }

    /// Inserts an item, incrementing its k counters.
    ///
    /// A counter already at its saturation bound keeps its value and the
    /// dropped increment is recorded in
    /// [`num_saturated_updates`](Self::num_saturated_updates).
    pub fn insert(&mut self, item: impl AsRef<[u8]>) {
        for index in self.indices_of(item.as_ref()) {
            let counter = &mut self.counters[index as usize];
            if *counter == COUNTER_MAX {
                self.num_saturated_updates += 1;
            } else {
                *counter += 1;
            }
        }
        self.num_items += 1;
    }

    /// Tests whether an item is possibly in the set: true iff all of its k
    /// counters are non-zero.
    pub fn contains(&self, item: impl AsRef<[u8]>) -> bool {
        self.indices_of(item.as_ref())
            .into_iter()
            .all(|index| self.counters[index as usize] > 0)
    }

    /// Removes one occurrence of an item, decrementing its k counters.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ElementNotFound`](crate::error::ErrorKind::ElementNotFound)
    /// if any of the item's counters is zero; the filter is left unchanged
    /// in that case.
    pub fn remove(&mut self, item: impl AsRef<[u8]>) -> Result<(), Error> {
        let indices = self.indices_of(item.as_ref());
        if indices
            .iter()
            .any(|&index| self.counters[index as usize] == 0)
        {
            return Err(Error::element_not_found(
                "an item counter is zero; the item was not inserted",
            ));
        }

        for index in indices {
            self.counters[index as usize] -= 1;
        }
        self.num_items = self.num_items.saturating_sub(1);
        Ok(())
    }

    fn indices_of(&self, item: &[u8]) -> Vec<u64> {
        let (h1, h2) = hash::hash_twice(item, self.seed);
        hash::distinct_indices(
            h1,
            h2,
            self.counters.len() as u64,
            self.num_hashes as usize,
        )
    }

    /// Returns whether the filter is empty (no items inserted).
    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    /// Returns the number of items currently counted.
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Returns the length of the counter array.
    pub fn num_counters(&self) -> u64 {
        self.counters.len() as u64
    }

    /// Returns the number of hash functions used.
    pub fn num_hashes(&self) -> u16 {
        self.num_hashes
    }

    /// Returns the number of increments dropped at saturated counters.
    ///
    /// Non-zero means the filter has become conservative: removals through
    /// a saturated counter may leave stale counts behind.
    pub fn num_saturated_updates(&self) -> u64 {
        self.num_saturated_updates
    }

    /// Returns the hash seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Replaces the hash seed.
    ///
    /// Reseeding an occupied filter invalidates its contents.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Estimates the current false positive probability, as for the
    /// classic filter.
    pub fn estimated_fpp(&self) -> f64 {
        let k = self.num_hashes as f64;
        let n = self.num_items as f64;
        let m = self.counters.len() as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    /// Checks if two filters are comparable: same shape and seed.
    pub fn is_compatible(&self, other: &CountingBloomFilter) -> bool {
        self.counters.len() == other.counters.len()
            && self.num_hashes == other.num_hashes
            && self.seed == other.seed
    }

    /// Serializes the filter to a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let is_empty = self.num_items == 0 && self.counters.iter().all(|&c| c == 0);
        let payload = if is_empty { 0 } else { self.counters.len() };
        let mut bytes = SketchBytes::with_capacity(8 * PREAMBLE_LONGS as usize + payload);

        bytes.write_u8(PREAMBLE_LONGS);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::COUNTING_BLOOM.id);
        bytes.write_u8(if is_empty { FLAGS_IS_EMPTY } else { 0 });
        bytes.write_u16_le(self.num_hashes);
        bytes.write_u8(COUNTER_WIDTH_BITS);
        bytes.write_u8(0); // reserved
        bytes.write_u64_le(self.seed);
        bytes.write_u64_le(self.counters.len() as u64);
        bytes.write_u64_le(self.num_items);
        bytes.write_u64_le(self.num_saturated_updates);

        if !is_empty {
            bytes.write(&self.counters);
        }

        bytes.into_bytes()
    }

    /// Deserializes a filter from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidData`](crate::error::ErrorKind::InvalidData)
    /// if the data is truncated, carries another family's tag, or declares
    /// an unsupported version, counter width, or shape.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = Cursor::new(bytes);
        let preamble_longs = cursor.read_u8().map_err(truncated("preamble_longs"))?;
        let serial_version = cursor.read_u8().map_err(truncated("serial_version"))?;
        let family_id = cursor.read_u8().map_err(truncated("family_id"))?;
        let flags = cursor.read_u8().map_err(truncated("flags"))?;

        Family::COUNTING_BLOOM.validate_id(family_id)?;
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
        let counter_width = cursor.read_u8().map_err(truncated("counter_width"))?;
        cursor.read_u8().map_err(truncated("reserved"))?;
        if counter_width != COUNTER_WIDTH_BITS {
            return Err(Error::deserial(format!(
                "unsupported counter width: expected {COUNTER_WIDTH_BITS}, got {counter_width}"
            )));
        }

        let seed = cursor.read_u64::<LE>().map_err(truncated("seed"))?;
        let num_counters = cursor.read_u64::<LE>().map_err(truncated("num_counters"))?;
        let num_items = cursor.read_u64::<LE>().map_err(truncated("num_items"))?;
        let num_saturated_updates = cursor
            .read_u64::<LE>()
            .map_err(truncated("num_saturated_updates"))?;

        validate_params(num_counters, num_hashes).map_err(|err| {
            Error::deserial(format!("invalid filter shape: {}", err.message()))
        })?;

        let mut counters = vec![0u8; num_counters as usize];
        if (flags & FLAGS_IS_EMPTY) == 0 {
            cursor
                .read_exact(&mut counters)
                .map_err(truncated("counters"))?;
        }

        Ok(CountingBloomFilter {
            seed,
            num_hashes,
            counters,
            num_items,
            num_saturated_updates,
        })
    }
}

fn validate_params(num_counters: u64, num_hashes: u16) -> Result<(), Error> {
    if num_counters == 0 {
        return Err(Error::invalid_argument("num_counters must be at least 1"));
    }
    if num_counters > MAX_NUM_COUNTERS {
        return Err(
            Error::invalid_argument("num_counters exceeds the supported limit")
                .with_context("num_counters", num_counters)
                .with_context("max", MAX_NUM_COUNTERS),
        );
    }
    if num_hashes == 0 {
        return Err(Error::invalid_argument("num_hashes must be at least 1"));
    }
    if num_hashes as u64 > num_counters {
        return Err(
            Error::invalid_argument("num_hashes must not exceed num_counters")
                .with_context("num_hashes", num_hashes)
                .with_context("num_counters", num_counters),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_round_trip() {
        let mut filter = CountingBloomFilter::with_size(64, 4).unwrap();
        filter.insert("alice");
        filter.insert("bob");
        filter.insert("carole");

        filter.remove("carole").unwrap();

        assert!(filter.contains("alice"));
        assert!(filter.contains("bob"));
        assert!(!filter.contains("carole"));
        assert_eq!(filter.num_items(), 2);
    }

    #[test]
    fn test_remove_restores_prior_state() {
        let mut filter = CountingBloomFilter::with_size(128, 4).unwrap();
        filter.insert("alice");
        let before = filter.clone();

        filter.insert("bob");
        filter.remove("bob").unwrap();

        assert_eq!(filter, before);
    }

    #[test]
    fn test_remove_unknown_element_fails_without_mutation() {
        let mut filter = CountingBloomFilter::with_size(128, 4).unwrap();
        filter.insert("alice");
        let before = filter.clone();

        let err = filter.remove("never-inserted").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ElementNotFound);
        assert_eq!(filter, before);
    }

    #[test]
    fn test_saturation_is_recorded_and_never_wraps() {
        let mut filter = CountingBloomFilter::with_size(8, 2).unwrap();
        for _ in 0..300 {
            filter.insert("hammered");
        }
        assert!(filter.num_saturated_updates() > 0);
        assert!(filter.counters.iter().all(|&c| c <= COUNTER_MAX));
        assert!(filter.contains("hammered"));
    }

    #[test]
    fn test_double_insert_needs_double_remove() {
        let mut filter = CountingBloomFilter::with_size(128, 4).unwrap();
        filter.insert("alice");
        filter.insert("alice");

        filter.remove("alice").unwrap();
        assert!(filter.contains("alice"));
        filter.remove("alice").unwrap();
        assert!(!filter.contains("alice"));
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut filter = CountingBloomFilter::with_capacity(100, 0.01).unwrap();
        filter.insert("alice");
        filter.insert("bob");
        filter.remove("bob").unwrap();

        let restored = CountingBloomFilter::deserialize(&filter.serialize()).unwrap();
        assert_eq!(filter, restored);
        assert!(restored.contains("alice"));
        assert!(!restored.contains("bob"));
    }

    #[test]
    fn test_deserialize_rejects_unknown_counter_width() {
        let filter = CountingBloomFilter::with_size(64, 4).unwrap();
        let mut bytes = filter.serialize();
        bytes[6] = 4; // counter_width
        let err = CountingBloomFilter::deserialize(&bytes).unwrap_err();
        assert!(err.message().contains("counter width"));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(CountingBloomFilter::with_size(0, 4).is_err());
        assert!(CountingBloomFilter::with_size(64, 0).is_err());
        assert!(CountingBloomFilter::with_size(3, 4).is_err());
        assert!(CountingBloomFilter::with_capacity(100, 2.0).is_err());
    }
}
