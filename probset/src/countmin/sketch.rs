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
use std::mem::size_of;

use byteorder::ReadBytesExt;
use byteorder::LE;

use crate::codec::truncated;
use crate::codec::Family;
use crate::codec::SketchBytes;
use crate::countmin::serialization::FLAGS_IS_EMPTY;
use crate::countmin::serialization::LONG_SIZE_BYTES;
use crate::countmin::serialization::PREAMBLE_LONGS;
use crate::countmin::serialization::SERIAL_VERSION;
use crate::error::Error;
use crate::hash;
use crate::hash::DEFAULT_UPDATE_SEED;

const MAX_TABLE_ENTRIES: usize = 1 << 30;

/// Count-Min sketch for estimating item frequencies.
///
/// A `d x w` matrix of counters where row `i` is addressed by the i-th
/// double-hashed index of an item. The point estimate is the minimum
/// across rows, an upper bound on the true count:
/// `true <= estimate <= true + (e/w) * N` with probability
/// `1 - e^(-d)`, where `N` is the total inserted weight.
#[derive(Debug, Clone, PartialEq)]
pub struct CountMinSketch {
    num_hashes: u8,
    num_buckets: u32,
    seed: u64,
    total_weight: i64,
    counts: Vec<i64>,
}

impl CountMinSketch {
    /// Creates a new Count-Min sketch with the default seed.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `num_hashes` or `num_buckets` is 0, or the table exceeds the
    /// supported size.
    pub fn new(num_hashes: u8, num_buckets: u32) -> Result<Self, Error> {
        Self::with_seed(num_hashes, num_buckets, DEFAULT_UPDATE_SEED)
    }

    /// Creates a new Count-Min sketch with the provided seed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`new`](Self::new).
    pub fn with_seed(num_hashes: u8, num_buckets: u32, seed: u64) -> Result<Self, Error> {
        let entries = entries_for_config(num_hashes, num_buckets)?;
        Ok(Self::make(num_hashes, num_buckets, seed, entries))
    }

    /// Creates a sketch sized for a target relative error `epsilon` and
    /// failure probability `delta`: `w = ceil(e/epsilon)` buckets and
    /// `d = ceil(ln(1/delta))` rows.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `epsilon` is not positive or `delta` is not in (0.0, 1.0).
    ///
    /// # Examples
    ///
    /// ```
    /// # use probset::countmin::CountMinSketch;
    /// let sketch = CountMinSketch::with_accuracy(0.001, 0.01).unwrap();
    /// assert_eq!(sketch.num_buckets(), 2719);
    /// assert_eq!(sketch.num_hashes(), 5);
    /// ```
    pub fn with_accuracy(epsilon: f64, delta: f64) -> Result<Self, Error> {
        Self::with_accuracy_and_seed(epsilon, delta, DEFAULT_UPDATE_SEED)
    }

    /// Creates a sketch sized for `(epsilon, delta)` with a custom seed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`with_accuracy`](Self::with_accuracy).
    pub fn with_accuracy_and_seed(epsilon: f64, delta: f64, seed: u64) -> Result<Self, Error> {
        if !(epsilon > 0.0) {
            return Err(Error::invalid_argument("epsilon must be positive")
                .with_context("epsilon", epsilon));
        }
        if !(delta > 0.0 && delta < 1.0) {
            return Err(
                Error::invalid_argument("delta must be in (0, 1) exclusive")
                    .with_context("delta", delta),
            );
        }
        Self::with_seed(
            Self::suggest_num_hashes(delta),
            Self::suggest_num_buckets(epsilon),
            seed,
        )
    }

    /// Suggests the number of buckets per row for the given relative
    /// error: `w = ceil(e/epsilon)`.
    pub fn suggest_num_buckets(epsilon: f64) -> u32 {
        let buckets = (std::f64::consts::E / epsilon).ceil();
        buckets.clamp(1.0, u32::MAX as f64) as u32
    }

    /// Suggests the number of rows for the given failure probability:
    /// `d = ceil(ln(1/delta))`.
    pub fn suggest_num_hashes(delta: f64) -> u8 {
        let hashes = (1.0 / delta).ln().ceil();
        hashes.clamp(1.0, u8::MAX as f64) as u8
    }

    /// Returns the number of hash functions (rows) used by the sketch.
    pub fn num_hashes(&self) -> u8 {
        self.num_hashes
    }

    /// Returns the number of buckets per row.
    pub fn num_buckets(&self) -> u32 {
        self.num_buckets
    }

    /// Returns the seed used by the sketch.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Replaces the hash seed.
    ///
    /// Reseeding an occupied sketch invalidates its contents.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Returns the total weight inserted into the sketch.
    pub fn total_weight(&self) -> i64 {
        self.total_weight
    }

    /// Returns the relative error implied by the number of buckets.
    pub fn relative_error(&self) -> f64 {
        std::f64::consts::E / self.num_buckets as f64
    }

    /// Returns true if the sketch has not seen any updates.
    pub fn is_empty(&self) -> bool {
        self.total_weight == 0
    }

    /// Updates the sketch with a single occurrence of the item.
    pub fn update(&mut self, item: impl AsRef<[u8]>) {
        self.update_with_weight(item, 1);
    }

    /// Updates the sketch with the given item and weight.
    ///
    /// Negative weights are accepted and subtract from the counters, but
    /// they void the `true <= estimate` guarantee: once weights can go
    /// down, the row minimum may undercount.
    pub fn update_with_weight(&mut self, item: impl AsRef<[u8]>, weight: i64) {
        if weight == 0 {
            return;
        }
        self.total_weight = self.total_weight.wrapping_add(weight);
        let (h1, h2) = hash::hash_twice(item.as_ref(), self.seed);
        let num_buckets = self.num_buckets as usize;
        for row in 0..self.num_hashes as usize {
            let bucket = hash::index_at(h1, h2, row as u64, self.num_buckets as u64) as usize;
            let index = row * num_buckets + bucket;
            self.counts[index] = self.counts[index].wrapping_add(weight);
        }
    }

    /// Returns the estimated frequency of the given item: the minimum of
    /// its counters across all rows.
    pub fn estimate(&self, item: impl AsRef<[u8]>) -> i64 {
        let (h1, h2) = hash::hash_twice(item.as_ref(), self.seed);
        let num_buckets = self.num_buckets as usize;
        let mut min = i64::MAX;
        for row in 0..self.num_hashes as usize {
            let bucket = hash::index_at(h1, h2, row as u64, self.num_buckets as u64) as usize;
            let value = self.counts[row * num_buckets + bucket];
            if value < min {
                min = value;
            }
        }
        min
    }

    /// Returns the upper bound on the estimate: `estimate + epsilon * N`.
    pub fn upper_bound(&self, item: impl AsRef<[u8]>) -> i64 {
        let estimate = self.estimate(item);
        let error = (self.relative_error() * self.total_weight as f64) as i64;
        estimate.wrapping_add(error)
    }

    /// Merges another sketch into this one by element-wise addition.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Incompatible`](crate::error::ErrorKind::Incompatible)
    /// if the sketches differ in rows, buckets, or seed, and
    /// [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// when merging a sketch with itself.
    pub fn merge(&mut self, other: &CountMinSketch) -> Result<(), Error> {
        if std::ptr::eq(self, other) {
            return Err(Error::invalid_argument("cannot merge a sketch with itself"));
        }
        if self.num_hashes != other.num_hashes
            || self.num_buckets != other.num_buckets
            || self.seed != other.seed
        {
            return Err(Error::incompatible("sketch configurations differ")
                .with_context("num_hashes", format!("{} vs {}", self.num_hashes, other.num_hashes))
                .with_context(
                    "num_buckets",
                    format!("{} vs {}", self.num_buckets, other.num_buckets),
                )
                .with_context("seed", format!("{} vs {}", self.seed, other.seed)));
        }
        for (dst, src) in self.counts.iter_mut().zip(other.counts.iter()) {
            *dst = dst.wrapping_add(*src);
        }
        self.total_weight = self.total_weight.wrapping_add(other.total_weight);
        Ok(())
    }

    /// Serializes this sketch to a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let header_size = PREAMBLE_LONGS as usize * LONG_SIZE_BYTES;
        let payload_size = if self.is_empty() {
            0
        } else {
            LONG_SIZE_BYTES + (self.counts.len() * size_of::<i64>())
        };
        let mut bytes = SketchBytes::with_capacity(header_size + payload_size);

        bytes.write_u8(PREAMBLE_LONGS);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::COUNTMIN.id);
        bytes.write_u8(if self.is_empty() { FLAGS_IS_EMPTY } else { 0 });
        bytes.write_u32_le(0); // reserved

        bytes.write_u32_le(self.num_buckets);
        bytes.write_u8(self.num_hashes);
        bytes.write_u8(0); // reserved
        bytes.write_u16_le(0); // reserved
        bytes.write_u64_le(self.seed);

        if self.is_empty() {
            return bytes.into_bytes();
        }

        bytes.write_i64_le(self.total_weight);
        for &count in &self.counts {
            bytes.write_i64_le(count);
        }
        bytes.into_bytes()
    }

    /// Deserializes a sketch from bytes.
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
        cursor.read_u32::<LE>().map_err(truncated("reserved"))?;

        Family::COUNTMIN.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        if preamble_longs != PREAMBLE_LONGS {
            return Err(Error::invalid_preamble_longs(PREAMBLE_LONGS, preamble_longs));
        }

        let num_buckets = cursor.read_u32::<LE>().map_err(truncated("num_buckets"))?;
        let num_hashes = cursor.read_u8().map_err(truncated("num_hashes"))?;
        cursor.read_u8().map_err(truncated("reserved"))?;
        cursor.read_u16::<LE>().map_err(truncated("reserved"))?;
        let seed = cursor.read_u64::<LE>().map_err(truncated("seed"))?;

        let entries = entries_for_config(num_hashes, num_buckets).map_err(|err| {
            Error::deserial(format!("invalid sketch shape: {}", err.message()))
        })?;
        let mut sketch = Self::make(num_hashes, num_buckets, seed, entries);
        if (flags & FLAGS_IS_EMPTY) != 0 {
            return Ok(sketch);
        }

        sketch.total_weight = cursor.read_i64::<LE>().map_err(truncated("total_weight"))?;
        for count in sketch.counts.iter_mut() {
            *count = cursor.read_i64::<LE>().map_err(truncated("counts"))?;
        }
        Ok(sketch)
    }

    fn make(num_hashes: u8, num_buckets: u32, seed: u64, entries: usize) -> Self {
        CountMinSketch {
            num_hashes,
            num_buckets,
            seed,
            total_weight: 0,
            counts: vec![0i64; entries],
        }
    }
}

fn entries_for_config(num_hashes: u8, num_buckets: u32) -> Result<usize, Error> {
    if num_hashes == 0 {
        return Err(Error::invalid_argument("num_hashes must be at least 1"));
    }
    if num_buckets == 0 {
        return Err(Error::invalid_argument("num_buckets must be at least 1"));
    }
    let entries = num_hashes as usize * num_buckets as usize;
    if entries >= MAX_TABLE_ENTRIES {
        return Err(
            Error::invalid_argument("num_hashes * num_buckets exceeds the supported limit")
                .with_context("entries", entries)
                .with_context("max", MAX_TABLE_ENTRIES),
        );
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_sizing() {
        // w = ceil(e / 0.001) = 2719, d = ceil(ln 100) = 5.
        let sketch = CountMinSketch::with_accuracy(0.001, 0.01).unwrap();
        assert_eq!(sketch.num_buckets(), 2719);
        assert_eq!(sketch.num_hashes(), 5);
        assert!(sketch.is_empty());
    }

    #[test]
    fn test_update_and_estimate() {
        let mut sketch = CountMinSketch::with_accuracy(0.001, 0.01).unwrap();
        sketch.update("alice");
        sketch.update("alice");
        sketch.update("bob");

        assert_eq!(sketch.estimate("alice"), 2);
        assert_eq!(sketch.estimate("bob"), 1);
        assert_eq!(sketch.estimate("daniel"), 0);
        assert_eq!(sketch.total_weight(), 3);
    }

    #[test]
    fn test_estimate_never_undercounts() {
        let mut sketch = CountMinSketch::new(5, 256).unwrap();
        for i in 0..1000u32 {
            sketch.update(format!("item-{}", i % 50));
        }
        for i in 0..50u32 {
            assert!(sketch.estimate(format!("item-{i}")) >= 20);
        }
    }

    #[test]
    fn test_updates_are_monotone() {
        let mut sketch = CountMinSketch::new(5, 256).unwrap();
        let mut last = 0;
        for _ in 0..20 {
            sketch.update("alice");
            let now = sketch.estimate("alice");
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_weighted_updates() {
        let mut sketch = CountMinSketch::new(5, 256).unwrap();
        sketch.update_with_weight("banana", 3);
        assert_eq!(sketch.estimate("banana"), 3);
        assert!(sketch.upper_bound("banana") >= 3);

        sketch.update_with_weight("banana", -2);
        assert_eq!(sketch.estimate("banana"), 1);
        assert_eq!(sketch.total_weight(), 1);
    }

    #[test]
    fn test_merge() {
        let mut a = CountMinSketch::new(5, 256).unwrap();
        let mut b = CountMinSketch::new(5, 256).unwrap();
        a.update("alice");
        b.update("alice");
        b.update("bob");

        a.merge(&b).unwrap();
        assert_eq!(a.estimate("alice"), 2);
        assert_eq!(a.estimate("bob"), 1);
        assert_eq!(a.total_weight(), 3);
    }

    #[test]
    fn test_merge_incompatible_shapes() {
        let mut a = CountMinSketch::new(5, 256).unwrap();
        let b = CountMinSketch::new(5, 512).unwrap();
        let err = a.merge(&b).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Incompatible);

        let c = CountMinSketch::with_seed(5, 256, 999).unwrap();
        assert!(a.merge(&c).is_err());
    }

    #[test]
    fn test_clone_preserves_state() {
        let mut sketch = CountMinSketch::new(5, 256).unwrap();
        sketch.update("alice");

        let copy = sketch.clone();
        assert_eq!(copy, sketch);
        assert_eq!(copy.estimate("alice"), 1);
        assert_eq!(copy.total_weight(), sketch.total_weight());
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut sketch = CountMinSketch::new(3, 128).unwrap();
        sketch.update("alice");
        sketch.update_with_weight("bob", 7);

        let restored = CountMinSketch::deserialize(&sketch.serialize()).unwrap();
        assert_eq!(sketch, restored);
        assert_eq!(restored.estimate("bob"), 7);
    }

    #[test]
    fn test_serialize_round_trip_empty() {
        let sketch = CountMinSketch::new(3, 128).unwrap();
        let restored = CountMinSketch::deserialize(&sketch.serialize()).unwrap();
        assert_eq!(sketch, restored);
    }

    #[test]
    fn test_deserialize_rejects_wrong_family() {
        let mut bytes = CountMinSketch::new(3, 128).unwrap().serialize();
        bytes[2] = Family::IBLT.id;
        assert!(CountMinSketch::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(CountMinSketch::new(0, 128).is_err());
        assert!(CountMinSketch::new(3, 0).is_err());
        assert!(CountMinSketch::with_accuracy(0.0, 0.01).is_err());
        assert!(CountMinSketch::with_accuracy(0.001, 1.0).is_err());
    }
}
