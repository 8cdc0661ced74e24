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
use crate::common::XorShift64;
use crate::error::Error;
use crate::hash;
use crate::hash::DEFAULT_UPDATE_SEED;

const PREAMBLE_LONGS: u8 = 5;
const SERIAL_VERSION: u8 = 1;
const FLAGS_IS_EMPTY: u8 = 1 << 0;

/// Fingerprint value marking a free slot. Real fingerprints fold to 1 when
/// the hash would produce zero.
const EMPTY_SLOT: u64 = 0;

const DEFAULT_SLOTS_PER_BUCKET: u8 = 4;
const DEFAULT_MAX_KICKS: u32 = 500;

const MIN_SLOTS_PER_BUCKET: u8 = 2;
const MAX_SLOTS_PER_BUCKET: u8 = 8;
const MAX_FINGERPRINT_BITS: u8 = 64;
const MAX_TABLE_SLOTS: u64 = 1u64 << 32;

// Sustainable load for 4-slot buckets, from the cuckoo filter literature.
const TARGET_LOAD: f64 = 0.955;

// Domain separator so the eviction RNG stream is unrelated to the hashes
// the filter seed drives.
const RNG_SEED_TWEAK: u64 = 0x5bf0_3635;

/// A cuckoo filter for probabilistic set membership with removal.
///
/// Each item is reduced to an `f`-bit fingerprint stored in one of two
/// candidate buckets, where the alternate bucket is computable from any
/// bucket and the fingerprint alone: `alt = bucket XOR (H(fp) mod b)`. That
/// symmetry is what lets eviction chains relocate fingerprints without the
/// original items.
///
/// Only remove items that were previously inserted; see the module notes.
#[derive(Debug, Clone)]
pub struct CuckooFilter {
    seed: u64,
    /// Bucket count; always a power of two.
    num_buckets: u64,
    slots_per_bucket: u8,
    fingerprint_bits: u8,
    max_kicks: u32,
    num_items: u64,
    /// Flat bucket-major slot array, `num_buckets * slots_per_bucket` long.
    slots: Vec<u64>,
    rng: XorShift64,
}

impl CuckooFilter {
    /// Creates a filter sized to hold `capacity` items at roughly the
    /// target false positive probability, with 4 slots per bucket.
    ///
    /// The fingerprint width is `ceil(log2(2s / fpp))` bits and the bucket
    /// count the next power of two fitting `capacity` at a ~95% load.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `capacity` is 0, `fpp` is not in (0.0, 1.0), or the required
    /// fingerprint exceeds the 64-bit hash width.
    ///
    /// # Examples
    ///
    /// ```
    /// # use probset::cuckoo::CuckooFilter;
    /// let filter = CuckooFilter::with_capacity(1_000, 0.01).unwrap();
    /// assert!(filter.num_buckets().is_power_of_two());
    /// ```
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

        let slots_per_bucket = DEFAULT_SLOTS_PER_BUCKET;
        let fingerprint_bits = Self::suggest_fingerprint_bits(slots_per_bucket, fpp)?;
        let num_buckets =
            (capacity as f64 / (slots_per_bucket as f64 * TARGET_LOAD)).ceil() as u64;
        Self::with_size_and_seed(num_buckets.max(1), fingerprint_bits, slots_per_bucket, seed)
    }

    /// Creates a filter with explicit bucket count, fingerprint width, and
    /// slots per bucket.
    ///
    /// The bucket count is rounded up to the next power of two.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `num_buckets` is 0 or too large, `slots_per_bucket` is outside
    /// 2..=8, or `fingerprint_bits` is outside 1..=64.
    pub fn with_size(
        num_buckets: u64,
        fingerprint_bits: u8,
        slots_per_bucket: u8,
    ) -> Result<Self, Error> {
        Self::with_size_and_seed(
            num_buckets,
            fingerprint_bits,
            slots_per_bucket,
            DEFAULT_UPDATE_SEED,
        )
    }

    /// Creates a filter with explicit shape and a custom seed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`with_size`](Self::with_size).
    pub fn with_size_and_seed(
        num_buckets: u64,
        fingerprint_bits: u8,
        slots_per_bucket: u8,
        seed: u64,
    ) -> Result<Self, Error> {
        if num_buckets == 0 {
            return Err(Error::invalid_argument("num_buckets must be at least 1"));
        }
        if num_buckets > MAX_TABLE_SLOTS {
            return Err(
                Error::invalid_argument("num_buckets exceeds the supported limit")
                    .with_context("num_buckets", num_buckets)
                    .with_context("max", MAX_TABLE_SLOTS),
            );
        }
        if !(MIN_SLOTS_PER_BUCKET..=MAX_SLOTS_PER_BUCKET).contains(&slots_per_bucket) {
            return Err(Error::invalid_argument(format!(
                "slots_per_bucket must be in {MIN_SLOTS_PER_BUCKET}..={MAX_SLOTS_PER_BUCKET}"
            ))
            .with_context("slots_per_bucket", slots_per_bucket));
        }
        if fingerprint_bits == 0 || fingerprint_bits > MAX_FINGERPRINT_BITS {
            return Err(Error::invalid_argument(format!(
                "fingerprint_bits must be in 1..={MAX_FINGERPRINT_BITS}"
            ))
            .with_context("fingerprint_bits", fingerprint_bits));
        }

        let num_buckets = num_buckets.next_power_of_two();
        let total_slots = num_buckets
            .checked_mul(slots_per_bucket as u64)
            .filter(|&slots| slots <= MAX_TABLE_SLOTS)
            .ok_or_else(|| {
                Error::invalid_argument("table exceeds the supported slot count")
                    .with_context("num_buckets", num_buckets)
                    .with_context("slots_per_bucket", slots_per_bucket)
            })?;

        Ok(CuckooFilter {
            seed,
            num_buckets,
            slots_per_bucket,
            fingerprint_bits,
            max_kicks: DEFAULT_MAX_KICKS,
            num_items: 0,
            slots: vec![EMPTY_SLOT; total_slots as usize],
            rng: XorShift64::seeded(seed ^ RNG_SEED_TWEAK),
        })
    }

    /// Suggests the fingerprint width in bits for the target false
    /// positive probability: `f = ceil(log2(2s / fpp))`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// when the required width exceeds the 64-bit hash width.
    pub fn suggest_fingerprint_bits(slots_per_bucket: u8, fpp: f64) -> Result<u8, Error> {
        let bits = (2.0 * slots_per_bucket as f64 / fpp).log2().ceil() as i64;
        if bits > MAX_FINGERPRINT_BITS as i64 {
            return Err(Error::invalid_argument(
                "target false positive rate needs a fingerprint wider than the hash",
            )
            .with_context("fpp", fpp)
            .with_context("required_bits", bits));
        }
        Ok(bits.max(1) as u8)
    }

    // ========================================================================
    // Query and Update Operations
    // ========================================================================

    /// Inserts an item.
    ///
    /// If both candidate buckets are full, resident fingerprints are
    /// displaced to their alternate buckets, up to
    /// [`max_kicks`](Self::max_kicks) times.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CapacityExceeded`](crate::error::ErrorKind::CapacityExceeded)
    /// when the kick budget runs out. The filter stays valid and should be
    /// considered full: the new fingerprint was placed along the eviction
    /// chain and the final displaced fingerprint is dropped, so the item
    /// count is unchanged.
    pub fn insert(&mut self, item: impl AsRef<[u8]>) -> Result<(), Error> {
        let (fp, b1, b2) = self.locate(item.as_ref());

        if self.place_in_bucket(b1, fp) || self.place_in_bucket(b2, fp) {
            self.num_items += 1;
            return Ok(());
        }

        let mut bucket = if self.rng.next_bool() { b1 } else { b2 };
        let mut fp = fp;
        for _ in 0..self.max_kicks {
            let victim_slot = self.bucket_start(bucket)
                + self.rng.next_below(self.slots_per_bucket as u64) as usize;
            std::mem::swap(&mut fp, &mut self.slots[victim_slot]);

            bucket = self.alternate_bucket(bucket, fp);
            if self.place_in_bucket(bucket, fp) {
                self.num_items += 1;
                return Ok(());
            }
        }

        Err(
            Error::capacity_exceeded("eviction budget exhausted; the filter is full")
                .with_context("max_kicks", self.max_kicks)
                .with_context("num_items", self.num_items),
        )
    }

    /// Tests whether an item is possibly in the set: true iff its
    /// fingerprint appears in either candidate bucket.
    pub fn contains(&self, item: impl AsRef<[u8]>) -> bool {
        let (fp, b1, b2) = self.locate(item.as_ref());
        self.bucket_holds(b1, fp) || self.bucket_holds(b2, fp)
    }

    /// Removes one occurrence of an item's fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ElementNotFound`](crate::error::ErrorKind::ElementNotFound)
    /// if neither candidate bucket holds the fingerprint.
    pub fn remove(&mut self, item: impl AsRef<[u8]>) -> Result<(), Error> {
        let (fp, b1, b2) = self.locate(item.as_ref());
        if self.clear_from_bucket(b1, fp) || self.clear_from_bucket(b2, fp) {
            self.num_items = self.num_items.saturating_sub(1);
            Ok(())
        } else {
            Err(Error::element_not_found(
                "fingerprint absent from both candidate buckets",
            ))
        }
    }

    // ========================================================================
    // Fingerprint and bucket algebra
    // ========================================================================

    /// Derives `(fingerprint, bucket, alternate bucket)` for an item.
    fn locate(&self, item: &[u8]) -> (u64, u64, u64) {
        let h1 = hash::xxhash64(item, self.seed);
        let fp = self.fingerprint_of(h1);
        let b1 = h1 % self.num_buckets;
        let b2 = self.alternate_bucket(b1, fp);
        (fp, b1, b2)
    }

    /// The high `f` bits of the hash, folded to 1 when zero because zero
    /// marks a free slot.
    fn fingerprint_of(&self, h1: u64) -> u64 {
        let fp = if self.fingerprint_bits == 64 {
            h1
        } else {
            h1 >> (64 - self.fingerprint_bits as u32)
        };
        if fp == EMPTY_SLOT {
            1
        } else {
            fp
        }
    }

    /// `bucket XOR (H(fp) mod b)`. With a power-of-two bucket count this is
    /// an involution, so the same call maps a bucket to its alternate and
    /// back.
    fn alternate_bucket(&self, bucket: u64, fp: u64) -> u64 {
        let fp_hash = hash::xxhash64(&fp.to_le_bytes(), self.seed);
        bucket ^ (fp_hash % self.num_buckets)
    }

    fn bucket_start(&self, bucket: u64) -> usize {
        (bucket * self.slots_per_bucket as u64) as usize
    }

    fn place_in_bucket(&mut self, bucket: u64, fp: u64) -> bool {
        let start = self.bucket_start(bucket);
        for slot in start..start + self.slots_per_bucket as usize {
            if self.slots[slot] == EMPTY_SLOT {
                self.slots[slot] = fp;
                return true;
            }
        }
        false
    }

    fn bucket_holds(&self, bucket: u64, fp: u64) -> bool {
        let start = self.bucket_start(bucket);
        self.slots[start..start + self.slots_per_bucket as usize].contains(&fp)
    }

    fn clear_from_bucket(&mut self, bucket: u64, fp: u64) -> bool {
        let start = self.bucket_start(bucket);
        for slot in start..start + self.slots_per_bucket as usize {
            if self.slots[slot] == fp {
                self.slots[slot] = EMPTY_SLOT;
                return true;
            }
        }
        false
    }

    // ========================================================================
    // Statistics and Properties
    // ========================================================================

    /// Returns whether the filter is empty (no items stored).
    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    /// Returns the number of fingerprints currently stored.
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Returns the bucket count (a power of two).
    pub fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    /// Returns the number of fingerprint slots per bucket.
    pub fn slots_per_bucket(&self) -> u8 {
        self.slots_per_bucket
    }

    /// Returns the fingerprint width in bits.
    pub fn fingerprint_bits(&self) -> u8 {
        self.fingerprint_bits
    }

    /// Returns the eviction budget per insertion.
    pub fn max_kicks(&self) -> u32 {
        self.max_kicks
    }

    /// Replaces the eviction budget per insertion.
    pub fn set_max_kicks(&mut self, max_kicks: u32) {
        self.max_kicks = max_kicks;
    }

    /// Returns the fraction of slots occupied.
    pub fn load(&self) -> f64 {
        self.num_items as f64 / self.slots.len() as f64
    }

    /// Upper bound on the false positive probability: `2s / 2^f`.
    pub fn estimated_fpp(&self) -> f64 {
        2.0 * self.slots_per_bucket as f64 / 2f64.powi(self.fingerprint_bits as i32)
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
        self.rng = XorShift64::seeded(seed ^ RNG_SEED_TWEAK);
    }

    /// Checks if two filters are comparable: same shape and seed.
    pub fn is_compatible(&self, other: &CuckooFilter) -> bool {
        self.num_buckets == other.num_buckets
            && self.slots_per_bucket == other.slots_per_bucket
            && self.fingerprint_bits == other.fingerprint_bits
            && self.seed == other.seed
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serializes the filter to a byte vector. Slots are written verbatim,
    /// including the empty sentinel.
    pub fn serialize(&self) -> Vec<u8> {
        let is_empty = self.num_items == 0;
        let payload = if is_empty { 0 } else { self.slots.len() * 8 };
        let mut bytes = SketchBytes::with_capacity(8 * PREAMBLE_LONGS as usize + payload);

        bytes.write_u8(PREAMBLE_LONGS);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::CUCKOO.id);
        bytes.write_u8(if is_empty { FLAGS_IS_EMPTY } else { 0 });
        bytes.write_u8(self.slots_per_bucket);
        bytes.write_u8(self.fingerprint_bits);
        bytes.write_u16_le(0); // reserved
        bytes.write_u32_le(self.max_kicks);
        bytes.write_u32_le(0); // reserved
        bytes.write_u64_le(self.seed);
        bytes.write_u64_le(self.num_buckets);
        bytes.write_u64_le(self.num_items);

        if !is_empty {
            for &slot in &self.slots {
                bytes.write_u64_le(slot);
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

        Family::CUCKOO.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        if preamble_longs != PREAMBLE_LONGS {
            return Err(Error::invalid_preamble_longs(PREAMBLE_LONGS, preamble_longs));
        }

        let slots_per_bucket = cursor.read_u8().map_err(truncated("slots_per_bucket"))?;
        let fingerprint_bits = cursor.read_u8().map_err(truncated("fingerprint_bits"))?;
        cursor.read_u16::<LE>().map_err(truncated("reserved"))?;
        let max_kicks = cursor.read_u32::<LE>().map_err(truncated("max_kicks"))?;
        cursor.read_u32::<LE>().map_err(truncated("reserved"))?;
        let seed = cursor.read_u64::<LE>().map_err(truncated("seed"))?;
        let num_buckets = cursor.read_u64::<LE>().map_err(truncated("num_buckets"))?;
        let num_items = cursor.read_u64::<LE>().map_err(truncated("num_items"))?;

        if num_buckets == 0 || !num_buckets.is_power_of_two() {
            return Err(Error::deserial("num_buckets must be a power of two")
                .with_context("num_buckets", num_buckets));
        }

        let mut filter =
            Self::with_size_and_seed(num_buckets, fingerprint_bits, slots_per_bucket, seed)
                .map_err(|err| {
                    Error::deserial(format!("invalid filter shape: {}", err.message()))
                })?;
        filter.max_kicks = max_kicks;
        filter.num_items = num_items;

        if (flags & FLAGS_IS_EMPTY) == 0 {
            for slot in &mut filter.slots {
                *slot = cursor.read_u64::<LE>().map_err(truncated("slots"))?;
            }
        }

        Ok(filter)
    }
}

// The eviction RNG is transient state, not part of a filter's identity.
impl PartialEq for CuckooFilter {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
            && self.num_buckets == other.num_buckets
            && self.slots_per_bucket == other.slots_per_bucket
            && self.fingerprint_bits == other.fingerprint_bits
            && self.max_kicks == other.max_kicks
            && self.num_items == other.num_items
            && self.slots == other.slots
    }
}
