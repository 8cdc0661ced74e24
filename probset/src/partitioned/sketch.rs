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

const PREAMBLE_LONGS: u8 = 5;
const SERIAL_VERSION: u8 = 1;
const FLAGS_IS_EMPTY: u8 = 1 << 0;

const MAX_SLICE_BITS: u64 = 1u64 << 32;

/// The load factor assumed when none is given: half of each slice set when
/// the filter is populated to capacity.
pub const DEFAULT_LOAD_FACTOR: f64 = 0.5;

/// A partitioned Bloom filter.
///
/// The bit array is divided into `k` disjoint slices of equal size and hash
/// function `i` addresses slice `i` only. Every inserted item sets exactly
/// one bit in each slice.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedBloomFilter {
    seed: u64,
    /// Slice count; one hash function per slice.
    num_slices: u16,
    /// Size of each slice in bits.
    bits_per_slice: u64,
    /// Target fraction of each slice set at capacity.
    load_factor: f64,
    bits: BitVec,
    num_items: u64,
}

impl PartitionedBloomFilter {
    /// Creates a filter sized for `capacity` items at the target false
    /// positive probability, with the default load factor of 0.5.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `capacity` is 0 or `fpp` is not in (0.0, 1.0).
    ///
    /// # Examples
    ///
    /// ```
    /// # use probset::partitioned::PartitionedBloomFilter;
    /// let filter = PartitionedBloomFilter::with_capacity(1_000, 0.01).unwrap();
    /// assert_eq!(filter.num_slices(), 7);
    /// ```
    pub fn with_capacity(capacity: u64, fpp: f64) -> Result<Self, Error> {
        Self::with_load_factor(capacity, fpp, DEFAULT_LOAD_FACTOR, DEFAULT_UPDATE_SEED)
    }

    /// Creates a filter sized for `(capacity, fpp)` under an explicit load
    /// factor and seed.
    ///
    /// The slice count is `ceil(log2(1/fpp))` and each slice holds
    /// `ceil(-k * capacity / ln(1 - load_factor^(1/k)))` bits.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if `capacity` is 0, or `fpp` or `load_factor` is not in (0.0, 1.0).
    pub fn with_load_factor(
        capacity: u64,
        fpp: f64,
        load_factor: f64,
        seed: u64,
    ) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::invalid_argument("capacity must be at least 1"));
        }
        if !(fpp > 0.0 && fpp < 1.0) {
            return Err(
                Error::invalid_argument("false positive rate must be in (0, 1) exclusive")
                    .with_context("fpp", fpp),
            );
        }
        if !(load_factor > 0.0 && load_factor < 1.0) {
            return Err(
                Error::invalid_argument("load factor must be in (0, 1) exclusive")
                    .with_context("load_factor", load_factor),
            );
        }

        let num_slices = Self::suggest_num_slices(fpp);
        let bits_per_slice = Self::suggest_bits_per_slice(capacity, num_slices, load_factor);
        Self::make(num_slices, bits_per_slice, load_factor, seed)
    }

    /// Creates a filter with explicit slice shape.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if either dimension is 0 or a slice exceeds the supported size.
    pub fn with_size(num_slices: u16, bits_per_slice: u64, seed: u64) -> Result<Self, Error> {
        Self::make(num_slices, bits_per_slice, DEFAULT_LOAD_FACTOR, seed)
    }

    fn make(
        num_slices: u16,
        bits_per_slice: u64,
        load_factor: f64,
        seed: u64,
    ) -> Result<Self, Error> {
        validate_shape(num_slices, bits_per_slice)?;
        Ok(PartitionedBloomFilter {
            seed,
            num_slices,
            bits_per_slice,
            load_factor,
            bits: BitVec::new(num_slices as u64 * bits_per_slice),
            num_items: 0,
        })
    }

    /// Inserts an item, setting exactly one bit in each slice.
    pub fn insert(&mut self, item: impl AsRef<[u8]>) {
        let (h1, h2) = hash::hash_twice(item.as_ref(), self.seed);
        for slice in 0..self.num_slices as u64 {
            let offset = hash::index_at(h1, h2, slice, self.bits_per_slice);
            self.bits.set(slice * self.bits_per_slice + offset);
        }
        self.num_items += 1;
    }

    /// Tests whether an item is possibly in the set.
    pub fn contains(&self, item: impl AsRef<[u8]>) -> bool {
        if self.num_items == 0 {
            return false;
        }
        let (h1, h2) = hash::hash_twice(item.as_ref(), self.seed);
        (0..self.num_slices as u64).all(|slice| {
            let offset = hash::index_at(h1, h2, slice, self.bits_per_slice);
            self.bits.get(slice * self.bits_per_slice + offset)
        })
    }

    /// Returns whether the filter is empty (no items inserted).
    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    /// Returns the number of insertions performed.
    pub fn num_items(&self) -> u64 {
        self.num_items
    }

    /// Returns the slice count (one hash function per slice).
    pub fn num_slices(&self) -> u16 {
        self.num_slices
    }

    /// Returns the size of each slice in bits.
    pub fn bits_per_slice(&self) -> u64 {
        self.bits_per_slice
    }

    /// Returns the total number of bits across all slices.
    pub fn num_bits(&self) -> u64 {
        self.bits.num_bits()
    }

    /// Returns the load factor the filter was sized for.
    pub fn load_factor(&self) -> f64 {
        self.load_factor
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

    /// Estimates the current false positive probability.
    ///
    /// Each slice fills independently, so the estimate is the per-slice
    /// fill probability `1 - e^(-n/m)` raised to the slice count.
    pub fn estimated_fpp(&self) -> f64 {
        let n = self.num_items as f64;
        let m = self.bits_per_slice as f64;
        (1.0 - (-n / m).exp()).powf(self.num_slices as f64)
    }

    /// Checks if two filters are comparable: same shape and seed.
    pub fn is_compatible(&self, other: &PartitionedBloomFilter) -> bool {
        self.num_slices == other.num_slices
            && self.bits_per_slice == other.bits_per_slice
            && self.seed == other.seed
    }

    /// Serializes the filter to a byte vector.
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
        bytes.write_u8(Family::PARTITIONED_BLOOM.id);
        bytes.write_u8(if is_empty { FLAGS_IS_EMPTY } else { 0 });
        bytes.write_u16_le(self.num_slices);
        bytes.write_u16_le(0); // reserved
        bytes.write_u64_le(self.seed);
        bytes.write_u64_le(self.bits_per_slice);
        bytes.write_f64_le(self.load_factor);
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

        Family::PARTITIONED_BLOOM.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        if preamble_longs != PREAMBLE_LONGS {
            return Err(Error::invalid_preamble_longs(PREAMBLE_LONGS, preamble_longs));
        }

        let num_slices = cursor.read_u16::<LE>().map_err(truncated("num_slices"))?;
        cursor.read_u16::<LE>().map_err(truncated("reserved"))?;
        let seed = cursor.read_u64::<LE>().map_err(truncated("seed"))?;
        let bits_per_slice = cursor
            .read_u64::<LE>()
            .map_err(truncated("bits_per_slice"))?;
        let load_factor = cursor.read_f64::<LE>().map_err(truncated("load_factor"))?;
        let num_items = cursor.read_u64::<LE>().map_err(truncated("num_items"))?;

        validate_shape(num_slices, bits_per_slice).map_err(|err| {
            Error::deserial(format!("invalid filter shape: {}", err.message()))
        })?;
        if !(load_factor > 0.0 && load_factor < 1.0) {
            return Err(Error::deserial("load factor out of range"));
        }

        let num_bits = num_slices as u64 * bits_per_slice;
        let bits = if (flags & FLAGS_IS_EMPTY) != 0 {
            BitVec::new(num_bits)
        } else {
            let mut words = vec![0u64; BitVec::word_count(num_bits)];
            for word in &mut words {
                *word = cursor.read_u64::<LE>().map_err(truncated("bit_array"))?;
            }
            BitVec::from_words(num_bits, words)
        };

        Ok(PartitionedBloomFilter {
            seed,
            num_slices,
            bits_per_slice,
            load_factor,
            bits,
            num_items,
        })
    }

    /// Suggests the slice count for a target false positive probability:
    /// `k = ceil(log2(1/fpp))`.
    pub fn suggest_num_slices(fpp: f64) -> u16 {
        let k = (1.0 / fpp).log2().ceil() as u64;
        k.clamp(1, u16::MAX as u64) as u16
    }

    /// Suggests the slice size in bits for `(capacity, k, load_factor)`:
    /// `m = ceil(-k * capacity / ln(1 - load_factor^(1/k)))`.
    pub fn suggest_bits_per_slice(capacity: u64, num_slices: u16, load_factor: f64) -> u64 {
        let k = num_slices as f64;
        let per_slice_fill = 1.0 - load_factor.powf(1.0 / k);
        let bits = (-(k * capacity as f64) / per_slice_fill.ln()).ceil() as u64;
        bits.max(1)
    }
}

fn validate_shape(num_slices: u16, bits_per_slice: u64) -> Result<(), Error> {
    if num_slices == 0 {
        return Err(Error::invalid_argument("num_slices must be at least 1"));
    }
    if bits_per_slice == 0 {
        return Err(Error::invalid_argument("bits_per_slice must be at least 1"));
    }
    if bits_per_slice > MAX_SLICE_BITS {
        return Err(
            Error::invalid_argument("bits_per_slice exceeds the supported limit")
                .with_context("bits_per_slice", bits_per_slice)
                .with_context("max", MAX_SLICE_BITS),
        );
    }
    Ok(())
}
