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

//! Shared serialization plumbing: the little-endian byte writer and the
//! family registry identifying each structure on the wire. Reads go through
//! `std::io::Cursor` + byteorder in each structure's deserializer.

use std::io;

use crate::error::Error;

/// A simple wrapper around a `Vec<u8>` providing the write widths the
/// structure formats use. All multi-byte writes are little-endian.
pub(crate) struct SketchBytes {
    bytes: Vec<u8>,
}

impl SketchBytes {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write(&mut self, buf: &[u8]) {
        self.bytes.extend_from_slice(buf);
    }

    pub fn write_u8(&mut self, n: u8) {
        self.bytes.push(n);
    }

    pub fn write_u16_le(&mut self, n: u16) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, n: u32) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, n: u64) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, n: i32) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, n: i64) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_f64_le(&mut self, n: f64) {
        self.write(&n.to_le_bytes());
    }
}

/// Maps a truncated-read IO error onto the crate error type, tagging the
/// field that could not be read.
pub(crate) fn truncated(tag: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |err| Error::insufficient_data(tag).set_source(err)
}

/// Defines the families of structures that share a wire format.
///
/// A family identifies the structure type in the first bytes of every
/// serialized record, so a decoder can reject payloads produced by a
/// different structure.
pub(crate) struct Family {
    /// The byte ID for this family.
    pub id: u8,
    /// The name for this family.
    pub name: &'static str,
}

impl Family {
    /// Classic Bloom filter.
    pub const BLOOM: Family = Family {
        id: 1,
        name: "BloomFilter",
    };

    /// Partitioned Bloom filter.
    pub const PARTITIONED_BLOOM: Family = Family {
        id: 2,
        name: "PartitionedBloomFilter",
    };

    /// Counting Bloom filter.
    pub const COUNTING_BLOOM: Family = Family {
        id: 3,
        name: "CountingBloomFilter",
    };

    /// Cuckoo filter.
    pub const CUCKOO: Family = Family {
        id: 4,
        name: "CuckooFilter",
    };

    /// Count-Min sketch.
    pub const COUNTMIN: Family = Family {
        id: 5,
        name: "CountMinSketch",
    };

    /// Invertible Bloom lookup table.
    pub const IBLT: Family = Family {
        id: 6,
        name: "InvertibleBloomFilter",
    };

    pub fn validate_id(&self, family_id: u8) -> Result<(), Error> {
        if family_id != self.id {
            Err(Error::invalid_family(self.id, family_id, self.name))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_is_little_endian() {
        let mut bytes = SketchBytes::with_capacity(16);
        bytes.write_u8(0xab);
        bytes.write_u16_le(0x0102);
        bytes.write_u32_le(0x03040506);
        let out = bytes.into_bytes();
        assert_eq!(out, vec![0xab, 0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn test_family_ids_are_distinct() {
        let ids = [
            Family::BLOOM.id,
            Family::PARTITIONED_BLOOM.id,
            Family::COUNTING_BLOOM.id,
            Family::CUCKOO.id,
            Family::COUNTMIN.id,
            Family::IBLT.id,
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_validate_id_rejects_foreign_family() {
        assert!(Family::BLOOM.validate_id(Family::BLOOM.id).is_ok());
        let err = Family::BLOOM.validate_id(Family::CUCKOO.id).unwrap_err();
        assert!(err.message().contains("BloomFilter"));
    }
}
