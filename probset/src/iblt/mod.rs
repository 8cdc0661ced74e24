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

//! Invertible Bloom lookup table (IBLT) for set reconciliation.
//!
//! Each of `m` cells accumulates, by XOR, the fixed-length elements hashed
//! to it along with a per-element check hash and a signed counter. Two
//! tables built over different sets can be subtracted cell-wise; peeling
//! the difference recovers the symmetric difference of the sets, as long
//! as the table is large enough relative to the difference.
//!
//! # Usage
//!
//! ```rust
//! use probset::iblt::InvertibleBloomFilter;
//!
//! let mut local = InvertibleBloomFilter::new(50, 3, 8).unwrap();
//! let mut remote = InvertibleBloomFilter::new(50, 3, 8).unwrap();
//!
//! local.insert(b"alice---").unwrap();
//! local.insert(b"json----").unwrap();
//! remote.insert(b"alice---").unwrap();
//! remote.insert(b"car-----").unwrap();
//!
//! let decoded = local.subtract(&remote).unwrap().decode();
//! assert!(decoded.success);
//! assert_eq!(decoded.additional, vec![b"json----".to_vec()]);
//! assert_eq!(decoded.missing, vec![b"car-----".to_vec()]);
//! ```
//!
//! # Notes
//!
//! - All elements of a table must share one byte length, declared at
//!   construction; XOR accumulation is only reversible at a fixed width.
//! - Decoding is best effort: when the table is too small for the true
//!   difference, the result reports `success: false` along with whatever
//!   was peeled.

mod sketch;

pub use self::sketch::DecodeResult;
pub use self::sketch::InvertibleBloomFilter;
pub use self::sketch::ListResult;
pub use self::sketch::Membership;
