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

//! Cuckoo filter: approximate membership with removal and a bounded false
//! positive rate. Items are represented by short fingerprints stored in one
//! of two candidate buckets; insertion into a full table displaces resident
//! fingerprints cuckoo-style until a free slot is found or the kick budget
//! runs out.
//!
//! # Usage
//!
//! ```rust
//! use probset::cuckoo::CuckooFilter;
//!
//! let mut filter = CuckooFilter::with_capacity(1_000, 0.01).unwrap();
//! filter.insert("alice").unwrap();
//!
//! assert!(filter.contains("alice"));
//! filter.remove("alice").unwrap();
//! assert!(!filter.contains("alice"));
//! ```
//!
//! # Notes
//!
//! - Only remove items that were previously inserted. `contains` can be
//!   satisfied by an unrelated item with the same fingerprint, and removing
//!   such a false positive deletes the other item's fingerprint.
//! - The bucket count is rounded up to a power of two so that the
//!   partial-key bucket algebra is involutive.

mod sketch;

pub use self::sketch::CuckooFilter;
