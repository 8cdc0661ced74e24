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

//! # probset
//!
//! Probabilistic set and frequency data structures over opaque byte strings:
//! approximate membership, sub-linear frequency estimation, and set
//! reconciliation, all built on a shared seeded hashing substrate.
//!
//! The library is divided into modules that constitute distinct structures:
//!
//! - [`bloom`]: classic Bloom filter (membership, no false negatives)
//! - [`partitioned`]: partitioned Bloom filter (one bit per hash slice)
//! - [`counting`]: counting Bloom filter (membership with removal)
//! - [`cuckoo`]: cuckoo filter (fingerprint membership with removal)
//! - [`countmin`]: Count-Min sketch (stream frequency estimation)
//! - [`iblt`]: invertible Bloom lookup table (set reconciliation)
//!
//! Every structure hashes raw bytes: anything implementing `AsRef<[u8]>` can
//! be inserted, so string items hash as their UTF-8 bytes. Structures carry a
//! 64-bit seed that participates in every hash computation; instances must
//! share a seed (and shape) to be merged, subtracted, or compared.
//!
//! The structures are single-threaded and synchronous. Wrap instances in your
//! own synchronization if they must be shared across threads.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

pub mod bloom;
pub mod counting;
pub mod countmin;
pub mod cuckoo;
pub mod error;
pub mod iblt;
pub mod partitioned;

mod codec;
mod common;
mod hash;
