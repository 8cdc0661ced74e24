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

//! Partitioned Bloom filter: the bit array is split into k disjoint slices
//! and hash i addresses slice i only, so every insertion sets exactly one
//! bit per slice. Each element therefore contributes uniformly to the false
//! positive rate, at the cost of slightly denser slices for small inputs.
//!
//! # Usage
//!
//! ```rust
//! use probset::partitioned::PartitionedBloomFilter;
//!
//! let mut filter = PartitionedBloomFilter::with_capacity(1_000, 0.01).unwrap();
//! filter.insert("apple");
//!
//! assert!(filter.contains("apple"));
//! ```

mod sketch;

pub use self::sketch::PartitionedBloomFilter;
pub use self::sketch::DEFAULT_LOAD_FACTOR;
