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

//! Counting Bloom filter: each bit of the classic filter becomes a small
//! saturating counter, which makes removal possible. Counters never wrap;
//! once one saturates, subsequent removals through it may leave stale
//! counts, and the filter reports how many updates were dropped.
//!
//! # Usage
//!
//! ```rust
//! use probset::counting::CountingBloomFilter;
//!
//! let mut filter = CountingBloomFilter::with_capacity(1_000, 0.01).unwrap();
//! filter.insert("alice");
//! assert!(filter.contains("alice"));
//!
//! filter.remove("alice").unwrap();
//! assert!(!filter.contains("alice"));
//! ```

mod sketch;

pub use self::sketch::CountingBloomFilter;
