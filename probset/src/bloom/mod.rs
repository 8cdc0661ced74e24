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

//! Classic Bloom filter for probabilistic set membership testing.
//!
//! Provides fast membership queries with no false negatives and a tunable
//! false positive rate. Bits only flip from 0 to 1, so elements cannot be
//! removed; use the counting Bloom filter when removal is needed.
//!
//! # Usage
//!
//! ```rust
//! use probset::bloom::BloomFilter;
//!
//! let mut filter = BloomFilter::with_capacity(1_000, 0.01).unwrap();
//! filter.insert("apple");
//!
//! assert!(filter.contains("apple"));
//! assert!(!filter.contains("grape"));
//! ```

mod sketch;

pub use self::sketch::BloomFilter;
