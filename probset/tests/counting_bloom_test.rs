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

use googletest::assert_that;
use googletest::prelude::contains_substring;
use probset::counting::CountingBloomFilter;
use probset::error::ErrorKind;

#[test]
fn test_add_then_remove_walkthrough() {
    let mut filter = CountingBloomFilter::with_size(64, 4).unwrap();

    filter.insert("alice");
    filter.insert("bob");
    filter.insert("carole");
    filter.remove("carole").unwrap();

    assert!(filter.contains("alice"));
    assert!(filter.contains("bob"));
    assert!(!filter.contains("carole"));
}

#[test]
fn test_membership_is_unchanged_by_add_remove_pair() {
    let mut filter = CountingBloomFilter::with_capacity(200, 0.01).unwrap();
    for i in 0..100u32 {
        filter.insert(format!("resident-{i}"));
    }
    let before = filter.clone();

    filter.insert("transient");
    filter.remove("transient").unwrap();

    assert_eq!(filter, before);
    for i in 0..100u32 {
        assert!(filter.contains(format!("resident-{i}")));
    }
}

#[test]
fn test_remove_of_absent_item_reports_unknown_element() {
    let mut filter = CountingBloomFilter::with_capacity(200, 0.01).unwrap();
    filter.insert("alice");

    let err = filter.remove("nobody").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ElementNotFound);
    assert_that!(err.message(), contains_substring("not inserted"));
    assert!(filter.contains("alice"));
}

#[test]
fn test_round_trip_preserves_counters() {
    let mut filter = CountingBloomFilter::with_capacity(100, 0.01).unwrap();
    filter.insert("alice");
    filter.insert("alice");
    filter.insert("bob");
    filter.remove("bob").unwrap();

    let restored = CountingBloomFilter::deserialize(&filter.serialize()).unwrap();
    assert_eq!(restored, filter);

    // The restored filter carries live counters: one more removal of the
    // doubly-inserted item still leaves it present.
    let mut restored = restored;
    restored.remove("alice").unwrap();
    assert!(restored.contains("alice"));
    restored.remove("alice").unwrap();
    assert!(!restored.contains("alice"));
}

#[test]
fn test_saturation_survives_round_trip() {
    let mut filter = CountingBloomFilter::with_size(16, 2).unwrap();
    for _ in 0..400 {
        filter.insert("hot");
    }
    assert!(filter.num_saturated_updates() > 0);

    let restored = CountingBloomFilter::deserialize(&filter.serialize()).unwrap();
    assert_eq!(restored.num_saturated_updates(), filter.num_saturated_updates());
}
