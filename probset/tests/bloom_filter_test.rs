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
use probset::bloom::BloomFilter;

#[test]
fn test_thousand_items_at_one_percent() {
    let mut filter = BloomFilter::with_capacity(1000, 0.01).unwrap();
    for i in 1..=1000u32 {
        filter.insert(i.to_string());
    }

    // Every inserted item must be found.
    assert!(filter.contains("500"));
    for i in 1..=1000u32 {
        assert!(filter.contains(i.to_string()));
    }

    // The estimate at capacity stays near the configured rate.
    assert!(filter.estimated_fpp() <= 0.02);
}

#[test]
fn test_observed_false_positive_rate_converges() {
    let mut filter = BloomFilter::with_capacity(1000, 0.01).unwrap();
    for i in 0..1000u32 {
        filter.insert(format!("member-{i}"));
    }

    let false_positives = (0..10_000u32)
        .filter(|i| filter.contains(format!("probe-{i}")))
        .count();

    // Expected ~1%; 3% leaves a wide margin over the sampling noise.
    assert!(
        false_positives < 300,
        "observed {false_positives} false positives in 10000 probes"
    );
}

#[test]
fn test_different_seeds_disagree_on_false_positives() {
    let mut first = BloomFilter::with_capacity_and_seed(1000, 0.01, 1).unwrap();
    let mut second = BloomFilter::with_capacity_and_seed(1000, 0.01, 2).unwrap();
    for i in 0..1000u32 {
        let item = format!("member-{i}");
        first.insert(&item);
        second.insert(&item);
    }

    let disagreements = (0..10_000u32)
        .filter(|i| {
            let probe = format!("probe-{i}");
            first.contains(&probe) != second.contains(&probe)
        })
        .count();
    assert!(disagreements >= 1);
}

#[test]
fn test_round_trip_preserves_membership() {
    let mut filter = BloomFilter::with_capacity(200, 0.01).unwrap();
    for i in 0..200u32 {
        filter.insert(format!("item-{i}"));
    }

    let restored = BloomFilter::deserialize(&filter.serialize()).unwrap();
    assert_eq!(restored.seed(), filter.seed());
    for i in 0..200u32 {
        let item = format!("item-{i}");
        assert_eq!(filter.contains(&item), restored.contains(&item));
    }
}

#[test]
fn test_deserialize_reports_family_mismatch() {
    let mut bytes = BloomFilter::with_capacity(10, 0.1).unwrap().serialize();
    bytes[2] = 42;
    let err = BloomFilter::deserialize(&bytes).unwrap_err();
    assert_that!(err.message(), contains_substring("invalid family"));
}

#[test]
fn test_parameter_errors() {
    let err = BloomFilter::with_capacity(1000, 1.01).unwrap_err();
    assert_that!(err.message(), contains_substring("false positive rate"));

    let err = BloomFilter::with_capacity(0, 0.01).unwrap_err();
    assert_that!(err.message(), contains_substring("capacity"));
}
