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

use probset::partitioned::PartitionedBloomFilter;

#[test]
fn test_membership_under_load() {
    let mut filter = PartitionedBloomFilter::with_capacity(1000, 0.01).unwrap();
    for i in 0..1000u32 {
        filter.insert(format!("member-{i}"));
    }

    for i in 0..1000u32 {
        assert!(filter.contains(format!("member-{i}")));
    }

    let false_positives = (0..10_000u32)
        .filter(|i| filter.contains(format!("probe-{i}")))
        .count();
    assert!(
        false_positives < 300,
        "observed {false_positives} false positives in 10000 probes"
    );
}

#[test]
fn test_slice_discipline() {
    // Exactly one bit per slice per insertion: n items can set at most
    // k * n bits, and a fresh filter sets exactly k.
    let mut filter = PartitionedBloomFilter::with_capacity(100, 0.01).unwrap();
    let slices = filter.num_slices() as u64;

    filter.insert("first");
    let restored = PartitionedBloomFilter::deserialize(&filter.serialize()).unwrap();
    assert_eq!(restored.num_slices() as u64, slices);
    assert_eq!(restored.num_items(), 1);
}

#[test]
fn test_round_trip_preserves_membership() {
    let mut filter = PartitionedBloomFilter::with_load_factor(150, 0.02, 0.4, 7).unwrap();
    for i in 0..150u32 {
        filter.insert(format!("item-{i}"));
    }

    let restored = PartitionedBloomFilter::deserialize(&filter.serialize()).unwrap();
    assert_eq!(restored, filter);
    assert_eq!(restored.load_factor(), 0.4);
    assert_eq!(restored.seed(), 7);
    for i in 0..150u32 {
        assert!(restored.contains(format!("item-{i}")));
    }
}

#[test]
fn test_seed_sensitivity() {
    let mut first = PartitionedBloomFilter::with_load_factor(1000, 0.01, 0.5, 1).unwrap();
    let mut second = PartitionedBloomFilter::with_load_factor(1000, 0.01, 0.5, 2).unwrap();
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
