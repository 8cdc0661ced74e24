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

//! The shared hashing substrate: one seeded XXH64 pass yields a pair of
//! 64-bit values, and every index a structure needs is derived from that
//! pair by double hashing. The pair replaces k independent hash passes per
//! element (Kirsch-Mitzenmacher).

mod xxhash;

pub(crate) use self::xxhash::xxhash64;

/// The seed 0x1234567890 is used by every structure unless the caller
/// provides another one.
///
/// Choosing a seed is somewhat arbitrary; what matters is that the seed is
/// part of the identity of a structure. In order to merge, subtract, or
/// compare two structures it is critical that the same hash function and
/// seed are used for both, otherwise the assumed 1:1 relationship between
/// the original source key value and the hashed bit string would be
/// violated. Once you have a history of serialized structures you are stuck
/// with their seed.
pub(crate) const DEFAULT_UPDATE_SEED: u64 = 0x12_3456_7890;

/// Hashes `bytes` twice: once under `seed` and once under `seed + 1`.
///
/// The two values back all double-hashed index derivation, so a single
/// element is hashed at most twice no matter how many indices a structure
/// draws from it.
pub(crate) fn hash_twice(bytes: &[u8], seed: u64) -> (u64, u64) {
    (
        xxhash64(bytes, seed),
        xxhash64(bytes, seed.wrapping_add(1)),
    )
}

/// The i-th double-hashed index: `(h1 + i * h2) mod range`.
#[inline]
pub(crate) fn index_at(h1: u64, h2: u64, i: u64, range: u64) -> u64 {
    h1.wrapping_add(i.wrapping_mul(h2)) % range
}

// Attempts against one hash pair before re-deriving it, as a multiple of the
// range, and rounds of re-derivation before falling back to an ordered sweep.
const ATTEMPTS_PER_PAIR_FACTOR: u64 = 2;
const MAX_REHASH_ROUNDS: u32 = 8;

/// Draws `k` distinct indices in `0..range` from the hash pair.
///
/// Indices follow `(h1 + i * h2) mod range`; when a probe collides with an
/// index already drawn, a quadratic `i * i` tweak is added for that probe
/// only. If a pair keeps colliding it is re-derived from its own bytes, and
/// after several such rounds the remaining indices are taken by an ordered
/// sweep, which keeps the loop total.
///
/// Callers must guarantee `k <= range`; constructors enforce this when the
/// structure is built.
pub(crate) fn distinct_indices(h1: u64, h2: u64, range: u64, k: usize) -> Vec<u64> {
    debug_assert!(
        k as u64 <= range,
        "cannot draw {k} distinct indices from a range of {range}"
    );

    let (mut h1, mut h2) = (h1, h2);
    let mut indices: Vec<u64> = Vec::with_capacity(k);
    let mut attempt: u64 = 0;
    let mut rounds: u32 = 0;

    while indices.len() < k {
        let base = h1.wrapping_add(attempt.wrapping_mul(h2));
        let mut candidate = base % range;
        if indices.contains(&candidate) {
            candidate = base.wrapping_add(attempt.wrapping_mul(attempt)) % range;
        }
        if !indices.contains(&candidate) {
            indices.push(candidate);
        }

        attempt += 1;
        if attempt > range.saturating_mul(ATTEMPTS_PER_PAIR_FACTOR) {
            rounds += 1;
            if rounds >= MAX_REHASH_ROUNDS {
                for index in 0..range {
                    if indices.len() == k {
                        break;
                    }
                    if !indices.contains(&index) {
                        indices.push(index);
                    }
                }
                break;
            }

            let mut material = [0u8; 16];
            material[..8].copy_from_slice(&h1.to_le_bytes());
            material[8..].copy_from_slice(&h2.to_le_bytes());
            (h1, h2) = hash_twice(&material, h1 ^ h2);
            attempt = 0;
        }
    }

    indices
}
