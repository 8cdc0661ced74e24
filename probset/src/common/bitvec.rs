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

/// A fixed-length bit array packed into u64 words, tracking the number of
/// set bits so filters can report their load without a recount.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BitVec {
    num_bits: u64,
    num_set: u64,
    words: Vec<u64>,
}

impl BitVec {
    pub fn new(num_bits: u64) -> Self {
        BitVec {
            num_bits,
            num_set: 0,
            words: vec![0u64; Self::word_count(num_bits)],
        }
    }

    /// Rebuilds a bit array from serialized words, recounting set bits.
    pub fn from_words(num_bits: u64, words: Vec<u64>) -> Self {
        debug_assert_eq!(words.len(), Self::word_count(num_bits));
        let num_set = words.iter().map(|word| u64::from(word.count_ones())).sum();
        BitVec {
            num_bits,
            num_set,
            words,
        }
    }

    pub fn word_count(num_bits: u64) -> usize {
        num_bits.div_ceil(64) as usize
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_set(&self) -> u64 {
        self.num_set
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn get(&self, bit_index: u64) -> bool {
        debug_assert!(bit_index < self.num_bits);
        let word_index = (bit_index / 64) as usize;
        let mask = 1u64 << (bit_index % 64);
        (self.words[word_index] & mask) != 0
    }

    /// Sets a single bit, updating the count if it was not already set.
    pub fn set(&mut self, bit_index: u64) {
        debug_assert!(bit_index < self.num_bits);
        let word_index = (bit_index / 64) as usize;
        let mask = 1u64 << (bit_index % 64);
        if (self.words[word_index] & mask) == 0 {
            self.words[word_index] |= mask;
            self.num_set += 1;
        }
    }
}
