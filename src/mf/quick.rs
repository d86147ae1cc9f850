//! Forgetful hash table probing one or a few slots per key, for the
//! fastest quality tiers.

use alloc::{vec, vec::Vec};

use super::{
    backward_score, find_match_length, last_distance_score, search_dictionary, suffix, tail_byte,
    BestMatch, HASH_MUL,
};
use crate::dict::Dictionary;

/// Hash table of fixed size keyed on 5 bytes. Starting from the keyed
/// slot, `sweep` slots are used to store values of a key; each store
/// overwrites one of them, so older positions are forgotten quickly.
pub struct QuickHash {
    buckets: Vec<u32>,
    bucket_bits: u32,
    sweep: u32,
    use_dict: bool,
    num_dict_lookups: usize,
    num_dict_matches: usize,
}

impl QuickHash {
    pub fn new(bucket_bits: u32, sweep: u32, use_dict: bool) -> Self {
        debug_assert!(matches!(sweep, 1 | 2 | 4));
        let mut hash = Self {
            buckets: vec![0; (1usize << bucket_bits) + sweep as usize],
            bucket_bits,
            sweep,
            use_dict,
            num_dict_lookups: 0,
            num_dict_matches: 0,
        };
        hash.reset();
        hash
    }

    /// Clears all state. Zero-filling the buckets is not strictly needed
    /// for correctness, but stale slots would make the results on random
    /// data stochastic through accidental matches; position 0 left behind
    /// by the fill is rejected through the `backward == 0` check.
    pub fn reset(&mut self) {
        self.buckets.fill(0);
        self.num_dict_lookups = 0;
        self.num_dict_matches = 0;
    }

    /// Hashes 5 bytes: the shift keeps bytes 0..5 of the load in the
    /// product on little-endian hosts. A 5-byte key works much better for
    /// qualities 1 and 3, where the next store is likely to replace the
    /// slot anyway.
    #[inline(always)]
    fn hash(&self, data: &[u8], pos: usize) -> u32 {
        let h = (crate::mem::load64(data, pos) << 24).wrapping_mul(HASH_MUL as u64);
        (h >> (64 - self.bucket_bits)) as u32
    }

    /// Stores position `ix`, whose bytes start at `data[pos]`. Requires 8
    /// bytes of lookahead at `pos`.
    #[inline(always)]
    pub fn store(&mut self, data: &[u8], pos: usize, ix: u32) {
        let key = self.hash(data, pos);
        // Wiggle the slot within the sweep range so nearby positions do
        // not all evict each other.
        let off = (ix >> 3) % self.sweep;
        self.buckets[(key + off) as usize] = ix;
    }

    /// Finds the longest match for `cur_ix` of at most `max_length`
    /// bytes, no further back than `max_backward`.
    ///
    /// Probes the most recent emitted distance first, then the sweep
    /// slots, then (for the dictionary-enabled presets) the static
    /// dictionary when no local match was found and the probe quota
    /// allows.
    #[allow(clippy::too_many_arguments)]
    pub fn find_longest_match(
        &mut self,
        dictionary: Option<&dyn Dictionary>,
        data: &[u8],
        mask: usize,
        dist_cache: &[i32; 4],
        cur_ix: u32,
        max_length: usize,
        max_backward: u32,
        best: &mut BestMatch,
    ) -> bool {
        let best_len_in = best.len;
        let cur_ix_masked = cur_ix as usize & mask;
        let mut compare_char = tail_byte(data, cur_ix_masked + best_len_in);
        let mut best_score = best.score;
        let mut best_len = best_len_in;
        let mut match_found = false;

        // Try the last distance first.
        let backward = dist_cache[0] as u32;
        let prev_ix = cur_ix.wrapping_sub(backward);
        if prev_ix < cur_ix {
            let prev_ix = prev_ix as usize & mask;
            if compare_char == tail_byte(data, prev_ix + best_len) {
                let len = find_match_length(
                    suffix(data, prev_ix),
                    suffix(data, cur_ix_masked),
                    max_length,
                );
                if len >= 4 {
                    best_score = last_distance_score(len, 0);
                    best_len = len;
                    best.len = len;
                    best.len_code = len;
                    best.distance = backward;
                    best.score = best_score;
                    if self.sweep == 1 {
                        return true;
                    }
                    compare_char = tail_byte(data, cur_ix_masked + best_len);
                    match_found = true;
                }
            }
        }

        let key = self.hash(data, cur_ix_masked);
        if self.sweep == 1 {
            // Only one slot to look at, no need to prepare for a loop.
            let prev_ix = self.buckets[key as usize];
            let backward = cur_ix.wrapping_sub(prev_ix);
            let prev_ix = prev_ix as usize & mask;
            if compare_char != tail_byte(data, prev_ix + best_len_in) {
                return false;
            }
            if backward == 0 || backward > max_backward {
                return false;
            }
            let len = find_match_length(
                suffix(data, prev_ix),
                suffix(data, cur_ix_masked),
                max_length,
            );
            if len >= 4 {
                best.len = len;
                best.len_code = len;
                best.distance = backward;
                best.score = backward_score(len, backward);
                return true;
            }
        } else {
            for off in 0..self.sweep {
                let prev_ix = self.buckets[(key + off) as usize];
                let backward = cur_ix.wrapping_sub(prev_ix);
                let prev_ix = prev_ix as usize & mask;
                if compare_char != tail_byte(data, prev_ix + best_len) {
                    continue;
                }
                if backward == 0 || backward > max_backward {
                    continue;
                }
                let len = find_match_length(
                    suffix(data, prev_ix),
                    suffix(data, cur_ix_masked),
                    max_length,
                );
                if len >= 4 {
                    let score = backward_score(len, backward);
                    if best_score < score {
                        best_score = score;
                        best_len = len;
                        best.len = len;
                        best.len_code = len;
                        best.distance = backward;
                        best.score = score;
                        compare_char = tail_byte(data, cur_ix_masked + best_len);
                        match_found = true;
                    }
                }
            }
        }

        if self.use_dict && !match_found {
            if let Some(dictionary) = dictionary {
                // Dictionary probes are only allowed while past probes
                // have paid for themselves.
                if self.num_dict_matches >= (self.num_dict_lookups >> 7) {
                    let (lookups, matches) = search_dictionary(
                        dictionary,
                        suffix(data, cur_ix_masked),
                        max_length,
                        max_backward,
                        1,
                        best,
                    );
                    self.num_dict_lookups += lookups;
                    self.num_dict_matches += matches;
                    if matches > 0 {
                        return true;
                    }
                }
            }
        }

        match_found
    }

    /// Estimated memory footprint in KiB.
    pub fn memory_usage(&self) -> u32 {
        (self.buckets.len() * core::mem::size_of::<u32>() / 1024) as u32 + 1
    }
}
