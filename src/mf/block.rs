//! Hash table remembering the most recent positions of every key in a
//! small per-bucket ring, for the middle quality tiers.

use alloc::{vec, vec::Vec};

use super::{
    backward_score, find_match_length, hash32, last_distance_score, search_dictionary, suffix,
    BackwardMatch, BestMatch, MAX_ZOPFLI_LEN, SHORT_CODE_INDEX, SHORT_CODE_OFFSET,
};
use crate::dict::{Dictionary, INVALID_MATCH};

/// Hash table of `2^bucket_bits` buckets, each a ring of the last
/// `2^block_bits` positions stored under that key, keyed on 4 bytes.
pub struct BlockHash {
    /// Stores per bucket. Wraps at 16 bits; after 65536 stores into one
    /// bucket the newest-first scan order is only preserved modulo 65536.
    num: Vec<u16>,
    buckets: Vec<u32>,
    bucket_bits: u32,
    block_bits: u32,
    /// How many short-code candidates from the last-distance cache are
    /// probed before the bucket scan.
    last_distance_probes: usize,
    num_dict_lookups: usize,
    num_dict_matches: usize,
}

impl BlockHash {
    pub fn new(bucket_bits: u32, block_bits: u32, last_distance_probes: usize) -> Self {
        debug_assert!(last_distance_probes <= SHORT_CODE_INDEX.len());
        Self {
            num: vec![0; 1usize << bucket_bits],
            buckets: vec![0; 1usize << (bucket_bits + block_bits)],
            bucket_bits,
            block_bits,
            last_distance_probes,
            num_dict_lookups: 0,
            num_dict_matches: 0,
        }
    }

    /// Clears the store counters and the dictionary quota. Stale bucket
    /// entries are unreachable while their counter is zero.
    pub fn reset(&mut self) {
        self.num.fill(0);
        self.num_dict_lookups = 0;
        self.num_dict_matches = 0;
    }

    #[inline(always)]
    fn block_size(&self) -> u32 {
        1u32 << self.block_bits
    }

    #[inline(always)]
    fn block_mask(&self) -> u32 {
        (1u32 << self.block_bits) - 1
    }

    #[inline(always)]
    fn hash(&self, data: &[u8], pos: usize) -> u32 {
        hash32(crate::mem::load32(data, pos), self.bucket_bits)
    }

    /// Stores position `ix`, whose bytes start at `data[pos]`. Requires 4
    /// bytes of lookahead at `pos`.
    #[inline(always)]
    pub fn store(&mut self, data: &[u8], pos: usize, ix: u32) {
        let key = self.hash(data, pos) as usize;
        let minor_ix = (self.num[key] as u32 & self.block_mask()) as usize;
        self.buckets[(key << self.block_bits) + minor_ix] = ix;
        self.num[key] = self.num[key].wrapping_add(1);
    }

    /// Finds the longest match for `cur_ix` of at most `max_length`
    /// bytes, no further back than `max_backward`.
    ///
    /// Probes the last-distance short codes first, then the bucket
    /// newest-first, then the static dictionary under the probe quota.
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
        let cur_ix_masked = cur_ix as usize & mask;
        let mut match_found = false;
        let mut best_score = best.score;
        let mut best_len = best.len;
        best.len = 0;
        best.len_code = 0;

        // Try the last few distances first; short codes make even a
        // 2-byte reuse of the most recent distances worth encoding.
        for j in 0..self.last_distance_probes {
            let idx = SHORT_CODE_INDEX[j];
            let backward = dist_cache[idx] + SHORT_CODE_OFFSET[j];
            if backward <= 0 {
                continue;
            }
            let backward = backward as u32;
            let prev_ix = cur_ix.wrapping_sub(backward);
            if prev_ix >= cur_ix {
                continue;
            }
            if backward > max_backward {
                continue;
            }
            let prev_ix = prev_ix as usize & mask;

            if cur_ix_masked + best_len > mask
                || prev_ix + best_len > mask
                || data[cur_ix_masked + best_len] != data[prev_ix + best_len]
            {
                continue;
            }
            let len = find_match_length(
                suffix(data, prev_ix),
                suffix(data, cur_ix_masked),
                max_length,
            );
            if len >= 3 || (len == 2 && j < 2) {
                let score = last_distance_score(len, j);
                if best_score < score {
                    best_score = score;
                    best_len = len;
                    best.len = len;
                    best.len_code = len;
                    best.distance = backward;
                    best.score = score;
                    match_found = true;
                }
            }
        }

        let key = self.hash(data, cur_ix_masked) as usize;
        let bucket = &self.buckets[key << self.block_bits..][..self.block_size() as usize];
        let num = self.num[key] as i32;
        let down = (num - self.block_size() as i32).max(0);
        let mut i = num - 1;
        while i >= down {
            let prev_ix = bucket[(i as u32 & self.block_mask()) as usize];
            i -= 1;
            let backward = cur_ix.wrapping_sub(prev_ix);
            if backward > max_backward {
                // Older entries in the ring are only ever further away.
                break;
            }
            let prev_ix = prev_ix as usize & mask;
            if cur_ix_masked + best_len > mask
                || prev_ix + best_len > mask
                || data[cur_ix_masked + best_len] != data[prev_ix + best_len]
            {
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
                    match_found = true;
                }
            }
        }

        if !match_found {
            if let Some(dictionary) = dictionary {
                if self.num_dict_matches >= (self.num_dict_lookups >> 7) {
                    let (lookups, matches) = search_dictionary(
                        dictionary,
                        suffix(data, cur_ix_masked),
                        max_length,
                        max_backward,
                        2,
                        best,
                    );
                    self.num_dict_lookups += lookups;
                    self.num_dict_matches += matches;
                    match_found |= matches > 0;
                }
            }
        }

        match_found
    }

    /// Appends every match for `cur_ix` to `matches`, each strictly
    /// longer than the one before it, and returns how many were added.
    ///
    /// A match longer than [`MAX_ZOPFLI_LEN`] rewinds the output and is
    /// reported alone. The current position is not inserted; the caller
    /// stores it separately.
    #[allow(clippy::too_many_arguments)]
    pub fn find_all_matches(
        &self,
        dictionary: Option<&dyn Dictionary>,
        data: &[u8],
        mask: usize,
        cur_ix: u32,
        max_length: usize,
        max_backward: u32,
        matches: &mut Vec<BackwardMatch>,
    ) -> usize {
        let orig_len = matches.len();
        let cur_ix_masked = cur_ix as usize & mask;
        let mut best_len = 1usize;

        // Look for length-2 matches in the closest 64 positions; only a
        // linear scan can find those, the bucket hash covers 4 bytes.
        let stop = (cur_ix as i64 - 64).max(0);
        let mut i = cur_ix as i64 - 1;
        while i > stop && best_len <= 2 {
            let prev_ix = i as u32;
            i -= 1;
            let backward = cur_ix - prev_ix;
            if backward > max_backward {
                break;
            }
            let prev_ix = prev_ix as usize & mask;
            if data[cur_ix_masked] != data[prev_ix]
                || data[cur_ix_masked + 1] != data[prev_ix + 1]
            {
                continue;
            }
            let len = find_match_length(
                suffix(data, prev_ix),
                suffix(data, cur_ix_masked),
                max_length,
            );
            if len > best_len {
                best_len = len;
                if len > MAX_ZOPFLI_LEN {
                    matches.truncate(orig_len);
                }
                matches.push(BackwardMatch::new(backward, len));
            }
        }

        let key = self.hash(data, cur_ix_masked) as usize;
        let bucket = &self.buckets[key << self.block_bits..][..self.block_size() as usize];
        let num = self.num[key] as i32;
        let down = (num - self.block_size() as i32).max(0);
        let mut i = num - 1;
        while i >= down {
            let prev_ix = bucket[(i as u32 & self.block_mask()) as usize];
            i -= 1;
            let backward = cur_ix.wrapping_sub(prev_ix);
            if backward > max_backward {
                break;
            }
            let prev_ix = prev_ix as usize & mask;
            if cur_ix_masked + best_len > mask
                || prev_ix + best_len > mask
                || data[cur_ix_masked + best_len] != data[prev_ix + best_len]
            {
                continue;
            }
            let len = find_match_length(
                suffix(data, prev_ix),
                suffix(data, cur_ix_masked),
                max_length,
            );
            if len > best_len {
                best_len = len;
                if len > MAX_ZOPFLI_LEN {
                    matches.truncate(orig_len);
                }
                matches.push(BackwardMatch::new(backward, len));
            }
        }

        if let Some(dictionary) = dictionary {
            let max_dict_len = dictionary.max_match_len();
            let mut dict_matches = vec![INVALID_MATCH; max_dict_len + 1];
            let min_len = (best_len + 1).max(4);
            if dictionary.find_all_matches(
                suffix(data, cur_ix_masked),
                min_len,
                max_length,
                &mut dict_matches,
            ) {
                let max_len = max_dict_len.min(max_length);
                for l in min_len..=max_len {
                    let dict_id = dict_matches[l];
                    if dict_id < INVALID_MATCH {
                        matches.push(BackwardMatch::with_length_code(
                            max_backward + (dict_id >> 5) + 1,
                            l,
                            (dict_id & 31) as usize,
                        ));
                    }
                }
            }
        }

        matches.len() - orig_len
    }

    /// Estimated memory footprint in KiB.
    pub fn memory_usage(&self) -> u32 {
        let bytes = self.num.len() * core::mem::size_of::<u16>()
            + self.buckets.len() * core::mem::size_of::<u32>();
        (bytes / 1024) as u32 + 1
    }
}
