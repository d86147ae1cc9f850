//! The match-finder engine: quality presets, shared scoring and the
//! dispatch over the three finder families.

mod block;
mod bt4;
mod quick;

use alloc::vec::Vec;

pub use block::BlockHash;
pub use bt4::BT4;
pub use quick::QuickHash;

use crate::dict::Dictionary;

/// Multiplier shared by every hash in the engine. Must stay bit-identical
/// for output parity with other encoders of the same quality tier.
///
/// The multiplier is odd (an even one would lose the highest bit) and has
/// no long streaks of equal bits; it was tuned against compression
/// benchmarks, primality was never a goal.
pub const HASH_MUL: u32 = 0x1e35a7bd;

/// The maximum length for which the zopfli pass keeps distinct distances.
pub const MAX_ZOPFLI_LEN: usize = 325;

/// Which cached distance each short code refers to.
pub const SHORT_CODE_INDEX: [usize; 16] = [0, 1, 2, 3, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1];

/// Offset applied to the cached distance selected by the short code.
pub const SHORT_CODE_OFFSET: [i32; 16] = [0, 0, 0, 0, -1, 1, -2, 2, -3, 3, -1, 1, -2, 2, -3, 3];

/// Number of cutoff transforms a dictionary probe may fall back through.
pub const CUTOFF_TRANSFORM_COUNT: usize = 10;

/// Transform id per number of bytes cut off a dictionary word.
pub const CUTOFF_TRANSFORMS: [u32; 10] = [0, 12, 27, 23, 42, 63, 56, 48, 59, 64];

/// Approximate bit cost of each distance short code.
const SHORT_CODE_BIT_COST: [f64; 16] = [
    -0.6, 0.95, 1.17, 1.27, 0.93, 0.93, 0.96, 0.96, 0.99, 0.99, 1.05, 1.05, 1.15, 1.15, 1.25, 1.25,
];

#[inline(always)]
pub(crate) fn hash32(value: u32, bits: u32) -> u32 {
    // The higher product bits carry more mixture from the multiplication,
    // so the result is taken from there.
    value.wrapping_mul(HASH_MUL) >> (32 - bits)
}

/// Usually the longest backward reference wins. A reference that is
/// further away is usually coded with more bits, approximated here by
/// log2(distance); this lets a slightly shorter but much nearer match
/// beat a longer one.
#[inline(always)]
pub(crate) fn backward_score(copy_length: usize, backward: u32) -> f64 {
    5.4 * copy_length as f64 - 1.20 * backward.ilog2() as f64
}

/// Score for a match whose distance is expressible as a short code over
/// the last-distance cache.
#[inline(always)]
pub(crate) fn last_distance_score(copy_length: usize, short_code: usize) -> f64 {
    5.4 * copy_length as f64 - SHORT_CODE_BIT_COST[short_code]
}

/// A backward reference candidate.
///
/// Packs length and length code into one word; the code is zero when it
/// equals the length, which is every non-dictionary match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackwardMatch {
    pub distance: u32,
    length_and_code: u32,
}

impl BackwardMatch {
    #[inline(always)]
    pub fn new(distance: u32, len: usize) -> Self {
        Self {
            distance,
            length_and_code: (len as u32) << 5,
        }
    }

    #[inline(always)]
    pub fn with_length_code(distance: u32, len: usize, len_code: usize) -> Self {
        let code = if len == len_code { 0 } else { len_code as u32 };
        Self {
            distance,
            length_and_code: ((len as u32) << 5) | code,
        }
    }

    #[inline(always)]
    pub fn length(&self) -> usize {
        (self.length_and_code >> 5) as usize
    }

    /// The untransformed length for dictionary matches, otherwise the
    /// match length itself.
    #[inline(always)]
    pub fn length_code(&self) -> usize {
        let code = (self.length_and_code & 31) as usize;
        if code == 0 {
            self.length()
        } else {
            code
        }
    }
}

/// In/out record for [`MatchFinder::find_longest_match`].
///
/// Callers seed it with the best match known so far (all zero when there
/// is none); the finder only reports candidates scoring above `score`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BestMatch {
    pub len: usize,
    pub len_code: usize,
    pub distance: u32,
    pub score: f64,
}

/// Extends a match to its maximum possible length, comparing at most
/// `limit` bytes and never past the end of either slice.
///
/// This function is optimized using native word-at-a-time comparisons.
#[cfg(feature = "optimization")]
#[inline(always)]
pub(crate) fn find_match_length(s1: &[u8], s2: &[u8], limit: usize) -> usize {
    const WORD_SIZE: usize = core::mem::size_of::<usize>();

    let len = limit.min(s1.len()).min(s2.len());

    // SAFETY: All pointer accesses are bounded by `len`, which is clamped
    // to the lengths of both input slices.
    unsafe {
        let mut ptr1 = s1.as_ptr();
        let mut ptr2 = s2.as_ptr();

        let mut matched = 0;

        while matched + WORD_SIZE <= len {
            let word1 = ptr1.cast::<usize>().read_unaligned();
            let word2 = ptr2.cast::<usize>().read_unaligned();

            if word1 == word2 {
                matched += WORD_SIZE;
                ptr1 = ptr1.add(WORD_SIZE);
                ptr2 = ptr2.add(WORD_SIZE);
            } else {
                let diff_bits = word1 ^ word2;

                #[cfg(target_endian = "little")]
                let matching_bytes = (diff_bits.trailing_zeros() / 8) as usize;

                #[cfg(target_endian = "big")]
                let matching_bytes = (diff_bits.leading_zeros() / 8) as usize;

                return matched + matching_bytes;
            }
        }

        while matched < len && *ptr1 == *ptr2 {
            matched += 1;
            ptr1 = ptr1.add(1);
            ptr2 = ptr2.add(1);
        }

        matched
    }
}

/// Extends a match to its maximum possible length, comparing at most
/// `limit` bytes and never past the end of either slice.
///
/// Unoptimized byte for byte version.
#[cfg(not(feature = "optimization"))]
#[inline(always)]
pub(crate) fn find_match_length(s1: &[u8], s2: &[u8], limit: usize) -> usize {
    s1.iter()
        .zip(s2.iter())
        .take(limit)
        .take_while(|&(byte1, byte2)| byte1 == byte2)
        .count()
}

/// The suffix of `data` starting at `pos`, empty when `pos` is past the
/// end.
#[inline(always)]
pub(crate) fn suffix(data: &[u8], pos: usize) -> &[u8] {
    &data[pos.min(data.len())..]
}

/// Tail-character probe. The probe position is one past the current best
/// match and may land beyond the buffered bytes near the window edge;
/// the read is clamped to the last byte there, like the ring tail absorbs
/// it in the reference layout.
#[inline(always)]
pub(crate) fn tail_byte(data: &[u8], pos: usize) -> u8 {
    data[pos.min(data.len() - 1)]
}

/// One static-dictionary probe round for `find_longest_match`.
///
/// `data` is the suffix at the current position. Examines `probes`
/// consecutive entries of the dictionary hash table and updates `best`
/// with any transformed word scoring above it. Returns the number of
/// lookups made and of improvements found, for the caller's quota
/// accounting.
pub(crate) fn search_dictionary(
    dict: &dyn Dictionary,
    data: &[u8],
    max_length: usize,
    max_backward: u32,
    probes: u32,
    best: &mut BestMatch,
) -> (usize, usize) {
    if data.len() < 4 {
        return (0, 0);
    }

    let key = hash32(crate::mem::load32(data, 0), 14) << 1;
    let mut lookups = 0;
    let mut matches = 0;

    for j in 0..probes {
        lookups += 1;
        let entry = dict.hash_entry(key | j);
        if entry == 0 {
            continue;
        }

        let len = (entry & 31) as usize;
        let dist = (entry >> 5) as u32;
        if len > max_length || len > dict.max_match_len() {
            // Out-of-range lengths mean a corrupt table entry; skip it.
            continue;
        }

        let matchlen = find_match_length(data, dict.word(len, dist), len);
        if matchlen + CUTOFF_TRANSFORM_COUNT > len && matchlen > 0 {
            let transform_id = CUTOFF_TRANSFORMS[len - matchlen];
            let word_id = (transform_id << dict.size_bits_by_length(len)) + dist;
            let backward = max_backward + word_id + 1;
            let score = backward_score(matchlen, backward);
            if best.score < score {
                matches += 1;
                best.len = matchlen;
                best.len_code = len;
                best.distance = backward;
                best.score = score;
            }
        }
    }

    (lookups, matches)
}

/// A match finder configured for one of the ten quality tiers.
///
/// Owns the hash state for one compression job. The ring buffer and the
/// static dictionary are borrowed read-only per call; positions handed to
/// [`store`](Self::store) must be monotonically non-decreasing.
pub enum MatchFinder {
    Quick(QuickHash),
    Block(BlockHash),
    BT4(BT4),
}

impl MatchFinder {
    /// Creates the finder preset for `quality` (1..=10). `lgwin` is only
    /// used by the quality-10 tree, which sizes its node table from the
    /// window.
    pub fn new(quality: u32, lgwin: u32) -> Self {
        match quality {
            1 => MatchFinder::Quick(QuickHash::new(16, 1, true)),
            2 => MatchFinder::Quick(QuickHash::new(16, 2, false)),
            3 => MatchFinder::Quick(QuickHash::new(16, 4, false)),
            4 => MatchFinder::Quick(QuickHash::new(17, 4, true)),
            5 => MatchFinder::Block(BlockHash::new(14, 4, 4)),
            6 => MatchFinder::Block(BlockHash::new(14, 5, 4)),
            7 => MatchFinder::Block(BlockHash::new(15, 6, 10)),
            8 => MatchFinder::Block(BlockHash::new(15, 7, 10)),
            9 => MatchFinder::Block(BlockHash::new(15, 8, 16)),
            10 => MatchFinder::BT4(BT4::new(lgwin, 32, 48)),
            _ => panic!("quality must be in 1..=10"),
        }
    }

    /// Clears all hash state and dictionary-quota counters. Idempotent.
    pub fn reset(&mut self) {
        match self {
            MatchFinder::Quick(h) => h.reset(),
            MatchFinder::Block(h) => h.reset(),
            MatchFinder::BT4(t) => t.reset(),
        }
    }

    /// How many bytes a single `store` hashes.
    pub fn hash_type_len(&self) -> usize {
        match self {
            MatchFinder::Quick(_) => 8,
            MatchFinder::Block(_) => 4,
            MatchFinder::BT4(_) => 4,
        }
    }

    /// Inserts the prefix at position `ix` into the hash structure.
    ///
    /// The quality-10 tree inserts through [`skip_byte`](Self::skip_byte)
    /// and [`find_all_matches`](Self::find_all_matches) instead; storing
    /// into it is a caller error.
    pub fn store(&mut self, data: &[u8], mask: usize, ix: u32) {
        let pos = ix as usize & mask;
        match self {
            MatchFinder::Quick(h) => h.store(data, pos, ix),
            MatchFinder::Block(h) => h.store(data, pos, ix),
            MatchFinder::BT4(_) => {
                debug_assert!(false, "quality 10 inserts through skip_byte");
            }
        }
    }

    /// Stores every position in `start..start + len`.
    pub fn store_range(&mut self, data: &[u8], mask: usize, start: u32, len: usize) {
        for p in 0..len as u32 {
            self.store(data, mask, start.wrapping_add(p));
        }
    }

    /// Warms the hash from a user-supplied preamble; stored positions are
    /// relative to 0, so the stream itself starts at `dict.len()`.
    pub fn prepend_custom_dictionary(&mut self, dict: &[u8]) {
        let hash_type_len = self.hash_type_len();
        if dict.len() < hash_type_len {
            return;
        }
        match self {
            MatchFinder::Quick(h) => {
                for i in 0..=(dict.len() - hash_type_len) {
                    h.store(dict, i, i as u32);
                }
            }
            MatchFinder::Block(h) => {
                for i in 0..=(dict.len() - hash_type_len) {
                    h.store(dict, i, i as u32);
                }
            }
            // TODO: route through skip_byte so that quality 10 can take a
            // custom dictionary as well.
            MatchFinder::BT4(_) => {}
        }
    }

    /// Finds the longest match for position `cur_ix`, no longer than
    /// `max_length` and no further back than `max_backward`.
    ///
    /// Returns whether a match better than the seeded `best` was found;
    /// on `true` the record holds the new length, length code, distance
    /// and score.
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
        match self {
            MatchFinder::Quick(h) => h.find_longest_match(
                dictionary,
                data,
                mask,
                dist_cache,
                cur_ix,
                max_length,
                max_backward,
                best,
            ),
            MatchFinder::Block(h) => h.find_longest_match(
                dictionary,
                data,
                mask,
                dist_cache,
                cur_ix,
                max_length,
                max_backward,
                best,
            ),
            MatchFinder::BT4(_) => {
                debug_assert!(false, "quality 10 reports through find_all_matches");
                false
            }
        }
    }

    /// Appends every match for `cur_ix` to `matches`, longest last, and
    /// returns how many were added. Quality 5 and up only; the quick
    /// tiers track a single candidate and cannot enumerate.
    #[allow(clippy::too_many_arguments)]
    pub fn find_all_matches(
        &mut self,
        dictionary: Option<&dyn Dictionary>,
        data: &[u8],
        mask: usize,
        cur_ix: u32,
        max_length: usize,
        max_backward: u32,
        matches: &mut Vec<BackwardMatch>,
    ) -> usize {
        match self {
            MatchFinder::Quick(_) => {
                debug_assert!(false, "quick tiers cannot enumerate matches");
                0
            }
            MatchFinder::Block(h) => h.find_all_matches(
                dictionary,
                data,
                mask,
                cur_ix,
                max_length,
                max_backward,
                matches,
            ),
            MatchFinder::BT4(t) => {
                t.find_all_matches(dictionary, data, mask, cur_ix, max_length, matches)
            }
        }
    }

    /// Advances past `cur_ix` without reporting matches. On the
    /// quality-10 tree this re-roots the position's bucket; the hash
    /// tiers simply store the position.
    pub fn skip_byte(&mut self, data: &[u8], mask: usize, cur_ix: u32, max_length: usize) {
        match self {
            MatchFinder::Quick(h) => h.store(data, cur_ix as usize & mask, cur_ix),
            MatchFinder::Block(h) => h.store(data, cur_ix as usize & mask, cur_ix),
            MatchFinder::BT4(t) => t.skip_byte(data, mask, cur_ix, max_length),
        }
    }

    /// Estimated memory footprint in KiB.
    pub fn memory_usage(&self) -> u32 {
        match self {
            MatchFinder::Quick(h) => h.memory_usage(),
            MatchFinder::Block(h) => h.memory_usage(),
            MatchFinder::BT4(t) => t.memory_usage(),
        }
    }
}
