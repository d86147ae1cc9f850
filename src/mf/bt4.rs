//! Binary-tree matchfinder for the highest quality tier.
//!
//! Each 4-byte-hash bucket holds the root of a binary tree of window
//! positions, sorted so that every left child starts a lexicographically
//! lesser sequence than its parent and every right child a greater one.
//! Visiting a position searches its bucket's tree and re-roots it at the
//! visited position in the same traversal. Two smaller subtables catch
//! length-2 and length-3 matches that the tree cannot represent.

use alloc::{vec, vec::Vec};

use super::{find_match_length, hash32, suffix, tail_byte, BackwardMatch};
use crate::dict::{Dictionary, INVALID_MATCH};
use crate::mem;

const HASH2_BITS: u32 = 10;
const HASH3_BITS: u32 = 15;
const HASH4_BITS: u32 = 17;

const HASH2_OFFSET: usize = 0;
const HASH3_OFFSET: usize = HASH2_OFFSET + (1 << HASH2_BITS);
const HASH4_OFFSET: usize = HASH3_OFFSET + (1 << HASH3_BITS);
const HASH_TOTAL_LEN: usize = HASH4_OFFSET + (1 << HASH4_BITS);

pub struct BT4 {
    /// The 2-byte and 3-byte subtables followed by the tree roots, one
    /// flat allocation.
    hash: Vec<u32>,
    /// Child links: `child[2 * (p & window_mask)]` and the slot after it
    /// are the left and right children of node `p`.
    child: Vec<u32>,
    window_mask: u32,
    /// Node visits per lookup before the search gives up.
    max_search_depth: u32,
    /// Stop searching once a match of at least this length is found.
    nice_len: usize,
}

impl BT4 {
    pub fn new(lgwin: u32, max_search_depth: u32, nice_len: usize) -> Self {
        debug_assert!(max_search_depth >= 1);
        let window_mask = (1u32 << lgwin) - 1;
        let mut tree = Self {
            hash: vec![0; HASH_TOTAL_LEN],
            child: vec![0; 2 * (window_mask as usize + 1)],
            window_mask,
            max_search_depth,
            nice_len,
        };
        tree.reset();
        tree
    }

    /// Resets for a new input stream. The child table keeps its contents;
    /// nodes are only reachable through the hash roots, and every stale
    /// root now fails the window check.
    pub fn reset(&mut self) {
        let invalid = self.invalid_pos();
        self.hash.fill(invalid);
    }

    /// Sentinel position: subtracting it from any current position yields
    /// a difference beyond the window check.
    #[inline(always)]
    fn invalid_pos(&self) -> u32 {
        self.window_mask.wrapping_neg()
    }

    /// In-window bound for tree links. The slack of 15 keeps the tail
    /// reads of the comparison loop inside the ring overflow area.
    #[inline(always)]
    fn in_window_limit(&self) -> u32 {
        self.window_mask - 15
    }

    /// Searches the bucket tree of `cur_ix` and re-roots it at `cur_ix`
    /// in the same descent. With `matches` present every improving match
    /// is appended; a match reaching the nice length rewinds the output
    /// to just that match and ends the descent early. Returns the best
    /// tree match length found (at least 3).
    ///
    /// Positions whose lookahead is shorter than the nice length are not
    /// inserted at all; the splice would need bytes past the stream end.
    fn advance(
        &mut self,
        data: &[u8],
        mask: usize,
        cur_ix: u32,
        max_length: usize,
        mut matches: Option<&mut Vec<BackwardMatch>>,
    ) -> usize {
        let mut best_len = 3usize;
        if max_length < self.nice_len {
            return best_len;
        }

        let cur_ix_masked = cur_ix as usize & mask;
        let nice_len = self.nice_len.min(max_length);
        let orig_len = matches.as_deref().map_or(0, Vec::len);
        let mut depth_remaining = self.max_search_depth;

        let seq4 = mem::load32(data, cur_ix_masked);
        let seq3 = mem::loaded_u32_to_u24(seq4);
        let seq2 = mem::loaded_u32_to_u16(seq4);

        // Length-2 match from the first subtable.
        let slot2 = HASH2_OFFSET + hash32(seq2, HASH2_BITS) as usize;
        let prev_ix = self.hash[slot2];
        self.hash[slot2] = cur_ix;
        if let Some(matches) = matches.as_deref_mut() {
            if cur_ix.wrapping_sub(prev_ix) <= self.in_window_limit() {
                let prev_masked = prev_ix as usize & mask;
                if prev_masked + 2 <= data.len()
                    && seq2 == mem::load16(data, prev_masked) as u32
                {
                    matches.push(BackwardMatch::new(cur_ix.wrapping_sub(prev_ix), 2));
                }
            }
        }

        // Length-3 match from the second subtable.
        let slot3 = HASH3_OFFSET + hash32(seq3, HASH3_BITS) as usize;
        let prev_ix = self.hash[slot3];
        self.hash[slot3] = cur_ix;
        if let Some(matches) = matches.as_deref_mut() {
            if cur_ix.wrapping_sub(prev_ix) <= self.in_window_limit() {
                let prev_masked = prev_ix as usize & mask;
                if prev_masked + 4 <= data.len()
                    && seq3 == mem::loaded_u32_to_u24(mem::load32(data, prev_masked))
                {
                    matches.push(BackwardMatch::new(cur_ix.wrapping_sub(prev_ix), 3));
                }
            }
        }

        // Length 4 and up live in the tree; the bucket holds its root.
        let slot4 = HASH4_OFFSET + hash32(seq4, HASH4_BITS) as usize;
        let mut prev_ix = self.hash[slot4];
        self.hash[slot4] = cur_ix;

        let mut pending_lt = 2 * (cur_ix & self.window_mask) as usize;
        let mut pending_gt = pending_lt + 1;

        if cur_ix.wrapping_sub(prev_ix) > self.in_window_limit() {
            self.child[pending_lt] = self.invalid_pos();
            self.child[pending_gt] = self.invalid_pos();
            return best_len;
        }

        let mut best_lt_len = 0usize;
        let mut best_gt_len = 0usize;
        let mut len = 0usize;

        // Rearrange the tree so that its new root is the current
        // sequence, recording matches on the way down when asked to.
        loop {
            let prev_masked = prev_ix as usize & mask;
            let pair = 2 * (prev_ix & self.window_mask) as usize;

            if tail_byte(data, prev_masked + len) == data[cur_ix_masked + len] {
                len += 1;
                len += find_match_length(
                    suffix(data, prev_masked + len),
                    suffix(data, cur_ix_masked + len),
                    max_length - len,
                );
                match matches.as_deref_mut() {
                    None => {
                        if len >= nice_len {
                            self.child[pending_lt] = self.child[pair];
                            self.child[pending_gt] = self.child[pair + 1];
                            return best_len;
                        }
                    }
                    Some(matches) => {
                        if len > best_len {
                            best_len = len;
                            if len >= nice_len {
                                matches.truncate(orig_len);
                                matches
                                    .push(BackwardMatch::new(cur_ix.wrapping_sub(prev_ix), len));
                                self.child[pending_lt] = self.child[pair];
                                self.child[pending_gt] = self.child[pair + 1];
                                return best_len;
                            }
                            matches.push(BackwardMatch::new(cur_ix.wrapping_sub(prev_ix), len));
                        }
                    }
                }
            }

            if tail_byte(data, prev_masked + len) < data[cur_ix_masked + len] {
                // The visited node joins the less-than side of the new
                // root; its right subtree is where the next less-than
                // candidate hangs.
                self.child[pending_lt] = prev_ix;
                pending_lt = pair + 1;
                prev_ix = self.child[pending_lt];
                best_lt_len = len;
                if best_gt_len < len {
                    len = best_gt_len;
                }
            } else {
                self.child[pending_gt] = prev_ix;
                pending_gt = pair;
                prev_ix = self.child[pending_gt];
                best_gt_len = len;
                if best_lt_len < len {
                    len = best_lt_len;
                }
            }

            depth_remaining -= 1;
            if cur_ix.wrapping_sub(prev_ix) > self.in_window_limit() || depth_remaining == 0 {
                self.child[pending_lt] = self.invalid_pos();
                self.child[pending_gt] = self.invalid_pos();
                return best_len;
            }
        }
    }

    /// Appends every match for `cur_ix` to `matches`, sorted by strictly
    /// increasing length, and returns how many were added. A match of the
    /// nice length or longer is reported alone.
    ///
    /// Dictionary distances are based at `min(cur_ix, window)` so they
    /// stay distinguishable from in-window distances.
    pub fn find_all_matches(
        &mut self,
        dictionary: Option<&dyn Dictionary>,
        data: &[u8],
        mask: usize,
        cur_ix: u32,
        max_length: usize,
        matches: &mut Vec<BackwardMatch>,
    ) -> usize {
        let orig_len = matches.len();
        let best_len = self.advance(data, mask, cur_ix, max_length, Some(matches));

        if let Some(dictionary) = dictionary {
            let max_dict_len = dictionary.max_match_len();
            let mut dict_matches = vec![INVALID_MATCH; max_dict_len + 1];
            let min_len = best_len + 1;
            if dictionary.find_all_matches(
                suffix(data, cur_ix as usize & mask),
                min_len,
                max_length,
                &mut dict_matches,
            ) {
                let max_len = max_dict_len.min(max_length);
                let base = cur_ix.min(self.in_window_limit());
                for l in min_len..=max_len {
                    let dict_id = dict_matches[l];
                    if dict_id < INVALID_MATCH {
                        matches.push(BackwardMatch::with_length_code(
                            base + (dict_id >> 5) + 1,
                            l,
                            (dict_id & 31) as usize,
                        ));
                    }
                }
            }
        }

        matches.len() - orig_len
    }

    /// Advances past `cur_ix` without reporting matches. Re-roots the
    /// position's bucket tree so later lookups stay exact.
    pub fn skip_byte(&mut self, data: &[u8], mask: usize, cur_ix: u32, max_length: usize) {
        self.advance(data, mask, cur_ix, max_length, None);
    }

    pub fn nice_len(&self) -> usize {
        self.nice_len
    }

    /// Estimated memory footprint in KiB.
    pub fn memory_usage(&self) -> u32 {
        let bytes = (self.hash.len() + self.child.len()) * core::mem::size_of::<u32>();
        (bytes / 1024) as u32 + 1
    }
}
