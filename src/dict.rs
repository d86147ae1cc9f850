//! Interface to the shared static dictionary.
//!
//! The dictionary contents and transform machinery live in a collaborating
//! crate; the match finders only need hashed probe access and the bulk
//! by-length enumeration used by the zopfli pass.

/// Sentinel for "no dictionary word of this length".
///
/// Valid packed matches are strictly smaller, so a plain `<` comparison
/// separates hits from empty slots.
pub const INVALID_MATCH: u32 = 0x0FFF_FFFF;

/// Read-only view of a static dictionary.
///
/// Packed formats follow the dictionary tables: probe entries are
/// `(dist << 5) | len` with zero meaning empty, and `find_all_matches`
/// output entries are `(dict_distance << 5) | length_code` where
/// `length_code` is the untransformed word length.
pub trait Dictionary {
    /// Entry of the `2^15`-slot probe hash table for `key`.
    fn hash_entry(&self, key: u32) -> u16;

    /// Bytes of word number `dist` among the words of length `len`.
    fn word(&self, len: usize, dist: u32) -> &[u8];

    /// log2 of the number of dictionary words of length `len`.
    fn size_bits_by_length(&self, len: usize) -> u32;

    /// Longest match length `find_all_matches` can report.
    fn max_match_len(&self) -> usize;

    /// Finds all dictionary matches for the start of `data`, including
    /// transformed ones, with lengths in `min_len..=max_len`.
    ///
    /// `matches_by_len[l]` receives the best packed match of length `l`,
    /// or keeps [`INVALID_MATCH`]. Returns whether anything was found.
    fn find_all_matches(
        &self,
        data: &[u8],
        min_len: usize,
        max_len: usize,
        matches_by_len: &mut [u32],
    ) -> bool;
}
