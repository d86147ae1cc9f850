//! Match-finder core for a Brotli-style LZ77 encoder.
//!
//! Given the bytes seen so far in a sliding window, a [`MatchFinder`]
//! proposes backward references `(distance, length)` for the current
//! position so that a downstream entropy coder can emit a copy instead of
//! literals. Ten quality presets trade search effort for compression
//! ratio: qualities 1..=4 use a forgetful sweep hash, 5..=9 a hash table
//! with per-bucket rings of recent positions, and 10 a binary-tree
//! matchfinder that enumerates all matches for optimal parsing.
//!
//! Block splitting, entropy coding and bitstream writing are the
//! encoder's business; the static dictionary contents come from a
//! collaborating crate through the [`Dictionary`] trait.
//!
//! The hashes consume raw native-endian loads, so the same input
//! compresses to different (internally consistent) output on little- and
//! big-endian hosts. This avoids a byteswap on the hot path.
//!
//! ```
//! use brotli_rust2::{BestMatch, MatchFinder};
//!
//! let mut data = b"sells seashells by the seashore; sells seashells".to_vec();
//! let mask = 63;
//! data.resize(mask + 1, 0);
//! let mut finder = MatchFinder::new(5, 16);
//! for i in 0..33 {
//!     finder.store(&data, mask, i);
//! }
//!
//! let mut best = BestMatch::default();
//! let found = finder.find_longest_match(
//!     None,
//!     &data,
//!     mask,
//!     &[33, 0, 0, 0],
//!     33,
//!     15,
//!     33,
//!     &mut best,
//! );
//! assert!(found);
//! assert_eq!((best.distance, best.len), (33, 15));
//! ```

#![no_std]

extern crate alloc;

pub mod mem;

mod dict;
mod mf;

pub use dict::{Dictionary, INVALID_MATCH};
pub use mf::{
    BackwardMatch, BestMatch, BlockHash, MatchFinder, QuickHash, BT4, CUTOFF_TRANSFORMS,
    CUTOFF_TRANSFORM_COUNT, HASH_MUL, MAX_ZOPFLI_LEN, SHORT_CODE_INDEX, SHORT_CODE_OFFSET,
};
