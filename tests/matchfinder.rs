use std::cell::Cell;

use brotli_rust2::{
    mem, BackwardMatch, BestMatch, Dictionary, MatchFinder, BT4, CUTOFF_TRANSFORMS, HASH_MUL,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

static WORDS: &str = include_str!("data/words.txt");

/// Single-word dictionary with a side counter for the probe quota tests.
struct TestDict {
    word: &'static [u8],
    key: u32,
    lookups: Cell<usize>,
}

impl TestDict {
    /// Dictionary whose probe table answers for `word` under the key the
    /// finders derive from its first four bytes.
    fn for_word(word: &'static [u8]) -> Self {
        let loaded = u32::from_ne_bytes(word[..4].try_into().unwrap());
        Self {
            word,
            key: (loaded.wrapping_mul(HASH_MUL) >> 18) << 1,
            lookups: Cell::new(0),
        }
    }

    /// Dictionary that counts probes but never answers.
    fn empty() -> Self {
        Self {
            word: b"unmatchable!",
            key: u32::MAX,
            lookups: Cell::new(0),
        }
    }
}

impl Dictionary for TestDict {
    fn hash_entry(&self, key: u32) -> u16 {
        self.lookups.set(self.lookups.get() + 1);
        if key == self.key {
            self.word.len() as u16
        } else {
            0
        }
    }

    fn word(&self, len: usize, dist: u32) -> &[u8] {
        assert_eq!((len, dist), (self.word.len(), 0));
        self.word
    }

    fn size_bits_by_length(&self, _len: usize) -> u32 {
        0
    }

    fn max_match_len(&self) -> usize {
        24
    }

    fn find_all_matches(
        &self,
        data: &[u8],
        min_len: usize,
        max_len: usize,
        matches_by_len: &mut [u32],
    ) -> bool {
        let mut found = false;
        for l in min_len..=self.word.len().min(max_len) {
            if l > data.len() || data[..l] != self.word[..l] {
                continue;
            }
            let dict_distance = CUTOFF_TRANSFORMS[self.word.len() - l];
            matches_by_len[l] = (dict_distance << 5) | self.word.len() as u32;
            found = true;
        }
        found
    }
}

/// Text, random noise and copies of earlier output, interleaved.
fn mixed_corpus(len: usize, seed: u64) -> Vec<u8> {
    let text = WORDS.as_bytes();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data: Vec<u8> = Vec::with_capacity(len + 128);
    while data.len() < len {
        match rng.gen_range(0..3) {
            0 => {
                for _ in 0..rng.gen_range(8..48) {
                    data.push(rng.gen());
                }
            }
            1 => {
                let n = rng.gen_range(16usize..128);
                let start = rng.gen_range(0..text.len() - n);
                data.extend_from_slice(&text[start..start + n]);
            }
            _ if data.len() > 64 => {
                let n = rng.gen_range(8usize..64).min(data.len() - 1);
                let start = rng.gen_range(0..data.len() - n);
                let copy = data[start..start + n].to_vec();
                data.extend_from_slice(&copy);
            }
            _ => data.push(rng.gen()),
        }
    }
    data.truncate(len);
    data
}

#[test]
fn single_repeat_hits_last_distance() {
    let data = vec![0xAA; 256];
    let mut finder = MatchFinder::new(1, 16);
    for i in 0..4 {
        finder.store(&data, 255, i);
    }

    let mut best = BestMatch::default();
    let found =
        finder.find_longest_match(None, &data, 255, &[1, 0, 0, 0], 4, 32, 255, &mut best);
    assert!(found);
    assert_eq!((best.len, best.len_code, best.distance), (32, 32, 1));
    assert!((best.score - (5.4 * 32.0 + 0.6)).abs() < 1e-9);
}

#[test]
fn last_distance_beats_bucket_by_short_code() {
    let data = b"abcdefghxyzabcdefgh".to_vec();
    let mut finder = MatchFinder::new(5, 16);
    for i in 0..=10 {
        finder.store(&data, 15, i);
    }

    let mut best = BestMatch::default();
    let found =
        finder.find_longest_match(None, &data, 15, &[11, 0, 0, 0], 11, 8, 11, &mut best);
    assert!(found);
    assert_eq!((best.len, best.len_code, best.distance), (8, 8, 11));
    assert!((best.score - (5.4 * 8.0 + 0.6)).abs() < 1e-9);
}

#[test]
fn nice_length_shortcut_reports_single_match() {
    let mut data: Vec<u8> = (0u8..64).collect();
    data.extend_from_slice(&(0u8..8).collect::<Vec<u8>>());
    let mut tree = BT4::new(10, 32, 8);
    for i in 0..64 {
        tree.skip_byte(&data, 1023, i, data.len() - i as usize);
    }

    let mut matches = Vec::new();
    let count = tree.find_all_matches(None, &data, 1023, 64, 8, &mut matches);
    assert_eq!(count, 1);
    assert_eq!(matches[0].distance, 64);
    assert_eq!(matches[0].length(), 8);
    assert_eq!(matches[0].length_code(), 8);
}

#[cfg(target_endian = "little")]
#[test]
fn sweep_prefers_the_nearest_equal_match() {
    let mut data = vec![b'.'; 128];
    for (pos, tail) in [(8usize, b'a'), (56, b'b'), (64, b'c'), (71, b'd')] {
        data[pos..pos + 5].copy_from_slice(b"QRSTU");
        data[pos + 5] = tail;
    }
    let mut finder = MatchFinder::new(3, 16);
    for ix in [8u32, 56, 64] {
        finder.store(&data, 127, ix);
    }

    let mut best = BestMatch::default();
    let found =
        finder.find_longest_match(None, &data, 127, &[100, 100, 100, 100], 71, 6, 63, &mut best);
    assert!(found);
    assert_eq!((best.len, best.distance), (5, 7));
    assert!((best.score - (5.4 * 5.0 - 1.20 * 2.0)).abs() < 1e-9);
}

#[test]
fn dictionary_word_is_found() {
    let dict = TestDict::for_word(b"winter");
    let mut data = b"wxyzwinter".to_vec();
    data.resize(16, 0);
    let mut finder = MatchFinder::new(1, 16);

    let mut best = BestMatch::default();
    let found = finder.find_longest_match(
        Some(&dict),
        &data,
        15,
        &[0, 0, 0, 0],
        4,
        6,
        65535,
        &mut best,
    );
    assert!(found);
    assert_eq!((best.len, best.len_code, best.distance), (6, 6, 65536));
    assert!((best.score - (5.4 * 6.0 - 1.20 * 16.0)).abs() < 1e-9);
}

#[test]
fn dictionary_cutoff_transform_keeps_length_code() {
    let dict = TestDict::for_word(b"winter");
    let mut data = b"wxyzwinteQ".to_vec();
    data.resize(16, 0);
    let mut finder = MatchFinder::new(5, 16);

    let mut best = BestMatch::default();
    let found = finder.find_longest_match(
        Some(&dict),
        &data,
        15,
        &[0, 0, 0, 0],
        4,
        6,
        65535,
        &mut best,
    );
    assert!(found);
    // Five of six bytes match, so the probe falls back one cutoff
    // transform: word id 12, length code still the full word length.
    assert_eq!((best.len, best.len_code), (5, 6));
    assert_eq!(best.distance, 65535 + 12 + 1);
}

#[test]
fn dictionary_pass_fills_all_longer_lengths() {
    let dict = TestDict::for_word(b"winter");
    let mut data = b"wxyzwinter".to_vec();
    data.resize(16, 0);
    let mut finder = MatchFinder::new(5, 16);

    let mut matches = Vec::new();
    let count = finder.find_all_matches(Some(&dict), &data, 15, 4, 6, 65535, &mut matches);
    assert_eq!(count, 3);
    let lens: Vec<usize> = matches.iter().map(BackwardMatch::length).collect();
    assert_eq!(lens, [4, 5, 6]);
    for m in &matches {
        assert_eq!(m.length_code(), 6);
    }
    assert_eq!(matches[2].distance, 65536);
    assert_eq!(matches[1].distance, 65535 + 12 + 1);
    assert_eq!(matches[0].distance, 65535 + 27 + 1);
}

#[test]
fn zopfli_rewind_reports_only_the_long_match() {
    let data = vec![0xAB; 500];
    let mut finder = MatchFinder::new(10, 16);
    for i in 0..100 {
        finder.skip_byte(&data, 65535, i, data.len() - i as usize);
    }

    let mut matches = Vec::new();
    let count = finder.find_all_matches(None, &data, 65535, 100, 400, 65535, &mut matches);
    assert_eq!(count, 1);
    assert_eq!(matches[0].length(), 400);
    assert_eq!(matches[0].distance, 1);
}

#[test]
fn dictionary_probes_are_rationed() {
    let dict = TestDict::empty();
    let mut data = b"wxyzwinter".to_vec();
    data.resize(16, 0);
    let mut finder = MatchFinder::new(1, 16);

    for _ in 0..300 {
        let mut best = BestMatch::default();
        let found = finder.find_longest_match(
            Some(&dict),
            &data,
            15,
            &[0, 0, 0, 0],
            4,
            6,
            65535,
            &mut best,
        );
        assert!(!found);
    }
    // A miss costs a lookup and pays nothing back, so after 128 of them
    // the quota gate stays closed.
    assert_eq!(dict.lookups.get(), 128);
}

#[test]
fn reset_forgets_stored_positions() {
    let mut data = b"abcdabcdabcd".to_vec();
    data.resize(16, 0);
    let mut finder = MatchFinder::new(5, 16);
    for i in 0..=7 {
        finder.store(&data, 15, i);
    }

    let mut best = BestMatch::default();
    assert!(finder.find_longest_match(None, &data, 15, &[0; 4], 8, 4, 8, &mut best));
    assert_eq!(best.distance, 4);

    finder.reset();
    let mut best = BestMatch::default();
    assert!(!finder.find_longest_match(None, &data, 15, &[0; 4], 8, 4, 8, &mut best));
}

#[test]
fn store_range_equals_individual_stores() {
    let data = mixed_corpus(1024, 7);
    let mask = 1023;
    let mut stored = MatchFinder::new(6, 16);
    let mut ranged = MatchFinder::new(6, 16);
    for i in 0..512u32 {
        stored.store(&data, mask, i);
    }
    ranged.store_range(&data, mask, 0, 512);

    for cur in [512u32, 600, 700, 900] {
        let mut a = BestMatch::default();
        let mut b = BestMatch::default();
        let fa = stored.find_longest_match(None, &data, mask, &[4, 11, 15, 16], cur, 32, cur, &mut a);
        let fb = ranged.find_longest_match(None, &data, mask, &[4, 11, 15, 16], cur, 32, cur, &mut b);
        assert_eq!(fa, fb);
        assert_eq!((a.len, a.distance), (b.len, b.distance));
    }
}

#[test]
fn custom_dictionary_warms_the_hash() {
    let prefix = b"the quick brown fox jumps over the lazy dog!";
    let mut data = prefix.to_vec();
    data.extend_from_slice(b"the quick brown fox");
    data.resize(128, 0);
    let mut finder = MatchFinder::new(5, 16);
    finder.prepend_custom_dictionary(prefix);

    let cur = prefix.len() as u32;
    let mut best = BestMatch::default();
    let found = finder.find_longest_match(None, &data, 127, &[0; 4], cur, 19, cur, &mut best);
    assert!(found);
    assert_eq!((best.len, best.distance), (19, 44));
}

#[test]
fn quality_ten_ignores_custom_dictionary() {
    let mut finder = MatchFinder::new(10, 16);
    finder.prepend_custom_dictionary(b"abcdefghijklmnopqrstuvwxyz");

    let data = mixed_corpus(256, 3);
    let mut matches = Vec::new();
    let count = finder.find_all_matches(None, &data, 65535, 0, 64, 0, &mut matches);
    assert_eq!(count, 0);
}

#[test]
fn found_matches_round_trip() {
    for quality in 1..=9u32 {
        let data = mixed_corpus(4096, 0x1234 + quality as u64);
        let mask = 4095;
        let mut finder = MatchFinder::new(quality, 12);
        let mut dist_cache = [4i32, 11, 15, 16];
        let mut found_any = 0;

        for i in 16..data.len() - 64 {
            let cur = i as u32;
            let max_backward = cur.min(mask as u32);
            let mut best = BestMatch::default();
            let found = finder.find_longest_match(
                None,
                &data,
                mask,
                &dist_cache,
                cur,
                64,
                max_backward,
                &mut best,
            );
            if found {
                found_any += 1;
                assert!(best.len >= 2 && best.len <= 64);
                assert!(best.distance >= 1 && best.distance <= max_backward);
                assert_eq!(best.len_code, best.len);
                assert!(best.score > 0.0);
                let d = best.distance as usize;
                for k in 0..best.len {
                    assert_eq!(data[i - d + k], data[i + k], "mismatch at offset {k}");
                }
                if quality >= 5 {
                    // A re-query seeded with the result only succeeds on
                    // a strict score improvement.
                    let mut again = best;
                    let improved = finder.find_longest_match(
                        None,
                        &data,
                        mask,
                        &dist_cache,
                        cur,
                        64,
                        max_backward,
                        &mut again,
                    );
                    if improved {
                        assert!(again.score > best.score);
                    }
                }
                dist_cache = [best.distance as i32, dist_cache[0], dist_cache[1], dist_cache[2]];
            }
            finder.store(&data, mask, cur);
        }
        assert!(found_any > 100, "quality {quality} found {found_any} matches");
    }
}

#[test]
fn block_find_all_matches_lengths_increase() {
    for quality in 5..=9u32 {
        let data = mixed_corpus(4096, 99 + quality as u64);
        let mask = 4095;
        let mut finder = MatchFinder::new(quality, 12);
        let mut matches = Vec::new();
        let mut total = 0;

        for i in 8..data.len() - 64 {
            let cur = i as u32;
            if i % 3 == 0 {
                matches.clear();
                let count =
                    finder.find_all_matches(None, &data, mask, cur, 64, cur.min(mask as u32), &mut matches);
                assert_eq!(count, matches.len());
                total += count;
                let mut last_len = 0;
                for m in &matches {
                    assert!(m.length() > last_len, "lengths must strictly increase");
                    last_len = m.length();
                    let d = m.distance as usize;
                    assert!(d >= 1 && d <= i);
                    for k in 0..m.length() {
                        assert_eq!(data[i - d + k], data[i + k]);
                    }
                }
            }
            finder.store(&data, mask, cur);
        }
        assert!(total > 100, "quality {quality} found {total} matches");
    }
}

#[test]
fn bt4_find_all_matches_lengths_increase() {
    let data = mixed_corpus(4096, 0xB7);
    let mask = 4095;
    let mut finder = MatchFinder::new(10, 12);
    let mut matches = Vec::new();
    let mut total = 0;

    for i in 0..data.len() - 64 {
        let cur = i as u32;
        if i % 3 == 0 {
            matches.clear();
            let count = finder.find_all_matches(None, &data, mask, cur, 64, cur.min(mask as u32), &mut matches);
            assert_eq!(count, matches.len());
            total += count;
            let mut last_len = 0;
            for m in &matches {
                assert!(m.length() > last_len, "lengths must strictly increase");
                last_len = m.length();
                let d = m.distance as usize;
                assert!(d >= 1 && d <= i);
                for k in 0..m.length() {
                    assert_eq!(data[i - d + k], data[i + k]);
                }
            }
        } else {
            finder.skip_byte(&data, mask, cur, 64);
        }
    }
    assert!(total > 100, "quality 10 found {total} matches");
}

#[test]
fn text_compresses_through_every_tier() {
    let text = WORDS.as_bytes();
    let len = text.len() & !63;
    let mask = 4095;
    for quality in 1..=9u32 {
        let mut finder = MatchFinder::new(quality, 12);
        let mut found_any = 0;
        for i in 8..len - 64 {
            let cur = i as u32;
            let mut best = BestMatch::default();
            if finder.find_longest_match(
                None,
                text,
                mask,
                &[4, 11, 15, 16],
                cur,
                64,
                cur.min(mask as u32),
                &mut best,
            ) {
                found_any += 1;
            }
            finder.store(text, mask, cur);
        }
        assert!(found_any > 50, "quality {quality} found {found_any} matches in text");
    }
}

#[test]
fn memory_usage_grows_with_quality() {
    let q1 = MatchFinder::new(1, 16).memory_usage();
    let q5 = MatchFinder::new(5, 16).memory_usage();
    let q9 = MatchFinder::new(9, 16).memory_usage();
    let q10 = MatchFinder::new(10, 16).memory_usage();
    assert!(q1 < q5 && q5 < q9);
    assert!(q10 > 1000, "the tree tier holds a megabyte-class table");
}

#[test]
#[should_panic(expected = "quality")]
fn quality_out_of_range_panics() {
    let _ = MatchFinder::new(11, 16);
}

#[test]
fn backward_match_packs_length_and_code() {
    let plain = BackwardMatch::new(9, 40);
    assert_eq!((plain.length(), plain.length_code()), (40, 40));

    let transformed = BackwardMatch::with_length_code(9, 5, 6);
    assert_eq!((transformed.length(), transformed.length_code()), (5, 6));

    let untransformed = BackwardMatch::with_length_code(9, 6, 6);
    assert_eq!((untransformed.length(), untransformed.length_code()), (6, 6));
}

#[test]
fn unaligned_access_round_trips() {
    let mut buf = [0u8; 16];
    mem::store16(&mut buf, 1, 0xBEEF);
    assert_eq!(mem::load16(&buf, 1), 0xBEEF);
    mem::store32(&mut buf, 3, 0xDEAD_BEEF);
    assert_eq!(mem::load32(&buf, 3), 0xDEAD_BEEF);
    mem::store64(&mut buf, 7, 0x0123_4567_89AB_CDEF);
    assert_eq!(mem::load64(&buf, 7), 0x0123_4567_89AB_CDEF);
}

#[test]
fn loaded_helpers_keep_low_address_bytes() {
    let a = mem::load32(b"abcX", 0);
    let b = mem::load32(b"abcY", 0);
    let c = mem::load32(b"abZW", 0);
    assert_eq!(mem::loaded_u32_to_u24(a), mem::loaded_u32_to_u24(b));
    assert_ne!(mem::loaded_u32_to_u24(a), mem::loaded_u32_to_u24(c));
    assert_eq!(mem::loaded_u32_to_u16(a), mem::loaded_u32_to_u16(c));
}
