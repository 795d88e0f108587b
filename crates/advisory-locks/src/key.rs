// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexSpaces.
//
// PlexSpaces is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexSpaces is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexSpaces. If not, see <https://www.gnu.org/licenses/>.

//! Lock key encoder.
//!
//! ## Purpose
//! Maps every supported identifier form onto the provider's 64-bit
//! advisory lock key space, deterministically and without collisions
//! between encodings.
//!
//! ## Encodings
//! - **Int64**: raw caller-supplied `i64`
//! - **Int32Pair**: two `i32` halves packed high/low; numerically the same
//!   space as Int64, so a pair and the `i64` with the same bits are one key
//! - **Ascii**: up to 9 seven-bit characters packed MSB-first with a
//!   terminator bit and all-ones padding
//! - **Hashed**: last 8 bytes of the SHA-1 digest of the UTF-8 name
//!   (collision-possible, opt-in only)
//!
//! ## Examples
//! ```rust
//! use plexspaces_advisory_locks::key::{encode_name, KeyEncoding};
//!
//! let key = encode_name("orders", false).unwrap();
//! assert_eq!(key.encoding(), KeyEncoding::Ascii);
//!
//! let pair = encode_name("0000abcd,0000ef01", false).unwrap();
//! assert_eq!(pair.value(), 0x0000_ABCD_0000_EF01);
//! ```

use crate::EncodingError;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Longest name the ASCII encoding accepts.
pub const MAX_ASCII_LENGTH: usize = 9;

const ASCII_CHAR_BITS: u32 = 7;
const ASCII_PADDING: u64 = 0x7F;
const HEX_HALF_DIGITS: usize = 8;

/// Which encoding produced a [`LockKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncoding {
    Int64,
    Int32Pair,
    Ascii,
    Hashed,
}

impl KeyEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEncoding::Int64 => "int64",
            KeyEncoding::Int32Pair => "int32_pair",
            KeyEncoding::Ascii => "ascii",
            KeyEncoding::Hashed => "hashed",
        }
    }
}

/// A 64-bit advisory lock key tagged with the encoding that produced it.
///
/// Equality and hashing look at the 64-bit value only: keys from different
/// encodings that carry the same bits address the same provider key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockKey {
    value: i64,
    encoding: KeyEncoding,
}

impl LockKey {
    /// The 64-bit key value.
    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    /// True when the key is addressed as two 32-bit values.
    pub fn is_pair(&self) -> bool {
        self.encoding == KeyEncoding::Int32Pair
    }

    /// High and low 32-bit halves of the value.
    pub fn halves(&self) -> (i32, i32) {
        ((self.value >> 32) as i32, self.value as i32)
    }
}

impl PartialEq for LockKey {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for LockKey {}

impl Hash for LockKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:016x}", self.encoding.as_str(), self.value as u64)
    }
}

/// Textual shape accepted by [`decode_hash_pair_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashPairForm {
    /// 16 hex digits
    Contiguous,
    /// `XXXXXXXX,XXXXXXXX`
    CommaSeparated,
}

/// Wrap a raw 64-bit key.
pub fn encode_int64(value: i64) -> LockKey {
    LockKey {
        value,
        encoding: KeyEncoding::Int64,
    }
}

/// Pack two 32-bit keys: `high` in the upper half, `low` (as unsigned) in the lower.
pub fn encode_int32_pair(high: i32, low: i32) -> LockKey {
    LockKey {
        value: (i64::from(high) << 32) | i64::from(low as u32),
        encoding: KeyEncoding::Int32Pair,
    }
}

/// Pack a short ASCII name into a unique 64-bit key.
///
/// Each character contributes 7 bits MSB-first, followed by a single 0
/// terminator bit and one all-ones 7-bit group per unused slot. The
/// terminator sits at the true end of the name, so no name can be confused
/// with a padded shorter one.
///
/// ## Errors
/// - [`EncodingError::NonAscii`] if any character is above 127
/// - [`EncodingError::TooLong`] if the name exceeds [`MAX_ASCII_LENGTH`]
pub fn encode_ascii(name: &str) -> Result<LockKey, EncodingError> {
    if let Some(ch) = name.chars().find(|c| !c.is_ascii()) {
        return Err(EncodingError::NonAscii(ch));
    }
    // All ASCII from here: byte length is character count.
    let len = name.len();
    if len > MAX_ASCII_LENGTH {
        return Err(EncodingError::TooLong {
            len,
            max: MAX_ASCII_LENGTH,
        });
    }

    let mut packed: u64 = 0;
    for byte in name.bytes() {
        packed = (packed << ASCII_CHAR_BITS) | u64::from(byte);
    }
    packed <<= 1;
    for _ in len..MAX_ASCII_LENGTH {
        packed = (packed << ASCII_CHAR_BITS) | ASCII_PADDING;
    }

    Ok(LockKey {
        value: packed as i64,
        encoding: KeyEncoding::Ascii,
    })
}

/// Decode a hash-pair string into an [`KeyEncoding::Int32Pair`] key.
///
/// Accepts 16 hex digits or two 8-digit halves separated by a comma at
/// index 8. Each half is a big-endian unsigned 32-bit value. The detected
/// shape is returned alongside the key.
pub fn decode_hash_pair_string(text: &str) -> Result<(LockKey, HashPairForm), EncodingError> {
    let bytes = text.as_bytes();
    let (high, low, form) = match bytes.len() {
        16 => (&bytes[..HEX_HALF_DIGITS], &bytes[HEX_HALF_DIGITS..], HashPairForm::Contiguous),
        17 if bytes[HEX_HALF_DIGITS] == b',' => (
            &bytes[..HEX_HALF_DIGITS],
            &bytes[HEX_HALF_DIGITS + 1..],
            HashPairForm::CommaSeparated,
        ),
        _ => return Err(EncodingError::NotHashForm(text.to_string())),
    };

    match (parse_hex_half(high), parse_hex_half(low)) {
        (Some(high), Some(low)) => Ok((encode_int32_pair(high as i32, low as i32), form)),
        _ => Err(EncodingError::NotHashForm(text.to_string())),
    }
}

fn parse_hex_half(digits: &[u8]) -> Option<u32> {
    let mut buf = [0u8; 4];
    hex::decode_to_slice(digits, &mut buf).ok()?;
    Some(u32::from_be_bytes(buf))
}

/// Hash an arbitrary name into a key.
///
/// Takes the last 8 bytes of the SHA-1 digest, the final byte being most
/// significant, independent of host byte order. Distinct names may collide.
pub fn hash_arbitrary(name: &str) -> LockKey {
    let digest = Sha1::digest(name.as_bytes());
    let mut tail = [0u8; 8];
    let start = digest.len() - tail.len();
    tail.copy_from_slice(&digest[start..]);
    LockKey {
        value: i64::from_le_bytes(tail),
        encoding: KeyEncoding::Hashed,
    }
}

/// Encode a caller-facing lock name.
///
/// Tries ASCII, then hash-pair decoding, then (only with `allow_hashing`)
/// SHA-1 hashing; the first success wins. A name of at most 9 ASCII
/// characters therefore always takes the ASCII path.
pub fn encode_name(name: &str, allow_hashing: bool) -> Result<LockKey, EncodingError> {
    if let Ok(key) = encode_ascii(name) {
        return Ok(key);
    }
    if let Ok((key, _)) = decode_hash_pair_string(name) {
        return Ok(key);
    }
    if allow_hashing {
        return Ok(hash_arbitrary(name));
    }
    Err(EncodingError::Unsupported {
        name: name.to_string(),
        hashing_allowed: allow_hashing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_int32_pair_matches_int64_bits() {
        let pair = encode_int32_pair(0x0000_ABCD, 0x0000_EF01);
        assert_eq!(pair.value(), 0x0000_ABCD_0000_EF01);
        assert_eq!(pair, encode_int64(0x0000_ABCD_0000_EF01));
        assert_eq!(pair.encoding(), KeyEncoding::Int32Pair);
        assert_eq!(pair.halves(), (0xABCD, 0xEF01));
    }

    #[test]
    fn test_int32_pair_masks_negative_low_half() {
        let key = encode_int32_pair(1, -1);
        assert_eq!(key.value(), 0x0000_0001_FFFF_FFFF);
        assert_eq!(key.halves(), (1, -1));

        let key = encode_int32_pair(-1, 0);
        assert_eq!(key.value(), -0x1_0000_0000);
        assert_eq!(key.halves(), (-1, 0));
    }

    #[test]
    fn test_ascii_known_values() {
        assert_eq!(encode_ascii("").unwrap().value(), i64::MAX);
        assert_eq!(encode_ascii("a").unwrap().value(), 0xC2FF_FFFF_FFFF_FFFFu64 as i64);
        assert_eq!(encode_ascii("orders").unwrap().value(), 0xDFCB_265E_5CDF_FFFFu64 as i64);
        assert_eq!(encode_ascii("123456789").unwrap().value(), 0x62C9_9B46_AD9B_B872);
    }

    #[test]
    fn test_ascii_padding_character_does_not_collide() {
        // 0x7F matches the padding group; the terminator keeps them apart
        let short = encode_ascii("a").unwrap();
        let padded = encode_ascii("a\x7f").unwrap();
        assert_ne!(short, padded);
        assert_eq!(padded.value(), 0xC3FD_FFFF_FFFF_FFFFu64 as i64);
    }

    #[test]
    fn test_ascii_too_long() {
        assert_eq!(
            encode_ascii("123456789X"),
            Err(EncodingError::TooLong { len: 10, max: 9 })
        );
        assert!(encode_ascii("123456789").is_ok());
    }

    #[test]
    fn test_ascii_rejects_non_ascii() {
        assert_eq!(encode_ascii("caf\u{e9}"), Err(EncodingError::NonAscii('\u{e9}')));
        assert_eq!(encode_ascii("\u{80}"), Err(EncodingError::NonAscii('\u{80}')));
        assert!(matches!(
            encode_ascii("far-too-long-and-\u{1F512}"),
            Err(EncodingError::NonAscii(_))
        ));
    }

    #[test]
    fn test_ascii_exhaustive_two_chars_unique() {
        let mut seen = HashSet::new();
        assert!(seen.insert(encode_ascii("").unwrap().value()));
        for a in 0u8..128 {
            assert!(seen.insert(encode_ascii(&(a as char).to_string()).unwrap().value()));
            for b in 0u8..128 {
                let name: String = [a as char, b as char].iter().collect();
                assert!(seen.insert(encode_ascii(&name).unwrap().value()), "collision on {name:?}");
            }
        }
    }

    #[test]
    fn test_hash_pair_both_forms() {
        let expected = encode_int32_pair(0xabcd, 0xef01);

        let (key, form) = decode_hash_pair_string("0000abcd0000ef01").unwrap();
        assert_eq!(key, expected);
        assert_eq!(key.encoding(), KeyEncoding::Int32Pair);
        assert_eq!(form, HashPairForm::Contiguous);

        let (key, form) = decode_hash_pair_string("0000abcd,0000ef01").unwrap();
        assert_eq!(key, expected);
        assert_eq!(form, HashPairForm::CommaSeparated);
    }

    #[test]
    fn test_hash_pair_upper_case_and_high_bit() {
        let (key, _) = decode_hash_pair_string("FFFFFFFF,80000000").unwrap();
        assert_eq!(key.halves(), (-1, i32::MIN));
        assert_eq!(key.value(), 0xFFFF_FFFF_8000_0000u64 as i64);
    }

    #[test]
    fn test_hash_pair_rejects_other_shapes() {
        for text in [
            "",
            "0000abcd",
            "0000abcd0000ef0",
            "0000abcd0000ef012",
            "0000abcd;0000ef01",
            "0000abc,d0000ef01",
            "0000abcd,0000ef011",
            "0000abcg0000ef01",
            "+000abcd0000ef01",
            "0000abcd,+000ef01",
        ] {
            assert_eq!(
                decode_hash_pair_string(text),
                Err(EncodingError::NotHashForm(text.to_string())),
                "{text:?}"
            );
        }
    }

    #[test]
    fn test_hash_pair_rejects_multibyte_text() {
        // 16 bytes, not hex
        let text = "\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}";
        assert_eq!(text.len(), 16);
        assert!(matches!(
            decode_hash_pair_string(text),
            Err(EncodingError::NotHashForm(_))
        ));
    }

    #[test]
    fn test_hash_arbitrary_known_values() {
        let key = hash_arbitrary("hello world");
        assert_eq!(key.value(), 0xED46_E81E_E99C_8B40u64 as i64);
        assert_eq!(key.encoding(), KeyEncoding::Hashed);
        assert_eq!(hash_arbitrary("").value(), 0x0907_D8AF_9018_6095);
        assert_eq!(hash_arbitrary("hello world"), hash_arbitrary("hello world"));
    }

    #[test]
    fn test_encode_name_prefers_ascii() {
        // Valid hex digits, but short enough for ASCII
        let key = encode_name("deadbeef", false).unwrap();
        assert_eq!(key.encoding(), KeyEncoding::Ascii);
        assert_eq!(key, encode_ascii("deadbeef").unwrap());
    }

    #[test]
    fn test_encode_name_falls_back_to_hash_pair() {
        let key = encode_name("0000abcd0000ef01", false).unwrap();
        assert_eq!(key.encoding(), KeyEncoding::Int32Pair);
        assert_eq!(key.value(), 0x0000_ABCD_0000_EF01);
    }

    #[test]
    fn test_encode_name_hashing_opt_in() {
        let name = "a-very-long-resource-name";
        assert_eq!(
            encode_name(name, false),
            Err(EncodingError::Unsupported {
                name: name.to_string(),
                hashing_allowed: false,
            })
        );

        let key = encode_name(name, true).unwrap();
        assert_eq!(key.encoding(), KeyEncoding::Hashed);
        assert_eq!(key.value(), 0xB53C_C0F7_846A_EC46u64 as i64);
    }

    #[test]
    fn test_encode_name_non_ascii_needs_hashing() {
        assert!(matches!(
            encode_name("caf\u{e9}", false),
            Err(EncodingError::Unsupported { .. })
        ));
        assert_eq!(encode_name("caf\u{e9}", true).unwrap().encoding(), KeyEncoding::Hashed);
    }

    #[test]
    fn test_display() {
        assert_eq!(encode_int64(255).to_string(), "int64:00000000000000ff");
        assert_eq!(encode_int64(-1).to_string(), "int64:ffffffffffffffff");
        assert_eq!(encode_int32_pair(1, 2).to_string(), "int32_pair:0000000100000002");
    }

    proptest! {
        #[test]
        fn prop_ascii_injective(a in "[\\x00-\\x7f]{0,9}", b in "[\\x00-\\x7f]{0,9}") {
            let ka = encode_ascii(&a).unwrap();
            let kb = encode_ascii(&b).unwrap();
            prop_assert_eq!(a == b, ka == kb);
        }

        #[test]
        fn prop_pair_round_trips_halves(high in any::<i32>(), low in any::<i32>()) {
            let key = encode_int32_pair(high, low);
            prop_assert_eq!(key.halves(), (high, low));
            prop_assert_eq!(key, encode_int64(((high as i64) << 32) | (low as u32 as i64)));
        }
    }
}
