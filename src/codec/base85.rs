//! Base-85 Text Encoding
//!
//! The RFC 1924 alphabet, packed the same way as Python's `base64.b85encode`:
//!
//! ```text
//! 0-9 A-Z a-z ! # $ % & ( ) * + - ; < = > ? @ ^ _ ` { | } ~
//! ```
//!
//! Input is read in big-endian 4-byte words; each word becomes five digits,
//! most significant first. A trailing partial word is zero-padded and the
//! characters standing for the padding are dropped. Decoding pads a partial
//! group with `~` (digit 84) and drops the same number of bytes.

use crate::error::{CodecError, CodecResult};

const ALPHABET: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

/// Reverse lookup; 0xFF marks bytes outside the alphabet
const DECODE: [u8; 256] = {
    let mut table = [0xFFu8; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Encode bytes as base-85 text
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(4) * 5);
    for chunk in bytes.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        let keep = 5 - (4 - chunk.len());
        out.extend(digits[..keep].iter().map(|&d| d as char));
    }
    out
}

/// Decode base-85 text
///
/// # Errors
///
/// [`CodecError::InvalidBase85`] for a character outside the alphabet and
/// [`CodecError::Base85Overflow`] when a group exceeds 32 bits.
pub fn decode(text: &str) -> CodecResult<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len().div_ceil(5) * 4);

    for (group, chunk) in bytes.chunks(5).enumerate() {
        let offset = group * 5;
        let mut value: u64 = 0;
        for i in 0..5 {
            let digit = match chunk.get(i) {
                Some(&b) => {
                    let d = DECODE[b as usize];
                    if d == 0xFF {
                        // Report the full char, not a UTF-8 continuation byte
                        let character = text[offset + i..].chars().next().unwrap_or('\u{FFFD}');
                        return Err(CodecError::InvalidBase85 {
                            character,
                            offset: offset + i,
                        });
                    }
                    d as u64
                }
                None => 84,
            };
            value = value * 85 + digit;
        }
        if value > u32::MAX as u64 {
            return Err(CodecError::Base85Overflow(offset));
        }
        let word = (value as u32).to_be_bytes();
        let keep = 4 - (5 - chunk.len());
        out.extend_from_slice(&word[..keep]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        // Python: base64.b85encode(b"hello") == b"Xk~0{Zv"
        assert_eq!(encode(b"hello"), "Xk~0{Zv");
        assert_eq!(encode(b"\x00\x00\x00\x00"), "00000");
        assert_eq!(encode(b""), "");
        assert_eq!(decode("Xk~0{Zv").unwrap(), b"hello");
    }

    #[test]
    fn test_every_tail_length() {
        let data: Vec<u8> = (0u8..=255).collect();
        for len in 0..12 {
            let encoded = encode(&data[..len]);
            assert_eq!(encoded.len(), len / 4 * 5 + if len % 4 == 0 { 0 } else { len % 4 + 1 });
            assert_eq!(decode(&encoded).unwrap(), &data[..len]);
        }
    }

    #[test]
    fn test_invalid_character() {
        let err = decode("Xk~0\"Zv").unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidBase85 {
                character: '"',
                offset: 4
            }
        ));
    }

    #[test]
    fn test_overflowing_group() {
        assert!(matches!(decode("~~~~~"), Err(CodecError::Base85Overflow(0))));
    }
}
