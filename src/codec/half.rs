//! Half-Precision Packing (lossy)
//!
//! Packs values as IEEE-754 binary16, big-endian, two bytes per value. About
//! three significant decimal digits survive, and magnitudes above 65504 become
//! infinity. Use it for size-constrained transport of activations or previews,
//! never for trained weight files; those go through the lossless JSON path in
//! [`crate::codec`].
//!
//! Values are rounded to nearest-even once, straight from their `f64` bits.
//!
//! ```text
//! binary16:  s eeeee mmmmmmmmmm   (bias 15)
//! ```

use super::base85;
use crate::error::{CodecError, CodecResult};

/// Convert an `f64` to binary16 bits, rounding to nearest-even
///
/// Rounds once, straight from the `f64` bits.
pub fn f64_to_f16(x: f64) -> u16 {
    let bits = x.to_bits();
    let sign = ((bits >> 48) & 0x8000) as u16;
    let exp = ((bits >> 52) & 0x7FF) as i32;
    let frac = bits & 0xF_FFFF_FFFF_FFFF;

    if exp == 0x7FF {
        // Inf stays Inf; NaN stays a quiet NaN
        return sign | 0x7C00 | if frac != 0 { 0x200 } else { 0 };
    }

    let new_exp = exp - 1023 + 15;
    if new_exp >= 31 {
        return sign | 0x7C00;
    }

    if new_exp <= 0 {
        if new_exp < -10 {
            return sign;
        }
        let full = frac | (1 << 52);
        let shift = (43 - new_exp) as u32;
        let mantissa = full >> shift;
        let rem = full & ((1 << shift) - 1);
        let halfway = 1 << (shift - 1);
        let round_up = rem > halfway || (rem == halfway && mantissa & 1 == 1);
        // A carry out of the mantissa lands on the smallest normal
        return sign | (mantissa + round_up as u64) as u16;
    }

    let mantissa = frac >> 42;
    let rem = frac & ((1 << 42) - 1);
    let halfway = 1 << 41;
    let round_up = rem > halfway || (rem == halfway && mantissa & 1 == 1);
    let packed = (((new_exp as u64) << 10) | mantissa) + round_up as u64;
    // Carry may bump the exponent, up to Inf at 0x7C00
    sign | packed as u16
}

/// Convert an `f32` to binary16 bits, rounding to nearest-even
pub fn f32_to_f16(x: f32) -> u16 {
    f64_to_f16(f64::from(x))
}

/// Convert binary16 bits to `f32` exactly
pub fn f16_to_f32(h: u16) -> f32 {
    let sign = ((h as u32) & 0x8000) << 16;
    let exp = ((h >> 10) & 0x1F) as u32;
    let frac = (h & 0x3FF) as u32;

    if exp == 0 {
        if frac == 0 {
            return f32::from_bits(sign);
        }
        // Subnormal: normalise the mantissa
        let mut e = 0i32;
        let mut f = frac;
        while f & 0x400 == 0 {
            f <<= 1;
            e += 1;
        }
        let exp32 = (127 - 15 + 1 - e) as u32;
        let frac32 = (f & 0x3FF) << 13;
        return f32::from_bits(sign | (exp32 << 23) | frac32);
    }
    if exp == 31 {
        return f32::from_bits(sign | 0x7F80_0000 | (frac << 13));
    }
    f32::from_bits(sign | ((exp + 127 - 15) << 23) | (frac << 13))
}

/// Pack values as big-endian binary16
pub fn pack_f16(values: &[f64]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|&v| f64_to_f16(v).to_be_bytes())
        .collect()
}

/// Unpack big-endian binary16 values
///
/// # Errors
///
/// [`CodecError::OddHalfLength`] if `bytes` is not a whole number of values.
pub fn unpack_f16(bytes: &[u8]) -> CodecResult<Vec<f64>> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddHalfLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f16_to_f32(u16::from_be_bytes([pair[0], pair[1]])) as f64)
        .collect())
}

/// [`pack_f16`] followed by base-85
pub fn encode_f16_text(values: &[f64]) -> String {
    base85::encode(&pack_f16(values))
}

/// Base-85 decode followed by [`unpack_f16`]
pub fn decode_f16_text(text: &str) -> CodecResult<Vec<f64>> {
    unpack_f16(&base85::decode(text.trim())?)
}
