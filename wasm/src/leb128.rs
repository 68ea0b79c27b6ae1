// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! LEB128 integer decoding.
//!
//! Encodings longer than the type allows, and final bytes whose unused
//! payload bits are not a correct zero/sign extension, are rejected. Both
//! checks matter: the lenient decoder in many engines' first drafts happily
//! wraps `0xFF 0xFF 0xFF 0xFF 0x7F` into a u32.

use crate::error::{DecodeError, Result};
use crate::reader::Reader;

fn malformed(r: &Reader<'_>) -> DecodeError {
    DecodeError::Section {
        section: 0xFF,
        offset: r.pos(),
        reason: "malformed LEB128 integer",
    }
}

/// Unsigned 32-bit, at most 5 bytes.
pub fn read_u32(r: &mut Reader<'_>) -> Result<u32> {
    let mut result: u32 = 0;
    let mut shift = 0u32;
    loop {
        let byte = r.read_byte()?;
        if shift == 28 && byte & 0xF0 != 0 {
            // 5th byte: only 4 payload bits left, and no continuation.
            return Err(malformed(r));
        }
        result |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 32 {
            return Err(malformed(r));
        }
    }
}

/// Signed 32-bit, at most 5 bytes.
pub fn read_i32(r: &mut Reader<'_>) -> Result<i32> {
    let mut result: i32 = 0;
    let mut shift = 0u32;
    loop {
        let byte = r.read_byte()?;
        if shift == 28 {
            if byte & 0x80 != 0 {
                return Err(malformed(r));
            }
            // Bits above the final value bit must match its sign.
            let sign_bits = byte & 0x70;
            let expect = if byte & 0x08 != 0 { 0x70 } else { 0 };
            if sign_bits != expect {
                return Err(malformed(r));
            }
        }
        result |= i32::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 32 && byte & 0x40 != 0 {
                result |= -1i32 << shift;
            }
            return Ok(result);
        }
    }
}

/// Signed 64-bit, at most 10 bytes.
pub fn read_i64(r: &mut Reader<'_>) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = r.read_byte()?;
        if shift == 63 {
            if byte & 0x80 != 0 {
                return Err(malformed(r));
            }
            let sign_bits = byte & 0x7E;
            let expect = if byte & 0x01 != 0 { 0x7E } else { 0 };
            if sign_bits != expect {
                return Err(malformed(r));
            }
        }
        result |= i64::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            return Ok(result);
        }
    }
}

/// Signed 33-bit (block types), at most 5 bytes.
pub fn read_s33(r: &mut Reader<'_>) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = r.read_byte()?;
        if shift == 28 {
            if byte & 0x80 != 0 {
                return Err(malformed(r));
            }
            let sign_bits = byte & 0x60;
            let expect = if byte & 0x10 != 0 { 0x60 } else { 0 };
            if sign_bits != expect {
                return Err(malformed(r));
            }
        }
        result |= i64::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 33 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            // Sign-extend from bit 33 down.
            let result = (result << 31) >> 31;
            return Ok(result);
        }
    }
}

pub fn read_f32(r: &mut Reader<'_>) -> Result<f32> {
    let bytes = r.read_bytes(4)?;
    Ok(f32::from_le_bytes(bytes.try_into().expect("4 bytes")))
}

pub fn read_f64(r: &mut Reader<'_>) -> Result<f64> {
    let bytes = r.read_bytes(8)?;
    Ok(f64::from_le_bytes(bytes.try_into().expect("8 bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_of(bytes: &[u8]) -> Result<u32> {
        read_u32(&mut Reader::new(bytes))
    }

    fn i32_of(bytes: &[u8]) -> Result<i32> {
        read_i32(&mut Reader::new(bytes))
    }

    #[test]
    fn u32_round_trips() {
        assert_eq!(u32_of(&[0x00]).unwrap(), 0);
        assert_eq!(u32_of(&[0x7F]).unwrap(), 127);
        assert_eq!(u32_of(&[0x80, 0x01]).unwrap(), 128);
        assert_eq!(u32_of(&[0xE5, 0x8E, 0x26]).unwrap(), 624485);
        assert_eq!(u32_of(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]).unwrap(), u32::MAX);
    }

    #[test]
    fn u32_rejects_overlong() {
        // Six bytes.
        assert!(u32_of(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]).is_err());
        // Unused payload bits set in byte five.
        assert!(u32_of(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]).is_err());
    }

    #[test]
    fn u32_rejects_truncation() {
        assert!(u32_of(&[0x80]).is_err());
        assert!(u32_of(&[]).is_err());
    }

    #[test]
    fn u32_accepts_padded_zero() {
        // Non-minimal but within five bytes with clean spare bits.
        assert_eq!(u32_of(&[0x80, 0x00]).unwrap(), 0);
    }

    #[test]
    fn i32_signs() {
        assert_eq!(i32_of(&[0x7F]).unwrap(), -1);
        assert_eq!(i32_of(&[0x40]).unwrap(), -64);
        assert_eq!(i32_of(&[0xC0, 0xBB, 0x78]).unwrap(), -123456);
        assert_eq!(
            i32_of(&[0x80, 0x80, 0x80, 0x80, 0x78]).unwrap(),
            i32::MIN
        );
        assert_eq!(
            i32_of(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07]).unwrap(),
            i32::MAX
        );
    }

    #[test]
    fn i32_rejects_bad_sign_extension() {
        // Positive value with stray high bits in the last byte.
        assert!(i32_of(&[0xFF, 0xFF, 0xFF, 0xFF, 0x4F]).is_err());
    }

    #[test]
    fn i64_extremes() {
        let mut min = vec![0x80u8; 9];
        min.push(0x7F);
        assert_eq!(read_i64(&mut Reader::new(&min)).unwrap(), i64::MIN);
        let mut max = vec![0xFFu8; 9];
        max.push(0x00);
        assert_eq!(read_i64(&mut Reader::new(&max)).unwrap(), i64::MAX);
    }
}
