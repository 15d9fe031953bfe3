//! Header field codec.
//!
//! Every TAR header is a 512-byte block of fixed-width fields. Text fields are
//! NUL-padded ASCII. Numeric fields are either octal ASCII digits terminated by
//! NUL or space, or (GNU extension) a base-256 big-endian integer flagged by the
//! high bit of the first byte.
//!
//! All functions operate on the exclusively borrowed field slice; use
//! [`Field::of`] / [`Field::of_mut`] to cut the slice out of a block.

use crate::error::{Result, TarError};

/// Size of a header block.
pub const BLOCK_SIZE: usize = 512;

/// A header block.
pub type Block = [u8; BLOCK_SIZE];

/// Offset and width of a field within a header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Byte offset of the first byte of the field.
    pub offset: usize,
    /// Width of the field in bytes.
    pub len: usize,
}

impl Field {
    /// Create a field descriptor.
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Byte offset one past the end of the field.
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Borrow the field out of a block.
    pub fn of<'a>(&self, block: &'a [u8]) -> &'a [u8] {
        &block[self.offset..self.end()]
    }

    /// Mutably borrow the field out of a block.
    pub fn of_mut<'a>(&self, block: &'a mut [u8]) -> &'a mut [u8] {
        &mut block[self.offset..self.end()]
    }
}

/// Byte range holding the checksum.
const CHECKSUM: Field = Field::new(148, 8);

/// Decode a NUL-terminated text field.
///
/// Bytes after the first NUL are ignored. The codec only ever writes 7-bit
/// ASCII, which decodes identically; bytes outside that range written by
/// other archivers are decoded as UTF-8 with replacement.
pub fn decode_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Encode `text` as ASCII into `field`, zero-padding the remainder.
///
/// With `nul_terminate` set, one trailing byte is reserved for a NUL.
pub fn encode_string(text: &str, field: &mut [u8], nul_terminate: bool) -> Result<()> {
    if !text.is_ascii() {
        return Err(TarError::encoding(format!(
            "non-ASCII character in header field: {text:?}"
        )));
    }
    let capacity = field.len() - usize::from(nul_terminate);
    if text.len() > capacity {
        return Err(TarError::encoding(format!(
            "{} bytes do not fit in a {}-byte field",
            text.len(),
            field.len()
        )));
    }
    field[..text.len()].copy_from_slice(text.as_bytes());
    field[text.len()..].fill(0);
    Ok(())
}

/// Decode a numeric field into the target integer type.
///
/// Returns `Ok(None)` for an empty field, so callers can tell an unset field
/// from zero.
pub fn decode_number<T: TryFrom<i128>>(field: &[u8]) -> Result<Option<T>> {
    let width = field.len();
    let Some(&first) = field.first() else {
        return Ok(None);
    };

    let value = if first & 0x80 != 0 {
        decode_base256(field)?
    } else {
        let digits = octal_digits(field);
        if digits.is_empty() {
            return Ok(None);
        }
        parse_octal(digits, width)?
    };

    T::try_from(value)
        .map(Some)
        .map_err(|_| TarError::overflow(width))
}

/// Decode a base-256 field.
///
/// A set `0x40` bit in the leading byte marks a negative value stored as
/// two's complement across the whole field.
fn decode_base256(field: &[u8]) -> Result<i128> {
    let width = field.len();
    let negative = field[0] & 0x40 != 0;

    let mut value: i128 = if negative { -1 } else { 0 };
    for (i, &byte) in field.iter().enumerate() {
        let byte = if i == 0 && !negative { byte & 0x7F } else { byte };
        value = value
            .checked_mul(256)
            .and_then(|v| v.checked_add(i128::from(byte)))
            .ok_or_else(|| TarError::overflow(width))?;
    }
    Ok(value)
}

/// Slice out the octal digits of a field: leading spaces skipped, stop at
/// the first NUL or space.
fn octal_digits(field: &[u8]) -> &[u8] {
    let start = field.iter().position(|&b| b != b' ').unwrap_or(field.len());
    let rest = &field[start..];
    let end = rest
        .iter()
        .position(|&b| b == 0 || b == b' ')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn parse_octal(digits: &[u8], width: usize) -> Result<i128> {
    let mut value: i128 = 0;
    for &b in digits {
        if !(b'0'..=b'7').contains(&b) {
            return Err(TarError::invalid_header(
                0,
                format!("invalid octal digit {:?}", b as char),
            ));
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(i128::from(b - b'0')))
            .ok_or_else(|| TarError::overflow(width))?;
    }
    Ok(value)
}

/// Encode `value` as left-zero-padded octal followed by a NUL.
///
/// Fails with a range error if `value` is negative or needs more than
/// `field.len() - 1` digits.
pub fn encode_number(value: i128, field: &mut [u8]) -> Result<()> {
    let width = field.len();
    if value < 0 {
        return Err(TarError::range(value, width));
    }
    let digits = format!("{value:o}");
    let capacity = width - 1;
    if digits.len() > capacity {
        return Err(TarError::range(value, width));
    }
    let pad = capacity - digits.len();
    field[..pad].fill(b'0');
    field[pad..capacity].copy_from_slice(digits.as_bytes());
    field[capacity] = 0;
    Ok(())
}

/// Largest value [`encode_number`] accepts for a field of `width` bytes.
pub const fn max_octal(width: usize) -> u64 {
    (1u64 << (3 * (width as u32 - 1))) - 1
}

/// Encode `value` using octal when it fits, base-256 otherwise.
///
/// Negative values are written as two's complement padded with `0xFF`; large
/// positive values get a `0x80` marker byte followed by big-endian bytes.
/// The `0x40` bit of the leading byte carries the sign, so a negative value
/// keeps two bits fewer than the field width.
pub fn encode_gnu_number(value: i128, field: &mut [u8]) -> Result<()> {
    let width = field.len();
    if value >= 0 && octal_len(value) < width {
        return encode_number(value, field);
    }

    let bits = 8 * width as u32;
    if value < 0 {
        if bits <= 128 && value < -(1i128 << (bits - 2)) {
            return Err(TarError::range(value, width));
        }
        let mut v = value;
        for byte in field.iter_mut().rev() {
            *byte = (v & 0xFF) as u8;
            v >>= 8;
        }
    } else {
        let payload_bits = bits - 8;
        if payload_bits <= 127 && value >= (1i128 << payload_bits) {
            return Err(TarError::range(value, width));
        }
        let mut v = value;
        for byte in field[1..].iter_mut().rev() {
            *byte = (v & 0xFF) as u8;
            v >>= 8;
        }
        field[0] = 0x80;
    }
    Ok(())
}

fn octal_len(value: i128) -> usize {
    let mut len = 1;
    let mut v = value >> 3;
    while v > 0 {
        len += 1;
        v >>= 3;
    }
    len
}

/// Compute the header checksum: the unsigned sum of all bytes with the
/// checksum field counted as ASCII spaces.
pub fn checksum(block: &Block) -> u32 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if (CHECKSUM.offset..CHECKSUM.end()).contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(b)
            }
        })
        .sum()
}

/// Signed-byte variant of [`checksum`], produced by some historic archivers.
fn signed_checksum(block: &Block) -> i64 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if (CHECKSUM.offset..CHECKSUM.end()).contains(&i) {
                i64::from(b' ')
            } else {
                i64::from(b as i8)
            }
        })
        .sum()
}

/// Verify the stored checksum of a header block.
///
/// Returns the stored checksum on success.
pub fn verify_checksum(block: &Block) -> Result<u32> {
    let computed = checksum(block);
    let stored = decode_number::<u32>(CHECKSUM.of(block)).ok().flatten();
    match stored {
        Some(s) if s == computed || i64::from(s) == signed_checksum(block) => Ok(s),
        _ => Err(TarError::checksum(0, stored, computed)),
    }
}

/// Recompute and store the checksum. Must run after every other field is set.
pub fn set_checksum(block: &mut Block) -> u32 {
    let sum = checksum(block);
    let text = format!("{sum:06o}\0 ");
    CHECKSUM.of_mut(block).copy_from_slice(&text.as_bytes()[..CHECKSUM.len]);
    sum
}

/// Check whether a block is entirely zero.
pub fn is_zero_block(block: &Block) -> bool {
    block.iter().all(|&b| b == 0)
}
