//! Byte ↔ ASCII-hex codec. Every reply unit the core produces is a line of
//! two-digit hex pairs, optionally space separated; every incoming request
//! is such a line in the other direction.
use crate::core::ReplyLine;
use crate::error::HexError;

const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

#[inline]
fn digit_value(ch: u8) -> Result<u8, HexError> {
    match ch {
        b'0'..=b'9' => Ok(ch - b'0'),
        b'A'..=b'F' => Ok(ch - b'A' + 10),
        b'a'..=b'f' => Ok(ch - b'a' + 10),
        _ => Err(HexError::InvalidDigit),
    }
}

/// Render `bytes` as hex pairs into `out`. With `spaces` set, one space
/// separates the pairs; the trailing separator is trimmed.
pub fn to_ascii(bytes: &[u8], out: &mut ReplyLine, spaces: bool) {
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize]);
        out.push(DIGITS[(b & 0x0F) as usize]);
        if spaces {
            out.push(b' ');
        }
    }
    if spaces {
        out.trim_trailing(b' ');
    }
}

/// Parse a hex request string into `out`, skipping embedded spaces.
/// Returns the number of bytes written.
pub fn to_bytes(s: &str, out: &mut [u8]) -> Result<usize, HexError> {
    let mut high: Option<u8> = None;
    let mut len = 0;

    for &ch in s.as_bytes() {
        if ch == b' ' {
            continue;
        }
        let val = digit_value(ch)?;
        match high.take() {
            None => high = Some(val),
            Some(h) => {
                if len >= out.len() {
                    return Err(HexError::Overflow);
                }
                out[len] = (h << 4) | val;
                len += 1;
            }
        }
    }

    if high.is_some() {
        return Err(HexError::OddLength);
    }
    Ok(len)
}

/// Render a CAN identifier: three digits for 11-bit, eight for 29-bit.
pub fn can_id_to_ascii(id: u32, extended: bool, out: &mut ReplyLine) {
    let digits = if extended { 8 } else { 3 };
    for i in (0..digits).rev() {
        let nibble = ((id >> (i * 4)) & 0xF) as usize;
        out.push(DIGITS[nibble]);
    }
}
