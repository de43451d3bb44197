//! Message framer: encodes a raw payload into the wire format of one
//! protocol family (header insertion + checksum) and strips received wire
//! frames back to payload bytes.
use crate::config::{AdapterConfig, BytesProp};
use crate::core::ReplyLine;
use crate::infra::hex;

/// Message buffer capacity.
pub const MSG_CAP: usize = 255;
/// Every legacy family carries a 3-byte header.
pub const HEADER_SIZE: usize = 3;

/// Protocol family of a framed message. CAN traffic never goes through the
/// framer; its framing lives in the ISO 15765 adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MsgFamily {
    Iso9141,
    Iso14230,
    Vpw,
    Pwm,
}

impl MsgFamily {
    /// The family's default functional-addressing header.
    fn default_header(&self) -> [u8; HEADER_SIZE] {
        match self {
            MsgFamily::Iso9141 => [0x68, 0x6A, 0xF1],
            MsgFamily::Iso14230 => [0xC0, 0x33, 0xF1],
            MsgFamily::Vpw => [0x68, 0x6A, 0xF1],
            MsgFamily::Pwm => [0x61, 0x6A, 0xF1],
        }
    }
}

/// A length-bounded message exchanged with the ECU, tagged with its family
/// and the 3-byte header to frame it with. Created per exchange and dropped
/// with it; the buffer never crosses an ownership boundary.
pub struct EcuMsg {
    family: MsgFamily,
    header: [u8; HEADER_SIZE],
    len: usize,
    data: [u8; MSG_CAP],
}

impl EcuMsg {
    /// Allocate a message pre-seeded with the family default header, or the
    /// configured custom header when one is set.
    pub fn new<F: AdapterConfig>(family: MsgFamily, config: &F) -> Self {
        let mut header = family.default_header();
        let custom = config.bytes_prop(BytesProp::HeaderBytes);
        if custom.is_set() {
            let n = custom.as_slice().len().min(HEADER_SIZE);
            header[..n].copy_from_slice(&custom.as_slice()[..n]);
        }
        Self {
            family,
            header,
            len: 0,
            data: [0; MSG_CAP],
        }
    }

    #[inline]
    pub fn family(&self) -> MsgFamily {
        self.family
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Truncate or extend the valid length (bytes beyond the previous
    /// length keep whatever the buffer held).
    #[inline]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(MSG_CAP);
    }

    /// The valid message bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Mutable view over the whole buffer (receive paths write into it).
    #[inline]
    pub fn buf_mut(&mut self) -> &mut [u8; MSG_CAP] {
        &mut self.data
    }

    /// Replace the contents with `bytes`.
    pub fn set_data(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(MSG_CAP);
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.len = n;
    }

    /// Append one byte; silently dropped at capacity.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        if self.len < MSG_CAP {
            self.data[self.len] = byte;
            self.len += 1;
        }
    }

    /// Shift the payload right, write the header into the freed space and
    /// append the family checksum. ISO 14230 additionally encodes the
    /// payload length into the low 6 bits of the format byte, preserving
    /// the two addressing-mode bits.
    pub fn add_header_and_checksum(&mut self) {
        let payload_len = self.len;
        self.data.copy_within(0..payload_len, HEADER_SIZE);
        self.data[..HEADER_SIZE].copy_from_slice(&self.header);
        self.len = payload_len + HEADER_SIZE;

        if self.family == MsgFamily::Iso14230 {
            self.data[0] = (self.data[0] & 0xC0) | (payload_len as u8 & 0x3F);
        }

        let checksum = match self.family {
            MsgFamily::Iso9141 | MsgFamily::Iso14230 => iso_checksum(self.bytes()),
            MsgFamily::Vpw | MsgFamily::Pwm => j1850_checksum(self.bytes()),
        };
        self.push(checksum);
    }

    /// Remove the leading header and trailing checksum by length surgery
    /// alone. The received checksum byte is dropped, never re-verified;
    /// a malformed checksum passes through silently.
    pub fn strip_header_and_checksum(&mut self) -> bool {
        if self.len < HEADER_SIZE + 1 {
            return false;
        }
        self.len -= HEADER_SIZE;
        self.data.copy_within(HEADER_SIZE..HEADER_SIZE + self.len, 0);
        self.len -= 1; // checksum byte
        true
    }

    /// Render the message bytes into a reply line.
    pub fn to_ascii(&self, out: &mut ReplyLine, spaces: bool) {
        hex::to_ascii(self.bytes(), out, spaces);
    }
}

/// ISO 9141/14230 checksum: unsigned 8-bit sum of all preceding bytes.
pub fn iso_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// SAE J1850 CRC: 8-bit running value seeded with 0xFF, updated bit by bit
/// MSB first; the transmitted byte is the complement of the final value.
pub fn j1850_checksum(bytes: &[u8]) -> u8 {
    let mut chksum = 0xFFu8;
    for &byte in bytes {
        let mut val = byte;
        for _ in 0..8 {
            if (val ^ chksum) & 0x80 != 0 {
                chksum ^= 0x0E;
                chksum = (chksum << 1) | 1;
            } else {
                chksum <<= 1;
            }
            val <<= 1;
        }
    }
    !chksum
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
