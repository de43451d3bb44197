//! Read-only view of the adapter settings store. The command layer owns the
//! storage and its persistence; the protocol core only ever reads through
//! this trait, keyed by the typed property enums below.

/// Small byte-array property value (custom header, wakeup message,
/// CAN filter/mask). Empty (`length == 0`) means "not configured".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteArray {
    pub data: [u8; ByteArray::CAP],
    pub length: u8,
}

impl ByteArray {
    pub const CAP: usize = 7;

    /// An unset property value.
    pub const fn empty() -> Self {
        Self {
            data: [0; Self::CAP],
            length: 0,
        }
    }

    /// Build from a slice, clamped to capacity.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut value = Self::empty();
        let n = bytes.len().min(Self::CAP);
        value.data[..n].copy_from_slice(&bytes[..n]);
        value.length = n as u8;
        value
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.length != 0
    }

    /// The populated bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.length as usize]
    }
}

impl Default for ByteArray {
    fn default() -> Self {
        Self::empty()
    }
}

/// Boolean options the core consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolProp {
    /// Raise the K-line receive cap beyond the OBD standard length.
    AllowLong,
    /// Show the DLC digit in CAN reply lines (with `HeaderShow`).
    CanDlc,
    /// Keep header and checksum bytes in rendered replies.
    HeaderShow,
    /// Validate ISO keyword bytes during init.
    KwCheck,
    /// Separate rendered byte pairs with spaces.
    Spaces,
    /// Fall back to auto-detection when a pinned connect fails.
    UseAutoSp,
}

/// Integer options (zero means "use the protocol default").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntProp {
    /// Priority byte folded into custom 29-bit CAN identifiers.
    CanPriority,
    /// ISO slow-init address byte (default 0x33).
    IsoInitAddress,
    /// Override of the per-exchange P2 timeout, in milliseconds.
    Timeout,
    /// Keep-alive period in 20 ms units.
    WakeupVal,
}

/// Byte-array options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesProp {
    /// Custom 3-byte message header / CAN id bytes.
    HeaderBytes,
    /// Custom K-line wakeup (keep-alive) message.
    WakeupMessage,
    /// Custom CAN acceptance filter (4 bytes).
    CanFilter,
    /// Custom CAN acceptance mask (4 bytes).
    CanMask,
}

/// Contract to read adapter settings.
pub trait AdapterConfig {
    fn bool_prop(&self, prop: BoolProp) -> bool;
    fn int_prop(&self, prop: IntProp) -> u32;
    fn bytes_prop(&self, prop: BytesProp) -> ByteArray;
}
