//! Shared vocabulary of the adapter core: protocol identifiers, operation
//! status codes, and the fixed-capacity reply line buffer every component
//! renders text into.

/// Maximum payload bytes of an incoming OBD request (SAE J1979 data bytes).
pub const OBD_IN_MSG_DLEN: usize = 7;
/// Maximum wire length of an OBD message: 7 data + 4 header + 1 reserved.
pub const OBD_IN_MSG_LEN: usize = OBD_IN_MSG_DLEN + 5;

/// Capacity of one rendered reply line. A worst-case K-line reply
/// (18 bytes, spaced) plus a CAN history row both fit with margin.
pub const REPLY_LINE_CAP: usize = 96;

/// The wire protocols the adapter can negotiate, in their user-visible
/// numbering (0 = automatic selection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    Auto,
    J1850Pwm,
    J1850Vpw,
    Iso9141,
    /// ISO 14230 negotiated over the 5-baud (slow) init.
    Iso14230Slow,
    /// ISO 14230 negotiated over the fast init.
    Iso14230,
    /// ISO 15765 on 11-bit identifiers at 500 kbit/s.
    IsoCan11,
    /// ISO 15765 on 29-bit identifiers at 500 kbit/s.
    IsoCan29,
}

impl Protocol {
    /// Resolve a user-supplied protocol number.
    pub fn from_number(num: u8) -> Option<Self> {
        Some(match num {
            0 => Protocol::Auto,
            1 => Protocol::J1850Pwm,
            2 => Protocol::J1850Vpw,
            3 => Protocol::Iso9141,
            4 => Protocol::Iso14230Slow,
            5 => Protocol::Iso14230,
            6 => Protocol::IsoCan11,
            7 => Protocol::IsoCan29,
            _ => return None,
        })
    }

    /// User-visible protocol number (the "ATDPN" digit).
    pub fn number(&self) -> u8 {
        match self {
            Protocol::Auto => 0,
            Protocol::J1850Pwm => 1,
            Protocol::J1850Vpw => 2,
            Protocol::Iso9141 => 3,
            Protocol::Iso14230Slow => 4,
            Protocol::Iso14230 => 5,
            Protocol::IsoCan11 => 6,
            Protocol::IsoCan29 => 7,
        }
    }

    /// Whether the protocol runs on the K-line serial adapter.
    pub fn is_kline(&self) -> bool {
        matches!(
            self,
            Protocol::Iso9141 | Protocol::Iso14230Slow | Protocol::Iso14230
        )
    }
}

/// The adapter state machines the registry owns, one instance each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdapterKind {
    Auto,
    Pwm,
    Vpw,
    IsoSerial,
    Can11,
    Can29,
}

/// Status of one completed protocol operation. Exactly one per exchange;
/// the coordinator renders each into at most one fixed reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    /// Operation completed, nothing further to report.
    Ok,
    /// Malformed or oversized request, never reached the transport.
    CmdRejected,
    /// Malformed or undersized reply, or a checksum-strip failure.
    DataError,
    /// Clean timeout, no reply at all.
    NoData,
    /// A reply arrived but could not be interpreted.
    Error,
    /// Every auto-detect candidate was exhausted.
    UnableToConnect,
    /// Arbitration loss or busy bus detected before the send completed.
    BusBusy,
    /// Timing violation while receiving.
    BusError,
    /// Loopback/echo verification failed during low-level init.
    WiringError,
    /// The adapter already emitted its own reply lines.
    None,
}

impl Reply {
    /// The fixed user-visible line for this status, if it produces one.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Reply::Ok | Reply::None => None,
            Reply::CmdRejected => Some("?"),
            Reply::DataError => Some("DATA ERROR"),
            Reply::NoData => Some("NO DATA"),
            Reply::Error => Some("ERROR"),
            Reply::UnableToConnect => Some("UNABLE TO CONNECT"),
            Reply::BusBusy => Some("BUS BUSY"),
            Reply::BusError => Some("BUS ERROR"),
            Reply::WiringError => Some("FB ERROR"),
        }
    }
}

/// One reply line under construction: a fixed ASCII buffer with a length,
/// so no allocation happens on the render path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLine {
    len: usize,
    data: [u8; REPLY_LINE_CAP],
}

impl Default for ReplyLine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyLine {
    /// Create an empty line.
    pub const fn new() -> Self {
        Self {
            len: 0,
            data: [0; REPLY_LINE_CAP],
        }
    }

    /// Number of characters stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks whether the line is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reset the line.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append a single ASCII character; silently drops past capacity.
    #[inline]
    pub fn push(&mut self, ch: u8) {
        if self.len < REPLY_LINE_CAP {
            self.data[self.len] = ch;
            self.len += 1;
        }
    }

    /// Append a string slice, clamped to the remaining capacity.
    pub fn push_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.push(b);
        }
    }

    /// Pad with spaces up to column `n` (no-op when already past it).
    pub fn pad_to(&mut self, n: usize) {
        while self.len < n.min(REPLY_LINE_CAP) {
            self.data[self.len] = b' ';
            self.len += 1;
        }
    }

    /// Drop the trailing character when it equals `ch`.
    pub fn trim_trailing(&mut self, ch: u8) {
        if self.len > 0 && self.data[self.len - 1] == ch {
            self.len -= 1;
        }
    }

    /// View as a string slice. The buffer only ever holds ASCII.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.data[..self.len]).unwrap_or("")
    }
}
