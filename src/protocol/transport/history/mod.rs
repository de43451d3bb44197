//! Bounded diagnostic history rings. One trail records the raw serial
//! (K-line / J1850) exchanges, one records CAN traffic. Both exist purely
//! for the buffer-dump command; protocol logic never reads them back.
use crate::core::ReplyLine;
use crate::infra::hex;
use crate::protocol::transport::can_frame::CanFrame;

const SERIAL_TRAIL_LEN: usize = 256;
const SERIAL_ITEM_LEN: usize = 16;

/// Serial exchange trail: fixed 16-byte slots, each a length prefix plus
/// up to 15 message bytes, silently wrapping at capacity.
pub struct SerialHistory {
    buf: [u8; SERIAL_TRAIL_LEN],
    pos: usize,
}

impl Default for SerialHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialHistory {
    pub const fn new() -> Self {
        Self {
            buf: [0; SERIAL_TRAIL_LEN],
            pos: 0,
        }
    }

    /// Start a new trail with `bytes` as its first record.
    pub fn insert(&mut self, bytes: &[u8]) {
        self.pos = 0;
        self.buf = [0; SERIAL_TRAIL_LEN];
        self.append(bytes);
    }

    /// Append one record; empty messages are not recorded.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if self.pos + SERIAL_ITEM_LEN > SERIAL_TRAIL_LEN {
            self.pos = 0;
        }
        let n = bytes.len().min(SERIAL_ITEM_LEN - 1);
        self.buf[self.pos] = bytes.len() as u8;
        self.buf[self.pos + 1..self.pos + 1 + n].copy_from_slice(&bytes[..n]);
        self.pos += SERIAL_ITEM_LEN;
    }

    /// Render the trail, one line per 16-byte slot.
    pub fn dump(&self) -> impl Iterator<Item = ReplyLine> + '_ {
        self.buf.chunks_exact(SERIAL_ITEM_LEN).map(|item| {
            let mut line = ReplyLine::new();
            hex::to_ascii(item, &mut line, false);
            line
        })
    }
}

const CAN_HISTORY_LEN: usize = 16;

/// One recorded CAN exchange.
#[derive(Clone, Copy)]
struct CanHistoryEntry {
    id: u32,
    sent: bool,
    extended: bool,
    dlc: u8,
    data: [u8; 8],
    slot: u8,
}

impl CanHistoryEntry {
    const fn blank() -> Self {
        Self {
            id: 0,
            sent: false,
            extended: false,
            dlc: 0,
            data: [0; 8],
            slot: 0,
        }
    }
}

/// CAN message log: a fixed ring where the oldest entries are silently
/// overwritten once the ring wraps.
pub struct CanHistory {
    entries: [CanHistoryEntry; CAN_HISTORY_LEN],
    pos: usize,
    total: usize,
}

impl Default for CanHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl CanHistory {
    pub const fn new() -> Self {
        Self {
            entries: [CanHistoryEntry::blank(); CAN_HISTORY_LEN],
            pos: 0,
            total: 0,
        }
    }

    /// Record one frame. `sent` is the direction; `slot` identifies the
    /// hardware receive buffer for received frames.
    pub fn add(&mut self, frame: &CanFrame, sent: bool, slot: u8) {
        self.entries[self.pos] = CanHistoryEntry {
            id: frame.raw_id(),
            sent,
            extended: frame.is_extended(),
            dlc: frame.dlc,
            data: frame.data,
            slot,
        };
        self.pos += 1;
        if self.pos >= CAN_HISTORY_LEN {
            self.pos = 0;
        }
        self.total += 1;
    }

    /// Number of retrievable entries (at most the ring capacity).
    pub fn len(&self) -> usize {
        self.total.min(CAN_HISTORY_LEN)
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Render the log oldest-first: identifier, direction, DLC, the eight
    /// data bytes, and the receive slot.
    pub fn dump(&self) -> impl Iterator<Item = ReplyLine> + '_ {
        let count = self.len();
        let start = if self.total <= CAN_HISTORY_LEN {
            0
        } else {
            self.pos
        };
        // Column of the direction flag depends on the widest id recorded.
        let id_col = if self.iter(start, count).any(|e| e.extended) {
            10
        } else {
            5
        };
        self.iter(start, count).map(move |entry| {
            let mut line = ReplyLine::new();
            hex::can_id_to_ascii(entry.id, entry.extended, &mut line);
            line.pad_to(id_col);
            line.push(if entry.sent { b'S' } else { b'R' });
            line.pad_to(id_col + 3);
            line.push(b'0' + entry.dlc);
            line.pad_to(id_col + 6);
            hex::to_ascii(&entry.data, &mut line, false);
            line.push_str("  -> ");
            hex::to_ascii(&[entry.slot], &mut line, false);
            line
        })
    }

    fn iter(&self, start: usize, count: usize) -> impl Iterator<Item = &CanHistoryEntry> + '_ {
        (0..count).map(move |i| &self.entries[(start + i) % CAN_HISTORY_LEN])
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
