//! In-memory representation of one classic CAN frame as the adapter
//! exchanges it with the controller.
use embedded_can::{ExtendedId, Id, StandardId};

/// Pad byte for unused data positions.
pub const CAN_PAD_BYTE: u8 = 0x55;

/// Raw CAN frame. The identifier is a typed [`embedded_can::Id`], so an
/// 11-bit value can never masquerade as a 29-bit one. Data bytes beyond
/// `dlc` hold the pad byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanFrame {
    /// Standard (11-bit) or extended (29-bit) identifier.
    pub id: Id,
    /// Payload buffer. Classic frames always provide eight bytes.
    pub data: [u8; 8],
    /// Number of valid payload bytes (0 to 8).
    pub dlc: u8,
    /// Hardware receive slot that produced the frame (0 on transmit).
    pub slot: u8,
}

impl CanFrame {
    /// Build a frame from a raw identifier, padding the data beyond `bytes`.
    pub fn new(raw_id: u32, extended: bool, dlc: u8, bytes: &[u8]) -> Self {
        let id = if extended {
            Id::Extended(ExtendedId::new(raw_id & ExtendedId::MAX.as_raw()).unwrap_or(ExtendedId::ZERO))
        } else {
            Id::Standard(
                StandardId::new((raw_id & StandardId::MAX.as_raw() as u32) as u16)
                    .unwrap_or(StandardId::ZERO),
            )
        };
        let mut data = [CAN_PAD_BYTE; 8];
        let n = bytes.len().min(8);
        data[..n].copy_from_slice(&bytes[..n]);
        Self {
            id,
            data,
            dlc: dlc.min(8),
            slot: 0,
        }
    }

    /// The identifier as a plain integer (11 or 29 significant bits).
    pub fn raw_id(&self) -> u32 {
        match self.id {
            Id::Standard(id) => id.as_raw() as u32,
            Id::Extended(id) => id.as_raw(),
        }
    }

    /// Whether the frame carries a 29-bit identifier.
    pub fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }
}
