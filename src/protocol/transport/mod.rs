//! Transport layer: the CAN frame value object, the diagnostic history
//! rings, the collaborator traits, and the timing tables of the buses.
//!
//! ## Timing constants
//!
//! The millisecond windows come from ISO 9141 / ISO 14230 (P1–P4 between
//! bytes and messages, W1–W4 during init); the microsecond tables are the
//! SAE J1850 symbol widths. All values match in-field adapter practice
//! rather than the loosest values the standards would permit.

pub mod can_frame;
pub mod history;
pub mod traits;

/// ISO 9141/14230 K-line baud rate.
pub const ECU_SPEED: u32 = 10_400;

/// ISO 9141/14230 millisecond windows.
pub mod iso {
    /// P1 max: inter-byte gap inside an ECU reply.
    pub const P1_MAX_TIMEOUT: u32 = 20;
    /// P2 max: request-to-reply / reply-to-reply window.
    pub const P2_MAX_TIMEOUT: u32 = 50;
    /// P3 min: spacing between consecutive tester requests.
    pub const P3_MIN_TIMEOUT: u32 = 55;
    /// P4: tester inter-byte delay while transmitting.
    pub const P4_TIMEOUT: u32 = 7;
    /// W1 max: wait for the synchronization pattern after slow init.
    pub const W1_MAX_TIMEOUT: u32 = 300;
    /// W3: gap between the sync reply bytes.
    pub const W3_TIMEOUT: u32 = 20;
    /// W4: pause before echoing the inverted keyword byte.
    pub const W4_TIMEOUT: u32 = 33;
    /// W4 max: wait for the inverted-address acknowledgment.
    pub const W4_MAX_TIMEOUT: u32 = 50;
    /// Slow init bit interval: 5 bit/s.
    pub const SLOW_INIT_BIT_MS: u32 = 200;
    /// Fast init wake-up pulse halves (TWuP).
    pub const FAST_INIT_PULSE_MS: u32 = 25;
    /// Default keep-alive period when no wakeup interval is configured.
    pub const DEFAULT_WAKEUP_TIME: u32 = 3000;
}

/// SAE J1850 shared limits and the VPW/PWM symbol tables (µs unless noted).
pub mod j1850 {
    /// P2 for both J1850 encodings, in ms.
    pub const P2_J1850: u32 = 100;
    /// Minimum valid OBD frame: 3 header + 1 data + 1 checksum.
    pub const OBD2_BYTES_MIN: usize = 5;
    /// Maximum valid OBD frame: 3 header + 7 data + 1 checksum.
    pub const OBD2_BYTES_MAX: usize = 11;

    // VPW transmit widths.
    pub const TV1_TX_NOM: u32 = 64;
    pub const TV2_TX_NOM: u32 = 128;
    pub const TV3_TX_NOM: u32 = 200;
    pub const TV4_TX_MIN: u32 = 261;
    pub const TV5_TX_NOM: u32 = 300;
    pub const TV6_TX_NOM: u32 = 300;

    // VPW receive classification.
    pub const TV1_RX_MIN: u32 = 34;
    pub const TV2_RX_MAX: u32 = 163;
    pub const TV3_RX_MIN: u32 = 163;
    pub const TV3_RX_MAX: u32 = 239;
    /// Midpoint separating a short half ("1") from a long half ("0").
    pub const VPW_RX_MID: u32 = 96;

    // PWM transmit widths.
    pub const TP1_TX_NOM: u32 = 8;
    pub const TP2_TX_NOM: u32 = 16;
    pub const TP3_TX_NOM: u32 = 24;
    pub const TP4_TX_NOM: u32 = 48;
    pub const TP5_TX_MIN: u32 = 70;
    pub const TP6_TX_NOM: u32 = 96;
    pub const TP7_TX_NOM: u32 = 32;
    pub const TP9_TX_NOM: u32 = 120;

    // PWM receive classification (falling edge to falling edge).
    pub const TP2_RX_MIN: u32 = 12;
    pub const TP2_RX_MAX: u32 = 19;
    pub const TP3_RX_MAX: u32 = 27;
    pub const TP4_RX_MAX: u32 = 63;
    pub const TP7_RX_MIN: u32 = 30;
    pub const TP7_RX_MAX: u32 = 35;
}

/// ISO 15765 millisecond windows.
pub mod can {
    /// P2 max for CAN diagnostics.
    pub const CAN_P2_MAX_TIMEOUT: u32 = 50;
}
