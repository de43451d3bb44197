use super::*;
use crate::config::{AdapterConfig, BoolProp, ByteArray, BytesProp, IntProp};
use crate::core::ReplyLine;

/// Config stub: everything off unless a custom header is provided.
struct TestConfig {
    header: ByteArray,
}

impl TestConfig {
    fn new() -> Self {
        Self {
            header: ByteArray::empty(),
        }
    }

    fn with_header(bytes: &[u8]) -> Self {
        Self {
            header: ByteArray::from_slice(bytes),
        }
    }
}

impl AdapterConfig for TestConfig {
    fn bool_prop(&self, _prop: BoolProp) -> bool {
        false
    }
    fn int_prop(&self, _prop: IntProp) -> u32 {
        0
    }
    fn bytes_prop(&self, prop: BytesProp) -> ByteArray {
        match prop {
            BytesProp::HeaderBytes => self.header,
            _ => ByteArray::empty(),
        }
    }
}

#[test]
fn iso9141_frame_carries_sum_checksum() {
    let cfg = TestConfig::new();
    let mut msg = EcuMsg::new(MsgFamily::Iso9141, &cfg);
    msg.set_data(&[0x01, 0x00]);
    msg.add_header_and_checksum();

    // 68 6A F1 01 00 sums to 0xC4.
    assert_eq!(msg.bytes(), &[0x68, 0x6A, 0xF1, 0x01, 0x00, 0xC4]);
}

#[test]
fn j1850_crc_matches_known_vector() {
    // Running the SAE J1850 bit-serial CRC over 68 6A F1 01 00 yields 0x17.
    assert_eq!(j1850_checksum(&[0x68, 0x6A, 0xF1, 0x01, 0x00]), 0x17);

    let cfg = TestConfig::new();
    let mut msg = EcuMsg::new(MsgFamily::Vpw, &cfg);
    msg.set_data(&[0x01, 0x00]);
    msg.add_header_and_checksum();
    assert_eq!(msg.bytes(), &[0x68, 0x6A, 0xF1, 0x01, 0x00, 0x17]);
}

#[test]
fn iso14230_encodes_payload_length_in_format_byte() {
    let cfg = TestConfig::new();
    for len in 1..=10usize {
        let payload = [0x3E; 10];
        let mut msg = EcuMsg::new(MsgFamily::Iso14230, &cfg);
        msg.set_data(&payload[..len]);
        msg.add_header_and_checksum();

        // Top two bits come from the default header 0xC0; the low six
        // bits carry the payload length.
        assert_eq!(msg.bytes()[0], 0xC0 | len as u8);
        assert_eq!(msg.len(), len + 4);
    }
}

#[test]
fn strip_round_trips_every_family() {
    let cfg = TestConfig::new();
    let payload = [0x41, 0x00, 0xBE, 0x1F, 0xB8, 0x13];
    for family in [
        MsgFamily::Iso9141,
        MsgFamily::Iso14230,
        MsgFamily::Vpw,
        MsgFamily::Pwm,
    ] {
        let mut msg = EcuMsg::new(family, &cfg);
        msg.set_data(&payload);
        msg.add_header_and_checksum();
        assert!(msg.strip_header_and_checksum());
        assert_eq!(msg.bytes(), &payload);
    }
}

#[test]
fn strip_never_verifies_the_received_checksum() {
    let cfg = TestConfig::new();
    let mut msg = EcuMsg::new(MsgFamily::Iso9141, &cfg);
    // Deliberately corrupt checksum byte: strip still succeeds.
    msg.set_data(&[0x48, 0x6B, 0x10, 0x41, 0x00, 0xEE]);
    assert!(msg.strip_header_and_checksum());
    assert_eq!(msg.bytes(), &[0x41, 0x00]);
}

#[test]
fn custom_header_overrides_the_family_default() {
    let cfg = TestConfig::with_header(&[0x81, 0x10, 0xF0]);
    let mut msg = EcuMsg::new(MsgFamily::Iso9141, &cfg);
    msg.set_data(&[0x3E]);
    msg.add_header_and_checksum();
    assert_eq!(&msg.bytes()[..3], &[0x81, 0x10, 0xF0]);
}

#[test]
fn renders_with_and_without_spaces() {
    let cfg = TestConfig::new();
    let mut msg = EcuMsg::new(MsgFamily::Iso9141, &cfg);
    msg.set_data(&[0x41, 0x00]);

    let mut line = ReplyLine::new();
    msg.to_ascii(&mut line, false);
    assert_eq!(line.as_str(), "4100");

    line.clear();
    msg.to_ascii(&mut line, true);
    assert_eq!(line.as_str(), "41 00");
}
