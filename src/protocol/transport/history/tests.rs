use super::*;
use crate::protocol::transport::can_frame::CanFrame;

fn frame(id: u32, first: u8) -> CanFrame {
    CanFrame::new(id, false, 8, &[first, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07])
}

#[test]
fn can_ring_wraps_and_keeps_the_most_recent_entries() {
    let mut history = CanHistory::new();
    // One more than the ring capacity: entry 0 must be discarded.
    for i in 0..=CAN_HISTORY_LEN as u8 {
        history.add(&frame(0x7E8, i), false, 0);
    }

    assert_eq!(history.len(), CAN_HISTORY_LEN);
    assert_eq!(history.dump().count(), CAN_HISTORY_LEN);

    // Oldest retrievable entry is #1 (its first data byte is 01),
    // newest is #16 (first data byte 0x10).
    let oldest = history.dump().next().unwrap();
    assert!(oldest.as_str().contains("0101020304050607"));
    let newest = history.dump().last().unwrap();
    assert!(newest.as_str().contains("1001020304050607"));
}

#[test]
fn can_dump_renders_direction_dlc_and_slot() {
    let mut history = CanHistory::new();
    history.add(&frame(0x7DF, 0x02), true, 0);
    history.add(&frame(0x7E8, 0x06), false, 2);

    let mut lines = history.dump();
    let sent = lines.next().unwrap();
    assert!(sent.as_str().starts_with("7DF"));
    assert!(sent.as_str().contains('S'));
    assert!(sent.as_str().ends_with("-> 00"));

    let received = lines.next().unwrap();
    assert!(received.as_str().contains('R'));
    assert!(received.as_str().ends_with("-> 02"));
}

#[test]
fn serial_trail_insert_resets_and_append_wraps() {
    let mut history = SerialHistory::new();
    history.insert(&[0x68, 0x6A, 0xF1, 0x01, 0x00, 0xC4]);
    history.append(&[0x48, 0x6B, 0x10, 0x41, 0x00]);

    let first = history.dump().next().unwrap();
    // Length prefix 06, then the message bytes.
    assert!(first.as_str().starts_with("06686AF10100C4"));
    assert_eq!(history.dump().count(), 16);

    // Empty messages are never recorded.
    let before = history.dump().nth(2).unwrap();
    history.append(&[]);
    let after = history.dump().nth(2).unwrap();
    assert_eq!(before.as_str(), after.as_str());
}
