//! Session coordinator scenarios that stop short of the bus: request
//! validation, the exhausted-connect status, and the protocol description
//! lines.

mod helpers;

use helpers::{MockCanBus, MockPulseBus, MockSerialBus, MockTimer, RecordingSink, TestConfig};
use obd_proto::core::Protocol;
use obd_proto::protocol::session::ObdProfile;

#[tokio::test(start_paused = true)]
async fn malformed_requests_never_reach_the_bus() {
    let (serial, _serial_host) = MockSerialBus::create_pair();
    let (can, mut can_host) = MockCanBus::create_pair();
    let pulse = MockPulseBus::new();
    let config = TestConfig::default();

    let mut profile = ObdProfile::new(serial, can, pulse.clone(), MockTimer::new());
    let mut sink = RecordingSink::default();

    // Odd digit count, a non-hex digit, an oversized command, an empty
    // one, and a payload past the OBD limit.
    for cmd in [
        "01000",
        "01ZZ",
        "01010101010101010101010101",
        "",
        "0102030405060708",
    ] {
        profile
            .on_request(cmd, &config, &mut sink)
            .await
            .expect("request must succeed");
    }

    assert_eq!(sink.lines, ["?", "?", "?", "?", "?"]);
    assert!(pulse.state().opened.is_empty());
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(1), can_host.recv())
            .await
            .is_err(),
        "no frame may reach the CAN bus"
    );
}

#[tokio::test(start_paused = true)]
async fn kline_selection_allows_one_extra_payload_byte() {
    let (serial, _serial_host) = MockSerialBus::create_pair();
    let (can, _can_host) = MockCanBus::create_pair();
    let pulse = MockPulseBus::new();
    let config = TestConfig::default();

    let mut profile = ObdProfile::new(serial, can, pulse, MockTimer::new());
    profile
        .set_protocol(Protocol::Iso9141, true, &config)
        .expect("protocol selection must succeed");

    // Eight payload bytes pass the K-line length check, so the request
    // proceeds to a connect attempt, which exhausts against silence. The
    // status lands on the open init-progress line.
    let mut sink = RecordingSink::default();
    profile
        .on_request("0102030405060708", &config, &mut sink)
        .await
        .expect("request must succeed");
    assert_eq!(sink.lines, ["BUSINIT: .UNABLE TO CONNECT"]);

    // Nine are rejected outright.
    let mut sink = RecordingSink::default();
    profile
        .on_request("010203040506070809", &config, &mut sink)
        .await
        .expect("request must succeed");
    assert_eq!(sink.lines, ["?"]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_cascade_reports_unable_to_connect() {
    let (serial, _serial_host) = MockSerialBus::create_pair();
    let (can, _can_host) = MockCanBus::create_pair();
    let pulse = MockPulseBus::new();
    let config = TestConfig::default();

    let mut profile = ObdProfile::new(serial, can, pulse, MockTimer::new());

    let mut sink = RecordingSink::default();
    profile
        .on_request("0100", &config, &mut sink)
        .await
        .expect("request must succeed");

    assert_eq!(sink.lines, ["UNABLE TO CONNECT"]);
    assert!(!profile.is_connected());
    assert_eq!(profile.protocol(), Protocol::Auto);
}

#[tokio::test]
async fn descriptions_follow_the_active_selection() {
    let (serial, _serial_host) = MockSerialBus::create_pair();
    let (can, _can_host) = MockCanBus::create_pair();
    let pulse = MockPulseBus::new();
    let config = TestConfig::default();

    let mut profile = ObdProfile::new(serial, can, pulse, MockTimer::new());

    let mut sink = RecordingSink::default();
    profile.description(&config, &mut sink);
    profile.description_num(&config, &mut sink);
    assert_eq!(sink.lines, ["AUTO", "0"]);

    profile
        .set_protocol(Protocol::IsoCan29, true, &config)
        .expect("protocol selection must succeed");
    let mut sink = RecordingSink::default();
    profile.description(&config, &mut sink);
    profile.description_num(&config, &mut sink);
    assert_eq!(sink.lines, ["ISO 15765-4 (CAN 29/500)", "7"]);

    profile
        .set_protocol(Protocol::J1850Vpw, true, &config)
        .expect("protocol selection must succeed");
    let mut sink = RecordingSink::default();
    profile.description(&config, &mut sink);
    profile.description_num(&config, &mut sink);
    assert_eq!(sink.lines, ["SAE J1850 VPW", "2"]);
}
