//! J1850 integration scenarios against the scripted pulse engine: VPW
//! symbol decoding with the reply filter, and the PWM exchange with its
//! in-frame response handshake.

mod helpers;

use helpers::{MockCanBus, MockPulseBus, MockSerialBus, MockTimer, RecordingSink, TestConfig};
use obd_proto::core::Protocol;
use obd_proto::protocol::framing::j1850_checksum;
use obd_proto::protocol::session::ObdProfile;

#[tokio::test(start_paused = true)]
async fn vpw_probe_decodes_a_filtered_reply() {
    let (serial, _serial_host) = MockSerialBus::create_pair();
    let (can, _can_host) = MockCanBus::create_pair();
    let pulse = MockPulseBus::new();
    let config = TestConfig::default();

    // Reply to the 68 6A F1 01 00 probe: second byte 0x6B passes the
    // filter.
    let mut reply = vec![0x48, 0x6B, 0x10, 0x41, 0x00, 0xBE, 0x3E, 0xB8, 0x11];
    reply.push(j1850_checksum(&reply));
    pulse.script_vpw_frame(&reply);

    let mut profile = ObdProfile::new(serial, can, pulse.clone(), MockTimer::new());
    profile
        .set_protocol(Protocol::J1850Vpw, true, &config)
        .expect("protocol selection must succeed");

    let mut sink = RecordingSink::default();
    profile
        .on_request("0100", &config, &mut sink)
        .await
        .expect("request must succeed");

    assert_eq!(sink.lines, ["4100BE3EB811"]);
    assert_eq!(profile.protocol(), Protocol::J1850Vpw);
    assert!(profile.is_connected());
    assert_eq!(pulse.state().opened, [true, true]);
}

#[tokio::test(start_paused = true)]
async fn vpw_ignores_replies_for_other_requests() {
    let (serial, _serial_host) = MockSerialBus::create_pair();
    let (can, _can_host) = MockCanBus::create_pair();
    let pulse = MockPulseBus::new();
    let config = TestConfig::default();

    // Second byte 0x6C does not match the expected 0x6B.
    let mut stray = vec![0x48, 0x6C, 0x10, 0x41, 0x00, 0xBE, 0x3E, 0xB8, 0x11];
    stray.push(j1850_checksum(&stray));
    pulse.script_vpw_frame(&stray);

    let mut profile = ObdProfile::new(serial, can, pulse, MockTimer::new());
    profile
        .set_protocol(Protocol::J1850Vpw, true, &config)
        .expect("protocol selection must succeed");

    let mut sink = RecordingSink::default();
    profile
        .on_request("0100", &config, &mut sink)
        .await
        .expect("request must succeed");

    // The stray frame was dropped and the connect attempt exhausted.
    assert_eq!(sink.lines, ["UNABLE TO CONNECT"]);
    assert!(!profile.is_connected());
}

#[tokio::test(start_paused = true)]
async fn pwm_exchange_acknowledges_with_an_ifr() {
    let (serial, _serial_host) = MockSerialBus::create_pair();
    let (can, _can_host) = MockCanBus::create_pair();
    let pulse = MockPulseBus::new();
    let config = TestConfig::default();

    // The receiving node acknowledges our frame, then answers it.
    pulse.script_pwm_ifr(0xF1);
    let mut reply = vec![0x41, 0x6B, 0x10, 0x41, 0x00, 0xBE, 0x3E, 0xB8, 0x11];
    reply.push(j1850_checksum(&reply));
    pulse.script_pwm_frame(&reply);

    let mut profile = ObdProfile::new(serial, can, pulse.clone(), MockTimer::new());
    profile
        .set_protocol(Protocol::J1850Pwm, true, &config)
        .expect("protocol selection must succeed");

    let mut sink = RecordingSink::default();
    profile
        .on_request("0100", &config, &mut sink)
        .await
        .expect("request must succeed");

    assert_eq!(sink.lines, ["4100BE3EB811"]);
    assert_eq!(profile.protocol(), Protocol::J1850Pwm);
    assert!(profile.is_connected());

    // Our own in-frame response went out after the reply: a short active
    // pulse per "1" bit of 0xF1.
    let pairs = pulse.state().sent_pairs.clone();
    let ifr = &pairs[pairs.len() - 8..];
    assert_eq!(
        ifr.iter().map(|&(active, _)| active).collect::<Vec<_>>(),
        [8, 8, 8, 8, 16, 16, 16, 8]
    );
}
