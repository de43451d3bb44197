//! Auto-detect cascade scenarios: every candidate is probed in the fixed
//! order until one answers, and a pinned protocol falls back to the
//! cascade when the automatic-fallback option is set.

mod helpers;

use helpers::{MockCanBus, MockPulseBus, MockSerialBus, MockTimer, RecordingSink, TestConfig};
use obd_proto::core::Protocol;
use obd_proto::protocol::session::ObdProfile;
use obd_proto::protocol::transport::can_frame::CanFrame;

#[tokio::test(start_paused = true)]
async fn cascade_falls_through_to_can() {
    let (serial, _serial_host) = MockSerialBus::create_pair();
    let (can, mut host) = MockCanBus::create_pair();
    let pulse = MockPulseBus::new();
    let config = TestConfig::default();

    let mut profile = ObdProfile::new(serial, can, pulse.clone(), MockTimer::new());

    let ecu = tokio::spawn(async move {
        let probe = host.recv().await;
        assert_eq!(probe.raw_id(), 0x7DF);
        host.send(CanFrame::new(
            0x7E8,
            false,
            8,
            &[0x06, 0x41, 0x00, 0xBE, 0x3E, 0xB8, 0x11, 0x55],
        ));
        host
    });

    let mut sink = RecordingSink::default();
    profile
        .on_request("0100", &config, &mut sink)
        .await
        .expect("request must succeed");
    let host = ecu.await.expect("ECU task must finish");

    // PWM first, VPW second; both gave up before CAN answered.
    assert_eq!(pulse.state().opened, [false, true]);
    assert_eq!(*host.filter.lock().unwrap(), Some((0x7E8, 0x7F8, false)));

    assert_eq!(sink.lines, ["064100BE3EB81155"]);
    assert_eq!(profile.protocol(), Protocol::IsoCan11);
    assert!(profile.is_connected());

    let mut num = RecordingSink::default();
    profile.description_num(&config, &mut num);
    assert_eq!(num.lines, ["6"]);
}

#[tokio::test(start_paused = true)]
async fn pinned_protocol_falls_back_when_auto_sp_is_set() {
    let (serial, _serial_host) = MockSerialBus::create_pair();
    let (can, mut host) = MockCanBus::create_pair();
    let pulse = MockPulseBus::new();
    let config = TestConfig {
        use_auto_sp: true,
        ..TestConfig::default()
    };

    let mut profile = ObdProfile::new(serial, can, pulse, MockTimer::new());
    profile
        .set_protocol(Protocol::J1850Pwm, true, &config)
        .expect("protocol selection must succeed");

    let ecu = tokio::spawn(async move {
        let probe = host.recv().await;
        assert_eq!(probe.raw_id(), 0x7DF);
        host.send(CanFrame::new(
            0x7E8,
            false,
            8,
            &[0x06, 0x41, 0x00, 0xBE, 0x3E, 0xB8, 0x11, 0x55],
        ));
        host
    });

    let mut sink = RecordingSink::default();
    profile
        .on_request("0100", &config, &mut sink)
        .await
        .expect("request must succeed");
    let _host = ecu.await.expect("ECU task must finish");

    assert_eq!(sink.lines, ["064100BE3EB81155"]);
    assert_eq!(profile.protocol(), Protocol::IsoCan11);

    // The adopted protocol reports the automatic-fallback prefix.
    let mut num = RecordingSink::default();
    profile.description_num(&config, &mut num);
    assert_eq!(num.lines, ["A6"]);

    let mut description = RecordingSink::default();
    profile.description(&config, &mut description);
    assert_eq!(description.lines, ["AUTO, ISO 15765-4 (CAN 11/500)"]);
}
