/// Test doubles simulating the K-line transceiver, the CAN controller, the
/// J1850 pulse engine, and the timer during integration tests.
use obd_proto::config::{AdapterConfig, BoolProp, ByteArray, BytesProp, IntProp};
use obd_proto::protocol::transport::can_frame::CanFrame;
use obd_proto::protocol::transport::traits::{
    can_bus::CanBus, obd_timer::ObdTimer, pulse_bus::PulseBus, reply_sink::ReplySink,
    serial_bus::SerialBus,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};

#[allow(dead_code)]
/// Timer driven by the tokio clock; tests run with the clock paused so the
/// protocol's long waits elapse in virtual time.
pub struct MockTimer {
    start: Instant,
}

#[allow(dead_code)]
impl MockTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl ObdTimer for MockTimer {
    async fn delay_ms(&mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }

    async fn delay_us(&mut self, micros: u32) {
        sleep(Duration::from_micros(micros as u64)).await;
    }

    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[allow(dead_code)]
/// In-memory K-line reproducing the `SerialBus` behavior. The driven level
/// loops straight back, like the single-wire bus it stands in for.
pub struct MockSerialBus {
    tx: mpsc::UnboundedSender<u8>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<u8>>>,
    line: Arc<Mutex<bool>>,
}

#[allow(dead_code)]
/// ECU side of a [`MockSerialBus`] pair.
pub struct SerialHost {
    tx: mpsc::UnboundedSender<u8>,
    rx: mpsc::UnboundedReceiver<u8>,
}

#[allow(dead_code)]
impl MockSerialBus {
    /// Construct a pair of interconnected endpoints (DUT and host).
    pub fn create_pair() -> (Self, SerialHost) {
        let (dut_tx, host_rx) = mpsc::unbounded_channel();
        let (host_tx, dut_rx) = mpsc::unbounded_channel();

        let dut = Self {
            tx: dut_tx,
            rx: Arc::new(tokio::sync::Mutex::new(dut_rx)),
            line: Arc::new(Mutex::new(true)),
        };
        let host = SerialHost {
            tx: host_tx,
            rx: host_rx,
        };

        (dut, host)
    }
}

impl SerialBus for MockSerialBus {
    type Error = ();

    async fn send(&mut self, byte: u8) -> Result<bool, Self::Error> {
        self.tx.send(byte).map_err(|_| ())?;
        Ok(true)
    }

    async fn recv(&mut self) -> Result<u8, Self::Error> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(())
    }

    fn set_bit_bang(&mut self, _enable: bool) {}

    fn set_bit(&mut self, level: bool) {
        *self.line.lock().unwrap() = level;
    }

    fn get_bit(&self) -> bool {
        *self.line.lock().unwrap()
    }

    fn clear(&mut self) {
        if let Ok(mut rx) = self.rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }
}

#[allow(dead_code)]
impl SerialHost {
    pub fn send(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.tx.send(byte).expect("DUT side closed");
        }
    }

    pub async fn recv(&mut self) -> u8 {
        self.rx.recv().await.expect("DUT side closed")
    }

    pub async fn recv_exact(&mut self, count: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.recv().await);
        }
        bytes
    }
}

#[allow(dead_code)]
/// In-memory CAN bus reproducing the `CanBus` trait behavior.
pub struct MockCanBus {
    tx: mpsc::UnboundedSender<CanFrame>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<CanFrame>>>,
    filter: Arc<Mutex<Option<(u32, u32, bool)>>>,
    bit: Arc<Mutex<bool>>,
}

#[allow(dead_code)]
/// ECU side of a [`MockCanBus`] pair.
pub struct CanHost {
    tx: mpsc::UnboundedSender<CanFrame>,
    rx: mpsc::UnboundedReceiver<CanFrame>,
    pub filter: Arc<Mutex<Option<(u32, u32, bool)>>>,
}

#[allow(dead_code)]
impl MockCanBus {
    /// Construct a pair of interconnected endpoints (DUT and host).
    pub fn create_pair() -> (Self, CanHost) {
        let (dut_tx, host_rx) = mpsc::unbounded_channel();
        let (host_tx, dut_rx) = mpsc::unbounded_channel();
        let filter = Arc::new(Mutex::new(None));

        let dut = Self {
            tx: dut_tx,
            rx: Arc::new(tokio::sync::Mutex::new(dut_rx)),
            filter: filter.clone(),
            bit: Arc::new(Mutex::new(false)),
        };
        let host = CanHost {
            tx: host_tx,
            rx: host_rx,
            filter,
        };

        (dut, host)
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    async fn send<'a>(&'a mut self, frame: &'a CanFrame) -> Result<(), Self::Error> {
        self.tx.send(*frame).map_err(|_| ())?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(())
    }

    fn set_filter(&mut self, filter: u32, mask: u32, extended: bool) -> Result<(), Self::Error> {
        *self.filter.lock().unwrap() = Some((filter, mask, extended));
        Ok(())
    }

    fn set_bit_bang(&mut self, _enable: bool) {}

    fn set_bit(&mut self, level: bool) {
        *self.bit.lock().unwrap() = level;
    }

    fn get_bit(&self) -> bool {
        *self.bit.lock().unwrap()
    }
}

#[allow(dead_code)]
impl CanHost {
    pub fn send(&self, frame: CanFrame) {
        self.tx.send(frame).expect("DUT side closed");
    }

    pub async fn recv(&mut self) -> CanFrame {
        self.rx.recv().await.expect("DUT side closed")
    }
}

#[allow(dead_code)]
#[derive(Default)]
/// Scripted state behind a [`MockPulseBus`].
pub struct PulseScript {
    pub sof_widths: VecDeque<u32>,
    pub edge_widths: VecDeque<Option<u32>>,
    pub opened: Vec<bool>,
    pub sent_pairs: Vec<(u32, u32)>,
}

#[allow(dead_code)]
#[derive(Clone, Default)]
/// Scripted J1850 front end: transmit operations are recorded, receive
/// pulses are replayed from the queued widths. An empty SOF queue leaves
/// the receiver waiting forever (a silent bus).
pub struct MockPulseBus {
    state: Arc<Mutex<PulseScript>>,
}

#[allow(dead_code)]
impl MockPulseBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, PulseScript> {
        self.state.lock().unwrap()
    }

    /// Queue one VPW frame: SOF, then per bit the passive/active width of
    /// `byte ^ 0x55` as it appears on the wire.
    pub fn script_vpw_frame(&self, bytes: &[u8]) {
        let mut state = self.state();
        state.sof_widths.push_back(200);
        for &byte in bytes {
            let wire = byte ^ 0x55;
            for bit in (0..8).rev() {
                let width = if wire >> bit & 0x01 != 0 { 128 } else { 64 };
                state.edge_widths.push_back(Some(width));
            }
        }
        state.edge_widths.push_back(None);
    }

    /// Queue one PWM frame: SOF, then the active width of each bit.
    pub fn script_pwm_frame(&self, bytes: &[u8]) {
        let mut state = self.state();
        state.sof_widths.push_back(32);
        for &byte in bytes {
            for bit in (0..8).rev() {
                let width = if byte >> bit & 0x01 != 0 { 8 } else { 16 };
                state.edge_widths.push_back(Some(width));
            }
        }
        state.edge_widths.push_back(None);
    }

    /// Queue a bare in-frame response byte (no SOF), as the receiver of a
    /// PWM frame returns it.
    pub fn script_pwm_ifr(&self, byte: u8) {
        let mut state = self.state();
        for bit in (0..8).rev() {
            let width = if byte >> bit & 0x01 != 0 { 8 } else { 16 };
            state.edge_widths.push_back(Some(width));
        }
    }
}

impl PulseBus for MockPulseBus {
    type Error = ();

    fn open(&mut self, vpw: bool) -> Result<(), Self::Error> {
        self.state().opened.push(vpw);
        Ok(())
    }

    fn stop(&mut self) {}

    fn set_bit(&mut self, _active: bool) {}

    fn get_bit(&self) -> bool {
        false
    }

    async fn wait_idle(&mut self, _idle_us: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn pulse_pair(&mut self, active_us: u32, passive_us: u32) -> Result<(), Self::Error> {
        self.state().sent_pairs.push((active_us, passive_us));
        Ok(())
    }

    async fn wait_sof(&mut self, max_us: u32) -> Result<u32, Self::Error> {
        let width = self.state().sof_widths.pop_front();
        match width {
            Some(width) => Ok(width.min(max_us)),
            None => std::future::pending().await,
        }
    }

    fn set_rx_timeout(&mut self, _timeout_us: u32) {}

    async fn wait_edge(&mut self) -> Result<Option<u32>, Self::Error> {
        Ok(self.state().edge_widths.pop_front().flatten())
    }
}

#[allow(dead_code)]
#[derive(Default)]
/// Sink collecting rendered lines; partial fragments accumulate until the
/// line is terminated.
pub struct RecordingSink {
    pending: String,
    pub lines: Vec<String>,
}

impl ReplySink for RecordingSink {
    fn send_partial(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    fn send_line(&mut self, line: &str) {
        self.pending.push_str(line);
        self.lines.push(std::mem::take(&mut self.pending));
    }
}

#[allow(dead_code)]
#[derive(Default)]
/// Adapter configuration backed by plain fields.
pub struct TestConfig {
    pub allow_long: bool,
    pub can_dlc: bool,
    pub header_show: bool,
    pub kw_check: bool,
    pub spaces: bool,
    pub use_auto_sp: bool,
    pub can_priority: u32,
    pub iso_init_address: u32,
    pub timeout: u32,
    pub wakeup_val: u32,
    pub header_bytes: ByteArray,
    pub wakeup_message: ByteArray,
    pub can_filter: ByteArray,
    pub can_mask: ByteArray,
}

impl AdapterConfig for TestConfig {
    fn bool_prop(&self, prop: BoolProp) -> bool {
        match prop {
            BoolProp::AllowLong => self.allow_long,
            BoolProp::CanDlc => self.can_dlc,
            BoolProp::HeaderShow => self.header_show,
            BoolProp::KwCheck => self.kw_check,
            BoolProp::Spaces => self.spaces,
            BoolProp::UseAutoSp => self.use_auto_sp,
        }
    }

    fn int_prop(&self, prop: IntProp) -> u32 {
        match prop {
            IntProp::CanPriority => self.can_priority,
            IntProp::IsoInitAddress => self.iso_init_address,
            IntProp::Timeout => self.timeout,
            IntProp::WakeupVal => self.wakeup_val,
        }
    }

    fn bytes_prop(&self, prop: BytesProp) -> ByteArray {
        match prop {
            BytesProp::HeaderBytes => self.header_bytes,
            BytesProp::WakeupMessage => self.wakeup_message,
            BytesProp::CanFilter => self.can_filter,
            BytesProp::CanMask => self.can_mask,
        }
    }
}
