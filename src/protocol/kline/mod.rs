//! ISO 9141 / ISO 14230 K-line adapter: 5-baud slow init, fast init,
//! keyword-driven protocol selection, the request/reply exchange, and the
//! periodic keep-alive that holds the session open.
use crate::config::{AdapterConfig, BoolProp, ByteArray, BytesProp, IntProp};
use crate::core::{Protocol, Reply, ReplyLine, OBD_IN_MSG_LEN};
use crate::protocol::framing::{EcuMsg, MsgFamily};
use crate::protocol::transport::history::SerialHistory;
use crate::protocol::transport::iso::{
    DEFAULT_WAKEUP_TIME, FAST_INIT_PULSE_MS, P1_MAX_TIMEOUT, P2_MAX_TIMEOUT, P3_MIN_TIMEOUT,
    P4_TIMEOUT, SLOW_INIT_BIT_MS, W1_MAX_TIMEOUT, W3_TIMEOUT, W4_MAX_TIMEOUT, W4_TIMEOUT,
};
use crate::protocol::transport::traits::obd_timer::ObdTimer;
use crate::protocol::transport::traits::reply_sink::ReplySink;
use crate::protocol::transport::traits::serial_bus::SerialBus;
use crate::protocol::transport::traits::with_deadline;

const ISO14230_START_COMM: [u8; 1] = [0x81];
const ISO9141_WAKEUP: [u8; 2] = [0x01, 0x00];
const ISO14230_WAKEUP: [u8; 1] = [0x3E];

const BUS_INIT: &str = "BUSINIT: ";
const ECHO_DOT: &str = ".";
const ECHO_OK: &str = "OK";

/// ISO 14230 key byte 1 carries the supported header layouts in its low
/// nibble; only the layouts with a format byte, target and source address
/// are handled here.
fn supported_iso14230_header(kb1: u8) -> bool {
    matches!(kb1 & 0x0F, 0x9 | 0xB | 0xD | 0xF)
}

/// K-line session state machine. Owns the negotiated protocol, the last
/// keyword bytes, and the keep-alive / P3 deadlines; the buses, timer and
/// configuration are borrowed per operation.
pub struct IsoSerialAdapter {
    protocol: Protocol,
    connected: bool,
    kw_check: bool,
    init_address: u8,
    wakeup_time: u32,
    custom_wakeup: ByteArray,
    keywords: [u8; 2],
    keep_alive_at: u64,
    p3_ready_at: u64,
    history: SerialHistory,
}

impl Default for IsoSerialAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl IsoSerialAdapter {
    pub const fn new() -> Self {
        Self {
            protocol: Protocol::Auto,
            connected: false,
            kw_check: false,
            init_address: 0x33,
            wakeup_time: DEFAULT_WAKEUP_TIME,
            custom_wakeup: ByteArray::empty(),
            keywords: [0; 2],
            keep_alive_at: 0,
            p3_ready_at: 0,
            history: SerialHistory::new(),
        }
    }

    /// The protocol negotiated by the last successful init.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Drop the session. The ECU will time the tester out on its own.
    pub fn close(&mut self) {
        self.connected = false;
    }

    pub fn history(&self) -> &SerialHistory {
        &self.history
    }

    /// Latch the configurable init parameters for the upcoming session.
    fn configure<F: AdapterConfig>(&mut self, config: &F) {
        self.kw_check = config.bool_prop(BoolProp::KwCheck);
        self.custom_wakeup = config.bytes_prop(BytesProp::WakeupMessage);

        let init_address = config.int_prop(IntProp::IsoInitAddress);
        self.init_address = if init_address != 0 {
            init_address as u8
        } else {
            0x33
        };

        let wakeup = config.int_prop(IntProp::WakeupVal);
        self.wakeup_time = if wakeup != 0 {
            wakeup * 20
        } else {
            DEFAULT_WAKEUP_TIME
        };
    }

    /// P2 window: the configured timeout when set, the ISO default otherwise.
    fn p2_max_timeout<F: AdapterConfig>(config: &F) -> u32 {
        let timeout = config.int_prop(IntProp::Timeout);
        if timeout != 0 {
            timeout
        } else {
            P2_MAX_TIMEOUT
        }
    }

    /// Receive ceiling: the OBD standard length, or a relaxed one when the
    /// long-message option is on.
    fn max_len<F: AdapterConfig>(config: &F) -> usize {
        if config.bool_prop(BoolProp::AllowLong) {
            OBD_IN_MSG_LEN + 6
        } else {
            OBD_IN_MSG_LEN
        }
    }

    /// Arm the keep-alive and P3 deadlines after a completed exchange.
    fn set_keep_alive<T: ObdTimer>(&mut self, timer: &T) {
        let now = timer.now_ms();
        if self.wakeup_time != 0 {
            self.keep_alive_at = now + self.wakeup_time as u64;
        }
        self.p3_ready_at = now + P3_MIN_TIMEOUT as u64;
    }

    fn keep_alive_due<T: ObdTimer>(&self, timer: &T) -> bool {
        self.connected && self.wakeup_time != 0 && timer.now_ms() >= self.keep_alive_at
    }

    /// Hold back until the P3 minimum spacing since the previous exchange
    /// has elapsed.
    async fn await_p3<T: ObdTimer>(&self, timer: &mut T) {
        let now = timer.now_ms();
        if now < self.p3_ready_at {
            timer.delay_ms((self.p3_ready_at - now) as u32).await;
        }
    }

    /// Transmit a framed message byte by byte, verifying each echo.
    /// Returns `false` on an echo mismatch (wiring problem).
    async fn send_to_ecu<S, T>(
        &mut self,
        serial: &mut S,
        timer: &mut T,
        msg: &EcuMsg,
        p4_timeout: u32,
    ) -> Result<bool, S::Error>
    where
        S: SerialBus,
        T: ObdTimer,
    {
        self.history.insert(msg.bytes());

        for (i, &byte) in msg.bytes().iter().enumerate() {
            // Interbyte gap <P4>.
            if i > 0 {
                timer.delay_ms(p4_timeout).await;
            }
            if !serial.send(byte).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Receive up to `max_len` bytes: the first within `p2_timeout`, each
    /// further one within `p1_timeout`. A timeout ends the message.
    async fn receive_from_ecu<S, T>(
        &mut self,
        serial: &mut S,
        timer: &mut T,
        msg: &mut EcuMsg,
        max_len: usize,
        p2_timeout: u32,
        p1_timeout: u32,
    ) -> Result<(), S::Error>
    where
        S: SerialBus,
        T: ObdTimer,
    {
        let mut len = 0;
        let mut window = p2_timeout;

        while len < max_len {
            let Some(received) = with_deadline(timer, window, serial.recv()).await else {
                break;
            };
            msg.buf_mut()[len] = received?;
            len += 1;
            window = p1_timeout;
        }

        msg.set_len(len);
        self.history.append(msg.bytes());
        Ok(())
    }

    /// Clock the init address out at 5 bit/s with the UART bypassed.
    /// Returns `false` when the stop bit does not read back (wiring error,
    /// typically a missing +12V supply).
    async fn slow_init<S, T>(&mut self, serial: &mut S, timer: &mut T) -> Result<bool, S::Error>
    where
        S: SerialBus,
        T: ObdTimer,
    {
        serial.set_bit_bang(true);

        // Start bit, eight data bits LSB first, stop bit.
        let mut shift = (self.init_address as u16) << 1 | 0x200;
        for _ in 0..10 {
            serial.set_bit(shift & 0x01 != 0);
            timer.delay_ms(SLOW_INIT_BIT_MS).await;
            shift >>= 1;
        }

        let wired = serial.get_bit();
        serial.set_bit_bang(false);
        serial.clear();

        Ok(wired)
    }

    /// Emit the ISO 14230 wake-up pattern: TWuP low, TWuP high.
    async fn fast_init<S, T>(&mut self, serial: &mut S, timer: &mut T) -> Result<bool, S::Error>
    where
        S: SerialBus,
        T: ObdTimer,
    {
        serial.set_bit_bang(true);

        serial.set_bit(false);
        timer.delay_ms(FAST_INIT_PULSE_MS).await;
        serial.set_bit(true);
        timer.delay_ms(FAST_INIT_PULSE_MS).await;

        let wired = serial.get_bit();
        serial.set_bit_bang(false);
        serial.clear();

        Ok(wired)
    }

    /// 5-baud init and keyword exchange (ISO 9141 and ISO 14230 5-baud).
    async fn connect_slow<S, T, F, R>(
        &mut self,
        requested: Protocol,
        serial: &mut S,
        timer: &mut T,
        config: &F,
        sink: &mut R,
    ) -> Result<Reply, S::Error>
    where
        S: SerialBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        self.connected = false;
        let mut msg = EcuMsg::new(MsgFamily::Iso9141, config);

        // Init progress is only echoed for a pinned protocol; auto-detect
        // stays quiet until a protocol actually answers.
        if requested != Protocol::Auto {
            sink.send_partial(BUS_INIT);
        }

        if !self.slow_init(serial, timer).await? {
            return Ok(Reply::WiringError);
        }
        if requested != Protocol::Auto {
            sink.send_partial(ECHO_DOT);
        }

        // Sync pattern and keywords within <W1>: 0x55 KB1 KB2.
        self.receive_from_ecu(serial, timer, &mut msg, 3, W1_MAX_TIMEOUT, W3_TIMEOUT)
            .await?;
        if msg.is_empty() {
            return Ok(Reply::Error);
        }
        if msg.len() != 3 || msg.bytes()[0] != 0x55 {
            return Ok(Reply::DataError);
        }

        let kb1 = msg.bytes()[1];
        let kb2 = msg.bytes()[2];
        self.keywords = [kb1, kb2];

        if requested != Protocol::Auto {
            sink.send_partial(ECHO_DOT);
        }

        // Pause <W4>, then acknowledge with the inverted KB2.
        timer.delay_ms(W4_TIMEOUT).await;
        msg.set_data(&[!kb2]);
        if !self.send_to_ecu(serial, timer, &msg, P4_TIMEOUT).await? {
            return Ok(Reply::WiringError);
        }

        // The ECU closes the handshake with the inverted init address.
        self.receive_from_ecu(serial, timer, &mut msg, 1, W4_MAX_TIMEOUT, W3_TIMEOUT)
            .await?;
        if msg.is_empty() {
            return Ok(Reply::Error);
        }
        if msg.len() != 1 || msg.bytes()[0] != !self.init_address {
            return Ok(Reply::DataError);
        }

        if requested != Protocol::Auto {
            sink.send_partial(ECHO_DOT);
        }

        let auto_sp = config.bool_prop(BoolProp::UseAutoSp);
        let slow_iso9141 =
            matches!(requested, Protocol::Iso9141 | Protocol::Auto) || auto_sp;

        if !self.kw_check {
            self.connected = true;
            self.protocol = if slow_iso9141 {
                Protocol::Iso9141
            } else {
                Protocol::Iso14230Slow
            };
        } else if kb2 == 0x08 || kb2 == 0x94 {
            if slow_iso9141 {
                self.connected = true;
                self.protocol = Protocol::Iso9141;
            }
        } else if kb2 == 0x8F
            && supported_iso14230_header(kb1)
            && (matches!(requested, Protocol::Iso14230Slow | Protocol::Auto) || auto_sp)
        {
            self.connected = true;
            self.protocol = Protocol::Iso14230Slow;
        }

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "slow init: kb1={:#04x} kb2={:#04x} connected={}",
            kb1,
            kb2,
            self.connected
        );

        self.set_keep_alive(timer);

        Ok(if self.connected {
            Reply::Ok
        } else {
            Reply::Error
        })
    }

    /// Fast init and StartCommunication exchange (ISO 14230).
    async fn connect_fast<S, T, F, R>(
        &mut self,
        requested: Protocol,
        serial: &mut S,
        timer: &mut T,
        config: &F,
        sink: &mut R,
    ) -> Result<Reply, S::Error>
    where
        S: SerialBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        self.connected = false;
        let mut sts = Reply::Error;
        let p2_timeout = Self::p2_max_timeout(config);
        let mut msg = EcuMsg::new(MsgFamily::Iso14230, config);

        if requested != Protocol::Auto {
            sink.send_partial(BUS_INIT);
        }

        if !self.fast_init(serial, timer).await? {
            return Ok(Reply::WiringError);
        }

        msg.set_data(&ISO14230_START_COMM);
        msg.add_header_and_checksum();
        if !self.send_to_ecu(serial, timer, &msg, P4_TIMEOUT).await? {
            return Ok(Reply::WiringError);
        }

        loop {
            // 3 header bytes + 3 data bytes + checksum.
            self.receive_from_ecu(serial, timer, &mut msg, 7, p2_timeout, P1_MAX_TIMEOUT)
                .await?;
            if msg.is_empty() {
                break;
            }
            if self.connected {
                continue; // Drain any further replies.
            }
            if msg.len() < 5 {
                sts = Reply::DataError;
                continue;
            }

            // The positive-response offset depends on the header layout
            // the ECU chose.
            let bytes = msg.bytes();
            let n = if bytes[0] == 0 {
                2 // no address, separate length byte
            } else if bytes[0] & 0xC0 == 0 {
                1 // single-byte header
            } else if bytes[0] & 0x3F != 0 {
                3 // length carried in the format byte
            } else {
                4 // full header with separate length byte
            };

            if bytes.get(n).copied() != Some(0xC1) {
                sts = Reply::DataError;
                continue;
            }

            let kb1 = bytes.get(n + 1).copied().unwrap_or(0);
            let kb2 = bytes.get(n + 2).copied().unwrap_or(0);
            self.keywords = [kb1, kb2];

            if !self.kw_check || supported_iso14230_header(kb1) {
                self.connected = true;
                self.protocol = Protocol::Iso14230;
                sts = Reply::Ok;
            } else {
                sts = Reply::DataError;
            }
        }

        self.set_keep_alive(timer);

        Ok(sts)
    }

    /// Bring up the K-line session for `requested`, trying slow init before
    /// fast init when the protocol is automatic.
    pub async fn connect<S, T, F, R>(
        &mut self,
        requested: Protocol,
        serial: &mut S,
        timer: &mut T,
        config: &F,
        sink: &mut R,
    ) -> Result<Reply, S::Error>
    where
        S: SerialBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        if self.connected {
            return Ok(Reply::Ok);
        }

        self.configure(config);

        let sts = match requested {
            Protocol::Iso9141 | Protocol::Iso14230Slow => {
                self.connect_slow(requested, serial, timer, config, sink)
                    .await?
            }
            Protocol::Iso14230 => {
                self.connect_fast(requested, serial, timer, config, sink)
                    .await?
            }
            _ => {
                let sts = self
                    .connect_slow(Protocol::Auto, serial, timer, config, sink)
                    .await?;
                if self.connected {
                    sts
                } else {
                    self.connect_fast(Protocol::Auto, serial, timer, config, sink)
                        .await?
                }
            }
        };

        if self.connected {
            if requested != Protocol::Auto {
                sink.send_line(ECHO_OK);
            }
        } else {
            self.close();
        }

        Ok(sts)
    }

    /// One request/reply exchange. Replies stream to the sink as they
    /// arrive; the returned status covers the exchange as a whole.
    pub async fn on_request<S, T, F, R>(
        &mut self,
        data: &[u8],
        serial: &mut S,
        timer: &mut T,
        config: &F,
        sink: &mut R,
    ) -> Result<Reply, S::Error>
    where
        S: SerialBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        let mut got_reply = false;
        let p2_timeout = Self::p2_max_timeout(config);
        let max_len = Self::max_len(config);
        let spaces = config.bool_prop(BoolProp::Spaces);
        let show_header = config.bool_prop(BoolProp::HeaderShow);

        let family = if self.protocol == Protocol::Iso14230 {
            MsgFamily::Iso14230
        } else {
            MsgFamily::Iso9141
        };
        let mut msg = EcuMsg::new(family, config);
        msg.set_data(data);
        msg.add_header_and_checksum();

        // Honor the P3 minimum before the next request hits the bus.
        self.await_p3(timer).await;

        if !self.send_to_ecu(serial, timer, &msg, P4_TIMEOUT).await? {
            return Ok(Reply::WiringError);
        }

        loop {
            self.receive_from_ecu(serial, timer, &mut msg, max_len, p2_timeout, P1_MAX_TIMEOUT)
                .await?;
            if msg.is_empty() {
                break;
            }
            if msg.len() < 5 {
                return Ok(Reply::DataError);
            }

            got_reply = true;

            if !show_header && !msg.strip_header_and_checksum() {
                return Ok(Reply::DataError);
            }

            let mut line = ReplyLine::new();
            msg.to_ascii(&mut line, spaces);
            sink.send_line(line.as_str());
        }

        self.set_keep_alive(timer);

        Ok(if got_reply { Reply::None } else { Reply::NoData })
    }

    /// Periodic wake-up: either the configured custom message verbatim or
    /// the per-protocol default request. Silence from the ECU closes the
    /// session.
    pub async fn send_heartbeat<S, T, F>(
        &mut self,
        serial: &mut S,
        timer: &mut T,
        config: &F,
    ) -> Result<(), S::Error>
    where
        S: SerialBus,
        T: ObdTimer,
        F: AdapterConfig,
    {
        if !self.keep_alive_due(timer) {
            return Ok(());
        }

        let p2_timeout = Self::p2_max_timeout(config);
        let family = if self.protocol == Protocol::Iso14230 {
            MsgFamily::Iso14230
        } else {
            MsgFamily::Iso9141
        };
        let mut msg = EcuMsg::new(family, config);

        if self.custom_wakeup.is_set() {
            // Custom wake-up bytes go out exactly as configured.
            msg.set_data(self.custom_wakeup.as_slice());
        } else {
            if self.protocol == Protocol::Iso9141 {
                msg.set_data(&ISO9141_WAKEUP);
            } else {
                msg.set_data(&ISO14230_WAKEUP);
            }
            msg.add_header_and_checksum();
        }

        if !self.send_to_ecu(serial, timer, &msg, P4_TIMEOUT).await? {
            self.close();
            return Ok(());
        }

        let mut num_replies = 0;
        loop {
            self.receive_from_ecu(
                serial,
                timer,
                &mut msg,
                OBD_IN_MSG_LEN,
                p2_timeout,
                P1_MAX_TIMEOUT,
            )
            .await?;
            if msg.is_empty() {
                break;
            }
            num_replies += 1;
        }

        if num_replies == 0 {
            self.close();
        } else {
            self.set_keep_alive(timer);
        }
        Ok(())
    }

    /// Protocol description line ("ATDP").
    pub fn description<F: AdapterConfig, R: ReplySink>(&self, config: &F, sink: &mut R) {
        let auto_sp = config.bool_prop(BoolProp::UseAutoSp);
        let name = match self.protocol {
            Protocol::Iso9141 => Some(if auto_sp {
                "AUTO, ISO 9141-2"
            } else {
                "ISO 9141-2"
            }),
            Protocol::Iso14230Slow => Some(if auto_sp {
                "AUTO, ISO 14230-4 (KWP 5BAUD)"
            } else {
                "ISO 14230-4 (KWP 5BAUD)"
            }),
            Protocol::Iso14230 => Some(if auto_sp {
                "AUTO, ISO 14230-4 (KWP FAST)"
            } else {
                "ISO 14230-4 (KWP FAST)"
            }),
            _ => None,
        };
        if let Some(name) = name {
            sink.send_line(name);
        }
    }

    /// Protocol number line ("ATDPN").
    pub fn description_num<F: AdapterConfig, R: ReplySink>(&self, config: &F, sink: &mut R) {
        if !self.protocol.is_kline() {
            sink.send_line("???");
            return;
        }
        let mut line = ReplyLine::new();
        if config.bool_prop(BoolProp::UseAutoSp) {
            line.push(b'A');
        }
        line.push(b'0' + self.protocol.number());
        sink.send_line(line.as_str());
    }

    /// Render the last negotiated keyword bytes ("ATKW").
    pub fn keywords_line(&self) -> ReplyLine {
        let mut line = ReplyLine::new();
        line.push_str("1:");
        push_kw(&mut line, self.keywords[0]);
        line.push_str(" 2:");
        push_kw(&mut line, self.keywords[1]);
        line
    }

    pub fn kw_display<R: ReplySink>(&self, sink: &mut R) {
        sink.send_line(self.keywords_line().as_str());
    }

    /// Drive the K-line both ways and read it back ("ATZT" wiring test).
    pub async fn wiring_check<S, T, R>(&mut self, serial: &mut S, timer: &mut T, sink: &mut R)
    where
        S: SerialBus,
        T: ObdTimer,
        R: ReplySink,
    {
        serial.set_bit_bang(true);

        serial.set_bit(true);
        timer.delay_ms(1).await;
        if !serial.get_bit() {
            sink.send_line("ISO9141/14230 wiring failed [1]");
        } else {
            serial.set_bit(false);
            timer.delay_ms(1).await;
            if !serial.get_bit() {
                sink.send_line("ISO9141/14230 wiring is OK");
            } else {
                sink.send_line("ISO9141/14230 wiring failed [0]");
            }
        }

        serial.set_bit(false);
        serial.set_bit_bang(false);
    }
}

fn push_kw(line: &mut ReplyLine, kw: u8) {
    if kw != 0 {
        crate::infra::hex::to_ascii(&[kw], line, false);
    } else {
        line.push_str("--");
    }
}
