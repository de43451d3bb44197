//! J1850 PWM: every bit is an active/passive pulse pair inside a fixed
//! 24 µs slot, with the bit value carried by the active width. The receiver
//! of a frame acknowledges it with an in-frame response (IFR) byte.
use super::{expected_second_byte, p2_max_timeout, wiring_check_impl, RxStatus, TxStatus};
use crate::config::{AdapterConfig, BoolProp};
use crate::core::{Protocol, Reply, ReplyLine, OBD_IN_MSG_LEN};
use crate::protocol::framing::{EcuMsg, MsgFamily};
use crate::protocol::transport::history::SerialHistory;
use crate::protocol::transport::j1850::{
    OBD2_BYTES_MAX, OBD2_BYTES_MIN, TP1_TX_NOM, TP2_RX_MAX, TP2_RX_MIN, TP2_TX_NOM, TP3_RX_MAX,
    TP3_TX_NOM, TP4_RX_MAX, TP4_TX_NOM, TP5_TX_MIN, TP7_RX_MAX, TP7_RX_MIN, TP7_TX_NOM,
};
use crate::protocol::transport::traits::obd_timer::ObdTimer;
use crate::protocol::transport::traits::pulse_bus::PulseBus;
use crate::protocol::transport::traits::reply_sink::ReplySink;
use crate::protocol::transport::traits::with_deadline;

/// IFR byte carrying the tester address.
const IFR_BYTE: u8 = 0xF1;

/// Outcome of one byte capture.
enum ByteStatus {
    Byte(u8),
    /// The edge window lapsed: end of data.
    Quiet,
    /// A pulse width fell outside the symbol tolerances.
    BadPulse,
}

/// J1850 PWM session state machine.
pub struct PwmAdapter {
    connected: bool,
    history: SerialHistory,
}

impl Default for PwmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmAdapter {
    pub const fn new() -> Self {
        Self {
            connected: false,
            history: SerialHistory::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::J1850Pwm
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn close(&mut self) {
        self.connected = false;
    }

    pub fn history(&self) -> &SerialHistory {
        &self.history
    }

    async fn send_byte<P: PulseBus>(pulse: &mut P, byte: u8) -> Result<(), P::Error> {
        let mut val = byte;
        for _ in 0..8 {
            if val & 0x80 != 0 {
                pulse
                    .pulse_pair(TP1_TX_NOM, TP3_TX_NOM - TP1_TX_NOM)
                    .await?;
            } else {
                pulse
                    .pulse_pair(TP2_TX_NOM, TP3_TX_NOM - TP2_TX_NOM)
                    .await?;
            }
            val <<= 1;
        }
        Ok(())
    }

    async fn send_sof<P: PulseBus>(pulse: &mut P) -> Result<(), P::Error> {
        pulse.stop();
        pulse
            .pulse_pair(TP7_TX_NOM, TP4_TX_NOM - TP7_TX_NOM)
            .await
    }

    /// Capture one byte from the measured active widths: short is "1",
    /// longer is "0", anything past the tolerance window is a bus error.
    async fn receive_byte<P: PulseBus>(pulse: &mut P) -> Result<ByteStatus, P::Error> {
        let mut val = 0u8;
        for _ in 0..8 {
            let Some(width) = pulse.wait_edge().await? else {
                return Ok(ByteStatus::Quiet);
            };
            if width > TP2_RX_MAX {
                return Ok(ByteStatus::BadPulse);
            }
            val = (val << 1) | (width <= TP2_RX_MIN) as u8;
        }
        Ok(ByteStatus::Byte(val))
    }

    /// Clock the frame out, then wait for the receiver's IFR byte; its
    /// absence means nobody acknowledged the frame.
    async fn send_to_ecu<P, T>(
        &mut self,
        pulse: &mut P,
        timer: &mut T,
        msg: &EcuMsg,
        p2_timeout: u32,
    ) -> Result<TxStatus, P::Error>
    where
        P: PulseBus,
        T: ObdTimer,
    {
        self.history.insert(msg.bytes());

        let Some(idle) = with_deadline(timer, p2_timeout, pulse.wait_idle(TP5_TX_MIN)).await
        else {
            pulse.stop();
            return Ok(TxStatus::Lost);
        };
        idle?;

        Self::send_sof(pulse).await?;

        for &byte in msg.bytes() {
            Self::send_byte(pulse, byte).await?;
        }
        pulse.stop(); // EOD

        pulse.set_rx_timeout(TP4_RX_MAX);
        Ok(match Self::receive_byte(pulse).await? {
            ByteStatus::Byte(_) => TxStatus::Done,
            ByteStatus::Quiet => TxStatus::Silent,
            ByteStatus::BadPulse => TxStatus::Lost,
        })
    }

    /// Block for a start of frame, capture bytes until the bus goes quiet,
    /// then acknowledge with our own IFR.
    async fn receive_from_ecu<P, T>(
        &mut self,
        pulse: &mut P,
        timer: &mut T,
        msg: &mut EcuMsg,
        max_len: usize,
        deadline: u64,
    ) -> Result<RxStatus, P::Error>
    where
        P: PulseBus,
        T: ObdTimer,
    {
        msg.set_len(0);

        loop {
            let now = timer.now_ms();
            if now >= deadline {
                return Ok(RxStatus::Timeout);
            }
            let remaining = (deadline - now) as u32;
            match with_deadline(timer, remaining, pulse.wait_sof(TP7_RX_MAX)).await {
                None => return Ok(RxStatus::Timeout),
                Some(width) => {
                    if width? >= TP7_RX_MIN {
                        break;
                    }
                }
            }
        }

        pulse.set_rx_timeout(TP3_RX_MAX);

        let mut len = 0;
        while len < max_len {
            match Self::receive_byte(pulse).await? {
                ByteStatus::Byte(byte) => {
                    msg.buf_mut()[len] = byte;
                    len += 1;
                }
                ByteStatus::Quiet => break,
                ByteStatus::BadPulse => {
                    pulse.stop();
                    return Ok(RxStatus::BusError);
                }
            }
        }
        pulse.stop();

        // Acknowledge the frame.
        timer.delay_us(15).await;
        Self::send_byte(pulse, IFR_BYTE).await?;
        pulse.stop();

        msg.set_len(len);
        self.history.append(msg.bytes());
        Ok(RxStatus::Frame)
    }

    async fn request_impl<P, T, F, R>(
        &mut self,
        data: &[u8],
        pulse: &mut P,
        timer: &mut T,
        config: &F,
        sink: &mut R,
        send_reply: bool,
    ) -> Result<Reply, P::Error>
    where
        P: PulseBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        let p2_timeout = p2_max_timeout(config);
        let spaces = config.bool_prop(BoolProp::Spaces);
        let show_header = config.bool_prop(BoolProp::HeaderShow);
        let mut got_reply = false;

        let mut msg = EcuMsg::new(MsgFamily::Pwm, config);
        msg.set_data(data);
        msg.add_header_and_checksum();
        let expected = expected_second_byte(msg.bytes());

        match self.send_to_ecu(pulse, timer, &msg, p2_timeout).await? {
            TxStatus::Silent => return Ok(Reply::NoData),
            TxStatus::Lost => return Ok(Reply::BusBusy),
            TxStatus::Done => {}
        }

        let mut deadline = timer.now_ms() + p2_timeout as u64;
        loop {
            match self
                .receive_from_ecu(pulse, timer, &mut msg, OBD_IN_MSG_LEN, deadline)
                .await?
            {
                RxStatus::BusError => return Ok(Reply::BusError),
                RxStatus::Timeout => break,
                RxStatus::Frame => {}
            }

            if !(OBD2_BYTES_MIN..=OBD2_BYTES_MAX).contains(&msg.len()) {
                continue;
            }
            if msg.bytes()[1] != expected {
                continue;
            }

            deadline = timer.now_ms() + p2_timeout as u64;

            if !show_header && !msg.strip_header_and_checksum() {
                return Ok(Reply::DataError);
            }
            if send_reply && !msg.is_empty() {
                let mut line = ReplyLine::new();
                msg.to_ascii(&mut line, spaces);
                sink.send_line(line.as_str());
            }
            got_reply = true;
        }

        Ok(if got_reply { Reply::None } else { Reply::NoData })
    }

    /// One request/reply exchange over the connected session.
    pub async fn on_request<P, T, F, R>(
        &mut self,
        data: &[u8],
        pulse: &mut P,
        timer: &mut T,
        config: &F,
        sink: &mut R,
    ) -> Result<Reply, P::Error>
    where
        P: PulseBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        self.request_impl(data, pulse, timer, config, sink, true)
            .await
    }

    /// Probe the bus with a PID 0 request; a filtered reply marks the
    /// session connected.
    pub async fn connect<P, T, F, R>(
        &mut self,
        pulse: &mut P,
        timer: &mut T,
        config: &F,
        sink: &mut R,
        send_reply: bool,
    ) -> Result<Reply, P::Error>
    where
        P: PulseBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        pulse.open(false)?;
        let reply = self
            .request_impl(&[0x01, 0x00], pulse, timer, config, sink, send_reply)
            .await?;

        self.connected = reply == Reply::None;
        if !self.connected {
            self.close();
        }
        Ok(reply)
    }

    /// Protocol description line ("ATDP").
    pub fn description<F: AdapterConfig, R: ReplySink>(&self, config: &F, sink: &mut R) {
        let auto_sp = config.bool_prop(BoolProp::UseAutoSp);
        sink.send_line(if auto_sp {
            "AUTO, SAE J1850 PWM"
        } else {
            "SAE J1850 PWM"
        });
    }

    /// Protocol number line ("ATDPN").
    pub fn description_num<F: AdapterConfig, R: ReplySink>(&self, config: &F, sink: &mut R) {
        sink.send_line(if config.bool_prop(BoolProp::UseAutoSp) {
            "A1"
        } else {
            "1"
        });
    }

    /// Drive the PWM pins both ways and read them back.
    pub async fn wiring_check<P, T, R>(
        &mut self,
        pulse: &mut P,
        timer: &mut T,
        sink: &mut R,
    ) -> Result<(), P::Error>
    where
        P: PulseBus,
        T: ObdTimer,
        R: ReplySink,
    {
        pulse.open(false)?;
        wiring_check_impl(pulse, timer, sink, "PWM").await;
        pulse.stop();
        self.close();
        Ok(())
    }
}
