//! J1850 VPW: one bit per pulse, value encoded in the pulse width, bus
//! polarity alternating every symbol. Received bytes come off the wire
//! XORed with 0x55 and are normalized here.
use super::{expected_second_byte, p2_max_timeout, wiring_check_impl, RxStatus, TxStatus};
use crate::config::{AdapterConfig, BoolProp};
use crate::core::{Protocol, Reply, ReplyLine, OBD_IN_MSG_LEN};
use crate::protocol::framing::{EcuMsg, MsgFamily};
use crate::protocol::transport::history::SerialHistory;
use crate::protocol::transport::j1850::{
    OBD2_BYTES_MAX, OBD2_BYTES_MIN, TV1_RX_MIN, TV1_TX_NOM, TV2_RX_MAX, TV2_TX_NOM, TV3_RX_MAX,
    TV3_RX_MIN, TV3_TX_NOM, TV4_TX_MIN, TV6_TX_NOM, VPW_RX_MID,
};
use crate::protocol::transport::traits::obd_timer::ObdTimer;
use crate::protocol::transport::traits::pulse_bus::PulseBus;
use crate::protocol::transport::traits::reply_sink::ReplySink;
use crate::protocol::transport::traits::with_deadline;

/// J1850 VPW session state machine.
pub struct VpwAdapter {
    connected: bool,
    history: SerialHistory,
}

impl Default for VpwAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl VpwAdapter {
    pub const fn new() -> Self {
        Self {
            connected: false,
            history: SerialHistory::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::J1850Vpw
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

    /// Clock the frame out symbol by symbol. Passive symbols double as the
    /// arbitration window: the bus is sampled mid-symbol and an active
    /// level means another node is transmitting.
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

        let Some(idle) = with_deadline(timer, p2_timeout, pulse.wait_idle(TV6_TX_NOM)).await
        else {
            return Ok(TxStatus::Silent);
        };
        idle?;

        // SOF: fixed-width active pulse.
        pulse.set_bit(true);
        timer.delay_us(TV3_TX_NOM).await;

        for &byte in msg.bytes() {
            let mut ch = byte;
            let mut bits = 8;
            while bits > 0 {
                bits -= 1;
                if bits & 0x01 != 0 {
                    // Passive symbol: long means "1".
                    let width = if ch & 0x80 != 0 {
                        TV2_TX_NOM
                    } else {
                        TV1_TX_NOM
                    };
                    pulse.set_bit(false);
                    timer.delay_us(width / 2).await;
                    if pulse.get_bit() {
                        pulse.stop();
                        return Ok(TxStatus::Lost);
                    }
                    timer.delay_us(width - width / 2).await;
                } else {
                    // Active symbol: short means "1".
                    let width = if ch & 0x80 != 0 {
                        TV1_TX_NOM
                    } else {
                        TV2_TX_NOM
                    };
                    pulse.set_bit(true);
                    timer.delay_us(width).await;
                }
                ch <<= 1;
            }
        }

        pulse.stop(); // EOD
        Ok(TxStatus::Done)
    }

    /// Block for a start of frame, then capture symbol widths until the
    /// end-of-data gap.
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
            match with_deadline(timer, remaining, pulse.wait_sof(TV3_RX_MAX)).await {
                None => return Ok(RxStatus::Timeout),
                Some(width) => {
                    if width? >= TV3_RX_MIN {
                        break;
                    }
                }
            }
        }

        pulse.set_rx_timeout(TV4_TX_MIN);

        let mut len = 0;
        'bytes: while len < max_len {
            let mut ch = 0u8;
            for _ in 0..8 {
                // A quiet edge window is the end of data; a partial byte
                // in flight is discarded.
                let Some(width) = pulse.wait_edge().await? else {
                    break 'bytes;
                };
                if !(TV1_RX_MIN..=TV2_RX_MAX).contains(&width) {
                    pulse.stop();
                    return Ok(RxStatus::BusError);
                }
                ch = (ch << 1) | (width > VPW_RX_MID) as u8;
            }
            msg.buf_mut()[len] = ch ^ 0x55;
            len += 1;
        }

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

        let mut msg = EcuMsg::new(MsgFamily::Vpw, config);
        msg.set_data(data);
        msg.add_header_and_checksum();
        let expected = expected_second_byte(msg.bytes());

        match self.send_to_ecu(pulse, timer, &msg, p2_timeout).await? {
            TxStatus::Silent | TxStatus::Lost => return Ok(Reply::BusBusy),
            TxStatus::Done => {}
        }

        let mut deadline = timer.now_ms() + p2_timeout as u64;
        loop {
            match self
                .receive_from_ecu(pulse, timer, &mut msg, OBD_IN_MSG_LEN, deadline)
                .await?
            {
                RxStatus::BusError => {
                    // Tolerated: other traffic may violate our symbol
                    // tolerances without concerning this exchange.
                    if timer.now_ms() >= deadline {
                        break;
                    }
                    continue;
                }
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
            if send_reply {
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
        pulse.open(true)?;
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
            "AUTO, SAE J1850 VPW"
        } else {
            "SAE J1850 VPW"
        });
    }

    /// Protocol number line ("ATDPN").
    pub fn description_num<F: AdapterConfig, R: ReplySink>(&self, config: &F, sink: &mut R) {
        sink.send_line(if config.bool_prop(BoolProp::UseAutoSp) {
            "A2"
        } else {
            "2"
        });
    }

    /// Drive the VPW pins both ways and read them back.
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
        pulse.open(true)?;
        wiring_check_impl(pulse, timer, sink, "VPW").await;
        pulse.stop();
        self.close();
        Ok(())
    }
}
