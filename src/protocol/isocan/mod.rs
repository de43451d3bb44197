//! ISO 15765 adapter over classic CAN, in the two OBD flavors: 11-bit
//! identifiers and 29-bit identifiers, both at 500 kbit/s. Requests go out
//! as single frames; replies are classified by their PCI nibble and first
//! frames are answered with a flow-control continuation.
use crate::config::{AdapterConfig, BoolProp, BytesProp, IntProp};
use crate::core::{Protocol, Reply, ReplyLine};
use crate::infra::hex;
use crate::protocol::transport::can::CAN_P2_MAX_TIMEOUT;
use crate::protocol::transport::can_frame::{CanFrame, CAN_PAD_BYTE};
use crate::protocol::transport::history::CanHistory;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::obd_timer::ObdTimer;
use crate::protocol::transport::traits::reply_sink::ReplySink;
use crate::protocol::transport::traits::with_deadline;

/// Maximum payload of an outgoing single frame (one byte goes to the PCI).
const ISO_CAN_LEN: usize = 7;

/// PCI frame types (first data byte, high nibble).
const PCI_SINGLE: u8 = 0x0;
const PCI_FIRST: u8 = 0x1;
const PCI_CONSECUTIVE: u8 = 0x2;
/// Flow-control continuation, ClearToSend.
const FLOW_CONTROL: u8 = 0x30;

/// Identifier width variant of one ISO 15765 session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanMode {
    Standard11,
    Extended29,
}

/// ISO 15765 session state machine, parameterized by identifier width.
pub struct IsoCanAdapter {
    mode: CanMode,
    connected: bool,
    can_priority: u8,
    history: CanHistory,
}

impl IsoCanAdapter {
    pub const fn new(mode: CanMode) -> Self {
        Self {
            mode,
            connected: false,
            can_priority: 0,
            history: CanHistory::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self.mode {
            CanMode::Standard11 => Protocol::IsoCan11,
            CanMode::Extended29 => Protocol::IsoCan29,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn close(&mut self) {
        self.connected = false;
    }

    pub fn history(&self) -> &CanHistory {
        &self.history
    }

    fn is_extended(&self) -> bool {
        self.mode == CanMode::Extended29
    }

    fn configure<F: AdapterConfig>(&mut self, config: &F) {
        self.can_priority = config.int_prop(IntProp::CanPriority) as u8;
    }

    fn p2_max_timeout<F: AdapterConfig>(config: &F) -> u32 {
        let timeout = config.int_prop(IntProp::Timeout);
        if timeout != 0 {
            timeout
        } else {
            CAN_P2_MAX_TIMEOUT
        }
    }

    /// Functional request identifier: the configured header bytes when set,
    /// the OBD default otherwise.
    fn request_id<F: AdapterConfig>(&self, config: &F) -> u32 {
        let header = config.bytes_prop(BytesProp::HeaderBytes);
        let bytes = header.as_slice();
        match self.mode {
            CanMode::Standard11 => {
                if bytes.len() >= 4 {
                    ((bytes[2] & 0x07) as u32) << 8 | bytes[3] as u32
                } else {
                    0x7DF
                }
            }
            CanMode::Extended29 => {
                if bytes.len() >= 4 {
                    (self.can_priority as u32) << 24
                        | (bytes[1] as u32) << 16
                        | (bytes[2] as u32) << 8
                        | bytes[3] as u32
                } else {
                    0x18DB33F1
                }
            }
        }
    }

    /// Acceptance filter and mask: configured overrides when present, the
    /// OBD defaults for the identifier width otherwise.
    fn filter_and_mask<F: AdapterConfig>(&self, config: &F) -> (u32, u32) {
        let filter = config.bytes_prop(BytesProp::CanFilter);
        let mask = config.bytes_prop(BytesProp::CanMask);
        let f = filter.as_slice();
        let m = mask.as_slice();

        match self.mode {
            CanMode::Standard11 => {
                let filter = if f.len() >= 5 {
                    ((f[3] & 0x07) as u32) << 8 | f[4] as u32
                } else {
                    0x7E8
                };
                let mask = if m.len() >= 5 {
                    ((m[3] & 0x07) as u32) << 8 | m[4] as u32
                } else {
                    0x7F8
                };
                (filter, mask)
            }
            CanMode::Extended29 => {
                let filter = if f.len() >= 5 {
                    u32::from_be_bytes([f[1], f[2], f[3], f[4]])
                } else {
                    0x18DAF100
                };
                let mask = if m.len() >= 5 {
                    u32::from_be_bytes([m[1], m[2], m[3], m[4]])
                } else {
                    0x1FFFFF00
                };
                (filter, mask)
            }
        }
    }

    /// Install the acceptance filter for this session.
    pub fn open<C, F>(&mut self, can: &mut C, config: &F) -> Result<(), C::Error>
    where
        C: CanBus,
        F: AdapterConfig,
    {
        let (filter, mask) = self.filter_and_mask(config);
        can.set_filter(filter, mask, self.is_extended())
    }

    /// Render one received frame per the display options.
    fn process_frame<F, R>(&self, frame: &CanFrame, config: &F, sink: &mut R)
    where
        F: AdapterConfig,
        R: ReplySink,
    {
        let mut line = ReplyLine::new();
        if config.bool_prop(BoolProp::HeaderShow) {
            hex::can_id_to_ascii(frame.raw_id(), frame.is_extended(), &mut line);
            let spaces = config.bool_prop(BoolProp::Spaces);
            if spaces {
                line.push(b' ');
            }
            if config.bool_prop(BoolProp::CanDlc) {
                line.push(b'0' + frame.dlc);
                if spaces {
                    line.push(b' ');
                }
            }
        }
        hex::to_ascii(&frame.data, &mut line, false);
        sink.send_line(line.as_str());
    }

    /// Answer a first frame with a ClearToSend continuation. The response
    /// identifier folds the sender's address bits into the request base.
    async fn send_flow_control<C, F>(
        &mut self,
        can: &mut C,
        config: &F,
        trigger: &CanFrame,
    ) -> Result<(), C::Error>
    where
        C: CanBus,
        F: AdapterConfig,
    {
        let mut id = self.request_id(config);
        match self.mode {
            CanMode::Standard11 => id |= trigger.raw_id() & 0x07,
            CanMode::Extended29 => id |= (trigger.raw_id() & 0xFF) << 8,
        }
        let frame = CanFrame::new(id, self.is_extended(), 8, &[FLOW_CONTROL, 0x00, 0x00]);
        can.send(&frame).await
    }

    /// Drain replies until P2 lapses with no frame. Every frame is logged;
    /// with `send_reply` set each one is also rendered to the sink.
    async fn receive_from_ecu<C, T, F, R>(
        &mut self,
        can: &mut C,
        timer: &mut T,
        config: &F,
        sink: &mut R,
        send_reply: bool,
    ) -> Result<bool, C::Error>
    where
        C: CanBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        let p2_timeout = Self::p2_max_timeout(config);
        let mut received = false;

        loop {
            let Some(next) = with_deadline(timer, p2_timeout, can.recv()).await else {
                break;
            };
            let frame = next?;
            self.history.add(&frame, false, frame.slot);
            received = true;

            if !send_reply {
                continue;
            }
            match frame.data[0] >> 4 {
                PCI_SINGLE => self.process_frame(&frame, config, sink),
                PCI_FIRST => {
                    self.send_flow_control(can, config, &frame).await?;
                    self.process_frame(&frame, config, sink);
                }
                PCI_CONSECUTIVE => self.process_frame(&frame, config, sink),
                _ => {}
            }
        }
        Ok(received)
    }

    /// Single-frame transmit: PCI length byte, payload, pad to 8.
    async fn send_to_ecu<C, F>(
        &mut self,
        can: &mut C,
        config: &F,
        data: &[u8],
    ) -> Result<bool, C::Error>
    where
        C: CanBus,
        F: AdapterConfig,
    {
        if data.len() > ISO_CAN_LEN {
            return Ok(false);
        }
        let mut bytes = [CAN_PAD_BYTE; 8];
        bytes[0] = data.len() as u8;
        bytes[1..1 + data.len()].copy_from_slice(data);

        let frame = CanFrame::new(self.request_id(config), self.is_extended(), 8, &bytes);
        self.history.add(&frame, true, 0);
        can.send(&frame).await?;
        Ok(true)
    }

    /// Probe the bus with a PID 0 request; any reply marks the session
    /// connected. `send_reply` controls whether the probe replies are
    /// rendered (true when the user's own request was the probe).
    pub async fn connect<C, T, F, R>(
        &mut self,
        can: &mut C,
        timer: &mut T,
        config: &F,
        sink: &mut R,
        send_reply: bool,
    ) -> Result<Reply, C::Error>
    where
        C: CanBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        if self.connected {
            return Ok(Reply::Ok);
        }

        self.configure(config);
        self.open(can, config)?;

        if self.send_to_ecu(can, config, &[0x01, 0x00]).await?
            && self
                .receive_from_ecu(can, timer, config, sink, send_reply)
                .await?
        {
            self.connected = true;

            #[cfg(feature = "defmt")]
            defmt::debug!("ISO 15765 connected, extended={}", self.is_extended());

            return Ok(Reply::Ok);
        }

        self.close();
        Ok(Reply::Error)
    }

    /// One request/reply exchange over the connected session.
    pub async fn on_request<C, T, F, R>(
        &mut self,
        data: &[u8],
        can: &mut C,
        timer: &mut T,
        config: &F,
        sink: &mut R,
    ) -> Result<Reply, C::Error>
    where
        C: CanBus,
        T: ObdTimer,
        F: AdapterConfig,
        R: ReplySink,
    {
        if !self.send_to_ecu(can, config, data).await? {
            return Ok(Reply::DataError);
        }
        Ok(
            if self
                .receive_from_ecu(can, timer, config, sink, true)
                .await?
            {
                Reply::None
            } else {
                Reply::NoData
            },
        )
    }

    /// Protocol description line ("ATDP").
    pub fn description<F: AdapterConfig, R: ReplySink>(&self, config: &F, sink: &mut R) {
        let auto_sp = config.bool_prop(BoolProp::UseAutoSp);
        let name = match self.mode {
            CanMode::Standard11 => {
                if auto_sp {
                    "AUTO, ISO 15765-4 (CAN 11/500)"
                } else {
                    "ISO 15765-4 (CAN 11/500)"
                }
            }
            CanMode::Extended29 => {
                if auto_sp {
                    "AUTO, ISO 15765-4 (CAN 29/500)"
                } else {
                    "ISO 15765-4 (CAN 29/500)"
                }
            }
        };
        sink.send_line(name);
    }

    /// Protocol number line ("ATDPN").
    pub fn description_num<F: AdapterConfig, R: ReplySink>(&self, config: &F, sink: &mut R) {
        let mut line = ReplyLine::new();
        if config.bool_prop(BoolProp::UseAutoSp) {
            line.push(b'A');
        }
        line.push(b'0' + self.protocol().number());
        sink.send_line(line.as_str());
    }

    /// Drive the CAN pins both ways and read them back.
    pub async fn wiring_check<C, T, R>(&mut self, can: &mut C, timer: &mut T, sink: &mut R)
    where
        C: CanBus,
        T: ObdTimer,
        R: ReplySink,
    {
        let mut failed = false;
        can.set_bit_bang(true);

        can.set_bit(false);
        timer.delay_ms(1).await;
        if can.get_bit() {
            sink.send_line("CAN wiring failed [0->1]");
            failed = true;
        }

        can.set_bit(true);
        timer.delay_ms(1).await;
        if !can.get_bit() {
            sink.send_line("CAN wiring failed [1->0]");
            failed = true;
        }

        if !failed {
            sink.send_line("CAN wiring is OK");
        }

        can.set_bit_bang(false);
    }
}
