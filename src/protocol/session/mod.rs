//! Session coordinator: owns one adapter state machine per protocol family
//! plus the transports underneath them, tracks which adapter is active,
//! drives connect-on-demand and the auto-detect cascade, and renders every
//! operation status into its fixed reply line.
use crate::config::{AdapterConfig, BoolProp};
use crate::core::{AdapterKind, Protocol, Reply, OBD_IN_MSG_DLEN, OBD_IN_MSG_LEN};
use crate::error::ProfileError;
use crate::infra::hex;
use crate::protocol::isocan::{CanMode, IsoCanAdapter};
use crate::protocol::j1850::pwm::PwmAdapter;
use crate::protocol::j1850::vpw::VpwAdapter;
use crate::protocol::kline::IsoSerialAdapter;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::obd_timer::ObdTimer;
use crate::protocol::transport::traits::pulse_bus::PulseBus;
use crate::protocol::transport::traits::reply_sink::ReplySink;
use crate::protocol::transport::traits::serial_bus::SerialBus;

pub mod supervisor;

/// Request that, when it is what triggered a connect, has already been
/// answered by the probe the connect sent.
const OBD_TEST_SEQ: &str = "0100";

/// Coordinator error: the fault of whichever transport an operation was
/// driving when it failed.
pub type SessionError<S, C, P> = ProfileError<
    <C as CanBus>::Error,
    <S as SerialBus>::Error,
    <P as PulseBus>::Error,
>;

/// The profile owns the transports, the timer, and one instance of every
/// adapter state machine; exactly one adapter is active at a time.
pub struct ObdProfile<S, C, P, T> {
    serial: S,
    can: C,
    pulse: P,
    timer: T,
    iso: IsoSerialAdapter,
    can11: IsoCanAdapter,
    can29: IsoCanAdapter,
    vpw: VpwAdapter,
    pwm: PwmAdapter,
    active: AdapterKind,
    iso_requested: Protocol,
}

impl<S, C, P, T> ObdProfile<S, C, P, T>
where
    S: SerialBus,
    C: CanBus,
    P: PulseBus,
    T: ObdTimer,
{
    pub fn new(serial: S, can: C, pulse: P, timer: T) -> Self {
        Self {
            serial,
            can,
            pulse,
            timer,
            iso: IsoSerialAdapter::new(),
            can11: IsoCanAdapter::new(CanMode::Standard11),
            can29: IsoCanAdapter::new(CanMode::Extended29),
            vpw: VpwAdapter::new(),
            pwm: PwmAdapter::new(),
            active: AdapterKind::Auto,
            iso_requested: Protocol::Auto,
        }
    }

    /// The protocol the active adapter reports.
    pub fn protocol(&self) -> Protocol {
        match self.active {
            AdapterKind::Auto => Protocol::Auto,
            AdapterKind::Pwm => self.pwm.protocol(),
            AdapterKind::Vpw => self.vpw.protocol(),
            AdapterKind::IsoSerial => self.iso.protocol(),
            AdapterKind::Can11 => self.can11.protocol(),
            AdapterKind::Can29 => self.can29.protocol(),
        }
    }

    /// Whether the active adapter holds an open session.
    pub fn is_connected(&self) -> bool {
        match self.active {
            AdapterKind::Auto => false,
            AdapterKind::Pwm => self.pwm.is_connected(),
            AdapterKind::Vpw => self.vpw.is_connected(),
            AdapterKind::IsoSerial => self.iso.is_connected(),
            AdapterKind::Can11 => self.can11.is_connected(),
            AdapterKind::Can29 => self.can29.is_connected(),
        }
    }

    /// Select the active adapter. With `refresh` set (an explicit protocol
    /// switch) the previous adapter is closed and the new one opened; the
    /// adopt-after-connect path passes `refresh = false` and leaves the
    /// session untouched.
    pub fn set_protocol<F: AdapterConfig>(
        &mut self,
        protocol: Protocol,
        refresh: bool,
        config: &F,
    ) -> Result<(), SessionError<S, C, P>> {
        let previous = self.active;
        self.active = match protocol {
            Protocol::Auto => {
                self.iso_requested = Protocol::Auto;
                AdapterKind::Auto
            }
            Protocol::J1850Pwm => AdapterKind::Pwm,
            Protocol::J1850Vpw => AdapterKind::Vpw,
            Protocol::Iso9141 | Protocol::Iso14230Slow | Protocol::Iso14230 => {
                if refresh {
                    self.iso_requested = protocol;
                }
                AdapterKind::IsoSerial
            }
            Protocol::IsoCan11 => AdapterKind::Can11,
            Protocol::IsoCan29 => AdapterKind::Can29,
        };

        if refresh && previous != self.active {
            self.close_kind(previous);
            self.open_kind(self.active, config)?;
        }
        Ok(())
    }

    fn close_kind(&mut self, kind: AdapterKind) {
        match kind {
            AdapterKind::Auto => {}
            AdapterKind::Pwm => self.pwm.close(),
            AdapterKind::Vpw => self.vpw.close(),
            AdapterKind::IsoSerial => self.iso.close(),
            AdapterKind::Can11 => self.can11.close(),
            AdapterKind::Can29 => self.can29.close(),
        }
    }

    fn open_kind<F: AdapterConfig>(
        &mut self,
        kind: AdapterKind,
        config: &F,
    ) -> Result<(), SessionError<S, C, P>> {
        match kind {
            AdapterKind::Auto | AdapterKind::IsoSerial => Ok(()),
            AdapterKind::Pwm => self.pulse.open(false).map_err(ProfileError::Pulse),
            AdapterKind::Vpw => self.pulse.open(true).map_err(ProfileError::Pulse),
            AdapterKind::Can11 => self
                .can11
                .open(&mut self.can, config)
                .map_err(ProfileError::Can),
            AdapterKind::Can29 => self
                .can29
                .open(&mut self.can, config)
                .map_err(ProfileError::Can),
        }
    }

    /// Close the active session without touching the adapter selection.
    pub fn close_protocol(&mut self) {
        self.close_kind(self.active);
    }

    /// Connect one concrete adapter; returns the negotiated protocol on
    /// success.
    async fn connect_kind<F, R>(
        &mut self,
        kind: AdapterKind,
        config: &F,
        sink: &mut R,
        send_reply: bool,
    ) -> Result<Option<Protocol>, SessionError<S, C, P>>
    where
        F: AdapterConfig,
        R: ReplySink,
    {
        match kind {
            AdapterKind::Auto => Ok(None),
            AdapterKind::Pwm => {
                self.pwm
                    .connect(&mut self.pulse, &mut self.timer, config, sink, send_reply)
                    .await
                    .map_err(ProfileError::Pulse)?;
                Ok(self.pwm.is_connected().then(|| self.pwm.protocol()))
            }
            AdapterKind::Vpw => {
                self.vpw
                    .connect(&mut self.pulse, &mut self.timer, config, sink, send_reply)
                    .await
                    .map_err(ProfileError::Pulse)?;
                Ok(self.vpw.is_connected().then(|| self.vpw.protocol()))
            }
            AdapterKind::IsoSerial => {
                self.iso
                    .connect(
                        self.iso_requested,
                        &mut self.serial,
                        &mut self.timer,
                        config,
                        sink,
                    )
                    .await
                    .map_err(ProfileError::Serial)?;
                Ok(self.iso.is_connected().then(|| self.iso.protocol()))
            }
            AdapterKind::Can11 => {
                self.can11
                    .connect(&mut self.can, &mut self.timer, config, sink, send_reply)
                    .await
                    .map_err(ProfileError::Can)?;
                Ok(self.can11.is_connected().then(|| self.can11.protocol()))
            }
            AdapterKind::Can29 => {
                self.can29
                    .connect(&mut self.can, &mut self.timer, config, sink, send_reply)
                    .await
                    .map_err(ProfileError::Can)?;
                Ok(self.can29.is_connected().then(|| self.can29.protocol()))
            }
        }
    }

    /// Auto-detect cascade: strictly sequential, first success wins.
    async fn connect_auto<F, R>(
        &mut self,
        config: &F,
        sink: &mut R,
        send_reply: bool,
    ) -> Result<Option<Protocol>, SessionError<S, C, P>>
    where
        F: AdapterConfig,
        R: ReplySink,
    {
        const CASCADE: [AdapterKind; 5] = [
            AdapterKind::Pwm,
            AdapterKind::Vpw,
            AdapterKind::IsoSerial,
            AdapterKind::Can11,
            AdapterKind::Can29,
        ];

        for kind in CASCADE {
            if let Some(protocol) = self.connect_kind(kind, config, sink, send_reply).await? {
                #[cfg(feature = "defmt")]
                defmt::info!("auto-detect adopted protocol {}", protocol.number());

                return Ok(Some(protocol));
            }
        }
        Ok(None)
    }

    /// Delegate one framed request to the active adapter.
    async fn request_active<F, R>(
        &mut self,
        data: &[u8],
        config: &F,
        sink: &mut R,
    ) -> Result<Reply, SessionError<S, C, P>>
    where
        F: AdapterConfig,
        R: ReplySink,
    {
        match self.active {
            AdapterKind::Auto => Ok(Reply::NoData),
            AdapterKind::Pwm => self
                .pwm
                .on_request(data, &mut self.pulse, &mut self.timer, config, sink)
                .await
                .map_err(ProfileError::Pulse),
            AdapterKind::Vpw => self
                .vpw
                .on_request(data, &mut self.pulse, &mut self.timer, config, sink)
                .await
                .map_err(ProfileError::Pulse),
            AdapterKind::IsoSerial => self
                .iso
                .on_request(data, &mut self.serial, &mut self.timer, config, sink)
                .await
                .map_err(ProfileError::Serial),
            AdapterKind::Can11 => self
                .can11
                .on_request(data, &mut self.can, &mut self.timer, config, sink)
                .await
                .map_err(ProfileError::Can),
            AdapterKind::Can29 => self
                .can29
                .on_request(data, &mut self.can, &mut self.timer, config, sink)
                .await
                .map_err(ProfileError::Can),
        }
    }

    /// Request size ceiling: the OBD data length, one byte more for the
    /// K-line adapter (KWP allows an extra byte).
    fn send_length_check(&self, len: usize) -> bool {
        let mut max_len = OBD_IN_MSG_DLEN;
        if self.active == AdapterKind::IsoSerial {
            max_len += 1;
        }
        len != 0 && len <= max_len
    }

    /// Entry point for one hex-encoded request. Status rendering happens
    /// here; adapters only stream their own reply lines.
    pub async fn on_request<F, R>(
        &mut self,
        cmd: &str,
        config: &F,
        sink: &mut R,
    ) -> Result<(), SessionError<S, C, P>>
    where
        F: AdapterConfig,
        R: ReplySink,
    {
        let sts = self.on_request_impl(cmd, config, sink).await?;
        if let Some(message) = sts.message() {
            sink.send_line(message);
        }
        Ok(())
    }

    async fn on_request_impl<F, R>(
        &mut self,
        cmd: &str,
        config: &F,
        sink: &mut R,
    ) -> Result<Reply, SessionError<S, C, P>>
    where
        F: AdapterConfig,
        R: ReplySink,
    {
        // Oversized and malformed input never reaches a transport.
        if cmd.len() > OBD_IN_MSG_LEN * 2 {
            return Ok(Reply::CmdRejected);
        }
        let mut data = [0u8; OBD_IN_MSG_LEN];
        let Ok(len) = hex::to_bytes(cmd, &mut data) else {
            return Ok(Reply::CmdRejected);
        };
        if !self.send_length_check(len) {
            return Ok(Reply::CmdRejected);
        }

        // The regular flow stops here.
        if self.is_connected() {
            return self.request_active(&data[..len], config, sink).await;
        }

        // Connect on demand. When the request is the standard probe, the
        // connect itself produces the reply.
        let send_reply = cmd == OBD_TEST_SEQ;

        let protocol = if self.active == AdapterKind::Auto {
            self.connect_auto(config, sink, send_reply).await?
        } else {
            let mut protocol = self
                .connect_kind(self.active, config, sink, send_reply)
                .await?;
            if protocol.is_none() && config.bool_prop(BoolProp::UseAutoSp) {
                protocol = self.connect_auto(config, sink, send_reply).await?;
            }
            protocol
        };

        match protocol {
            Some(protocol) => {
                self.set_protocol(protocol, false, config)?;
                // K-line connects never forward the probe themselves, so
                // the request still has to go out.
                if !send_reply || protocol.is_kline() {
                    self.request_active(&data[..len], config, sink).await
                } else {
                    Ok(Reply::None)
                }
            }
            None => Ok(Reply::UnableToConnect),
        }
    }

    /// Protocol description of the active adapter ("ATDP").
    pub fn description<F: AdapterConfig, R: ReplySink>(&self, config: &F, sink: &mut R) {
        match self.active {
            AdapterKind::Auto => sink.send_line("AUTO"),
            AdapterKind::Pwm => self.pwm.description(config, sink),
            AdapterKind::Vpw => self.vpw.description(config, sink),
            AdapterKind::IsoSerial => self.iso.description(config, sink),
            AdapterKind::Can11 => self.can11.description(config, sink),
            AdapterKind::Can29 => self.can29.description(config, sink),
        }
    }

    /// Protocol number of the active adapter ("ATDPN").
    pub fn description_num<F: AdapterConfig, R: ReplySink>(&self, config: &F, sink: &mut R) {
        match self.active {
            AdapterKind::Auto => sink.send_line("0"),
            AdapterKind::Pwm => self.pwm.description_num(config, sink),
            AdapterKind::Vpw => self.vpw.description_num(config, sink),
            AdapterKind::IsoSerial => self.iso.description_num(config, sink),
            AdapterKind::Can11 => self.can11.description_num(config, sink),
            AdapterKind::Can29 => self.can29.description_num(config, sink),
        }
    }

    /// Render the active adapter's diagnostic history.
    pub fn dump_buffer<R: ReplySink>(&self, sink: &mut R) {
        match self.active {
            AdapterKind::Auto => {}
            AdapterKind::Pwm => {
                for line in self.pwm.history().dump() {
                    sink.send_line(line.as_str());
                }
            }
            AdapterKind::Vpw => {
                for line in self.vpw.history().dump() {
                    sink.send_line(line.as_str());
                }
            }
            AdapterKind::IsoSerial => {
                for line in self.iso.history().dump() {
                    sink.send_line(line.as_str());
                }
            }
            AdapterKind::Can11 => {
                for line in self.can11.history().dump() {
                    sink.send_line(line.as_str());
                }
            }
            AdapterKind::Can29 => {
                for line in self.can29.history().dump() {
                    sink.send_line(line.as_str());
                }
            }
        }
    }

    /// ISO keyword display; applies to the K-line adapter regardless of
    /// which adapter is active.
    pub fn kw_display<R: ReplySink>(&self, sink: &mut R) {
        self.iso.kw_display(sink);
    }

    /// Idle tick: forward to the K-line keep-alive when it is active.
    pub async fn send_heartbeat<F: AdapterConfig>(
        &mut self,
        config: &F,
    ) -> Result<(), SessionError<S, C, P>> {
        if self.active == AdapterKind::IsoSerial {
            self.iso
                .send_heartbeat(&mut self.serial, &mut self.timer, config)
                .await
                .map_err(ProfileError::Serial)?;
        }
        Ok(())
    }

    /// Loopback sweep across every physical front end.
    pub async fn wiring_check<R: ReplySink>(
        &mut self,
        sink: &mut R,
    ) -> Result<(), SessionError<S, C, P>> {
        self.pwm
            .wiring_check(&mut self.pulse, &mut self.timer, sink)
            .await
            .map_err(ProfileError::Pulse)?;
        self.vpw
            .wiring_check(&mut self.pulse, &mut self.timer, sink)
            .await
            .map_err(ProfileError::Pulse)?;
        self.iso
            .wiring_check(&mut self.serial, &mut self.timer, sink)
            .await;
        self.can11
            .wiring_check(&mut self.can, &mut self.timer, sink)
            .await;
        Ok(())
    }
}
