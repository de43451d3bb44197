//! Session supervisor built on top of [`ObdProfile`].
//!
//! It keeps the profile state machine alive and offers:
//!
//! * a command handle (`SessionHandle`) to queue requests and control
//!   operations;
//! * a reply receiver (`SessionReplies`) returning the rendered lines.
//!
//! Firmware provides pre-allocated [`embassy_sync::Channel`] instances. No
//! allocation is performed by the library and there is no dependency on a
//! particular BSP.

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Receiver, Sender},
};
use futures_util::{future::select, future::Either, pin_mut};

use crate::config::AdapterConfig;
use crate::core::{Protocol, ReplyLine};
use crate::protocol::session::{ObdProfile, SessionError};
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::obd_timer::ObdTimer;
use crate::protocol::transport::traits::pulse_bus::PulseBus;
use crate::protocol::transport::traits::reply_sink::ReplySink;
use crate::protocol::transport::traits::serial_bus::SerialBus;

/// Idle-loop granularity; the K-line keep-alive fires from this tick.
const HEARTBEAT_TICK_MS: u32 = 100;

/// Commands queued by producer tasks.
#[derive(Clone)]
pub enum SessionCommand {
    /// One hex-encoded OBD request line.
    Request(ReplyLine),
    /// Explicit protocol selection; closes the previous session.
    SetProtocol(Protocol),
    CloseProtocol,
    Describe,
    DescribeNum,
    KwDisplay,
    DumpBuffer,
    WiringCheck,
}

/// Service assembling the supervisor components.
pub struct SessionService<'a, S, C, P, T, F, const CMD_CAP: usize, const LINE_CAP: usize>
where
    S: SerialBus,
    C: CanBus,
    P: PulseBus,
    T: ObdTimer,
    F: AdapterConfig,
{
    profile: ObdProfile<S, C, P, T>,
    config: &'a F,
    tick_timer: T,
    command_channel: &'a Channel<CriticalSectionRawMutex, SessionCommand, CMD_CAP>,
    reply_channel: &'a Channel<CriticalSectionRawMutex, ReplyLine, LINE_CAP>,
}

impl<'a, S, C, P, T, F, const CMD_CAP: usize, const LINE_CAP: usize>
    SessionService<'a, S, C, P, T, F, CMD_CAP, LINE_CAP>
where
    S: SerialBus,
    C: CanBus,
    P: PulseBus,
    T: ObdTimer,
    F: AdapterConfig,
{
    /// Wrap an already-initialised [`ObdProfile`].
    pub fn new(
        profile: ObdProfile<S, C, P, T>,
        config: &'a F,
        tick_timer: T,
        command_channel: &'a Channel<CriticalSectionRawMutex, SessionCommand, CMD_CAP>,
        reply_channel: &'a Channel<CriticalSectionRawMutex, ReplyLine, LINE_CAP>,
    ) -> Self {
        Self {
            profile,
            config,
            tick_timer,
            command_channel,
            reply_channel,
        }
    }

    /// Split into handle/receiver/runner components.
    pub fn into_parts(self) -> SessionServiceParts<'a, S, C, P, T, F, CMD_CAP, LINE_CAP> {
        SessionServiceParts {
            handle: SessionHandle {
                sender: self.command_channel.sender(),
            },
            replies: SessionReplies {
                receiver: self.reply_channel.receiver(),
            },
            runner: SessionRunner {
                profile: self.profile,
                config: self.config,
                tick_timer: self.tick_timer,
                command_channel: self.command_channel,
                reply_channel: self.reply_channel,
            },
        }
    }
}

/// Bundle returned by [`SessionService::into_parts`].
pub struct SessionServiceParts<'a, S, C, P, T, F, const CMD_CAP: usize, const LINE_CAP: usize>
where
    S: SerialBus,
    C: CanBus,
    P: PulseBus,
    T: ObdTimer,
    F: AdapterConfig,
{
    pub handle: SessionHandle<'a, CMD_CAP>,
    pub replies: SessionReplies<'a, LINE_CAP>,
    pub runner: SessionRunner<'a, S, C, P, T, F, CMD_CAP, LINE_CAP>,
}

/// Runner that drives the supervisor loop.
pub struct SessionRunner<'a, S, C, P, T, F, const CMD_CAP: usize, const LINE_CAP: usize>
where
    S: SerialBus,
    C: CanBus,
    P: PulseBus,
    T: ObdTimer,
    F: AdapterConfig,
{
    profile: ObdProfile<S, C, P, T>,
    config: &'a F,
    tick_timer: T,
    command_channel: &'a Channel<CriticalSectionRawMutex, SessionCommand, CMD_CAP>,
    reply_channel: &'a Channel<CriticalSectionRawMutex, ReplyLine, LINE_CAP>,
}

impl<'a, S, C, P, T, F, const CMD_CAP: usize, const LINE_CAP: usize>
    SessionRunner<'a, S, C, P, T, F, CMD_CAP, LINE_CAP>
where
    S: SerialBus,
    C: CanBus,
    P: PulseBus,
    T: ObdTimer,
    F: AdapterConfig,
{
    pub async fn drive(mut self) -> Result<(), SessionError<S, C, P>> {
        let command_channel = self.command_channel;
        let mut sink = ChannelSink {
            pending: ReplyLine::new(),
            sender: self.reply_channel.sender(),
        };

        loop {
            let command = {
                let cmd_future = command_channel.receive();
                let tick_future = self.tick_timer.delay_ms(HEARTBEAT_TICK_MS);
                pin_mut!(cmd_future);
                pin_mut!(tick_future);

                match select(cmd_future, tick_future).await {
                    Either::Left((command, pending_tick)) => {
                        drop(pending_tick);
                        Some(command)
                    }
                    Either::Right(((), pending_cmd)) => {
                        drop(pending_cmd);
                        None
                    }
                }
            };

            match command {
                Some(command) => self.handle_command(command, &mut sink).await?,
                None => self.profile.send_heartbeat(self.config).await?,
            }
        }
    }

    async fn handle_command<R: ReplySink>(
        &mut self,
        command: SessionCommand,
        sink: &mut R,
    ) -> Result<(), SessionError<S, C, P>> {
        match command {
            SessionCommand::Request(line) => {
                self.profile.on_request(line.as_str(), self.config, sink).await
            }
            SessionCommand::SetProtocol(protocol) => {
                self.profile.set_protocol(protocol, true, self.config)
            }
            SessionCommand::CloseProtocol => {
                self.profile.close_protocol();
                Ok(())
            }
            SessionCommand::Describe => {
                self.profile.description(self.config, sink);
                Ok(())
            }
            SessionCommand::DescribeNum => {
                self.profile.description_num(self.config, sink);
                Ok(())
            }
            SessionCommand::KwDisplay => {
                self.profile.kw_display(sink);
                Ok(())
            }
            SessionCommand::DumpBuffer => {
                self.profile.dump_buffer(sink);
                Ok(())
            }
            SessionCommand::WiringCheck => self.profile.wiring_check(sink).await,
        }
    }
}

/// Command handle for producer tasks.
pub struct SessionHandle<'a, const CMD_CAP: usize> {
    sender: Sender<'a, CriticalSectionRawMutex, SessionCommand, CMD_CAP>,
}

impl<'a, const CMD_CAP: usize> SessionHandle<'a, CMD_CAP> {
    /// Queue one hex-encoded request line.
    pub async fn request(&self, cmd: &str) {
        let mut line = ReplyLine::new();
        line.push_str(cmd);
        self.sender.send(SessionCommand::Request(line)).await;
    }

    pub async fn send(&self, command: SessionCommand) {
        self.sender.send(command).await;
    }
}

/// Receiver returning the rendered reply lines.
pub struct SessionReplies<'a, const LINE_CAP: usize> {
    receiver: Receiver<'a, CriticalSectionRawMutex, ReplyLine, LINE_CAP>,
}

impl<'a, const LINE_CAP: usize> SessionReplies<'a, LINE_CAP> {
    pub async fn recv(&mut self) -> ReplyLine {
        self.receiver.receive().await
    }
}

/// Sink pushing completed lines into the reply channel. Partial fragments
/// (init progress dots) accumulate until the line is terminated; a full
/// channel drops the line rather than stall the protocol timing.
struct ChannelSink<'a, const LINE_CAP: usize> {
    pending: ReplyLine,
    sender: Sender<'a, CriticalSectionRawMutex, ReplyLine, LINE_CAP>,
}

impl<'a, const LINE_CAP: usize> ReplySink for ChannelSink<'a, LINE_CAP> {
    fn send_partial(&mut self, s: &str) {
        self.pending.push_str(s);
    }

    fn send_line(&mut self, s: &str) {
        self.pending.push_str(s);
        let line = self.pending;
        self.pending.clear();
        let _ = self.sender.try_send(line);
    }
}
