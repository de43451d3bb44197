//! SAE J1850 adapters: the VPW and PWM bit-banged protocols share their
//! reply filtering, timeout policy and wiring test; the per-encoding symbol
//! work lives in the submodules.
use crate::config::{AdapterConfig, IntProp};
use crate::core::ReplyLine;
use crate::protocol::transport::j1850::P2_J1850;
use crate::protocol::transport::traits::obd_timer::ObdTimer;
use crate::protocol::transport::traits::pulse_bus::PulseBus;
use crate::protocol::transport::traits::reply_sink::ReplySink;

pub mod pwm;
pub mod vpw;

/// Outcome of one bit-banged transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxStatus {
    /// Frame fully clocked out (and acknowledged, where the encoding has
    /// an in-frame response).
    Done,
    /// The bus never went idle, or no in-frame response arrived.
    Silent,
    /// Another node won arbitration mid-frame.
    Lost,
}

/// Outcome of one bit-banged reception attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxStatus {
    /// No start of frame before the deadline.
    Timeout,
    /// A frame was captured.
    Frame,
    /// A pulse fell outside the symbol tolerances.
    BusError,
}

/// P2 window: the configured timeout when set, the J1850 default otherwise.
fn p2_max_timeout<F: AdapterConfig>(config: &F) -> u32 {
    let timeout = config.int_prop(IntProp::Timeout);
    if timeout != 0 {
        timeout
    } else {
        P2_J1850
    }
}

/// A reply is only accepted when its second header byte is the request's
/// second byte plus one (the J1979 response-code convention).
fn expected_second_byte(request: &[u8]) -> u8 {
    request.get(1).copied().unwrap_or(0).wrapping_add(1)
}

/// Drive the bus both ways and read it back, reporting per-level failures.
async fn wiring_check_impl<P, T, R>(pulse: &mut P, timer: &mut T, sink: &mut R, name: &str)
where
    P: PulseBus,
    T: ObdTimer,
    R: ReplySink,
{
    let mut line = ReplyLine::new();

    pulse.set_bit(true);
    timer.delay_ms(1).await;
    if !pulse.get_bit() {
        line.push_str(name);
        line.push_str(" wiring failed [1->0]");
        sink.send_line(line.as_str());
    } else {
        pulse.set_bit(false);
        timer.delay_ms(1).await;
        line.push_str(name);
        if !pulse.get_bit() {
            line.push_str(" wiring is OK");
        } else {
            line.push_str(" wiring failed [0->1]");
        }
        sink.send_line(line.as_str());
    }

    pulse.set_bit(false);
}
