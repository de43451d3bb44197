//! Abstraction traits used by the transport layer (CAN bus, K-line UART,
//! J1850 pulse engine, timer, and reply sink), plus the bounded-wait helper.
pub mod can_bus;
pub mod obd_timer;
pub mod pulse_bus;
pub mod reply_sink;
pub mod serial_bus;

use futures_util::future::{select, Either};
use futures_util::pin_mut;
use obd_timer::ObdTimer;

/// Race `operation` against a millisecond deadline.
///
/// Returns `None` when the deadline fires first, otherwise the operation's
/// output. The losing future is dropped, so a pending receive is simply
/// abandoned.
pub async fn with_deadline<T, F>(timer: &mut T, millis: u32, operation: F) -> Option<F::Output>
where
    T: ObdTimer,
    F: core::future::Future,
{
    let deadline = timer.delay_ms(millis);
    pin_mut!(deadline);
    pin_mut!(operation);

    match select(deadline, operation).await {
        Either::Left(_) => None,
        Either::Right((output, _)) => Some(output),
    }
}
