//! Asynchronous timer abstraction providing the timing primitives the bus
//! state machines depend on, plus the default `embassy-time` implementation.
use embassy_time::{Duration, Instant, Timer};
use futures_util::Future;

/// Timer trait abstraction; must remain thread-safe when applicable.
pub trait ObdTimer {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms(&mut self, millis: u32) -> impl Future<Output = ()> + '_;

    /// Asynchronously wait for `micros` microseconds.
    fn delay_us(&mut self, micros: u32) -> impl Future<Output = ()> + '_;

    /// Monotonic millisecond clock used to compute protocol deadlines.
    fn now_ms(&self) -> u64;
}

/// [`ObdTimer`] backed by the `embassy-time` driver of the target.
#[derive(Default)]
pub struct EmbassyTimer;

impl ObdTimer for EmbassyTimer {
    fn delay_ms(&mut self, millis: u32) -> impl Future<Output = ()> + '_ {
        Timer::after(Duration::from_millis(millis as u64))
    }

    fn delay_us(&mut self, micros: u32) -> impl Future<Output = ()> + '_ {
        Timer::after(Duration::from_micros(micros as u64))
    }

    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}
