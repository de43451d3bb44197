//! J1850 pulse engine abstraction: microsecond-resolution symbol output
//! and edge-to-edge width measurement over the VPW or PWM pair.
use futures_util::Future;

/// Contract for the bit-banged J1850 front end.
///
/// Transmit is expressed as direct level control plus timed symbol pairs;
/// receive as the measured width between consecutive relevant edges. The
/// implementation owns the microsecond capture hardware so the protocol
/// layer never counts cycles itself.
pub trait PulseBus {
    type Error: core::fmt::Debug;

    /// Claim the bus pins. `vpw` selects the single-wire VPW drive;
    /// otherwise the differential PWM pair is used.
    fn open(&mut self, vpw: bool) -> Result<(), Self::Error>;

    /// Release the bus to its passive state and cancel any armed capture.
    fn stop(&mut self);

    /// Drive the bus active (`true`) or passive (`false`) immediately.
    fn set_bit(&mut self, active: bool);

    /// Sample the bus state. `true` means active.
    fn get_bit(&self) -> bool;

    /// Wait until the bus has been passive for `idle_us` microseconds.
    fn wait_idle(&mut self, idle_us: u32) -> impl Future<Output = Result<(), Self::Error>> + '_;

    /// Emit one symbol: active for `active_us`, then passive for `passive_us`.
    fn pulse_pair(
        &mut self,
        active_us: u32,
        passive_us: u32,
    ) -> impl Future<Output = Result<(), Self::Error>> + '_;

    /// Wait for the next active pulse and return its width, clamped to
    /// `max_us`. Start-of-frame detection loops on this until the width
    /// reaches the SOF minimum.
    fn wait_sof(&mut self, max_us: u32) -> impl Future<Output = Result<u32, Self::Error>> + '_;

    /// Bound subsequent [`PulseBus::wait_edge`] calls to `timeout_us`.
    fn set_rx_timeout(&mut self, timeout_us: u32);

    /// Wait for the next relevant edge and return the width since the
    /// previous one, or `None` on receive timeout (end of frame).
    fn wait_edge(&mut self) -> impl Future<Output = Result<Option<u32>, Self::Error>> + '_;
}
