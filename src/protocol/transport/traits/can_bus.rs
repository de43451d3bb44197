//! Minimal abstraction for an asynchronous CAN controller. Allows the
//! library to plug into various implementations (embedded HAL, desktop
//! driver, test double).
use crate::protocol::transport::can_frame::CanFrame;
use futures_util::Future;

/// Contract to send and receive CAN frames asynchronously.
pub trait CanBus {
    type Error: core::fmt::Debug;

    /// Emit a frame on the bus. Asynchronous to accommodate non-blocking drivers.
    fn send<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + 'a;

    /// Retrieve the next accepted frame. Asynchronously waits until data arrives.
    fn recv<'a>(&'a mut self) -> impl core::future::Future<Output = Result<CanFrame, Self::Error>> + 'a;

    /// Program the acceptance filter. Frames whose identifier does not match
    /// `filter` under `mask` must never reach [`CanBus::recv`].
    fn set_filter(&mut self, filter: u32, mask: u32, extended: bool) -> Result<(), Self::Error>;

    /// Switch the transceiver between controller mode and direct pin control
    /// (wiring test only).
    fn set_bit_bang(&mut self, enable: bool);

    /// Drive the bus level directly (bit-bang mode only).
    fn set_bit(&mut self, level: bool);

    /// Sample the bus level.
    fn get_bit(&self) -> bool;
}
