//! K-line UART abstraction. The same pin doubles as a bit-banged GPIO
//! during the 5-baud slow init, so the trait exposes both personalities.
use futures_util::Future;

/// Contract for the half-duplex K-line transceiver.
///
/// The K-line is a single-wire bus: every transmitted byte is looped back
/// by the transceiver. Implementations read the echo and report whether it
/// matched, which the init sequences use as a wiring check.
pub trait SerialBus {
    type Error: core::fmt::Debug;

    /// Transmit one byte and consume its echo. Returns `true` when the echo
    /// matched the transmitted byte.
    fn send(&mut self, byte: u8) -> impl Future<Output = Result<bool, Self::Error>> + '_;

    /// Wait for and return the next received byte.
    fn recv(&mut self) -> impl Future<Output = Result<u8, Self::Error>> + '_;

    /// Switch the pin between UART mode and direct GPIO control.
    fn set_bit_bang(&mut self, enable: bool);

    /// Drive the K-line level directly (bit-bang mode only).
    fn set_bit(&mut self, level: bool);

    /// Sample the K-line level.
    fn get_bit(&self) -> bool;

    /// Discard any pending received bytes.
    fn clear(&mut self);
}
