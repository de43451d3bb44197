//! Error definitions shared across library modules. Protocol-level failures
//! travel as [`crate::core::Reply`] status codes; the enums here carry the
//! faults of the transport collaborators underneath them.
use thiserror_no_std::Error;

/// Errors raised while parsing a hex request string.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HexError {
    /// A character outside `[0-9A-Fa-f]` (and space) was found.
    #[error("Invalid hex digit")]
    InvalidDigit,
    /// The string holds an odd number of hex digits.
    #[error("Odd number of hex digits")]
    OddLength,
    /// More bytes than the destination buffer can take.
    #[error("Request too long")]
    Overflow,
}

/// Transport fault surfaced by a coordinator operation, tagged with the
/// collaborator that produced it.
#[derive(Error, Debug)]
pub enum ProfileError<C: core::fmt::Debug, S: core::fmt::Debug, P: core::fmt::Debug> {
    /// CAN controller fault.
    #[error("CAN transport error: {0:?}")]
    Can(C),

    /// K-line UART fault.
    #[error("Serial transport error: {0:?}")]
    Serial(S),

    /// Pulse-timing hardware fault.
    #[error("Pulse transport error: {0:?}")]
    Pulse(P),
}
