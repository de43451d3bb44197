//! High-level components of the OBD-II protocol stack: message framing,
//! the per-protocol adapters (K-line, ISO 15765, J1850), the session
//! coordinator, and the transport layer underneath them.
pub mod framing;
pub mod isocan;
pub mod j1850;
pub mod kline;
pub mod session;
pub mod transport;
