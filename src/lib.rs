//! `obd-proto` library: protocol core of an ELM327-style OBD-II diagnostic
//! adapter in a `no_std` environment. The crate exposes the infrastructure
//! modules (hex rendering), the protocol logic (message framing, K-line,
//! ISO 15765 and J1850 adapters, session coordination), and the transport
//! traits a firmware implements for its hardware.
#![no_std]
/// Core data types shared across the adapter: protocols, statuses, the
/// reply line buffer.
pub mod core;
/// Adapter configuration surface: the properties the session reads from
/// the host's settings store.
pub mod config;
/// Domain and low-level errors (hex parsing, transport faults).
pub mod error;
/// ASCII rendering and parsing helpers.
pub mod infra;
/// OBD-II protocol implementation: framing, adapters, session coordination,
/// transport traits.
pub mod protocol;
