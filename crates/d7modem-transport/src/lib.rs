//! Byte link abstraction for talking to a radio modem.
//!
//! The modem is reached over a UART-class byte stream. On a host this is
//! either a tty device node or, for simulation and testing, a Unix domain
//! socket standing in for the wire. Both are exposed through a single
//! [`SerialLink`] type implementing `Read + Write`.
//!
//! This is the lowest layer of d7modem. Line settings (baud rate, parity)
//! are owned by the platform; [`LinkConfig`] only records them.

pub mod error;
pub mod link;

pub use error::{Result, TransportError};
pub use link::{LinkConfig, SerialLink, DEFAULT_BAUDRATE};
