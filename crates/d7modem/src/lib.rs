//! Host driver for DASH7/LoRaWAN radio modems on a serial link.
//!
//! d7modem frames ALP commands over a UART-class byte stream, reassembles
//! and verifies the modem's replies on a background worker, and correlates
//! tagged responses with the single command in flight.
//!
//! # Crate Structure
//!
//! - [`transport`] — Serial link handle (tty device or Unix socket)
//! - [`frame`] — Wire framing, CRC, ingress queue and receive pipeline
//! - [`alp`] — ALP action codec and interface session configuration
//! - [`driver`] — Command correlation and the `Modem` session (behind `driver` feature)

/// Re-export transport types.
pub mod transport {
    pub use d7modem_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use d7modem_frame::*;
}

/// Re-export action codec types.
pub mod alp {
    pub use d7modem_alp::*;
}

/// Re-export driver types (requires `driver` feature).
#[cfg(feature = "driver")]
pub mod driver {
    pub use d7modem_driver::*;
}
