//! Host-side driver for a DASH7/LoRaWAN modem on a serial link.
//!
//! A [`Modem`] owns one session: it frames outgoing ALP commands, runs a
//! receive worker that reassembles and verifies incoming frames, and
//! correlates the modem's tagged responses with the single command in
//! flight.
//!
//! ```no_run
//! use d7modem_driver::{Modem, ModemConfig, NoCallbacks};
//! use d7modem_transport::{LinkConfig, SerialLink};
//!
//! # fn main() -> d7modem_driver::Result<()> {
//! let link = SerialLink::open("/dev/ttyACM0", LinkConfig::default())?;
//! let modem = Modem::open(link, ModemConfig::default(), NoCallbacks)?;
//!
//! let mut uid = [0u8; 8];
//! let status = modem.read_file(0x00, 0, 8, &mut uid)?;
//! println!("{status}: {uid:02x?}");
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod command;
pub mod completion;
pub mod config;
pub mod error;
pub mod forward;
pub mod modem;
pub mod status;

pub use callbacks::{ModemCallbacks, NoCallbacks};
pub use command::{CommandEngine, CommandKind, CommandMode, CommandStats, PendingCommand};
pub use completion::{Completer, Completion, WaitError};
pub use config::{ModemConfig, DEFAULT_COMMAND_TIMEOUT};
pub use error::{ModemError, Result};
pub use forward::{build_raw_unsolicited, build_unsolicited};
pub use modem::{Modem, ModemStats};
pub use status::ModemStatus;

pub use d7modem_alp::SessionConfig;
