use std::fmt;
use std::io;

use d7modem_driver::{ModemError, ModemStatus};
use d7modem_frame::FrameError;
use d7modem_transport::TransportError;

pub const SUCCESS: i32 = 0;
/// The modem completed the command but reported an error.
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
/// Another command is still in flight (EX_TEMPFAIL).
pub const BUSY: i32 = 75;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Exit code for a finished command.
pub fn status_code(status: ModemStatus) -> i32 {
    match status {
        ModemStatus::CompletedSuccess | ModemStatus::Processing => SUCCESS,
        ModemStatus::CompletedError => FAILURE,
        ModemStatus::Busy => BUSY,
        ModemStatus::Timeout => TIMEOUT,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn modem_error(context: &str, err: ModemError) -> CliError {
    match err {
        ModemError::Transport(err) => transport_error(context, err),
        ModemError::Frame(err) => frame_error(context, err),
        ModemError::Alp(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ModemError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_distinct_codes() {
        assert_eq!(status_code(ModemStatus::CompletedSuccess), SUCCESS);
        assert_eq!(status_code(ModemStatus::CompletedError), FAILURE);
        assert_eq!(status_code(ModemStatus::Busy), BUSY);
        assert_eq!(status_code(ModemStatus::Timeout), TIMEOUT);
    }

    #[test]
    fn missing_device_is_a_transport_error() {
        let err = TransportError::Open {
            path: "/dev/ttyNOPE".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let cli = modem_error("open failed", ModemError::Transport(err));
        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.starts_with("open failed: "));
    }

    #[test]
    fn oversized_payload_is_invalid_data() {
        let err = ModemError::PayloadTooLarge {
            size: 300,
            max: 255,
        };
        assert_eq!(modem_error("write failed", err).code, DATA_INVALID);
    }
}
