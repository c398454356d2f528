use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use d7modem_alp::SessionConfig;
use d7modem_driver::{Modem, ModemCallbacks, ModemConfig};
use d7modem_transport::{LinkConfig, SerialLink, DEFAULT_BAUDRATE};
use tracing::debug;

use crate::exit::{io_error, modem_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod ping;
pub mod push;
pub mod read;
pub mod version;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read a file from the modem (defaults to the 8-byte UID in file 0).
    Read(ReadArgs),
    /// Write data to a modem file.
    Write(WriteArgs),
    /// Periodically push a counter as unsolicited file data.
    Push(PushArgs),
    /// Ping the modem and wait for its response.
    Ping(PingArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Read(args) => read::run(args, format),
        Command::Write(args) => write::run(args, format),
        Command::Push(args) => push::run(args, format),
        Command::Ping(args) => ping::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Modem device (tty node) or simulated modem socket.
    pub device: PathBuf,
    /// Line speed of the serial link.
    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    pub baudrate: u32,
    /// Maximum time to wait for the modem to complete a command (e.g. 5s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// File to read.
    #[arg(long, default_value = "0", value_parser = parse_u8)]
    pub file_id: u8,
    /// Byte offset within the file.
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
    /// Number of bytes to read.
    #[arg(long, default_value_t = 8)]
    pub length: u32,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// File to write.
    #[arg(long, value_parser = parse_u8)]
    pub file_id: u8,
    /// Byte offset within the file.
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
    /// Data to write, hex encoded (e.g. 0a0b0c).
    #[arg(long, value_parser = parse_hex)]
    pub data: HexBytes,
}

#[derive(Args, Debug)]
pub struct PushArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// File the pushed value is reported as.
    #[arg(long, default_value = "0x40", value_parser = parse_u8)]
    pub file_id: u8,
    /// Session configuration (JSON). Default: D7AP broadcast.
    #[arg(long, value_name = "FILE")]
    pub session: Option<PathBuf>,
    /// Time between pushes (e.g. 20s, 500ms).
    #[arg(long, default_value = "20s")]
    pub interval: String,
    /// Stop after N pushes.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Bytes given as a hex string on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

fn parse_hex(input: &str) -> Result<HexBytes, String> {
    let digits = input.trim().trim_start_matches("0x");
    if digits.is_empty() || !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(format!("expected an even number of hex digits, got {input:?}"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|at| {
            u8::from_str_radix(&digits[at..at + 2], 16)
                .map_err(|_| format!("invalid hex byte {:?}", &digits[at..at + 2]))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(HexBytes)
}

fn parse_u8(input: &str) -> Result<u8, String> {
    let parsed = match input.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid file id {input:?}: {err}"))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Open the link and start a modem session on it.
pub(crate) fn open_modem(
    link: &LinkArgs,
    callbacks: impl ModemCallbacks + 'static,
) -> CliResult<Modem> {
    let config = ModemConfig {
        command_timeout: parse_duration(&link.timeout)?,
        ..ModemConfig::default()
    };
    let link_config = LinkConfig {
        baudrate: link.baudrate,
        ..LinkConfig::default()
    };
    let serial = SerialLink::open(&link.device, link_config)
        .map_err(|err| transport_error("open failed", err))?;
    debug!(device = %link.device.display(), "link open");
    Modem::open(serial, config, callbacks).map_err(|err| modem_error("start failed", err))
}

pub(crate) fn load_session(path: Option<&Path>) -> CliResult<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::D7ap(Default::default()));
    };
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            USAGE,
            format!("{} is not a valid session configuration: {err}", path.display()),
        )
    })
}
