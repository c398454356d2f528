mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "d7modem", version, about = "DASH7/LoRaWAN serial modem CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_defaults_to_uid() {
        let cli = Cli::try_parse_from(["d7modem", "read", "/dev/ttyACM0"])
            .expect("read args should parse");

        let Command::Read(args) = cli.command else {
            panic!("expected read");
        };
        assert_eq!((args.file_id, args.offset, args.length), (0, 0, 8));
        assert_eq!(args.link.timeout, "30s");
    }

    #[test]
    fn write_requires_data() {
        let err = Cli::try_parse_from(["d7modem", "write", "/dev/ttyACM0", "--file-id", "0x40"])
            .expect_err("missing --data should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn write_rejects_bad_hex() {
        let err = Cli::try_parse_from([
            "d7modem",
            "write",
            "/dev/ttyACM0",
            "--file-id",
            "0x40",
            "--data",
            "xyz",
        ])
        .expect_err("invalid hex should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_push_subcommand() {
        let cli = Cli::try_parse_from([
            "d7modem",
            "push",
            "/tmp/modem.sock",
            "--interval",
            "500ms",
            "--count",
            "3",
            "--log-level",
            "debug",
        ])
        .expect("push args should parse");

        assert_eq!(cli.log_level, LogLevel::Debug);
        let Command::Push(args) = cli.command else {
            panic!("expected push");
        };
        assert_eq!(args.file_id, 0x40);
        assert_eq!(args.count, Some(3));
    }
}
