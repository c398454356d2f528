use std::time::Instant;

use d7modem_driver::NoCallbacks;

use crate::cmd::{open_modem, ReadArgs};
use crate::exit::{modem_error, status_code, CliError, CliResult, USAGE};
use crate::output::{print_report, CommandReport, OutputFormat};

/// Largest read that fits one return-file-data action in a modem frame.
const MAX_READ_LENGTH: u32 = 240;

pub fn run(args: ReadArgs, format: OutputFormat) -> CliResult<i32> {
    if args.length == 0 || args.length > MAX_READ_LENGTH {
        return Err(CliError::new(
            USAGE,
            format!("--length must be between 1 and {MAX_READ_LENGTH}"),
        ));
    }

    let modem = open_modem(&args.link, NoCallbacks)?;
    let mut response = vec![0u8; args.length as usize];
    let started = Instant::now();
    let status = modem
        .read_file(args.file_id, args.offset, args.length, &mut response)
        .map_err(|err| modem_error("read failed", err))?;

    let mut report =
        CommandReport::new("read", status, started.elapsed()).with_file(args.file_id, args.offset);
    if status.is_success() {
        report = report.with_data(&response);
    }
    print_report(&report, format);
    Ok(status_code(status))
}
