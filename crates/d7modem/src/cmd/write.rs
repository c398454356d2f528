use std::time::Instant;

use d7modem_driver::NoCallbacks;

use crate::cmd::{open_modem, WriteArgs};
use crate::exit::{modem_error, status_code, CliResult};
use crate::output::{print_report, CommandReport, OutputFormat};

pub fn run(args: WriteArgs, format: OutputFormat) -> CliResult<i32> {
    let modem = open_modem(&args.link, NoCallbacks)?;
    let started = Instant::now();
    let status = modem
        .write_file(args.file_id, args.offset, &args.data.0)
        .map_err(|err| modem_error("write failed", err))?;

    let report = CommandReport::new("write", status, started.elapsed())
        .with_file(args.file_id, args.offset)
        .with_data(&args.data.0);
    print_report(&report, format);
    Ok(status_code(status))
}
