use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::Instant;

use d7modem_driver::{ModemCallbacks, ModemStatus};

use crate::cmd::{open_modem, parse_duration, PingArgs};
use crate::exit::{modem_error, status_code, CliResult};
use crate::output::{print_report, CommandReport, OutputFormat};

struct PingWatcher {
    responses: Mutex<Sender<()>>,
}

impl ModemCallbacks for PingWatcher {
    fn ping_response(&self) {
        if let Ok(responses) = self.responses.lock() {
            let _ = responses.send(());
        }
    }
}

fn watcher() -> (PingWatcher, Receiver<()>) {
    let (tx, rx) = mpsc::channel();
    (
        PingWatcher {
            responses: Mutex::new(tx),
        },
        rx,
    )
}

pub fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.link.timeout)?;
    let (callbacks, responses) = watcher();
    let modem = open_modem(&args.link, callbacks)?;

    let started = Instant::now();
    modem
        .send_ping()
        .map_err(|err| modem_error("ping failed", err))?;
    let status = match responses.recv_timeout(timeout) {
        Ok(()) => ModemStatus::CompletedSuccess,
        Err(_) => ModemStatus::Timeout,
    };

    print_report(&CommandReport::new("ping", status, started.elapsed()), format);
    Ok(status_code(status))
}
