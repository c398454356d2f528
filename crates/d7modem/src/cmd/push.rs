use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use d7modem_driver::{ModemStatus, NoCallbacks};
use tracing::{info, warn};

use crate::cmd::{load_session, open_modem, parse_duration, PushArgs};
use crate::exit::{modem_error, status_code, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_report, CommandReport, OutputFormat};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

pub fn run(args: PushArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let session = load_session(args.session.as_deref())?;
    let modem = open_modem(&args.link, NoCallbacks)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;
    info!(interface = ?session.interface(), file_id = args.file_id, "pushing sensor values");

    let mut value: u8 = 0;
    let mut pushed = 0u64;
    let mut last_failure: Option<ModemStatus> = None;

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        let status = modem
            .send_unsolicited(args.file_id, 0, &[value], &session)
            .map_err(|err| modem_error("push failed", err))?;

        let report = CommandReport::new("push", status, started.elapsed())
            .with_file(args.file_id, 0)
            .with_data(&[value])
            .with_sequence(pushed);
        print_report(&report, format);

        if status.is_success() {
            value = value.wrapping_add(1);
        } else {
            warn!(%status, "push failed, resetting command state");
            modem.reset();
            last_failure = Some(status);
        }

        pushed += 1;
        if args.count.is_some_and(|count| pushed >= count) {
            break;
        }
        sleep_while_running(&running, interval);
    }

    info!(pushed, "push stopped");
    Ok(last_failure.map_or(SUCCESS, status_code))
}

fn sleep_while_running(running: &AtomicBool, interval: Duration) {
    let deadline = Instant::now() + interval;
    while running.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        thread::sleep(remaining.min(SLEEP_SLICE));
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
