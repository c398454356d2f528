//! One-shot, single-waiter completion with a bounded wait.
//!
//! A fresh pair is created for every command, so a late signal can never
//! complete the wrong waiter.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

/// Why [`Completion::wait`] returned without an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("timed out waiting for completion")]
    Timeout,
    /// The completer was dropped without signalling.
    #[error("completion abandoned")]
    Abandoned,
}

/// Signalling half. Never blocks.
#[derive(Debug)]
pub struct Completer<T> {
    tx: SyncSender<T>,
}

impl<T> Completer<T> {
    /// Deliver the outcome. Returns `false` if the waiter is gone.
    pub fn complete(self, outcome: T) -> bool {
        match self.tx.try_send(outcome) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Waiting half.
#[derive(Debug)]
pub struct Completion<T> {
    rx: Receiver<T>,
}

impl<T> Completion<T> {
    pub fn pair() -> (Completer<T>, Completion<T>) {
        let (tx, rx) = mpsc::sync_channel(1);
        (Completer { tx }, Completion { rx })
    }

    /// Block until the outcome arrives or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> std::result::Result<T, WaitError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => WaitError::Timeout,
            RecvTimeoutError::Disconnected => WaitError::Abandoned,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn outcome_delivered_before_wait() {
        let (completer, completion) = Completion::pair();
        assert!(completer.complete(7u8));
        assert_eq!(completion.wait(Duration::from_secs(1)), Ok(7));
    }

    #[test]
    fn outcome_delivered_from_other_thread() {
        let (completer, completion) = Completion::pair();
        let signaller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            completer.complete("done")
        });
        assert_eq!(completion.wait(Duration::from_secs(5)), Ok("done"));
        assert!(signaller.join().unwrap());
    }

    #[test]
    fn wait_times_out() {
        let (_completer, completion) = Completion::<()>::pair();
        let start = Instant::now();
        assert_eq!(
            completion.wait(Duration::from_millis(20)),
            Err(WaitError::Timeout)
        );
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn dropped_completer_abandons() {
        let (completer, completion) = Completion::<()>::pair();
        drop(completer);
        assert_eq!(
            completion.wait(Duration::from_secs(5)),
            Err(WaitError::Abandoned)
        );
    }

    #[test]
    fn complete_after_waiter_gone_does_not_block() {
        let (completer, completion) = Completion::pair();
        drop(completion);
        assert!(!completer.complete(1u32));
    }
}
