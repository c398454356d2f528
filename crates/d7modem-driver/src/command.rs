//! Command correlation: one command in flight, matched to its completion by tag.
//!
//! Every command starts with a tag request asking the modem to answer with
//! a return-tag action once the command has completed. The engine watches
//! received ALP payloads for that tag and completes the command, either by
//! waking the blocked caller or through [`ModemCallbacks::command_completed`].
//! An asynchronous command that gets no answer within its deadline is
//! expired and reported as completed with error.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use d7modem_alp::{actions, append_request_tag, Action, FileData, Status};
use d7modem_frame::{FrameSink, MessageType, MAX_PAYLOAD};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::callbacks::ModemCallbacks;
use crate::completion::{Completer, Completion, WaitError};
use crate::error::{ModemError, Result};
use crate::status::ModemStatus;

/// How the caller learns about completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// The caller blocks until completion or timeout.
    Sync,
    /// Completion is reported through the callbacks.
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Read,
    Write,
    Unsolicited,
    RawUnsolicited,
}

/// What a synchronous waiter receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub with_error: bool,
    /// File data collected for a synchronous read.
    pub response: Vec<u8>,
}

struct ActiveCommand {
    tag: u8,
    generation: u64,
    mode: CommandMode,
    kind: CommandKind,
    completed: bool,
    completed_with_error: bool,
    response: Vec<u8>,
    completer: Option<Completer<CommandOutcome>>,
    /// Only asynchronous commands carry one; synchronous waiters time out themselves.
    deadline: Option<Instant>,
}

/// A freshly allocated command, ready for its actions to be appended.
#[derive(Debug)]
pub struct PendingCommand {
    tag: u8,
    generation: u64,
    body: BytesMut,
    completion: Option<Completion<CommandOutcome>>,
}

impl PendingCommand {
    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Serialized actions, starting with the tag request.
    pub fn body_mut(&mut self) -> &mut BytesMut {
        &mut self.body
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Counters kept by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandStats {
    pub issued: u64,
    pub completed: u64,
    pub completed_with_error: u64,
    pub timeouts: u64,
    pub busy_rejections: u64,
    pub unmatched_tags: u64,
    pub decode_errors: u64,
}

#[derive(Default)]
struct Counters {
    issued: AtomicU64,
    completed: AtomicU64,
    completed_with_error: AtomicU64,
    timeouts: AtomicU64,
    busy_rejections: AtomicU64,
    unmatched_tags: AtomicU64,
    decode_errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct CommandEngine {
    slot: Mutex<Option<ActiveCommand>>,
    next_tag: AtomicU8,
    next_generation: AtomicU64,
    async_timeout: Option<Duration>,
    tx: Arc<dyn FrameSink>,
    callbacks: Arc<dyn ModemCallbacks>,
    counters: Counters,
}

impl CommandEngine {
    pub fn new(tx: Arc<dyn FrameSink>, callbacks: Arc<dyn ModemCallbacks>) -> Self {
        Self {
            slot: Mutex::new(None),
            next_tag: AtomicU8::new(0),
            next_generation: AtomicU64::new(1),
            async_timeout: None,
            tx,
            callbacks,
            counters: Counters::default(),
        }
    }

    /// Expire asynchronous commands that are still active `timeout` after allocation.
    pub fn with_async_timeout(mut self, timeout: Duration) -> Self {
        self.async_timeout = Some(timeout);
        self
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<ActiveCommand>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the command slot. Returns `None` (BUSY) while a command is active.
    pub fn allocate(&self, mode: CommandMode, kind: CommandKind) -> Option<PendingCommand> {
        self.expire_overdue();
        let mut slot = self.lock_slot();
        if let Some(active) = slot.as_ref() {
            bump(&self.counters.busy_rejections);
            debug!(active_tag = active.tag, "previous command still active");
            return None;
        }

        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (completer, completion, deadline) = match mode {
            CommandMode::Sync => {
                let (completer, completion) = Completion::pair();
                (Some(completer), Some(completion), None)
            }
            CommandMode::Async => (
                None,
                None,
                self.async_timeout
                    .and_then(|timeout| Instant::now().checked_add(timeout)),
            ),
        };

        *slot = Some(ActiveCommand {
            tag,
            generation,
            mode,
            kind,
            completed: false,
            completed_with_error: false,
            response: Vec::new(),
            completer,
            deadline,
        });

        let mut body = BytesMut::with_capacity(MAX_PAYLOAD);
        append_request_tag(&mut body, tag, true);
        Some(PendingCommand {
            tag,
            generation,
            body,
            completion,
        })
    }

    /// Put the command on the wire. The slot is released if sending fails.
    pub fn transmit(&self, command: &PendingCommand) -> Result<()> {
        let size = command.body.len();
        let sent = if size > MAX_PAYLOAD {
            Err(ModemError::PayloadTooLarge {
                size,
                max: MAX_PAYLOAD,
            })
        } else {
            self.tx
                .send_frame(MessageType::AlpData, &command.body)
                .map_err(ModemError::from)
        };

        match sent {
            Ok(counter) => {
                bump(&self.counters.issued);
                debug!(tag = command.tag, counter, len = size, "command sent");
                Ok(())
            }
            Err(err) => {
                self.release(command.generation);
                Err(err)
            }
        }
    }

    /// Block until a synchronous command completes or `timeout` elapses.
    ///
    /// On completion, collected read data is copied into `response`.
    pub fn wait(
        &self,
        command: PendingCommand,
        timeout: Duration,
        response: Option<&mut [u8]>,
    ) -> ModemStatus {
        let Some(completion) = command.completion else {
            return ModemStatus::Processing;
        };

        match completion.wait(timeout) {
            Ok(outcome) => {
                if let Some(buf) = response {
                    let len = outcome.response.len().min(buf.len());
                    buf[..len].copy_from_slice(&outcome.response[..len]);
                    if outcome.response.len() > buf.len() {
                        warn!(
                            received = outcome.response.len(),
                            capacity = buf.len(),
                            "read response truncated to caller buffer"
                        );
                    }
                }
                ModemStatus::completed(outcome.with_error)
            }
            Err(WaitError::Timeout) => {
                bump(&self.counters.timeouts);
                if self.release(command.generation) {
                    warn!(tag = command.tag, ?timeout, "command timed out");
                }
                ModemStatus::Timeout
            }
            Err(WaitError::Abandoned) => {
                bump(&self.counters.timeouts);
                warn!(tag = command.tag, "command abandoned");
                ModemStatus::Timeout
            }
        }
    }

    /// Free the slot if it still holds `generation`.
    fn release(&self, generation: u64) -> bool {
        let mut slot = self.lock_slot();
        if slot.as_ref().map(|active| active.generation) == Some(generation) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Expire the active asynchronous command if its deadline has passed.
    ///
    /// The slot is freed and the expiry is reported as
    /// `command_completed(true)`. Returns whether a command was expired.
    pub fn expire_overdue(&self) -> bool {
        self.expire_at(Instant::now())
    }

    fn expire_at(&self, now: Instant) -> bool {
        let expired = {
            let mut slot = self.lock_slot();
            let overdue = slot
                .as_ref()
                .and_then(|active| active.deadline)
                .is_some_and(|deadline| now >= deadline);
            if overdue {
                slot.take()
            } else {
                None
            }
        };
        let Some(command) = expired else {
            return false;
        };

        bump(&self.counters.timeouts);
        warn!(tag = command.tag, "async command timed out");
        self.callbacks.command_completed(true);
        true
    }

    /// Give up a command that was never sent.
    pub fn abandon(&self, command: PendingCommand) {
        self.release(command.generation);
    }

    /// Force the slot idle. A blocked synchronous caller observes a timeout.
    pub fn reset(&self) {
        if let Some(active) = self.lock_slot().take() {
            info!(tag = active.tag, "command slot reset");
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Tag of the active command, if any.
    pub fn active_tag(&self) -> Option<u8> {
        self.lock_slot().as_ref().map(|active| active.tag)
    }

    /// Send caller-encoded actions without allocating a command.
    pub fn execute_raw(&self, alp: &[u8]) -> Result<()> {
        if alp.len() > MAX_PAYLOAD {
            return Err(ModemError::PayloadTooLarge {
                size: alp.len(),
                max: MAX_PAYLOAD,
            });
        }
        let counter = self.tx.send_frame(MessageType::AlpData, alp)?;
        debug!(counter, len = alp.len(), "raw alp sent");
        Ok(())
    }

    /// Handle one verified ALP payload received from the modem.
    pub fn process_alp(&self, payload: &[u8]) {
        for action in actions(payload) {
            let action = match action {
                Ok(action) => action,
                Err(err) => {
                    bump(&self.counters.decode_errors);
                    warn!(%err, "failed to decode alp payload, skipping remainder");
                    break;
                }
            };

            match action {
                Action::ReturnTag {
                    tag_id,
                    completed,
                    error,
                } => self.on_tag_response(tag_id, completed, error),
                Action::ReturnFileData(data) => self.on_return_file_data(data),
                Action::WriteFileData { file, .. } => {
                    self.callbacks
                        .write_file_data(file.file_id, file.offset, &file.data);
                }
                Action::ReturnStatus(Status::Interface { interface, data }) => {
                    debug!(interface, len = data.len(), "interface status");
                }
                Action::ReturnStatus(Status::Action {
                    action_index,
                    status,
                }) => {
                    debug!(action_index, status, "action status");
                }
                other => debug!(action = other.name(), "ignoring action"),
            }
        }

        self.finish_completed();
    }

    fn on_tag_response(&self, tag_id: u8, completed: bool, error: bool) {
        let mut slot = self.lock_slot();
        match slot.as_mut() {
            Some(active) if active.tag == tag_id => {
                active.completed_with_error = error;
                active.completed |= completed;
            }
            Some(active) => {
                bump(&self.counters.unmatched_tags);
                warn!(tag_id, expected = active.tag, "response with unexpected tag");
            }
            None => {
                bump(&self.counters.unmatched_tags);
                warn!(tag_id, "response with no active command");
            }
        }
    }

    fn on_return_file_data(&self, data: FileData) {
        {
            let mut slot = self.lock_slot();
            if let Some(active) = slot.as_mut() {
                if active.mode == CommandMode::Sync && active.kind == CommandKind::Read {
                    active.response.extend_from_slice(&data.data);
                    return;
                }
            }
        }
        self.callbacks
            .return_file_data(data.file_id, data.offset, &data.data);
    }

    fn finish_completed(&self) {
        let finished = {
            let mut slot = self.lock_slot();
            if slot.as_ref().is_some_and(|active| active.completed) {
                slot.take()
            } else {
                None
            }
        };
        let Some(command) = finished else {
            return;
        };

        bump(&self.counters.completed);
        if command.completed_with_error {
            bump(&self.counters.completed_with_error);
        }
        info!(
            tag = command.tag,
            with_error = command.completed_with_error,
            "command completed"
        );

        match (command.mode, command.completer) {
            (CommandMode::Sync, Some(completer)) => {
                let delivered = completer.complete(CommandOutcome {
                    with_error: command.completed_with_error,
                    response: command.response,
                });
                if !delivered {
                    debug!(tag = command.tag, "waiter already gone");
                }
            }
            _ => self.callbacks.command_completed(command.completed_with_error),
        }
    }

    pub fn stats(&self) -> CommandStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CommandStats {
            issued: load(&self.counters.issued),
            completed: load(&self.counters.completed),
            completed_with_error: load(&self.counters.completed_with_error),
            timeouts: load(&self.counters.timeouts),
            busy_rejections: load(&self.counters.busy_rejections),
            unmatched_tags: load(&self.counters.unmatched_tags),
            decode_errors: load(&self.counters.decode_errors),
        }
    }
}

impl std::fmt::Debug for CommandEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEngine")
            .field("active_tag", &self.active_tag())
            .field("next_tag", &self.next_tag.load(Ordering::Relaxed))
            .finish()
    }
}
