use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use d7modem_alp::{append_read_file_data, append_write_file_data, SessionConfig};
use d7modem_frame::{
    ingress, Frame, FrameSink, IngressConsumer, IngressProducer, MessageType, PipelineStats,
    ReceivePipeline, Transmitter, PING_REQUEST,
};
use d7modem_transport::SerialLink;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::callbacks::ModemCallbacks;
use crate::command::{CommandEngine, CommandKind, CommandMode, CommandStats, PendingCommand};
use crate::config::ModemConfig;
use crate::error::{ModemError, Result};
use crate::forward::{build_raw_unsolicited, build_unsolicited};
use crate::status::ModemStatus;

const WORKER_THREAD_NAME: &str = "d7modem-rx";
const LINK_THREAD_NAME: &str = "d7modem-link";
const LINK_READ_CHUNK: usize = 64;

/// Snapshot of driver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModemStats {
    pub frames_received: u64,
    pub checksum_failures: u64,
    pub sequence_gaps: u64,
    pub resync_bytes: u64,
    pub unhandled_frames: u64,
    pub ping_replies: u64,
    /// Received bytes dropped because the ingress queue was full.
    pub ingress_dropped: u64,
    /// Counter carried by the last transmitted frame.
    pub tx_counter: u8,
    pub commands: CommandStats,
}

struct LinkReader {
    link: SerialLink,
    handle: JoinHandle<()>,
}

/// A session with one modem.
///
/// Owns the receive worker (and, when opened on a [`SerialLink`], the link
/// reader). Dropping the modem stops both.
pub struct Modem {
    engine: Arc<CommandEngine>,
    tx: Arc<Transmitter>,
    ingress: IngressProducer,
    config: ModemConfig,
    shutdown: Arc<AtomicBool>,
    pipeline_stats: Arc<Mutex<PipelineStats>>,
    worker: Option<JoinHandle<()>>,
    link_reader: Option<LinkReader>,
}

impl Modem {
    /// Start a session that transmits on `tx`.
    ///
    /// Received bytes are fed through the producer returned by
    /// [`Modem::ingress`], typically from a UART receive handler.
    pub fn start(
        tx: impl Write + Send + 'static,
        config: ModemConfig,
        callbacks: impl ModemCallbacks + 'static,
    ) -> Result<Self> {
        let callbacks: Arc<dyn ModemCallbacks> = Arc::new(callbacks);
        let tx = Arc::new(Transmitter::new(tx, config.tx_queue_capacity));
        let engine = Arc::new(
            CommandEngine::new(tx.clone(), Arc::clone(&callbacks))
                .with_async_timeout(config.command_timeout),
        );
        let (producer, consumer) = ingress(config.ingress_capacity);

        let mut pipeline = ReceivePipeline::new().with_ping_sink(tx.clone());
        register_handlers(&mut pipeline, &engine, &callbacks);

        let shutdown = Arc::new(AtomicBool::new(false));
        let pipeline_stats = Arc::new(Mutex::new(PipelineStats::default()));
        let worker = {
            let shutdown = Arc::clone(&shutdown);
            let stats = Arc::clone(&pipeline_stats);
            let engine = Arc::clone(&engine);
            let poll_interval = config.poll_interval;
            std::thread::Builder::new()
                .name(WORKER_THREAD_NAME.to_string())
                .spawn(move || {
                    run_worker(consumer, pipeline, &engine, shutdown, stats, poll_interval)
                })
                .map_err(|source| ModemError::Spawn {
                    name: WORKER_THREAD_NAME,
                    source,
                })?
        };
        info!(
            command_timeout = ?config.command_timeout,
            ingress_capacity = config.ingress_capacity,
            "modem session started"
        );

        Ok(Self {
            engine,
            tx,
            ingress: producer,
            config,
            shutdown,
            pipeline_stats,
            worker: Some(worker),
            link_reader: None,
        })
    }

    /// Start a session on `link`, with a background thread feeding received
    /// bytes into the ingress queue.
    pub fn open(
        link: SerialLink,
        config: ModemConfig,
        callbacks: impl ModemCallbacks + 'static,
    ) -> Result<Self> {
        let reader = link.try_clone()?;
        let control = link.try_clone()?;
        debug!(?link, "opening modem session");
        let mut modem = Self::start(link, config, callbacks)?;

        let producer = modem.ingress.clone();
        let shutdown = Arc::clone(&modem.shutdown);
        let handle = std::thread::Builder::new()
            .name(LINK_THREAD_NAME.to_string())
            .spawn(move || run_link_reader(reader, producer, shutdown))
            .map_err(|source| ModemError::Spawn {
                name: LINK_THREAD_NAME,
                source,
            })?;
        modem.link_reader = Some(LinkReader {
            link: control,
            handle,
        });
        Ok(modem)
    }

    /// Producer side of the received-byte queue.
    pub fn ingress(&self) -> IngressProducer {
        self.ingress.clone()
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    fn submit(
        &self,
        mut command: PendingCommand,
        build: impl FnOnce(&mut PendingCommand) -> Result<()>,
    ) -> Result<PendingCommand> {
        if let Err(err) = build(&mut command) {
            self.engine.abandon(command);
            return Err(err);
        }
        self.engine.transmit(&command)?;
        Ok(command)
    }

    /// Read `size` bytes of file `file_id` at `offset` into `response`.
    ///
    /// Blocks until the modem completes the command or the configured
    /// timeout elapses.
    pub fn read_file(
        &self,
        file_id: u8,
        offset: u32,
        size: u32,
        response: &mut [u8],
    ) -> Result<ModemStatus> {
        let Some(command) = self.engine.allocate(CommandMode::Sync, CommandKind::Read) else {
            return Ok(ModemStatus::Busy);
        };
        let command = self.submit(command, |command| {
            append_read_file_data(command.body_mut(), file_id, offset, size, true, false)?;
            Ok(())
        })?;
        Ok(self
            .engine
            .wait(command, self.config.command_timeout, Some(response)))
    }

    /// Request a file read; the data arrives through
    /// [`ModemCallbacks::return_file_data`].
    ///
    /// Asynchronous commands unanswered after the configured timeout are
    /// expired and reported as `command_completed(true)`.
    pub fn read_file_async(&self, file_id: u8, offset: u32, size: u32) -> Result<ModemStatus> {
        let Some(command) = self.engine.allocate(CommandMode::Async, CommandKind::Read) else {
            return Ok(ModemStatus::Busy);
        };
        self.submit(command, |command| {
            append_read_file_data(command.body_mut(), file_id, offset, size, true, false)?;
            Ok(())
        })?;
        Ok(ModemStatus::Processing)
    }

    pub fn write_file(&self, file_id: u8, offset: u32, data: &[u8]) -> Result<ModemStatus> {
        let Some(command) = self.engine.allocate(CommandMode::Sync, CommandKind::Write) else {
            return Ok(ModemStatus::Busy);
        };
        let command = self.submit(command, |command| {
            append_write_file_data(command.body_mut(), file_id, offset, data, true, false)?;
            Ok(())
        })?;
        Ok(self.engine.wait(command, self.config.command_timeout, None))
    }

    pub fn write_file_async(&self, file_id: u8, offset: u32, data: &[u8]) -> Result<ModemStatus> {
        let Some(command) = self.engine.allocate(CommandMode::Async, CommandKind::Write) else {
            return Ok(ModemStatus::Busy);
        };
        self.submit(command, |command| {
            append_write_file_data(command.body_mut(), file_id, offset, data, true, false)?;
            Ok(())
        })?;
        Ok(ModemStatus::Processing)
    }

    /// Send file data as an unsolicited response over the session's interface.
    pub fn send_unsolicited(
        &self,
        file_id: u8,
        offset: u32,
        data: &[u8],
        session: &SessionConfig,
    ) -> Result<ModemStatus> {
        let Some(command) = self
            .engine
            .allocate(CommandMode::Sync, CommandKind::Unsolicited)
        else {
            return Ok(ModemStatus::Busy);
        };
        let command = self.submit(command, |command| {
            build_unsolicited(command.body_mut(), file_id, offset, data, session)
        })?;
        Ok(self.engine.wait(command, self.config.command_timeout, None))
    }

    pub fn send_unsolicited_async(
        &self,
        file_id: u8,
        offset: u32,
        data: &[u8],
        session: &SessionConfig,
    ) -> Result<ModemStatus> {
        let Some(command) = self
            .engine
            .allocate(CommandMode::Async, CommandKind::Unsolicited)
        else {
            return Ok(ModemStatus::Busy);
        };
        self.submit(command, |command| {
            build_unsolicited(command.body_mut(), file_id, offset, data, session)
        })?;
        Ok(ModemStatus::Processing)
    }

    /// Forward caller-encoded actions over the session's interface.
    pub fn send_raw_unsolicited_async(
        &self,
        actions: &[u8],
        session: &SessionConfig,
    ) -> Result<ModemStatus> {
        let Some(command) = self
            .engine
            .allocate(CommandMode::Async, CommandKind::RawUnsolicited)
        else {
            return Ok(ModemStatus::Busy);
        };
        self.submit(command, |command| {
            build_raw_unsolicited(command.body_mut(), actions, session);
            Ok(())
        })?;
        Ok(ModemStatus::Processing)
    }

    /// Transmit caller-encoded actions as-is. No command is allocated, so
    /// nothing is correlated with the modem's answer.
    pub fn execute_raw(&self, alp: &[u8]) -> Result<()> {
        self.engine.execute_raw(alp)
    }

    /// Send a ping request; the answer reaches [`ModemCallbacks::ping_response`].
    pub fn send_ping(&self) -> Result<()> {
        let counter = self
            .tx
            .send_frame(MessageType::PingRequest, &PING_REQUEST)?;
        debug!(counter, "ping sent");
        Ok(())
    }

    /// Drop the active command, if any. A blocked caller gets a timeout.
    pub fn reset(&self) {
        self.engine.reset();
    }

    /// Whether a command is in flight.
    pub fn is_busy(&self) -> bool {
        self.engine.is_active()
    }

    pub fn stats(&self) -> ModemStats {
        let pipeline = *self
            .pipeline_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        ModemStats {
            frames_received: pipeline.decoder.frames,
            checksum_failures: pipeline.decoder.checksum_failures,
            sequence_gaps: pipeline.decoder.sequence_gaps,
            resync_bytes: pipeline.decoder.resync_bytes,
            unhandled_frames: pipeline.unhandled,
            ping_replies: pipeline.ping_replies,
            ingress_dropped: self.ingress.dropped(),
            tx_counter: self.tx.counter(),
            commands: self.engine.stats(),
        }
    }
}

impl Drop for Modem {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.ingress.close();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("receive worker panicked");
            }
        }

        if let Some(LinkReader { link, handle }) = self.link_reader.take() {
            if link.is_interruptible() {
                if let Err(err) = link.shutdown() {
                    debug!(%err, "link shutdown failed");
                }
                if handle.join().is_err() {
                    warn!("link reader panicked");
                }
            } else {
                // A blocking device read cannot be interrupted; the thread
                // exits on its next read.
                debug!(kind = link.kind(), "detaching link reader");
            }
        }
        info!("modem session closed");
    }
}

impl std::fmt::Debug for Modem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modem")
            .field("engine", &self.engine)
            .field("tx", &self.tx)
            .field("config", &self.config)
            .field("owns_link", &self.link_reader.is_some())
            .finish()
    }
}

fn register_handlers(
    pipeline: &mut ReceivePipeline,
    engine: &Arc<CommandEngine>,
    callbacks: &Arc<dyn ModemCallbacks>,
) {
    let alp_engine = Arc::clone(engine);
    pipeline.register_handler(
        MessageType::AlpData,
        Box::new(move |frame: &Frame| alp_engine.process_alp(&frame.payload)),
    );

    let ping_callbacks = Arc::clone(callbacks);
    pipeline.register_handler(
        MessageType::PingResponse,
        Box::new(move |_frame: &Frame| ping_callbacks.ping_response()),
    );

    let log_callbacks = Arc::clone(callbacks);
    pipeline.register_handler(
        MessageType::Logging,
        Box::new(move |frame: &Frame| {
            let message = String::from_utf8_lossy(&frame.payload);
            debug!(target: "d7modem::firmware", "{message}");
            log_callbacks.log_message(&message);
        }),
    );
}

fn run_worker(
    consumer: IngressConsumer,
    mut pipeline: ReceivePipeline,
    engine: &CommandEngine,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Mutex<PipelineStats>>,
    poll_interval: Duration,
) {
    debug!("receive worker started");
    let mut published = PipelineStats::default();
    loop {
        pipeline.feed(&consumer);
        // Resync and checksum counters move without producing frames.
        let snapshot = pipeline.stats();
        if snapshot != published {
            *stats.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
            published = snapshot;
        }
        engine.expire_overdue();

        if shutdown.load(Ordering::Acquire) {
            break;
        }
        if consumer.is_closed() && consumer.is_empty() {
            debug!("ingress closed");
            break;
        }
        consumer.wait(poll_interval);
    }
    debug!("receive worker stopped");
}

fn run_link_reader(mut link: SerialLink, producer: IngressProducer, shutdown: Arc<AtomicBool>) {
    let mut chunk = [0u8; LINK_READ_CHUNK];
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        match link.read(&mut chunk) {
            Ok(0) => {
                info!("modem link closed");
                producer.close();
                break;
            }
            Ok(n) => {
                producer.push_slice(&chunk[..n]);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(err) => {
                warn!(%err, "modem link read failed");
                producer.close();
                break;
            }
        }
    }
}
