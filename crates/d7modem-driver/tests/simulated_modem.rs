//! Driver sessions against a simulated modem on the other end of a socket pair.

use std::io::{Cursor, ErrorKind, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use d7modem_alp::{
    actions, append_return_file_data, append_return_tag, append_write_file_data, Action,
    D7apSessionConfig, FileData, FileOffset, Result as AlpResult, SessionConfig,
};
use d7modem_driver::{Modem, ModemCallbacks, ModemConfig, ModemStats, ModemStatus};
use d7modem_frame::{encode_frame, Frame, FrameError, FrameReader, FrameWriter, MessageType};
use d7modem_transport::{LinkConfig, SerialLink};

const DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Completed(bool),
    FileData(u8, u32, Vec<u8>),
    WriteRequest(u8, u32, Vec<u8>),
    Ping,
    Log(String),
}

struct Recorder {
    events: Mutex<Sender<Event>>,
}

impl Recorder {
    fn record(&self, event: Event) {
        let _ = self.events.lock().unwrap().send(event);
    }
}

impl ModemCallbacks for Recorder {
    fn command_completed(&self, with_error: bool) {
        self.record(Event::Completed(with_error));
    }

    fn return_file_data(&self, file_id: u8, offset: u32, data: &[u8]) {
        self.record(Event::FileData(file_id, offset, data.to_vec()));
    }

    fn write_file_data(&self, file_id: u8, offset: u32, data: &[u8]) {
        self.record(Event::WriteRequest(file_id, offset, data.to_vec()));
    }

    fn ping_response(&self) {
        self.record(Event::Ping);
    }

    fn log_message(&self, message: &str) {
        self.record(Event::Log(message.to_string()));
    }
}

fn recorder() -> (Recorder, Receiver<Event>) {
    let (tx, rx) = mpsc::channel();
    (
        Recorder {
            events: Mutex::new(tx),
        },
        rx,
    )
}

fn next_event(events: &Receiver<Event>) -> Event {
    events.recv_timeout(DEADLINE).expect("no callback within deadline")
}

fn eventually(modem: &Modem, check: impl Fn(&ModemStats) -> bool) -> ModemStats {
    let deadline = Instant::now() + DEADLINE;
    loop {
        let stats = modem.stats();
        if check(&stats) {
            return stats;
        }
        assert!(Instant::now() < deadline, "stats never converged: {stats:?}");
        thread::sleep(Duration::from_millis(5));
    }
}

/// The modem end of the link.
struct SimulatedModem {
    reader: FrameReader<SerialLink>,
    writer: FrameWriter<SerialLink>,
}

impl SimulatedModem {
    fn next_frame(&mut self) -> Frame {
        let deadline = Instant::now() + DEADLINE;
        loop {
            match self.reader.read_frame() {
                Ok(frame) => return frame,
                Err(FrameError::Io(err))
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
                        && Instant::now() < deadline => {}
                Err(err) => panic!("simulated modem read failed: {err}"),
            }
        }
    }

    /// Read one command and return its tag and the actions after the tag request.
    fn next_command(&mut self) -> (u8, Vec<Action>) {
        let frame = self.next_frame();
        assert_eq!(frame.message_type(), MessageType::AlpData);
        let mut parsed: Vec<Action> = actions(&frame.payload)
            .collect::<AlpResult<_>>()
            .unwrap();
        let Action::RequestTag {
            tag_id,
            respond_when_completed: true,
        } = parsed.remove(0)
        else {
            panic!("command does not start with a tag request");
        };
        (tag_id, parsed)
    }

    fn reply(&mut self, build: impl FnOnce(&mut BytesMut)) {
        let mut payload = BytesMut::new();
        build(&mut payload);
        self.writer.send(MessageType::AlpData, &payload).unwrap();
    }

    fn complete(&mut self, tag: u8, error: bool) {
        self.reply(|payload| append_return_tag(payload, tag, true, error));
    }

    fn send(&mut self, message_type: MessageType, payload: &[u8]) {
        self.writer.send(message_type, payload).unwrap();
    }

    fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.get_mut().write_all(bytes).unwrap();
    }
}

fn connect(
    config: ModemConfig,
    callbacks: impl ModemCallbacks + 'static,
) -> (Modem, SimulatedModem) {
    let (host, device) = SerialLink::pair(LinkConfig::default()).unwrap();
    let modem = Modem::open(host, config, callbacks).unwrap();
    let simulated = SimulatedModem {
        writer: FrameWriter::new(device.try_clone().unwrap()),
        reader: FrameReader::new(device),
    };
    (modem, simulated)
}

fn short_timeout() -> ModemConfig {
    ModemConfig {
        command_timeout: Duration::from_millis(300),
        ..ModemConfig::default()
    }
}

#[test]
fn read_uid_end_to_end() {
    let (events_sink, events) = recorder();
    let (modem, mut device) = connect(ModemConfig::default(), events_sink);
    let uid = [0x00, 0x0B, 0x57, 0x00, 0x01, 0x02, 0x03, 0x04];

    let peer = thread::spawn(move || {
        let (tag, actions) = device.next_command();
        assert_eq!(
            actions,
            vec![Action::ReadFileData {
                file: FileOffset {
                    file_id: 0x00,
                    offset: 0
                },
                length: 8,
                response_requested: true,
            }]
        );
        device.reply(|payload| {
            append_return_file_data(payload, 0x00, 0, &uid).unwrap();
            append_return_tag(payload, tag, true, false);
        });
        device
    });

    let mut response = [0u8; 8];
    let status = modem.read_file(0x00, 0, 8, &mut response).unwrap();
    peer.join().unwrap();

    assert_eq!(status, ModemStatus::CompletedSuccess);
    assert_eq!(response, uid);
    assert!(!modem.is_busy());
    assert_eq!(modem.stats().commands.completed, 1);
    assert_eq!(modem.stats().tx_counter, 1);
    // Sync read data is not reported through the callback.
    assert!(events.try_recv().is_err());
}

#[test]
fn read_data_split_across_frames() {
    let (modem, mut device) = connect(ModemConfig::default(), d7modem_driver::NoCallbacks);

    let peer = thread::spawn(move || {
        let (tag, _) = device.next_command();
        device.reply(|payload| append_return_file_data(payload, 0x40, 0, b"ab").unwrap());
        device.reply(|payload| {
            append_return_file_data(payload, 0x40, 2, b"cd").unwrap();
            append_return_tag(payload, tag, true, false);
        });
    });

    let mut response = [0u8; 4];
    let status = modem.read_file(0x40, 0, 4, &mut response).unwrap();
    peer.join().unwrap();

    assert_eq!(status, ModemStatus::CompletedSuccess);
    assert_eq!(&response, b"abcd");
}

#[test]
fn write_reports_modem_error() {
    let (modem, mut device) = connect(ModemConfig::default(), d7modem_driver::NoCallbacks);

    let peer = thread::spawn(move || {
        let (tag, actions) = device.next_command();
        assert!(matches!(
            &actions[..],
            [Action::WriteFileData { file, response_requested: true }]
                if file.file_id == 0x41 && file.offset == 2 && file.data.as_ref() == b"on"
        ));
        device.complete(tag, true);
    });

    let status = modem.write_file(0x41, 2, b"on").unwrap();
    peer.join().unwrap();

    assert_eq!(status, ModemStatus::CompletedError);
    assert!(!status.is_success());
    assert_eq!(modem.stats().commands.completed_with_error, 1);
}

#[test]
fn unsolicited_push_over_d7() {
    let (modem, mut device) = connect(ModemConfig::default(), d7modem_driver::NoCallbacks);
    let session = SessionConfig::D7ap(D7apSessionConfig::default());
    let expected_forward = session.clone();

    let peer = thread::spawn(move || {
        let (tag, actions) = device.next_command();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], Action::Forward(expected_forward));
        assert_eq!(
            actions[1],
            Action::ReturnFileData(FileData {
                file_id: 0x40,
                offset: 0,
                data: bytes::Bytes::from_static(&[0x07]),
            })
        );
        device.complete(tag, false);
    });

    let status = modem.send_unsolicited(0x40, 0, &[0x07], &session).unwrap();
    peer.join().unwrap();
    assert_eq!(status, ModemStatus::CompletedSuccess);
}

#[test]
fn second_command_is_busy_until_first_completes() {
    let (events_sink, events) = recorder();
    let (modem, mut device) = connect(ModemConfig::default(), events_sink);

    assert_eq!(
        modem.read_file_async(0x40, 0, 2).unwrap(),
        ModemStatus::Processing
    );
    assert!(modem.is_busy());
    let mut response = [0u8; 2];
    assert_eq!(
        modem.read_file(0x40, 0, 2, &mut response).unwrap(),
        ModemStatus::Busy
    );
    assert_eq!(
        modem.write_file_async(0x40, 0, b"x").unwrap(),
        ModemStatus::Busy
    );

    let (tag, _) = device.next_command();
    device.reply(|payload| {
        append_return_file_data(payload, 0x40, 0, &[0x12, 0x34]).unwrap();
        append_return_tag(payload, tag, true, false);
    });

    assert_eq!(
        next_event(&events),
        Event::FileData(0x40, 0, vec![0x12, 0x34])
    );
    assert_eq!(next_event(&events), Event::Completed(false));
    assert!(!modem.is_busy());

    let stats = modem.stats();
    assert_eq!(stats.commands.busy_rejections, 2);
    // Busy commands never reach the wire.
    assert_eq!(stats.tx_counter, 1);
}

#[test]
fn timeout_frees_slot_for_next_command() {
    let (modem, mut device) = connect(short_timeout(), d7modem_driver::NoCallbacks);

    let peer = thread::spawn(move || {
        let (stale_tag, _) = device.next_command();
        let (tag, _) = device.next_command();
        assert_ne!(stale_tag, tag);
        // Late answer to the timed-out command arrives first.
        device.complete(stale_tag, false);
        device.reply(|payload| {
            append_return_file_data(payload, 0x00, 0, &[0xAA]).unwrap();
            append_return_tag(payload, tag, true, false);
        });
    });

    let mut response = [0u8; 1];
    let started = Instant::now();
    assert_eq!(
        modem.read_file(0x00, 0, 1, &mut response).unwrap(),
        ModemStatus::Timeout
    );
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "overshot: {elapsed:?}");
    assert!(!modem.is_busy());

    let config = modem.config().clone();
    assert_eq!(config.command_timeout, Duration::from_millis(300));
    assert_eq!(
        modem.read_file(0x00, 0, 1, &mut response).unwrap(),
        ModemStatus::CompletedSuccess
    );
    peer.join().unwrap();

    assert_eq!(response, [0xAA]);
    let stats = modem.stats();
    assert_eq!(stats.commands.timeouts, 1);
    assert_eq!(stats.commands.unmatched_tags, 1);
}

#[test]
fn reset_releases_blocked_caller() {
    let (modem, mut device) = connect(ModemConfig::default(), d7modem_driver::NoCallbacks);
    let modem = Arc::new(modem);

    let caller = {
        let modem = Arc::clone(&modem);
        thread::spawn(move || modem.write_file(0x40, 0, b"z").unwrap())
    };
    device.next_command();
    modem.reset();

    assert_eq!(caller.join().unwrap(), ModemStatus::Timeout);
    assert!(!modem.is_busy());
}

#[test]
fn modem_initiated_write_reaches_callback() {
    let (events_sink, events) = recorder();
    let (_modem, mut device) = connect(ModemConfig::default(), events_sink);

    device.reply(|payload| {
        append_write_file_data(payload, 0x50, 1, b"cfg", false, false).unwrap();
    });
    assert_eq!(
        next_event(&events),
        Event::WriteRequest(0x50, 1, b"cfg".to_vec())
    );
}

#[test]
fn ping_both_directions() {
    let (events_sink, events) = recorder();
    let (modem, mut device) = connect(ModemConfig::default(), events_sink);

    modem.send_ping().unwrap();
    let request = device.next_frame();
    assert_eq!(request.message_type(), MessageType::PingRequest);
    assert_eq!(request.payload.as_ref(), &[0x01]);

    device.send(MessageType::PingResponse, &[0x02]);
    assert_eq!(next_event(&events), Event::Ping);

    device.send(MessageType::PingRequest, &[0x01]);
    let reply = device.next_frame();
    assert_eq!(reply.message_type(), MessageType::PingResponse);
    assert_eq!(reply.payload.as_ref(), &[0x02]);
    assert_eq!(reply.counter(), 2);

    eventually(&modem, |stats| stats.ping_replies == 1);
}

#[test]
fn firmware_log_lines_reach_callback() {
    let (events_sink, events) = recorder();
    let (_modem, mut device) = connect(ModemConfig::default(), events_sink);

    device.send(MessageType::Logging, b"boot ok");
    device.send(MessageType::Logging, &[b'x', 0xFF]);

    assert_eq!(next_event(&events), Event::Log("boot ok".to_string()));
    assert_eq!(next_event(&events), Event::Log("x\u{FFFD}".to_string()));
}

#[test]
fn garbage_and_corrupt_frames_are_skipped() {
    let (events_sink, events) = recorder();
    let (modem, mut device) = connect(ModemConfig::default(), events_sink);

    device.write_raw(&[0xFF, 0x13, 0x37]);

    let mut corrupt = BytesMut::new();
    encode_frame(1, MessageType::Logging, b"lost", &mut corrupt).unwrap();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0x01;
    device.write_raw(&corrupt);

    let mut clean = BytesMut::new();
    encode_frame(2, MessageType::Logging, b"kept", &mut clean).unwrap();
    device.write_raw(&clean);

    assert_eq!(next_event(&events), Event::Log("kept".to_string()));
    let stats = eventually(&modem, |stats| stats.frames_received == 1);
    assert_eq!(stats.resync_bytes, 3);
    assert_eq!(stats.checksum_failures, 1);
    assert_eq!(stats.sequence_gaps, 0);
}

#[test]
fn counter_gap_is_counted_and_frame_kept() {
    let (events_sink, events) = recorder();
    let (modem, mut device) = connect(ModemConfig::default(), events_sink);

    device.send(MessageType::Logging, b"one");
    let mut skipped = BytesMut::new();
    encode_frame(5, MessageType::Logging, b"five", &mut skipped).unwrap();
    device.write_raw(&skipped);

    assert_eq!(next_event(&events), Event::Log("one".to_string()));
    assert_eq!(next_event(&events), Event::Log("five".to_string()));
    let stats = eventually(&modem, |stats| stats.frames_received == 2);
    assert_eq!(stats.sequence_gaps, 1);
}

#[test]
fn drop_closes_link() {
    let (modem, mut device) = connect(ModemConfig::default(), d7modem_driver::NoCallbacks);
    drop(modem);

    let deadline = Instant::now() + DEADLINE;
    loop {
        match device.reader.read_frame() {
            Err(FrameError::ConnectionClosed) => break,
            Err(FrameError::Io(err)) if err.kind() == ErrorKind::WouldBlock => {
                assert!(Instant::now() < deadline, "link never closed");
            }
            other => panic!("unexpected read result: {other:?}"),
        }
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn bytes_fed_through_ingress() {
    let (events_sink, events) = recorder();
    let wire = SharedBuffer::default();
    let modem = Modem::start(wire.clone(), ModemConfig::default(), events_sink).unwrap();

    assert_eq!(
        modem.write_file_async(0x40, 0, b"v").unwrap(),
        ModemStatus::Processing
    );
    modem.execute_raw(&[0x01, 0x00, 0x00, 0x01]).unwrap();

    let sent = wire.0.lock().unwrap().clone();
    let mut reader = FrameReader::new(Cursor::new(sent));
    let command = reader.read_frame().unwrap();
    let raw = reader.read_frame().unwrap();
    assert_eq!((command.counter(), raw.counter()), (1, 2));
    assert_eq!(raw.payload.as_ref(), &[0x01, 0x00, 0x00, 0x01]);
    let tag = command.payload[1];

    // The raw command is not tracked; the slot still belongs to the write.
    assert!(modem.is_busy());

    let mut response = BytesMut::new();
    let mut payload = BytesMut::new();
    append_return_tag(&mut payload, tag, true, false);
    encode_frame(1, MessageType::AlpData, &payload, &mut response).unwrap();
    modem.ingress().push_slice(&response);

    assert_eq!(next_event(&events), Event::Completed(false));
    assert!(!modem.is_busy());
}

#[test]
fn ingress_overflow_is_counted() {
    let config = ModemConfig {
        ingress_capacity: 8,
        ..ModemConfig::default()
    };
    let modem = Modem::start(std::io::sink(), config, d7modem_driver::NoCallbacks).unwrap();
    let producer = modem.ingress();

    let noise = vec![0xFFu8; 4096];
    let accepted = producer.push_slice(&noise);

    assert_eq!(accepted as u64 + producer.dropped(), noise.len() as u64);
    assert_eq!(modem.stats().ingress_dropped, producer.dropped());
}

#[test]
fn oversized_raw_actions_rejected() {
    let modem = Modem::start(
        std::io::sink(),
        ModemConfig::default(),
        d7modem_driver::NoCallbacks,
    )
    .unwrap();
    let session = SessionConfig::D7ap(D7apSessionConfig::default());

    assert!(modem.execute_raw(&[0u8; 256]).is_err());
    assert!(modem.send_raw_unsolicited_async(&[0u8; 250], &session).is_err());
    // A failed send must not leave the slot claimed.
    assert!(!modem.is_busy());
    assert_eq!(modem.stats().tx_counter, 0);
}

/// A UART whose first write fails.
struct FaultyOnce {
    faulted: bool,
    wire: SharedBuffer,
}

impl Write for FaultyOnce {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.faulted {
            self.faulted = true;
            return Err(std::io::Error::other("uart fault"));
        }
        self.wire.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn failed_command_never_reaches_the_wire() {
    let wire = SharedBuffer::default();
    let uart = FaultyOnce {
        faulted: false,
        wire: wire.clone(),
    };
    let modem = Modem::start(uart, ModemConfig::default(), d7modem_driver::NoCallbacks).unwrap();

    assert!(modem.write_file_async(0x40, 0, b"FAILED").is_err());
    assert!(!modem.is_busy());
    assert_eq!(
        modem.read_file_async(0x00, 0, 8).unwrap(),
        ModemStatus::Processing
    );

    let sent = wire.0.lock().unwrap().clone();
    let mut reader = FrameReader::new(Cursor::new(sent));
    let frame = reader.read_frame().unwrap();
    assert_eq!(frame.counter(), 1);
    let parsed: Vec<Action> = actions(&frame.payload)
        .collect::<AlpResult<_>>()
        .unwrap();
    assert!(matches!(parsed[1], Action::ReadFileData { length: 8, .. }));
    assert!(matches!(
        reader.read_frame(),
        Err(FrameError::ConnectionClosed)
    ));
}

#[test]
fn unanswered_async_command_expires() {
    let (events_sink, events) = recorder();
    let config = ModemConfig {
        command_timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(10),
        ..ModemConfig::default()
    };
    let modem = Modem::start(std::io::sink(), config, events_sink).unwrap();

    let started = Instant::now();
    assert_eq!(
        modem.read_file_async(0x00, 0, 8).unwrap(),
        ModemStatus::Processing
    );
    assert_eq!(modem.read_file_async(0x00, 0, 8).unwrap(), ModemStatus::Busy);

    assert_eq!(next_event(&events), Event::Completed(true));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "expired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "expired late: {elapsed:?}");
    assert!(!modem.is_busy());
    assert_eq!(modem.stats().commands.timeouts, 1);

    assert_eq!(
        modem.read_file_async(0x00, 0, 8).unwrap(),
        ModemStatus::Processing
    );
}
