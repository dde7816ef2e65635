//! Connection supervisor: transport lifecycle plus the reader thread.
//!
//! One dedicated reader thread pulls bytes from the transport and drives
//! framing, classification, pairing, validation, and persistence in order.
//! Decoded events go to the consumer over a bounded channel; a slow consumer
//! costs display events, never byte intake. The pairing timeout is ticked on
//! every loop iteration, so it fires even when the line goes quiet.
//!
//! Reconnection is deliberately not automatic: a dropped transport or a
//! failed disk write ends the session, and [`ConnectionSupervisor::disconnect`]
//! hands the cause back to the caller.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::protocol::{classify, Line, LineFramer, PacketPairer, PairingOutput};
use crate::record::{self, ProvisionalRecord};
use crate::storage::{DetectionStore, StoredPaths};
use crate::transport::{SerialTransport, Transport};
use crate::DetectionRecord;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Out-of-band interrupt byte (Ctrl-C on the board's REPL): asks the
/// producer to stop its detection loop. Nothing acknowledges it.
pub const INTERRUPT_BYTE: u8 = 0x03;

/// CR-LF nudge that wakes the board's REPL after connecting
pub const WAKE_SEQUENCE: &[u8] = b"\r\n";

/// Read chunk size; lines are far shorter, this just bounds syscalls
const READ_CHUNK: usize = 1024;

/// Idle backoff when the transport returned no bytes
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Decoded output handed to the consumer
#[derive(Debug)]
pub enum Event {
    /// A validated detection, with where it was stored (if persistence is on)
    Detection {
        record: DetectionRecord,
        stored: Option<StoredPaths>,
    },
    /// Free-form producer output, for display
    DeviceLog(String),
}

/// Pipeline counters, shared between the reader thread and the caller
#[derive(Default)]
pub struct Stats {
    pub lines: AtomicU64,
    pub records: AtomicU64,
    pub orphans: AtomicU64,
    pub malformed_metadata: AtomicU64,
    pub malformed_raw_audio: AtomicU64,
    pub validation_rejects: AtomicU64,
    pub frame_anomalies: AtomicU64,
    pub stray_raw_audio: AtomicU64,
    pub unrecognized: AtomicU64,
    pub dropped_events: AtomicU64,
}

/// Point-in-time copy of [`Stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lines: u64,
    pub records: u64,
    pub orphans: u64,
    pub malformed_metadata: u64,
    pub malformed_raw_audio: u64,
    pub validation_rejects: u64,
    pub frame_anomalies: u64,
    pub stray_raw_audio: u64,
    pub unrecognized: u64,
    pub dropped_events: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            orphans: self.orphans.load(Ordering::Relaxed),
            malformed_metadata: self.malformed_metadata.load(Ordering::Relaxed),
            malformed_raw_audio: self.malformed_raw_audio.load(Ordering::Relaxed),
            validation_rejects: self.validation_rejects.load(Ordering::Relaxed),
            frame_anomalies: self.frame_anomalies.load(Ordering::Relaxed),
            stray_raw_audio: self.stray_raw_audio.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lines={} records={} orphans={} bad_meta={} bad_raw={} rejected={} anomalies={}",
            self.lines,
            self.records,
            self.orphans,
            self.malformed_metadata,
            self.malformed_raw_audio,
            self.validation_rejects,
            self.frame_anomalies
        )
    }
}

/// Reader-path tuning, separated from [`AppConfig`] so tests can drive the
/// pipeline with a mock transport and tight timeouts
pub struct SupervisorOptions {
    pub pairing_timeout: Duration,
    pub max_line_len: usize,
    /// `None` disables persistence (display-only session)
    pub store: Option<DetectionStore>,
    pub event_capacity: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            pairing_timeout: crate::protocol::DEFAULT_PAIRING_TIMEOUT,
            max_line_len: crate::protocol::framer::DEFAULT_MAX_LINE_LEN,
            store: None,
            event_capacity: 256,
        }
    }
}

impl SupervisorOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            pairing_timeout: Duration::from_millis(config.protocol.pairing_timeout_ms),
            max_line_len: config.protocol.max_line_len,
            store: config
                .storage
                .enabled
                .then(|| DetectionStore::new(&config.storage.directory)),
            ..Default::default()
        }
    }
}

/// Owns the transport and the reader thread for one session
pub struct ConnectionSupervisor {
    transport: Arc<Mutex<Option<Box<dyn Transport>>>>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<Result<()>>>,
    stats: Arc<Stats>,
}

impl ConnectionSupervisor {
    /// Open the configured serial port and start reading
    pub fn connect(config: &AppConfig) -> Result<(Self, Receiver<Event>)> {
        let transport =
            SerialTransport::open(&config.hardware.port, config.hardware.baud_rate)?;
        let (supervisor, events) =
            Self::start(Box::new(transport), SupervisorOptions::from_config(config))?;
        if config.hardware.wake_on_connect {
            supervisor.send_wake()?;
        }
        Ok((supervisor, events))
    }

    /// Start the reader over an already-open transport.
    ///
    /// Discards anything the transport buffered before this call: bytes
    /// from before the connection belong to no line we can frame.
    pub fn start(
        mut transport: Box<dyn Transport>,
        options: SupervisorOptions,
    ) -> Result<(Self, Receiver<Event>)> {
        transport.clear_input()?;

        let transport = Arc::new(Mutex::new(Some(transport)));
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Stats::default());
        let (event_tx, event_rx) = bounded(options.event_capacity);

        let reader = thread::Builder::new().name("serial-reader".to_string()).spawn({
            let transport = Arc::clone(&transport);
            let shutdown = Arc::clone(&shutdown);
            let stats = Arc::clone(&stats);
            move || reader_loop(transport, shutdown, stats, event_tx, options)
        })?;

        Ok((
            Self {
                transport,
                shutdown,
                reader: Some(reader),
                stats,
            },
            event_rx,
        ))
    }

    /// Send a single out-of-band control byte
    pub fn send_control(&self, byte: u8) -> Result<()> {
        self.write_all(&[byte])
    }

    /// Ask the producer to stop its detection loop (no ack expected)
    pub fn send_interrupt(&self) -> Result<()> {
        self.send_control(INTERRUPT_BYTE)
    }

    /// Nudge the board's REPL
    pub fn send_wake(&self) -> Result<()> {
        self.write_all(WAKE_SEQUENCE)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the reader and release the transport.
    ///
    /// Safe to call multiple times. The reader finishes any in-flight
    /// persistence write before the transport is dropped; the session's
    /// terminal error (transport or persistence), if any, is returned on
    /// the first call.
    pub fn disconnect(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);

        let result = match self.reader.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Other("reader thread panicked".to_string()))?,
            None => Ok(()),
        };

        let mut guard = self.transport.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            log::info!("Transport released");
        }

        result
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::error!("Session ended with error: {}", e);
        }
    }
}

impl ConnectionSupervisor {
    fn write_all(&self, mut bytes: &[u8]) -> Result<()> {
        let mut guard = self.transport.lock().unwrap_or_else(|e| e.into_inner());
        let port = guard
            .as_mut()
            .ok_or_else(|| Error::Transport("transport disconnected".to_string()))?;
        while !bytes.is_empty() {
            let n = port.write(bytes)?;
            if n == 0 {
                return Err(Error::Transport("write stalled".to_string()));
            }
            bytes = &bytes[n..];
        }
        port.flush()
    }
}

/// Reader loop: bytes in, events out, strictly in arrival order.
///
/// Returns `Err` only on structural failures (transport read, disk write);
/// per-line protocol failures are counted and the loop keeps going.
fn reader_loop(
    transport: Arc<Mutex<Option<Box<dyn Transport>>>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Stats>,
    events: Sender<Event>,
    options: SupervisorOptions,
) -> Result<()> {
    let mut framer = LineFramer::with_max_line_len(options.max_line_len);
    let mut pairer = PacketPairer::new(options.pairing_timeout);
    let store = options.store;
    let mut buf = [0u8; READ_CHUNK];

    while !shutdown.load(Ordering::Relaxed) {
        let n = {
            let mut guard = transport.lock().unwrap_or_else(|e| e.into_inner());
            let Some(port) = guard.as_mut() else {
                break;
            };
            match port.read(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    log::error!("Transport read failed: {}", e);
                    return Err(e);
                }
            }
        };

        if n > 0 {
            for framed in framer.push(&buf[..n]) {
                let Some(line) = classify(framed) else {
                    continue;
                };
                stats.lines.fetch_add(1, Ordering::Relaxed);
                handle_line(line, &mut pairer, &stats, &events, store.as_ref())?;
            }
        } else {
            thread::sleep(IDLE_SLEEP);
        }

        // Time-driven transition: orphan a pending record whose raw frame
        // is overdue, even if no bytes ever arrive again
        if let Some(orphaned) = pairer.check_timeout(Instant::now()) {
            emit_record(orphaned, &stats, &events, store.as_ref())?;
        }
    }

    log::debug!("Reader thread exiting");
    Ok(())
}

fn handle_line(
    line: Line,
    pairer: &mut PacketPairer,
    stats: &Stats,
    events: &Sender<Event>,
    store: Option<&DetectionStore>,
) -> Result<()> {
    let now = Instant::now();
    let outputs = match line {
        Line::Metadata(body) => pairer.on_metadata(&body, now),
        Line::RawAudio(body) => pairer.on_raw_audio(&body, now),
        Line::DeviceLog(text) => {
            send_event(Event::DeviceLog(text), stats, events);
            return Ok(());
        }
        Line::Unrecognized(text) => {
            stats.unrecognized.fetch_add(1, Ordering::Relaxed);
            log::debug!("Unrecognized line ({} bytes) dropped", text.len());
            return Ok(());
        }
    };

    for output in outputs {
        match output {
            PairingOutput::Record(provisional) => {
                emit_record(provisional, stats, events, store)?;
            }
            PairingOutput::Error(e @ Error::MalformedMetadata(_)) => {
                stats.malformed_metadata.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}", e);
            }
            PairingOutput::Error(e) => {
                stats.malformed_raw_audio.fetch_add(1, Ordering::Relaxed);
                log::warn!("{}", e);
            }
            PairingOutput::StrayRawAudio => {
                stats.stray_raw_audio.fetch_add(1, Ordering::Relaxed);
                log::warn!("Raw-audio line with no pending metadata dropped");
            }
        }
    }
    Ok(())
}

/// Validate, persist, and publish one provisional record.
///
/// Validation failure drops the record (counted); persistence failure is
/// structural and propagates.
fn emit_record(
    provisional: ProvisionalRecord,
    stats: &Stats,
    events: &Sender<Event>,
    store: Option<&DetectionStore>,
) -> Result<()> {
    let record = match record::validate(provisional) {
        Ok(record) => record,
        Err(e) => {
            stats.validation_rejects.fetch_add(1, Ordering::Relaxed);
            log::warn!("Detection dropped: {}", e);
            return Ok(());
        }
    };

    stats.records.fetch_add(1, Ordering::Relaxed);
    if record.orphaned {
        stats.orphans.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "Detection at {:.6} missing its promised raw frame",
            record.timestamp
        );
    }
    if record.frame_anomaly {
        stats.frame_anomalies.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "Heat-map length {} (expected {}), stored with anomaly flag",
            record.raw_frame.as_ref().map_or(0, Vec::len),
            record::RAW_FRAME_LEN
        );
    }

    let stored = match store {
        Some(store) => {
            let paths = store.persist(&record).inspect_err(|e| {
                log::error!("Failed to store detection: {}", e);
            })?;
            Some(paths)
        }
        None => None,
    };

    send_event(Event::Detection { record, stored }, stats, events);
    Ok(())
}

fn send_event(event: Event, stats: &Stats, events: &Sender<Event>) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            // The consumer is behind; dropping display events keeps the
            // reader ahead of the wire
            stats.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        Err(TrySendError::Disconnected(_)) => {
            // Consumer gone; persistence continues until disconnect()
        }
    }
}
