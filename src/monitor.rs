// src/monitor.rs
//
// Stream processor: the single owner of the line accumulator and frame history.
//
// Inbound:  raw bytes -> LineAccumulator -> record::parse -> FrameHistory
// Outbound: request id -> transmit::encode -> FrameSink (wire) + FrameHistory (TX frame)
//
// All mutation happens through `&mut self` on one task. Transports running on other
// threads hand bytes over through a channel; they never touch the processor directly.

use std::io;

use chrono::Local;
use serde::Serialize;

use crate::error::{RecordError, RequestError};
use crate::history::{FrameFilter, FrameHistory, DEFAULT_CAPACITY};
use crate::io::record;
use crate::io::serial::LineAccumulator;
use crate::io::Frame;
use crate::transmit::{self, format_hex_bytes};

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Where outbound wire bytes go.
pub trait FrameSink {
    /// Whether a write would reach the link right now
    fn is_writable(&self) -> bool;
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Sink for a link that is not open. Never writable.
#[derive(Debug, Default, Clone, Copy)]
pub struct Disconnected;

impl FrameSink for Disconnected {
    fn is_writable(&self) -> bool {
        false
    }

    fn write_all(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "link is disconnected"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory sink, always writable
impl FrameSink for Vec<u8> {
    fn is_writable(&self) -> bool {
        true
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Connection state as reported by the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Notifications for the presentation layer
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// History was modified; `count` is the unfiltered history size
    HistoryChanged { count: usize },
    /// A submission was refused (user-facing warning)
    RequestRejected { message: String },
    /// Transport connected or disconnected
    LinkChanged { state: LinkState },
}

/// Receiver of monitor notifications.
pub trait EventSink {
    fn emit(&mut self, event: MonitorEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl EventSink for NullEvents {
    fn emit(&mut self, _event: MonitorEvent) {}
}

impl EventSink for std::sync::mpsc::Sender<MonitorEvent> {
    fn emit(&mut self, event: MonitorEvent) {
        // Receiver gone means nobody is rendering; nothing to do
        let _ = self.send(event);
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<MonitorEvent> {
    fn emit(&mut self, event: MonitorEvent) {
        let _ = self.send(event);
    }
}

// ============================================================================
// Types
// ============================================================================

/// Processor tuning, usually taken from settings
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub history_capacity: usize,
    /// Cap on the unterminated record tail (None = unbounded)
    pub max_pending_bytes: Option<usize>,
    /// Log every parsed frame, not just rejections
    pub trace_records: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            history_capacity: DEFAULT_CAPACITY,
            max_pending_bytes: None,
            trace_records: false,
        }
    }
}

/// Counters for the status line
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub bytes_received: u64,
    pub records_parsed: u64,
    pub rejected_empty: u64,
    pub rejected_unrecognized: u64,
    pub rejected_malformed_id: u64,
    /// Requests whose wire bytes were written and flushed
    pub requests_sent: u64,
    /// Requests recorded while the sink was not writable
    pub requests_unsent: u64,
    pub write_failures: u64,
    /// Pending tails dropped for exceeding `max_pending_bytes`
    pub buffer_overflows: u64,
}

impl MonitorStats {
    /// Total records dropped by the parser
    pub fn rejected(&self) -> u64 {
        self.rejected_empty + self.rejected_unrecognized + self.rejected_malformed_id
    }

    fn count_rejection(&mut self, err: RecordError) {
        match err {
            RecordError::EmptyRecord => self.rejected_empty += 1,
            RecordError::UnrecognizedFormat => self.rejected_unrecognized += 1,
            RecordError::MalformedId => self.rejected_malformed_id += 1,
        }
    }
}

/// What happened to the wire bytes of an accepted request.
/// The TX frame is recorded in the history in every case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Bytes written and flushed
    Sent,
    /// Sink not writable; nothing was written
    NotWritable,
    /// Transport reported a write or flush error
    WriteFailed(String),
}

// ============================================================================
// Stream Processor
// ============================================================================

pub struct StreamProcessor<E: EventSink = NullEvents> {
    accumulator: LineAccumulator,
    history: FrameHistory,
    events: E,
    link: LinkState,
    stats: MonitorStats,
    trace_records: bool,
}

impl StreamProcessor<NullEvents> {
    /// Processor with default settings and no event receiver
    pub fn standalone() -> Self {
        Self::new(ProcessorConfig::default(), NullEvents)
    }
}

impl<E: EventSink> StreamProcessor<E> {
    pub fn new(config: ProcessorConfig, events: E) -> Self {
        StreamProcessor {
            accumulator: LineAccumulator::with_max_pending(config.max_pending_bytes),
            history: FrameHistory::with_capacity(config.history_capacity),
            events,
            link: LinkState::Disconnected,
            stats: MonitorStats::default(),
            trace_records: config.trace_records,
        }
    }

    /// Handle one chunk of bytes from the link.
    ///
    /// Every complete record in the chunk is parsed and stamped with the time the
    /// chunk arrived. Emits exactly one `HistoryChanged` per call. Returns the number
    /// of frames added.
    pub fn on_bytes_received(&mut self, bytes: &[u8]) -> usize {
        let captured_at = Local::now();
        self.stats.bytes_received += bytes.len() as u64;

        let overflows_before = self.accumulator.overflow_count();
        self.accumulator.feed(bytes);
        self.stats.buffer_overflows += self.accumulator.overflow_count() - overflows_before;

        let mut added = 0;
        for raw in self.accumulator.drain_records() {
            match record::parse(&raw, captured_at) {
                Ok(frame) => {
                    if self.trace_records {
                        tlog!(
                            "[monitor] RX {} {} ({} chars)",
                            frame.id,
                            frame.payload,
                            frame.length
                        );
                    }
                    self.history.insert_front(frame);
                    self.stats.records_parsed += 1;
                    added += 1;
                }
                Err(err) => {
                    if err != RecordError::EmptyRecord {
                        tlog!(
                            "[monitor] Skipping record ({}): {:?}",
                            err.label(),
                            String::from_utf8_lossy(&raw)
                        );
                    }
                    self.stats.count_rejection(err);
                }
            }
        }

        self.notify_history();
        added
    }

    /// Encode and send a request, recording it as a TX frame.
    ///
    /// The frame is recorded whether or not the sink accepted the bytes; the
    /// returned outcome says what happened on the wire. A `NoRequestSelected`
    /// rejection leaves the history untouched.
    pub fn submit_request(
        &mut self,
        request_id: u32,
        sink: &mut dyn FrameSink,
    ) -> Result<SubmitOutcome, RequestError> {
        let encoded = match transmit::encode(request_id, Local::now()) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.events.emit(MonitorEvent::RequestRejected {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        let outcome = if sink.is_writable() {
            match sink.write_all(&encoded.wire).and_then(|_| sink.flush()) {
                Ok(()) => {
                    tlog!(
                        "[monitor] Sent request {} raw bytes: {}",
                        encoded.frame.id,
                        format_hex_bytes(&encoded.wire)
                    );
                    self.stats.requests_sent += 1;
                    SubmitOutcome::Sent
                }
                Err(e) => {
                    tlog!("[monitor] Write failed for request {}: {}", encoded.frame.id, e);
                    self.stats.write_failures += 1;
                    SubmitOutcome::WriteFailed(e.to_string())
                }
            }
        } else {
            self.stats.requests_unsent += 1;
            SubmitOutcome::NotWritable
        };

        self.history.insert_front(encoded.frame);
        self.notify_history();
        Ok(outcome)
    }

    /// Drop every frame from the history.
    pub fn clear(&mut self) {
        self.history.clear();
        self.notify_history();
    }

    /// Snapshot of the history through `filter`, newest first.
    pub fn current_view(&self, filter: &FrameFilter) -> Vec<Frame> {
        self.history.snapshot(filter)
    }

    /// Transport opened the link. Any bytes left from a previous connection are dropped.
    pub fn on_connected(&mut self) {
        self.accumulator.reset();
        self.link = LinkState::Connected;
        self.events
            .emit(MonitorEvent::LinkChanged { state: self.link });
    }

    /// Transport closed the link.
    pub fn on_disconnected(&mut self) {
        self.link = LinkState::Disconnected;
        self.events
            .emit(MonitorEvent::LinkChanged { state: self.link });
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats.clone()
    }

    /// Bytes waiting for a line feed
    pub fn pending_len(&self) -> usize {
        self.accumulator.pending_len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn notify_history(&mut self) {
        self.events.emit(MonitorEvent::HistoryChanged {
            count: self.history.len(),
        });
    }
}
