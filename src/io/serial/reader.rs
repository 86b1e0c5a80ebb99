// src/io/serial/reader.rs
//
// Blocking serial port reader.
//
// The port is owned by one blocking thread. That thread forwards every read chunk
// as a `SerialEvent::Bytes` and services queued transmit requests between reads,
// so the stream processor on the consuming task never shares state with it.

use serde::Serialize;
use std::io::{self, Read, Write};
use std::sync::mpsc as std_mpsc;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::monitor::FrameSink;
use crate::transmit::format_hex_bytes;

/// Read timeout; bounds the latency of transmit requests and cancellation
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// How long a transmit waits for the reader thread to report the write result
const TRANSMIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Transmit requests queued before `try_send` reports the queue as full
const TRANSMIT_QUEUE_DEPTH: usize = 32;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Port to open. The baud rate is passed through unchanged; no other line settings are applied.
#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
}

/// Message from the reader thread to the consuming task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// Port opened
    Connected { port: String },
    /// One read's worth of raw bytes
    Bytes(Vec<u8>),
    /// Reader stopped ("stopped", "disconnected" or "error")
    Ended { reason: String },
    /// Open or read failure
    Error(String),
}

/// Transmit request sent through the channel
pub struct TransmitRequest {
    /// Wire bytes ready to send
    pub data: Vec<u8>,
    /// Sync oneshot channel to send the result back
    pub result_tx: std_mpsc::SyncSender<Result<(), String>>,
}

/// Sender type for transmit requests (sync-safe)
pub type TransmitSender = std_mpsc::SyncSender<TransmitRequest>;

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

// ============================================================================
// Transmitter
// ============================================================================

/// `FrameSink` that hands bytes to the reader thread.
///
/// `write_all` stages bytes; `flush` queues them and waits for the thread to
/// write and flush the port.
pub struct SerialTransmitter {
    tx: Option<TransmitSender>,
    connected: Arc<AtomicBool>,
    staged: Vec<u8>,
}

impl SerialTransmitter {
    fn new(tx: TransmitSender, connected: Arc<AtomicBool>) -> Self {
        SerialTransmitter {
            tx: Some(tx),
            connected,
            staged: Vec::new(),
        }
    }

    /// Transmitter with no reader behind it. Never writable.
    pub fn detached() -> Self {
        SerialTransmitter {
            tx: None,
            connected: Arc::new(AtomicBool::new(false)),
            staged: Vec::new(),
        }
    }
}

impl FrameSink for SerialTransmitter {
    fn is_writable(&self) -> bool {
        self.tx.is_some() && self.connected.load(Ordering::Relaxed)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.staged.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.staged);

        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no transmit channel"))?;

        let (result_tx, result_rx) = std_mpsc::sync_channel(1);
        tx.try_send(TransmitRequest { data, result_tx })
            .map_err(|e| io::Error::other(format!("Failed to queue transmit request: {}", e)))?;

        await_transmit_result(&result_rx)
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Transmit timeout or channel closed: {}", e),
                )
            })?
            .map_err(io::Error::other)
    }
}

/// Wait for the reader thread's answer. On a multi-thread runtime the wait is
/// moved off the async worker so other tasks keep running.
fn await_transmit_result(
    result_rx: &std_mpsc::Receiver<Result<(), String>>,
) -> Result<Result<(), String>, std_mpsc::RecvTimeoutError> {
    let multi_thread = tokio::runtime::Handle::try_current()
        .map(|handle| handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread)
        .unwrap_or(false);

    if multi_thread {
        tokio::task::block_in_place(|| result_rx.recv_timeout(TRANSMIT_TIMEOUT))
    } else {
        result_rx.recv_timeout(TRANSMIT_TIMEOUT)
    }
}

// ============================================================================
// Serial Reader
// ============================================================================

/// Owns the reader thread for one port
pub struct SerialReader {
    config: SerialConfig,
    cancel_flag: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<()>>,
}

impl SerialReader {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            task_handle: None,
        }
    }

    /// Start reading on a blocking thread. Must be called inside a Tokio runtime.
    /// Returns the transmitter for outbound requests on this port.
    pub fn start(&mut self, events: mpsc::UnboundedSender<SerialEvent>) -> SerialTransmitter {
        self.cancel_flag.store(false, Ordering::Relaxed);

        let (transmit_tx, transmit_rx) = std_mpsc::sync_channel::<TransmitRequest>(TRANSMIT_QUEUE_DEPTH);

        let config = self.config.clone();
        let cancel_flag = self.cancel_flag.clone();
        let connected = self.connected.clone();

        self.task_handle = Some(tokio::task::spawn_blocking(move || {
            run_serial_stream_blocking(config, cancel_flag, connected, events, transmit_rx)
        }));

        SerialTransmitter::new(transmit_tx, self.connected.clone())
    }

    /// Ask the reader thread to stop and wait for it.
    pub async fn stop(&mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                tlog!("[serial] Reader task panicked: {:?}", e);
            }
        }
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Blocking read/transmit loop. Runs until cancelled, EOF or a read error.
fn run_serial_stream_blocking(
    config: SerialConfig,
    cancel_flag: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SerialEvent>,
    transmit_rx: std_mpsc::Receiver<TransmitRequest>,
) {
    let mut port = match serialport::new(&config.port, config.baud_rate)
        .timeout(READ_TIMEOUT)
        .open()
    {
        Ok(p) => p,
        Err(e) => {
            let _ = events.send(SerialEvent::Error(format!("Failed to open {}: {}", config.port, e)));
            let _ = events.send(SerialEvent::Ended {
                reason: "error".to_string(),
            });
            return;
        }
    };

    tlog!("[serial] Opened {} at {} baud", config.port, config.baud_rate);
    connected.store(true, Ordering::Relaxed);
    let _ = events.send(SerialEvent::Connected {
        port: config.port.clone(),
    });

    let mut buf = [0u8; 256];
    let reason;

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            reason = "stopped";
            break;
        }

        // Process pending transmit requests (non-blocking)
        while let Ok(req) = transmit_rx.try_recv() {
            let result = port
                .write_all(&req.data)
                .and_then(|_| port.flush())
                .map_err(|e| format!("Serial write error: {}", e));
            if result.is_ok() {
                tlog!("[serial] Wrote {} bytes: {}", req.data.len(), format_hex_bytes(&req.data));
            }
            let _ = req.result_tx.try_send(result);
        }

        match port.read(&mut buf) {
            Ok(0) => {
                reason = "disconnected";
                break;
            }
            Ok(n) => {
                if events.send(SerialEvent::Bytes(buf[..n].to_vec())).is_err() {
                    // Consumer dropped its receiver
                    reason = "stopped";
                    break;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                // Timeout is expected for serial reads
            }
            Err(e) => {
                let _ = events.send(SerialEvent::Error(format!("Read error: {}", e)));
                reason = "error";
                break;
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
    tlog!("[serial] Closed {} ({})", config.port, reason);
    let _ = events.send(SerialEvent::Ended {
        reason: reason.to_string(),
    });
}

/// List serial ports visible to the OS
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, serialport::Error> {
    let ports = serialport::available_ports()?;

    Ok(ports
        .into_iter()
        // On macOS only show /dev/cu.* (calling unit), not /dev/tty.*
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None, None),
                serialport::SerialPortType::Unknown => {
                    ("Unknown".to_string(), None, None, None, None, None)
                }
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stand-in for the reader thread: records every request and answers with `reply`
    fn spawn_fake_port(
        rx: std_mpsc::Receiver<TransmitRequest>,
        reply: Result<(), String>,
    ) -> std::thread::JoinHandle<Vec<Vec<u8>>> {
        std::thread::spawn(move || {
            let mut written = Vec::new();
            while let Ok(req) = rx.recv() {
                written.push(req.data);
                let _ = req.result_tx.send(reply.clone());
            }
            written
        })
    }

    #[test]
    fn test_transmitter_writes_on_flush() {
        let (tx, rx) = std_mpsc::sync_channel(4);
        let port = spawn_fake_port(rx, Ok(()));
        let mut transmitter = SerialTransmitter::new(tx, Arc::new(AtomicBool::new(true)));

        assert!(transmitter.is_writable());
        transmitter.write_all(&[0x01, 0x90]).unwrap();
        transmitter.write_all(&[0x01, 0x40]).unwrap();
        transmitter.flush().unwrap();

        drop(transmitter);
        assert_eq!(port.join().unwrap(), vec![vec![0x01, 0x90, 0x01, 0x40]]);
    }

    #[test]
    fn test_transmitter_reports_port_error() {
        let (tx, rx) = std_mpsc::sync_channel(4);
        let _port = spawn_fake_port(rx, Err("Serial write error: gone".to_string()));
        let mut transmitter = SerialTransmitter::new(tx, Arc::new(AtomicBool::new(true)));

        transmitter.write_all(&[0xAA]).unwrap();
        let err = transmitter.flush().unwrap_err();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_transmitter_not_writable_until_connected() {
        let (tx, _rx) = std_mpsc::sync_channel(4);
        let connected = Arc::new(AtomicBool::new(false));
        let transmitter = SerialTransmitter::new(tx, connected.clone());
        assert!(!transmitter.is_writable());

        connected.store(true, Ordering::Relaxed);
        assert!(transmitter.is_writable());
    }

    #[test]
    fn test_detached_transmitter() {
        let mut transmitter = SerialTransmitter::detached();
        assert!(!transmitter.is_writable());
        transmitter.write_all(&[0x01]).unwrap();
        assert_eq!(
            transmitter.flush().unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_transmit_wait_leaves_runtime_responsive() {
        let (tx, rx) = std_mpsc::sync_channel::<TransmitRequest>(4);
        let (ticks_tx, mut ticks_rx) = mpsc::unbounded_channel();

        let port = std::thread::spawn(move || {
            let req = rx.recv().unwrap();
            std::thread::sleep(Duration::from_millis(200));
            let _ = req.result_tx.send(Ok(()));
            req.data
        });
        let ticker = tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let _ = ticks_tx.send(());
            }
        });

        // The only worker runs the flush; the ticker makes progress only if the
        // wait hands the worker back to the runtime
        let sender = tokio::spawn(async move {
            let mut transmitter = SerialTransmitter::new(tx, Arc::new(AtomicBool::new(true)));
            transmitter.write_all(&[0x01, 0x92, 0x01, 0x40]).unwrap();
            transmitter.flush().unwrap();
            let mut ticks = 0;
            while ticks_rx.try_recv().is_ok() {
                ticks += 1;
            }
            ticks
        });

        assert_eq!(sender.await.unwrap(), 3);
        ticker.await.unwrap();
        assert_eq!(port.join().unwrap(), vec![0x01, 0x92, 0x01, 0x40]);
    }

    #[test]
    fn test_transmit_times_out_without_reply() {
        let (tx, _rx) = std_mpsc::sync_channel(4);
        let mut transmitter = SerialTransmitter::new(tx, Arc::new(AtomicBool::new(true)));
        transmitter.write_all(&[0x01]).unwrap();
        assert_eq!(transmitter.flush().unwrap_err().kind(), io::ErrorKind::TimedOut);
    }
}
