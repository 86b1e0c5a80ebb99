// src/cli.rs
//
// Terminal front end: opens the serial port, feeds the stream processor and
// renders the frame table. Interactive commands are read line by line from stdin.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;

use crate::error::MonitorError;
use crate::history::FrameFilter;
use crate::io::serial::{list_serial_ports, SerialConfig, SerialEvent, SerialPortInfo, SerialReader};
use crate::io::Frame;
use crate::logging::{init_file_logging, stop_file_logging};
use crate::monitor::{EventSink, FrameSink, LinkState, MonitorEvent, MonitorStats, StreamProcessor, SubmitOutcome};
use crate::settings::{default_settings_path, load_settings, MonitorSettings};
use crate::transmit::{format_request_id, RequestCatalog};

#[derive(Parser, Debug)]
#[command(name = "canmon", version, about = "Monitor and transmit CAN frames over a serial bridge")]
pub struct CliArgs {
    /// Serial port path (overrides settings)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate passed to the port (overrides settings)
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Settings file (default: <config dir>/canmon/settings.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write logs to this directory as well as stderr
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Print snapshots as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// List serial ports and exit
    #[arg(long)]
    pub list_ports: bool,
}

/// Interactive command typed on stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a request by catalog index, hex id or label
    Send(String),
    /// List the request catalog
    Requests,
    Clear,
    /// Set (`Some`) or disable (`None`) the id filter
    Filter(Option<String>),
    Show,
    Stats,
    Help,
    Quit,
}

pub const HELP_TEXT: &str = "\
Commands:
  send <index|0xID|label>  transmit a request
  requests                 list available requests
  clear                    clear the frame history
  filter <text>            show only ids containing <text>
  filter off               show all frames
  show                     print the frame table
  stats                    print counters
  quit                     exit";

/// Parse one stdin line
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "send" | "s" if !rest.is_empty() => Ok(Command::Send(rest.to_string())),
        "send" | "s" => Err("usage: send <index|0xID|label>".to_string()),
        "requests" | "r" => Ok(Command::Requests),
        "clear" | "c" => Ok(Command::Clear),
        "filter" | "f" => match rest {
            "" | "off" => Ok(Command::Filter(None)),
            text => Ok(Command::Filter(Some(text.to_string()))),
        },
        "show" | "" => Ok(Command::Show),
        "stats" => Ok(Command::Stats),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{}' (try 'help')", other)),
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Frame table with a `CAN Monitor (N frames)` header
pub fn render_table(frames: &[Frame]) -> String {
    let mut out = format!("CAN Monitor ({} frames)\n", frames.len());
    out.push_str(&format!(
        "{:<12}  {:<3}  {:<12}  {:<3}  {}\n",
        "Time", "Dir", "ID", "DLC", "Data"
    ));
    for frame in frames {
        out.push_str(&format!(
            "{:<12}  {:<3}  {:<12}  {:<3}  {}\n",
            frame.timestamp_label(),
            frame.direction.label(),
            frame.id,
            frame.length_label(),
            frame.payload
        ));
    }
    out
}

/// One-line status with the link state and counters
pub fn render_stats(connected: bool, stats: &MonitorStats) -> String {
    format!(
        "{} | rx bytes: {} | frames: {} | rejected: {} | sent: {} | unsent: {} | write errors: {} | overflows: {}",
        if connected { "Connected" } else { "Disconnected" },
        stats.bytes_received,
        stats.records_parsed,
        stats.rejected(),
        stats.requests_sent,
        stats.requests_unsent,
        stats.write_failures,
        stats.buffer_overflows
    )
}

/// One `--list-ports` line: name, type, then whatever USB details the OS reports
pub fn render_port(port: &SerialPortInfo) -> String {
    let mut line = format!("{}  {}", port.port_name, port.port_type);
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        line.push_str(&format!("  {:04x}:{:04x}", vid, pid));
    }
    for detail in [&port.manufacturer, &port.product, &port.serial_number]
        .into_iter()
        .flatten()
    {
        line.push_str("  ");
        line.push_str(detail);
    }
    line
}

fn render_catalog(catalog: &RequestCatalog) -> String {
    catalog
        .entries()
        .iter()
        .enumerate()
        .map(|(i, def)| format!("  {}: {} ({})", i, def.label, format_request_id(def.id)))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Run Loop
// ============================================================================

/// Merge the settings file with command-line overrides
pub fn resolve_settings(args: &CliArgs) -> Result<MonitorSettings, MonitorError> {
    let mut settings = match args.config.clone().or_else(default_settings_path) {
        Some(path) => load_settings(&path)?,
        None => MonitorSettings::default(),
    };

    if let Some(port) = &args.port {
        settings.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        settings.baud_rate = baud;
    }
    if let Some(dir) = &args.log_dir {
        settings.log_dir = Some(dir.clone());
    }
    Ok(settings)
}

struct View {
    json: bool,
    filter: FrameFilter,
}

impl View {
    fn print<E: EventSink>(&self, processor: &StreamProcessor<E>) -> Result<(), MonitorError> {
        let frames = processor.current_view(&self.filter);
        if self.json {
            println!("{}", serde_json::to_string(&frames)?);
        } else {
            print!("{}", render_table(&frames));
        }
        Ok(())
    }
}

pub async fn run_monitor(args: CliArgs) -> Result<(), MonitorError> {
    if args.list_ports {
        let ports = list_serial_ports()?;
        if args.json {
            println!("{}", serde_json::to_string(&ports)?);
        } else {
            for port in &ports {
                println!("{}", render_port(port));
            }
        }
        return Ok(());
    }

    let settings = resolve_settings(&args)?;
    if let Some(dir) = &settings.log_dir {
        init_file_logging(dir).map_err(MonitorError::Logging)?;
    }
    let port = settings.port.clone().ok_or(MonitorError::NoPort)?;
    let catalog = RequestCatalog::with_extra(&settings.requests);

    let (event_tx, event_rx) = mpsc::unbounded_channel::<MonitorEvent>();
    let mut processor = StreamProcessor::new(settings.processor_config(), event_tx);

    let (serial_tx, serial_rx) = mpsc::unbounded_channel::<SerialEvent>();
    let mut reader = SerialReader::new(SerialConfig {
        port,
        baud_rate: settings.baud_rate,
    });
    let mut transmitter = reader.start(serial_tx);

    let mut view = View {
        json: args.json,
        filter: FrameFilter::disabled(),
    };
    let commands = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", HELP_TEXT);

    let result = drive(
        &mut processor,
        event_rx,
        &catalog,
        &mut view,
        commands,
        serial_rx,
        &mut transmitter,
    )
    .await;

    reader.stop().await;
    stop_file_logging();
    result
}

/// Event loop shared by the binary and its tests.
///
/// Returns on `quit`, or once stdin is exhausted and the serial stream has ended.
async fn drive<E, R>(
    processor: &mut StreamProcessor<E>,
    mut event_rx: mpsc::UnboundedReceiver<MonitorEvent>,
    catalog: &RequestCatalog,
    view: &mut View,
    mut commands: Lines<R>,
    mut serial_rx: mpsc::UnboundedReceiver<SerialEvent>,
    transmitter: &mut dyn FrameSink,
) -> Result<(), MonitorError>
where
    E: EventSink,
    R: AsyncBufRead + Unpin,
{
    let mut stdin_open = true;
    let mut stream_open = true;

    while stdin_open || stream_open {
        tokio::select! {
            event = serial_rx.recv(), if stream_open => match event {
                Some(SerialEvent::Bytes(bytes)) => {
                    processor.on_bytes_received(&bytes);
                }
                Some(SerialEvent::Connected { port }) => {
                    println!("Connected to {}", port);
                    processor.on_connected();
                }
                Some(SerialEvent::Ended { reason }) => {
                    println!("Serial stream ended ({})", reason);
                    processor.on_disconnected();
                    stream_open = false;
                }
                Some(SerialEvent::Error(message)) => {
                    tlog!("[cli] {}", message);
                }
                None => {
                    if processor.link_state() == LinkState::Connected {
                        processor.on_disconnected();
                    }
                    stream_open = false;
                }
            },
            Some(event) = event_rx.recv() => match event {
                MonitorEvent::HistoryChanged { .. } => view.print(processor)?,
                MonitorEvent::RequestRejected { message } => println!("Warning: {}", message),
                MonitorEvent::LinkChanged { .. } => {
                    println!("{}", render_stats(processor.link_state() == LinkState::Connected, &processor.stats()));
                }
            },
            line = commands.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    continue;
                };
                match parse_command(&line) {
                    Ok(Command::Send(target)) => match catalog.resolve(&target) {
                        Ok(id) => match processor.submit_request(id, transmitter) {
                            Ok(SubmitOutcome::Sent) => println!("Sent {}", format_request_id(id)),
                            Ok(SubmitOutcome::NotWritable) => {
                                println!("Not connected: {} recorded but not sent", format_request_id(id))
                            }
                            Ok(SubmitOutcome::WriteFailed(e)) => println!("Write failed: {}", e),
                            // Reported through RequestRejected
                            Err(_) => {}
                        },
                        Err(e) => println!("Warning: {}", e),
                    },
                    Ok(Command::Requests) => println!("{}", render_catalog(catalog)),
                    Ok(Command::Clear) => processor.clear(),
                    Ok(Command::Filter(text)) => {
                        view.filter = match text {
                            Some(text) => FrameFilter::id_contains(text),
                            None => FrameFilter::disabled(),
                        };
                        view.print(processor)?;
                    }
                    Ok(Command::Show) => view.print(processor)?,
                    Ok(Command::Stats) => {
                        println!("{}", render_stats(processor.link_state() == LinkState::Connected, &processor.stats()))
                    }
                    Ok(Command::Help) => println!("{}", HELP_TEXT),
                    Ok(Command::Quit) => break,
                    Err(e) => println!("{}", e),
                }
            }
            else => break,
        }
    }

    Ok(())
}
