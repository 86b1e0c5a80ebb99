// src/lib.rs
//
// Serial CAN monitor library: line framing, record parsing, bounded frame history
// and request encoding, plus the terminal front end used by the `canmon` binary.

#[macro_use]
mod logging;

pub mod cli;
pub mod error;
pub mod history;
pub mod io;
pub mod monitor;
pub mod settings;
pub mod transmit;

pub use error::{MonitorError, RecordError, RequestError};
pub use history::{FrameFilter, FrameHistory};
pub use io::{Direction, Frame};
pub use logging::{init_file_logging, stop_file_logging};
pub use monitor::{
    Disconnected, EventSink, FrameSink, LinkState, MonitorEvent, MonitorStats, NullEvents,
    ProcessorConfig, StreamProcessor, SubmitOutcome,
};
pub use settings::MonitorSettings;
pub use transmit::{RequestCatalog, RequestDefinition};

use clap::Parser;

/// Parse command-line arguments and run the monitor until `quit` or end of stream.
pub fn run() -> Result<(), MonitorError> {
    let args = cli::CliArgs::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(cli::run_monitor(args))
}
