// src/error.rs
//
// Error taxonomy for record parsing, request encoding and process setup.

use thiserror::Error;

/// Why an inbound record was dropped.
/// None of these are fatal: the record is skipped and processing continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RecordError {
    #[error("empty record")]
    EmptyRecord,

    #[error("record does not start with '[ID 0x'")]
    UnrecognizedFormat,

    #[error("record has no '0x...]' identifier")]
    MalformedId,
}

impl RecordError {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            RecordError::EmptyRecord => "empty",
            RecordError::UnrecognizedFormat => "unrecognized",
            RecordError::MalformedId => "malformed_id",
        }
    }
}

/// User-facing request selection errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Please select a request type!")]
    NoRequestSelected,

    #[error("Unknown request: {0}")]
    UnknownRequest(String),
}

/// Errors raised while setting up or driving the monitor process.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("No serial port given (use --port or set `port` in settings)")]
    NoPort,

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
