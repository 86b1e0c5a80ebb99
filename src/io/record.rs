// src/io/record.rs
//
// Parser for the textual CAN records sent by the STM32 bridge firmware.
//
// Record format (one per line):
//   [ID 0x<hex>]<freeform text>
//
// Examples:
//   `[ID 0x1a2]hello`      -> id=0X1A2, payload="hello"
//   `[ID 0xFF]`            -> id=0XFF, payload="No data"
//   `[ID 0x18FF50E5] 01 02` -> id=0X18FF50E5, payload="01 02"

use chrono::{DateTime, Local};

use crate::error::RecordError;
use crate::io::{Direction, Frame};

/// Literal marker every record must start with (case-sensitive)
pub const RECORD_PREFIX: &str = "[ID 0x";

/// Payload text used when nothing follows the closing bracket
pub const NO_DATA: &str = "No data";

/// Parse one record (without its line feed) captured at `captured_at`.
///
/// The id is taken verbatim from the first `0x` up to the first `]` after it and
/// upper-cased; it is not checked for valid hex digits.
pub fn parse(record: &[u8], captured_at: DateTime<Local>) -> Result<Frame, RecordError> {
    let text = String::from_utf8_lossy(record);
    let line = text.trim();

    if line.is_empty() {
        return Err(RecordError::EmptyRecord);
    }

    if !line.starts_with(RECORD_PREFIX) {
        return Err(RecordError::UnrecognizedFormat);
    }

    let id_start = line.find("0x").ok_or(RecordError::MalformedId)?;
    let id_end = line[id_start..]
        .find(']')
        .map(|offset| id_start + offset)
        .ok_or(RecordError::MalformedId)?;

    let id = line[id_start..id_end].to_uppercase();

    let rest = &line[id_end + 1..];
    let payload = if rest.is_empty() {
        NO_DATA.to_string()
    } else {
        rest.trim().to_string()
    };
    let length = payload.chars().count();

    Ok(Frame {
        timestamp: captured_at,
        id,
        payload,
        length,
        direction: Direction::Inbound,
    })
}

/// Parse a record stamped with the current local time.
pub fn parse_record(record: &str) -> Result<Frame, RecordError> {
    parse(record.as_bytes(), Local::now())
}
