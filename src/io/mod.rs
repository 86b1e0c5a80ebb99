// src/io/mod.rs
//
// Frame model shared by the inbound parser, the outbound encoder and the history.
//
// Submodules:
// - record: textual `[ID 0x...]` record parser
// - serial: line accumulator and blocking serial transport

pub mod record;
pub mod serial;

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

use crate::logging::TIME_FORMAT;

/// Which way a frame travelled over the link
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Parsed from a record received on the link
    Inbound,
    /// Recorded locally when a request was submitted
    Outbound,
}

impl Direction {
    /// Table label: "RX" for inbound, "TX" for outbound
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Inbound => "RX",
            Direction::Outbound => "TX",
        }
    }
}

/// One observed or sent CAN-related event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Frame {
    /// Wall-clock capture time
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Local>,
    /// Hex identifier text, e.g. "0x1900140" (outbound) or "0X1A2" (inbound)
    pub id: String,
    /// Hex byte pairs for outbound frames, free text for inbound frames
    pub payload: String,
    /// Payload byte count (outbound) or payload character count (inbound)
    pub length: usize,
    pub direction: Direction,
}

impl Frame {
    /// Capture time as `HH:MM:SS.mmm`
    pub fn timestamp_label(&self) -> String {
        self.timestamp.format(TIME_FORMAT).to_string()
    }

    /// DLC column text. Inbound lengths are character counts, so they are shown as "N/A".
    pub fn length_label(&self) -> String {
        match self.direction {
            Direction::Inbound => "N/A".to_string(),
            Direction::Outbound => self.length.to_string(),
        }
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.format(TIME_FORMAT).to_string())
}
