// src/transmit.rs
//
// Outbound request encoding.
//
// A request is a 32-bit identifier chosen from a small catalog. On the wire it is
// sent as 4 big-endian bytes with no framing. The history records it as a TX frame
// with a fixed 8-byte zero payload, which is what the bridge firmware expects the
// request frame to carry on the bus.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::io::{Direction, Frame};

/// Request id meaning "nothing selected"
pub const NO_REQUEST: u32 = 0;

/// Bytes recorded as the outbound frame payload
pub const REQUEST_PAYLOAD: [u8; 8] = [0x00; 8];

// ============================================================================
// Request Catalog
// ============================================================================

/// A named request bound to an identifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDefinition {
    pub label: String,
    pub id: u32,
}

impl RequestDefinition {
    pub fn new(label: impl Into<String>, id: u32) -> Self {
        RequestDefinition {
            label: label.into(),
            id,
        }
    }
}

/// BMS requests understood by the bridge firmware
const BUILTIN_REQUESTS: [(&str, u32); 4] = [
    ("Select request...", NO_REQUEST),
    ("SOC of Total Voltage / Current", 0x1900140),
    ("Max/Min Cell Voltages", 0x1910140),
    ("Max/Min Temperature", 0x1920140),
];

/// Ordered list of selectable requests. Entry 0 is always the "no selection" sentinel.
#[derive(Clone, Debug)]
pub struct RequestCatalog {
    entries: Vec<RequestDefinition>,
}

impl Default for RequestCatalog {
    fn default() -> Self {
        RequestCatalog {
            entries: BUILTIN_REQUESTS
                .iter()
                .map(|(label, id)| RequestDefinition::new(*label, *id))
                .collect(),
        }
    }
}

impl RequestCatalog {
    /// Built-in requests followed by `extra` (entries reusing a built-in id are skipped).
    pub fn with_extra(extra: &[RequestDefinition]) -> Self {
        let mut catalog = Self::default();
        for def in extra {
            if def.id == NO_REQUEST || catalog.entries.iter().any(|e| e.id == def.id) {
                tlog!("[transmit] Ignoring duplicate request '{}' ({:#x})", def.label, def.id);
                continue;
            }
            catalog.entries.push(def.clone());
        }
        catalog
    }

    pub fn entries(&self) -> &[RequestDefinition] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&RequestDefinition> {
        self.entries.get(index)
    }

    /// Resolve user input to a request id.
    ///
    /// Accepts a catalog index (`2`), a hex id (`0x1910140`) or a label
    /// (case-insensitive). Index 0 resolves to [`NO_REQUEST`].
    pub fn resolve(&self, input: &str) -> Result<u32, RequestError> {
        let input = input.trim();

        if let Ok(index) = input.parse::<usize>() {
            return self
                .get(index)
                .map(|def| def.id)
                .ok_or_else(|| RequestError::UnknownRequest(input.to_string()));
        }

        if let Some(hex) = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
        {
            return u32::from_str_radix(hex, 16)
                .map_err(|_| RequestError::UnknownRequest(input.to_string()));
        }

        self.entries
            .iter()
            .find(|def| def.label.eq_ignore_ascii_case(input))
            .map(|def| def.id)
            .ok_or_else(|| RequestError::UnknownRequest(input.to_string()))
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Result of encoding one request
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedRequest {
    /// Exact bytes to write to the link
    pub wire: [u8; 4],
    /// Frame to record in the history
    pub frame: Frame,
}

/// Format a request id the way outbound frames display it: `0x` + 7 upper hex digits
pub fn format_request_id(request_id: u32) -> String {
    format!("0x{:07X}", request_id)
}

/// Space-separated uppercase hex byte pairs, e.g. "00 01 FF"
pub fn format_hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Encode `request_id` for transmission, stamping the recorded frame with `captured_at`.
pub fn encode(request_id: u32, captured_at: DateTime<Local>) -> Result<EncodedRequest, RequestError> {
    if request_id == NO_REQUEST {
        return Err(RequestError::NoRequestSelected);
    }

    let frame = Frame {
        timestamp: captured_at,
        id: format_request_id(request_id),
        payload: format_hex_bytes(&REQUEST_PAYLOAD),
        length: REQUEST_PAYLOAD.len(),
        direction: Direction::Outbound,
    };

    Ok(EncodedRequest {
        wire: request_id.to_be_bytes(),
        frame,
    })
}
