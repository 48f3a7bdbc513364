use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client -> server commands.
///
/// Wire shape is `{"action": "...", "payload": {...}}`, hence the adjacent
/// tagging. Requests carry an empty payload object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum Command {
    Push { x: u16, y: u16 },
    AllButtons {},
    Size {},
}

/// Server -> client events, one per incoming frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    PushOk {
        x: u16,
        y: u16,
    },
    PushError {
        x: u16,
        y: u16,
    },
    SetText {
        x: u16,
        y: u16,
        text: String,
        #[serde(default)]
        is_icon: bool,
    },
    Size {
        rows: u16,
        cols: u16,
    },
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed frame: {raw}")]
    Malformed { raw: String },
}

pub fn encode_command(command: &Command) -> Result<String, WireError> {
    serde_json::to_string(command).map_err(WireError::Encode)
}

/// Total decode: every input maps to exactly one typed event or `Malformed`.
/// Unknown actions and payloads missing required fields are `Malformed` with
/// the offending raw text attached for diagnostics. No side effects.
pub fn decode_event(raw: &str) -> Result<ServerEvent, WireError> {
    serde_json::from_str(raw).map_err(|_| WireError::Malformed {
        raw: raw.to_string(),
    })
}
