//! Wire messages exchanged between clients and the relay.
//!
//! Every message is a JSON object tagged by a snake_case `type` field with
//! camelCase payload fields, e.g.
//! `{"type":"cell_update","userId":"u1","cellId":"A1","value":"=B1*2"}`.

use gridsync_engine::engine::{CellId, CellStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::presence::PresenceMap;

/// One cell inside an `initial_data` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSnapshot {
    pub id: CellId,
    /// Raw input.
    pub value: String,
    #[serde(default)]
    pub display_value: String,
}

/// Snapshot of every non-empty cell in `store`, row-major.
pub fn snapshot_cells(store: &CellStore) -> Vec<CellSnapshot> {
    store
        .sorted_cells()
        .into_iter()
        .map(|(id, cell)| CellSnapshot {
            id,
            value: cell.raw_input,
            display_value: cell.display_value,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    /// Client → relay: register this connection under a user identity.
    InitConnection { user_id: String, user_name: String },
    /// Relay → client: current cells and who is online.
    InitialData {
        #[serde(default)]
        cells: Vec<CellSnapshot>,
        #[serde(default)]
        active_users: PresenceMap,
    },
    /// An edit to one cell; `value` is the raw input.
    CellUpdate {
        user_id: String,
        cell_id: CellId,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
    },
    /// The user selected a cell, or cleared the selection.
    ActiveCell {
        user_id: String,
        #[serde(default)]
        cell_id: Option<CellId>,
    },
    /// The user's cursor moved over a cell.
    CursorMove {
        user_id: String,
        #[serde(default)]
        cell_id: Option<CellId>,
    },
    /// A user came online, or renamed themselves.
    UserJoined { user_id: String, user_name: String },
    UserLeft { user_id: String },
    /// Client → relay: ask for a fresh `initial_data`.
    RequestInitialData,
}

const KNOWN_TYPES: &[&str] = &[
    "init_connection",
    "initial_data",
    "cell_update",
    "active_cell",
    "cursor_move",
    "user_joined",
    "user_left",
    "request_initial_data",
];

impl Message {
    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::InitConnection { .. } => "init_connection",
            Message::InitialData { .. } => "initial_data",
            Message::CellUpdate { .. } => "cell_update",
            Message::ActiveCell { .. } => "active_cell",
            Message::CursorMove { .. } => "cursor_move",
            Message::UserJoined { .. } => "user_joined",
            Message::UserLeft { .. } => "user_left",
            Message::RequestInitialData => "request_initial_data",
        }
    }
}

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(Message),
    /// Well-formed JSON with a `type` this build does not know. Receivers
    /// ignore these.
    Unknown(String),
}

/// Decode one frame.
///
/// Malformed JSON, a missing `type`, or a known type with a bad payload are
/// errors. An unrecognized `type` is not.
pub fn decode(line: &str) -> Result<Decoded> {
    let value: Value = serde_json::from_str(line)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::Protocol("message has no type".to_string()))?
        .to_string();

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Ok(Decoded::Unknown(kind));
    }
    Ok(Decoded::Message(serde_json::from_value(value)?))
}

/// Encode one message as a single line of JSON (without the newline).
pub fn encode(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}
