//! Who is connected and which cell they are on.

use gridsync_engine::engine::CellId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Presence of one user. Ephemeral: never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub name: String,
    #[serde(default)]
    pub active_cell: Option<CellId>,
}

impl Presence {
    pub fn new(name: &str) -> Self {
        Presence {
            name: name.to_string(),
            active_cell: None,
        }
    }
}

/// Presence keyed by user id.
pub type PresenceMap = BTreeMap<String, Presence>;
