//! Client-side replica of a shared workbook.
//!
//! `Replica` is synchronous: it takes a local [`Command`] or a relay
//! [`Message`], applies it to the workbook, and reports what happened as
//! [`Notice`]s plus at most one message to send. Local and remote edits go
//! through the same `Workbook::apply_edit` path.

use std::fmt;

use gridsync_core::{SortDirection, Workbook};
use gridsync_engine::engine::{CellId, column_letter};

use crate::presence::{Presence, PresenceMap};
use crate::protocol::Message;

/// Largest page height `Command::Sort` will order.
pub const MAX_SORT_ROWS: u32 = 100_000;

/// Who this client is on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
}

/// A local user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set a cell's raw input; an empty raw clears it.
    Edit { cell: CellId, raw: String },
    Select(Option<CellId>),
    Rename(String),
    NewPage,
    SwitchPage(String),
    DeletePage(String),
    ListPages,
    Sort { column: u32, direction: SortDirection },
    /// One cell, or every cell on the current page.
    Show(Option<CellId>),
    Users,
    /// Ask the relay for a fresh snapshot.
    Resync,
}

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Connected(String),
    Disconnected,
    /// Cells whose display value was rewritten, with the author if remote.
    Updated {
        by: Option<String>,
        cells: Vec<(CellId, String)>,
    },
    Cell {
        id: CellId,
        raw: String,
        display: String,
    },
    Sheet(Vec<(CellId, String, String)>),
    Sorted {
        column: u32,
        rows: Vec<(u32, String)>,
    },
    Pages {
        ids: Vec<String>,
        current: String,
    },
    Users(Vec<(String, Presence)>),
    UserJoined { user_id: String, name: String },
    UserLeft { user_id: String, name: Option<String> },
    UserMoved { name: String, cell: Option<CellId> },
    Synced { users: usize, seeded: usize },
    Info(String),
    Error(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Connected(addr) => write!(f, "connected to {}", addr),
            Notice::Disconnected => write!(f, "disconnected; working offline"),
            Notice::Updated { by, cells } => {
                let list: Vec<String> = cells
                    .iter()
                    .map(|(id, display)| format!("{} = {}", id, display))
                    .collect();
                match by {
                    Some(name) => write!(f, "{} (by {})", list.join(", "), name),
                    None => write!(f, "{}", list.join(", ")),
                }
            }
            Notice::Cell { id, raw, display } => {
                if raw.starts_with('=') {
                    write!(f, "{}: {} -> {}", id, raw, display)
                } else {
                    write!(f, "{}: {}", id, display)
                }
            }
            Notice::Sheet(cells) => {
                if cells.is_empty() {
                    return write!(f, "(empty page)");
                }
                let lines: Vec<String> = cells
                    .iter()
                    .map(|(id, raw, display)| {
                        if raw.starts_with('=') {
                            format!("{}: {} -> {}", id, raw, display)
                        } else {
                            format!("{}: {}", id, display)
                        }
                    })
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            Notice::Sorted { column, rows } => {
                let letters = column_letter(*column);
                let lines: Vec<String> = rows
                    .iter()
                    .map(|(row, display)| format!("{:>5} | {}", row, display))
                    .collect();
                write!(f, "sorted by {}\n{}", letters, lines.join("\n"))
            }
            Notice::Pages { ids, current } => {
                let list: Vec<String> = ids
                    .iter()
                    .map(|id| {
                        if id == current {
                            format!("*{}", id)
                        } else {
                            id.clone()
                        }
                    })
                    .collect();
                write!(f, "pages: {}", list.join(" "))
            }
            Notice::Users(users) => {
                if users.is_empty() {
                    return write!(f, "no other users online");
                }
                let list: Vec<String> = users
                    .iter()
                    .map(|(_, presence)| match presence.active_cell {
                        Some(cell) => format!("{} @ {}", presence.name, cell),
                        None => presence.name.clone(),
                    })
                    .collect();
                write!(f, "online: {}", list.join(", "))
            }
            Notice::UserJoined { name, .. } => write!(f, "{} joined", name),
            Notice::UserLeft { user_id, name } => {
                write!(f, "{} left", name.as_deref().unwrap_or(user_id))
            }
            Notice::UserMoved { name, cell } => match cell {
                Some(cell) => write!(f, "{} is on {}", name, cell),
                None => write!(f, "{} cleared their selection", name),
            },
            Notice::Synced { users, seeded } => {
                write!(f, "synced: {} user(s) online, {} cell(s) loaded", users, seeded)
            }
            Notice::Info(text) => write!(f, "{}", text),
            Notice::Error(text) => write!(f, "error: {}", text),
        }
    }
}

/// What executing a command produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Message for the relay, if connected.
    pub outgoing: Option<Message>,
    pub notices: Vec<Notice>,
}

impl Outcome {
    fn notice(notice: Notice) -> Self {
        Outcome {
            outgoing: None,
            notices: vec![notice],
        }
    }
}

/// One client's view of the shared workbook.
#[derive(Debug)]
pub struct Replica {
    identity: Identity,
    workbook: Workbook,
    /// Other users, keyed by user id.
    presence: PresenceMap,
    active_cell: Option<CellId>,
}

impl Replica {
    pub fn new(identity: Identity, workbook: Workbook) -> Self {
        Replica {
            identity,
            workbook,
            presence: PresenceMap::new(),
            active_cell: None,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub fn into_workbook(self) -> Workbook {
        self.workbook
    }

    pub fn presence(&self) -> &PresenceMap {
        &self.presence
    }

    pub fn active_cell(&self) -> Option<CellId> {
        self.active_cell
    }

    /// First message on every (re)connection.
    pub fn hello(&self) -> Message {
        Message::InitConnection {
            user_id: self.identity.user_id.clone(),
            user_name: self.identity.user_name.clone(),
        }
    }

    /// Run a local command.
    pub fn execute(&mut self, command: Command) -> Outcome {
        match command {
            Command::Edit { cell, raw } => {
                let cells = self.apply(cell, &raw);
                Outcome {
                    outgoing: Some(Message::CellUpdate {
                        user_id: self.identity.user_id.clone(),
                        cell_id: cell,
                        value: raw,
                        user_name: Some(self.identity.user_name.clone()),
                    }),
                    notices: vec![Notice::Updated { by: None, cells }],
                }
            }
            Command::Select(cell) => {
                self.active_cell = cell;
                Outcome {
                    outgoing: Some(Message::ActiveCell {
                        user_id: self.identity.user_id.clone(),
                        cell_id: cell,
                    }),
                    notices: cell.map(|id| self.cell_notice(id)).into_iter().collect(),
                }
            }
            Command::Rename(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Outcome::notice(Notice::Error("name cannot be empty".into()));
                }
                self.identity.user_name = name.clone();
                Outcome {
                    outgoing: Some(Message::UserJoined {
                        user_id: self.identity.user_id.clone(),
                        user_name: name.clone(),
                    }),
                    notices: vec![Notice::Info(format!("you are now {}", name))],
                }
            }
            Command::NewPage => {
                let id = self.workbook.new_page();
                self.persist();
                Outcome::notice(Notice::Info(format!("created {}", id)))
            }
            Command::SwitchPage(id) => match self.workbook.switch_page(&id) {
                Ok(()) => {
                    self.persist();
                    Outcome::notice(Notice::Info(format!("switched to {}", id)))
                }
                Err(e) => Outcome::notice(Notice::Error(e.to_string())),
            },
            Command::DeletePage(id) => match self.workbook.delete_page(&id) {
                Ok(()) => {
                    self.persist();
                    Outcome::notice(Notice::Info(format!(
                        "deleted {}; now on {}",
                        id,
                        self.workbook.current_page_id()
                    )))
                }
                Err(e) => Outcome::notice(Notice::Error(e.to_string())),
            },
            Command::ListPages => Outcome::notice(Notice::Pages {
                ids: self.workbook.page_ids(),
                current: self.workbook.current_page_id().to_string(),
            }),
            Command::Sort { column, direction } => {
                let store = self.workbook.store();
                let rows = store
                    .sorted_cells()
                    .last()
                    .map(|(id, _)| id.row + 1)
                    .unwrap_or(0);
                if rows > MAX_SORT_ROWS {
                    return Outcome::notice(Notice::Error(format!(
                        "page has {} rows; sorting is limited to {}",
                        rows, MAX_SORT_ROWS
                    )));
                }
                let rows = self
                    .workbook
                    .sorted_rows(column, rows, direction)
                    .into_iter()
                    .map(|row| (row, store.display_value(CellId::new(column, row - 1))))
                    .collect();
                Outcome::notice(Notice::Sorted { column, rows })
            }
            Command::Show(Some(id)) => Outcome::notice(self.cell_notice(id)),
            Command::Show(None) => {
                let cells = self
                    .workbook
                    .store()
                    .sorted_cells()
                    .into_iter()
                    .map(|(id, cell)| (id, cell.raw_input, cell.display_value))
                    .collect();
                Outcome::notice(Notice::Sheet(cells))
            }
            Command::Users => Outcome::notice(Notice::Users(
                self.presence
                    .iter()
                    .filter(|(id, _)| **id != self.identity.user_id)
                    .map(|(id, presence)| (id.clone(), presence.clone()))
                    .collect(),
            )),
            Command::Resync => Outcome {
                outgoing: Some(Message::RequestInitialData),
                notices: Vec::new(),
            },
        }
    }

    /// Apply a message from the relay.
    pub fn receive(&mut self, message: Message) -> Vec<Notice> {
        match message {
            Message::CellUpdate {
                user_id,
                cell_id,
                value,
                user_name,
            } => {
                let cells = self.apply(cell_id, &value);
                let by = user_name
                    .or_else(|| self.presence.get(&user_id).map(|p| p.name.clone()))
                    .unwrap_or(user_id);
                vec![Notice::Updated {
                    by: Some(by),
                    cells,
                }]
            }
            Message::InitialData {
                cells,
                active_users,
            } => {
                self.presence = active_users;
                let mut seeded = 0;
                if self.workbook.store().is_empty() {
                    for cell in cells {
                        self.workbook.apply_edit(cell.id, &cell.value);
                        seeded += 1;
                    }
                    if seeded > 0 {
                        self.persist();
                    }
                }
                vec![Notice::Synced {
                    users: self.presence.len(),
                    seeded,
                }]
            }
            Message::UserJoined { user_id, user_name } => {
                self.presence
                    .entry(user_id.clone())
                    .and_modify(|entry| entry.name = user_name.clone())
                    .or_insert_with(|| Presence::new(&user_name));
                if user_id == self.identity.user_id {
                    return Vec::new();
                }
                vec![Notice::UserJoined {
                    user_id,
                    name: user_name,
                }]
            }
            Message::UserLeft { user_id } => {
                let name = self.presence.remove(&user_id).map(|p| p.name);
                vec![Notice::UserLeft { user_id, name }]
            }
            Message::ActiveCell { user_id, cell_id } | Message::CursorMove { user_id, cell_id } => {
                match self.presence.get_mut(&user_id) {
                    Some(entry) => {
                        entry.active_cell = cell_id;
                        vec![Notice::UserMoved {
                            name: entry.name.clone(),
                            cell: cell_id,
                        }]
                    }
                    None => Vec::new(),
                }
            }
            other @ (Message::InitConnection { .. } | Message::RequestInitialData) => {
                tracing::warn!(kind = other.kind(), "client-only message from relay ignored");
                Vec::new()
            }
        }
    }

    fn apply(&mut self, cell: CellId, raw: &str) -> Vec<(CellId, String)> {
        let updated = self.workbook.apply_edit(cell, raw);
        self.persist();
        let store = self.workbook.store();
        updated
            .into_iter()
            .map(|id| (id, store.display_value(id)))
            .collect()
    }

    fn cell_notice(&self, id: CellId) -> Notice {
        let store = self.workbook.store();
        Notice::Cell {
            id,
            raw: store.raw_input(id),
            display: store.display_value(id),
        }
    }

    /// Save-on-change. Failures are logged and otherwise ignored.
    fn persist(&mut self) {
        if self.workbook.file_path.is_none() {
            return;
        }
        if let Err(e) = self.workbook.save_if_modified() {
            tracing::warn!(error = %e, "failed to save snapshot");
        }
    }
}
