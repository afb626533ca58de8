//! The relay: one authoritative ordering point for every connected client.
//!
//! `Relay` is a synchronous state machine. Each call handles one event to
//! completion and returns the messages to deliver; the async server in
//! `server.rs` owns the sockets and feeds events in one at a time.

use std::collections::BTreeMap;

use gridsync_core::Workbook;
use gridsync_engine::engine::CellId;

use crate::presence::{Presence, PresenceMap};
use crate::protocol::{Message, snapshot_cells};

pub type SessionId = u64;

/// Who receives an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Session(SessionId),
    /// Every session except this one.
    Others(SessionId),
    All,
}

impl Recipient {
    pub fn includes(&self, session: SessionId) -> bool {
        match *self {
            Recipient::Session(target) => target == session,
            Recipient::Others(sender) => sender != session,
            Recipient::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: Recipient,
    pub message: Message,
}

impl Envelope {
    fn new(to: Recipient, message: Message) -> Self {
        Envelope { to, message }
    }
}

/// Relay state: connected sessions, the server-side mirror, and presence.
#[derive(Debug, Default)]
pub struct Relay {
    /// Session → user id registered by `init_connection`, if any.
    sessions: BTreeMap<SessionId, Option<String>>,
    next_session: SessionId,
    mirror: Workbook,
    presence: PresenceMap,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing mirror, e.g. one loaded from a snapshot file.
    pub fn with_mirror(mirror: Workbook) -> Self {
        Relay {
            mirror,
            ..Self::default()
        }
    }

    pub fn mirror(&self) -> &Workbook {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut Workbook {
        &mut self.mirror
    }

    pub fn presence(&self) -> &PresenceMap {
        &self.presence
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Full snapshot of the mirror's current page and presence.
    pub fn snapshot(&self) -> Message {
        Message::InitialData {
            cells: snapshot_cells(self.mirror.store()),
            active_users: self.presence.clone(),
        }
    }

    /// Register a new connection. The new session gets a snapshot right away.
    pub fn connect(&mut self) -> (SessionId, Vec<Envelope>) {
        self.next_session += 1;
        let session = self.next_session;
        self.sessions.insert(session, None);
        tracing::info!(session, "session connected");
        (
            session,
            vec![Envelope::new(Recipient::Session(session), self.snapshot())],
        )
    }

    /// Handle one decoded message from `session`.
    pub fn handle(&mut self, session: SessionId, message: Message) -> Vec<Envelope> {
        if !self.sessions.contains_key(&session) {
            tracing::warn!(session, kind = message.kind(), "message from unknown session");
            return Vec::new();
        }

        match message {
            Message::InitConnection { user_id, user_name } => {
                self.register(session, user_id, user_name)
            }
            Message::CellUpdate {
                user_id,
                cell_id,
                value,
                user_name,
            } => self.cell_update(session, user_id, cell_id, value, user_name),
            Message::ActiveCell { user_id, cell_id } => {
                if !self.move_presence(&user_id, cell_id) {
                    return Vec::new();
                }
                vec![Envelope::new(
                    Recipient::Others(session),
                    Message::ActiveCell { user_id, cell_id },
                )]
            }
            Message::CursorMove { user_id, cell_id } => {
                if !self.move_presence(&user_id, cell_id) {
                    return Vec::new();
                }
                vec![Envelope::new(
                    Recipient::Others(session),
                    Message::CursorMove { user_id, cell_id },
                )]
            }
            Message::UserJoined { user_id, user_name } => {
                let Some(entry) = self.presence.get_mut(&user_id) else {
                    tracing::debug!(user = %user_id, "rename for unknown user ignored");
                    return Vec::new();
                };
                entry.name = user_name.clone();
                vec![Envelope::new(
                    Recipient::Others(session),
                    Message::UserJoined { user_id, user_name },
                )]
            }
            Message::RequestInitialData => {
                vec![Envelope::new(Recipient::Session(session), self.snapshot())]
            }
            other @ (Message::InitialData { .. } | Message::UserLeft { .. }) => {
                tracing::warn!(session, kind = other.kind(), "relay-only message from client ignored");
                Vec::new()
            }
        }
    }

    /// Drop a session. A registered user whose last session this was leaves.
    pub fn disconnect(&mut self, session: SessionId) -> Vec<Envelope> {
        let Some(user_id) = self.sessions.remove(&session) else {
            return Vec::new();
        };
        tracing::info!(session, "session disconnected");
        match user_id {
            Some(user_id) => self.release_user(user_id),
            None => Vec::new(),
        }
    }

    fn register(&mut self, session: SessionId, user_id: String, user_name: String) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        let previous = self.sessions.insert(session, Some(user_id.clone())).flatten();
        if let Some(previous) = previous.filter(|previous| *previous != user_id) {
            envelopes.extend(self.release_user(previous));
        }

        self.presence
            .entry(user_id.clone())
            .and_modify(|entry| entry.name = user_name.clone())
            .or_insert_with(|| Presence::new(&user_name));
        tracing::info!(session, user = %user_id, name = %user_name, "user registered");

        envelopes.push(Envelope::new(
            Recipient::Others(session),
            Message::UserJoined { user_id, user_name },
        ));
        envelopes
    }

    fn cell_update(
        &mut self,
        session: SessionId,
        user_id: String,
        cell_id: CellId,
        value: String,
        user_name: Option<String>,
    ) -> Vec<Envelope> {
        let updated = self.mirror.apply_edit(cell_id, &value);
        tracing::debug!(session, cell = %cell_id, updated = updated.len(), "applied edit");

        let user_name = user_name.or_else(|| {
            self.presence
                .get(&user_id)
                .map(|entry| entry.name.clone())
        });
        vec![Envelope::new(
            Recipient::Others(session),
            Message::CellUpdate {
                user_id,
                cell_id,
                value,
                user_name,
            },
        )]
    }

    fn move_presence(&mut self, user_id: &str, cell_id: Option<CellId>) -> bool {
        match self.presence.get_mut(user_id) {
            Some(entry) => {
                entry.active_cell = cell_id;
                true
            }
            None => {
                tracing::debug!(user = %user_id, "presence for unknown user ignored");
                false
            }
        }
    }

    /// Remove `user_id` from presence unless another session still uses it.
    fn release_user(&mut self, user_id: String) -> Vec<Envelope> {
        let still_connected = self
            .sessions
            .values()
            .any(|registered| registered.as_deref() == Some(user_id.as_str()));
        if still_connected || self.presence.remove(&user_id).is_none() {
            return Vec::new();
        }
        tracing::info!(user = %user_id, "user left");
        vec![Envelope::new(Recipient::All, Message::UserLeft { user_id })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(name: &str) -> CellId {
        CellId::parse(name).unwrap()
    }

    fn join(relay: &mut Relay, user: &str) -> SessionId {
        let (session, _) = relay.connect();
        relay.handle(
            session,
            Message::InitConnection {
                user_id: user.into(),
                user_name: format!("name-{}", user),
            },
        );
        session
    }

    fn edit(user: &str, cell: &str, value: &str) -> Message {
        Message::CellUpdate {
            user_id: user.into(),
            cell_id: id(cell),
            value: value.into(),
            user_name: None,
        }
    }

    #[test]
    fn test_connect_sends_snapshot_to_new_session() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        relay.handle(a, edit("a", "A1", "5"));

        let (b, envelopes) = relay.connect();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].to, Recipient::Session(b));
        let Message::InitialData { cells, active_users } = &envelopes[0].message else {
            panic!("expected initial_data");
        };
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].value, "5");
        assert!(active_users.contains_key("a"));
    }

    #[test]
    fn test_session_ids_increase() {
        let mut relay = Relay::new();
        let (first, _) = relay.connect();
        let (second, _) = relay.connect();
        assert!(second > first);
    }

    #[test]
    fn test_init_connection_registers_and_announces() {
        let mut relay = Relay::new();
        let (session, _) = relay.connect();
        let envelopes = relay.handle(
            session,
            Message::InitConnection {
                user_id: "u1".into(),
                user_name: "Ann".into(),
            },
        );
        assert_eq!(
            envelopes,
            vec![Envelope::new(
                Recipient::Others(session),
                Message::UserJoined {
                    user_id: "u1".into(),
                    user_name: "Ann".into()
                }
            )]
        );
        assert_eq!(relay.presence()["u1"], Presence::new("Ann"));
    }

    #[test]
    fn test_edit_updates_mirror_and_skips_sender() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        let _b = join(&mut relay, "b");

        relay.handle(a, edit("a", "A1", "3"));
        let envelopes = relay.handle(a, edit("a", "B1", "=A1*2"));
        assert_eq!(relay.mirror().store().display_value(id("B1")), "6");
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].to, Recipient::Others(a));
        assert!(!envelopes[0].to.includes(a));
    }

    #[test]
    fn test_edit_rebroadcast_carries_sender_name() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        let envelopes = relay.handle(a, edit("a", "A1", "1"));
        let Message::CellUpdate { user_name, .. } = &envelopes[0].message else {
            panic!("expected cell_update");
        };
        assert_eq!(user_name.as_deref(), Some("name-a"));
    }

    #[test]
    fn test_last_edit_wins() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        let b = join(&mut relay, "b");
        relay.handle(a, edit("a", "C3", "first"));
        relay.handle(b, edit("b", "C3", "second"));
        assert_eq!(relay.mirror().store().display_value(id("C3")), "second");
    }

    #[test]
    fn test_active_cell_updates_presence() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        let envelopes = relay.handle(
            a,
            Message::ActiveCell {
                user_id: "a".into(),
                cell_id: Some(id("B2")),
            },
        );
        assert_eq!(envelopes.len(), 1);
        assert_eq!(relay.presence()["a"].active_cell, Some(id("B2")));
    }

    #[test]
    fn test_cursor_move_rebroadcasts_as_cursor_move() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        let envelopes = relay.handle(
            a,
            Message::CursorMove {
                user_id: "a".into(),
                cell_id: Some(id("D4")),
            },
        );
        assert_eq!(envelopes[0].message.kind(), "cursor_move");
        assert_eq!(relay.presence()["a"].active_cell, Some(id("D4")));
    }

    #[test]
    fn test_presence_for_unknown_user_is_ignored() {
        let mut relay = Relay::new();
        let (session, _) = relay.connect();
        let envelopes = relay.handle(
            session,
            Message::ActiveCell {
                user_id: "ghost".into(),
                cell_id: Some(id("A1")),
            },
        );
        assert!(envelopes.is_empty());
        assert!(relay.presence().is_empty());
    }

    #[test]
    fn test_user_joined_from_registered_user_renames() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        let envelopes = relay.handle(
            a,
            Message::UserJoined {
                user_id: "a".into(),
                user_name: "Alice".into(),
            },
        );
        assert_eq!(envelopes.len(), 1);
        assert_eq!(relay.presence()["a"].name, "Alice");
    }

    #[test]
    fn test_request_initial_data_replies_to_requester() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        let envelopes = relay.handle(a, Message::RequestInitialData);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].to, Recipient::Session(a));
        assert_eq!(envelopes[0].message.kind(), "initial_data");
    }

    #[test]
    fn test_disconnect_removes_presence_and_announces() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        let _b = join(&mut relay, "b");
        let envelopes = relay.disconnect(a);
        assert_eq!(
            envelopes,
            vec![Envelope::new(
                Recipient::All,
                Message::UserLeft { user_id: "a".into() }
            )]
        );
        assert!(!relay.presence().contains_key("a"));
        assert_eq!(relay.session_count(), 1);
    }

    #[test]
    fn test_disconnect_of_unregistered_session_is_silent() {
        let mut relay = Relay::new();
        let (session, _) = relay.connect();
        assert!(relay.disconnect(session).is_empty());
        assert!(relay.disconnect(session).is_empty());
    }

    #[test]
    fn test_user_with_two_sessions_stays_until_last_leaves() {
        let mut relay = Relay::new();
        let first = join(&mut relay, "a");
        let second = join(&mut relay, "a");
        assert!(relay.disconnect(first).is_empty());
        assert!(relay.presence().contains_key("a"));
        assert_eq!(relay.disconnect(second).len(), 1);
        assert!(relay.presence().is_empty());
    }

    #[test]
    fn test_relay_only_messages_from_clients_are_ignored() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        assert!(relay.handle(a, Message::UserLeft { user_id: "a".into() }).is_empty());
        assert!(relay.presence().contains_key("a"));
    }

    #[test]
    fn test_mirror_is_marked_modified_by_edits() {
        let mut relay = Relay::new();
        let a = join(&mut relay, "a");
        assert!(!relay.mirror().modified);
        relay.handle(a, edit("a", "A1", "1"));
        assert!(relay.mirror().modified);
    }
}
