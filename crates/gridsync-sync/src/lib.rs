//! Live synchronization for Gridsync workbooks.
//!
//! Clients keep their own replica of the grid and exchange edits through a
//! central relay. Every edit, local or remote, goes through the same
//! evaluation and propagation path, so replicas that see the same ordered
//! edits end up with identical cells.
//!
//! # Architecture
//!
//! - **Protocol** (`protocol.rs`): JSON messages tagged by `type`
//! - **Transport** (`transport.rs`): one message per line over TCP
//! - **Relay** (`relay.rs`): session registry, server-side mirror, presence,
//!   fan-out rules; `server.rs` runs it as a single actor task
//! - **Replica** (`replica.rs`): client-side state machine; `client.rs`
//!   drives it against the relay with a reconnect timer
//!
//! Conflicts resolve by arrival order at the relay: the last edit to a cell wins.

pub mod client;
pub mod error;
pub mod presence;
pub mod protocol;
pub mod relay;
pub mod replica;
pub mod server;
pub mod transport;

pub use client::{ClientOptions, run_client, run_offline};
pub use error::{Result, SyncError};
pub use presence::{Presence, PresenceMap};
pub use protocol::{CellSnapshot, Decoded, Message, decode, encode, snapshot_cells};
pub use relay::{Envelope, Recipient, Relay, SessionId};
pub use replica::{Command, Identity, Notice, Outcome, Replica};
pub use server::serve;
