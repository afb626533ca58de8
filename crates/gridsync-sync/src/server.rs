//! Async relay server.
//!
//! A single actor task owns the [`Relay`] and processes a mailbox of
//! connection events one at a time, so every edit is applied and fanned out
//! before the next one is looked at. Each connection reads into the mailbox
//! and writes from a bounded outbox; a session whose outbox fills up is
//! disconnected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::protocol::{Decoded, decode, encode};
use crate::relay::{Envelope, Relay, SessionId};
use crate::transport::{MessageReader, MessageWriter};

/// Frames queued for one session before it counts as too slow.
const OUTBOX_CAPACITY: usize = 256;

const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

struct Outbox {
    queue: mpsc::Sender<Arc<str>>,
    /// Dropping this closes the connection.
    _close: oneshot::Sender<()>,
}

enum RelayEvent {
    Connected {
        outbox: Outbox,
        reply: oneshot::Sender<SessionId>,
    },
    Inbound {
        session: SessionId,
        line: String,
    },
    Disconnected {
        session: SessionId,
    },
}

/// Accept connections on `listener` forever, relaying between them.
///
/// When the relay's mirror has a file path, it is saved after every event
/// that changed it.
pub async fn serve(listener: TcpListener, relay: Relay) -> Result<()> {
    let (events, mailbox) = mpsc::unbounded_channel();
    tokio::spawn(run_actor(relay, mailbox));

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "relay listening");
    }

    let mut failures: u32 = 0;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = accept_backoff(failures);
                tracing::warn!(error = %e, retry_in = ?delay, "accept failed");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        failures = 0;
        tracing::debug!(%peer, "accepted connection");
        tokio::spawn(handle_connection(stream, events.clone()));
    }
}

/// Delay before the next accept after `failures` consecutive errors.
fn accept_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(10);
    Duration::from_millis(10 << exponent).min(MAX_ACCEPT_BACKOFF)
}

async fn run_actor(mut relay: Relay, mut mailbox: mpsc::UnboundedReceiver<RelayEvent>) {
    let mut outboxes: HashMap<SessionId, Outbox> = HashMap::new();

    while let Some(event) = mailbox.recv().await {
        let envelopes = match event {
            RelayEvent::Connected { outbox, reply } => {
                let (session, envelopes) = relay.connect();
                outboxes.insert(session, outbox);
                if reply.send(session).is_err() {
                    // The connection died before learning its id.
                    outboxes.remove(&session);
                    relay.disconnect(session)
                } else {
                    envelopes
                }
            }
            RelayEvent::Inbound { session, .. } if !outboxes.contains_key(&session) => {
                // Already dropped; its connection is closing.
                Vec::new()
            }
            RelayEvent::Inbound { session, line } => match decode(&line) {
                Ok(Decoded::Message(message)) => {
                    tracing::debug!(session, kind = message.kind(), "inbound message");
                    relay.handle(session, message)
                }
                Ok(Decoded::Unknown(kind)) => {
                    tracing::warn!(session, %kind, "unknown message type ignored");
                    Vec::new()
                }
                Err(e) => {
                    tracing::warn!(session, error = %e, "dropping malformed message");
                    Vec::new()
                }
            },
            RelayEvent::Disconnected { session } => match outboxes.remove(&session) {
                Some(_) => relay.disconnect(session),
                None => Vec::new(),
            },
        };

        fan_out(&mut relay, &mut outboxes, envelopes);
        persist(&mut relay);
    }
}

/// Deliver `envelopes`, disconnecting sessions that cannot keep up along
/// with whatever their departure broadcasts.
fn fan_out(
    relay: &mut Relay,
    outboxes: &mut HashMap<SessionId, Outbox>,
    envelopes: Vec<Envelope>,
) {
    let mut pending = envelopes;
    while !pending.is_empty() {
        let lagging = deliver(outboxes, pending);
        pending = Vec::new();
        for session in lagging {
            if outboxes.remove(&session).is_some() {
                tracing::warn!(session, capacity = OUTBOX_CAPACITY, "outbox full; dropping session");
                pending.extend(relay.disconnect(session));
            }
        }
    }
}

/// Queue each envelope for its recipients. Returns sessions whose outbox
/// was full.
fn deliver(outboxes: &HashMap<SessionId, Outbox>, envelopes: Vec<Envelope>) -> Vec<SessionId> {
    let mut lagging = Vec::new();
    for envelope in envelopes {
        let line: Arc<str> = match encode(&envelope.message) {
            Ok(line) => line.into(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outgoing message");
                continue;
            }
        };
        for (session, outbox) in outboxes {
            if !envelope.to.includes(*session) || lagging.contains(session) {
                continue;
            }
            match outbox.queue.try_send(Arc::clone(&line)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => lagging.push(*session),
                // The writer is gone; the connection reports the disconnect.
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }
    lagging
}

fn persist(relay: &mut Relay) {
    let mirror = relay.mirror_mut();
    if mirror.file_path.is_none() {
        return;
    }
    match mirror.save_if_modified() {
        Ok(true) => tracing::debug!("relay snapshot saved"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "failed to save relay snapshot"),
    }
}

async fn handle_connection(stream: TcpStream, events: mpsc::UnboundedSender<RelayEvent>) {
    let (reader, writer) = stream.into_split();
    let (queue, outgoing) = mpsc::channel(OUTBOX_CAPACITY);
    let (close, closed) = oneshot::channel();
    let (reply, session) = oneshot::channel();

    let outbox = Outbox {
        queue,
        _close: close,
    };
    if events.send(RelayEvent::Connected { outbox, reply }).is_err() {
        return;
    }
    let Ok(session) = session.await else {
        return;
    };

    tokio::select! {
        _ = read_loop(session, reader, &events) => {}
        _ = write_loop(session, writer, outgoing) => {}
        _ = closed => tracing::debug!(session, "closed by relay"),
    }
    let _ = events.send(RelayEvent::Disconnected { session });
}

async fn read_loop(
    session: SessionId,
    reader: OwnedReadHalf,
    events: &mpsc::UnboundedSender<RelayEvent>,
) {
    let mut reader = MessageReader::new(reader);
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                if events.send(RelayEvent::Inbound { session, line }).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(session, error = %e, "closing connection");
                return;
            }
        }
    }
}

async fn write_loop(
    session: SessionId,
    writer: OwnedWriteHalf,
    mut outgoing: mpsc::Receiver<Arc<str>>,
) {
    let mut writer = MessageWriter::new(writer);
    while let Some(line) = outgoing.recv().await {
        if let Err(e) = writer.send_line(&line).await {
            tracing::debug!(session, error = %e, "write failed");
            return;
        }
    }
}
