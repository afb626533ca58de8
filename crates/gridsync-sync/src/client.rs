//! Async client loop: keeps a [`Replica`] connected to the relay.
//!
//! Local commands are always applied to the replica right away, including
//! while a connection attempt is pending. While connected, the resulting
//! messages go to the relay; while disconnected they are dropped, not
//! queued, and the loop retries after a fixed delay.

use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::protocol::{Decoded, decode};
use crate::replica::{Command, Notice, Replica};
use crate::transport::{MessageReader, MessageWriter};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Relay address, `host:port`.
    pub relay_addr: String,
    pub reconnect_delay: Duration,
    /// How long one connection attempt may take before it counts as failed.
    pub connect_timeout: Duration,
}

impl ClientOptions {
    pub fn new(relay_addr: &str) -> Self {
        ClientOptions {
            relay_addr: relay_addr.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

enum SessionEnd {
    /// The relay went away; reconnect later.
    Disconnected,
    /// The command channel closed; stop.
    Finished,
}

/// Drive `replica` against the relay until the command channel closes.
///
/// Returns the replica so the caller can inspect or save the final state.
pub async fn run_client(
    options: ClientOptions,
    mut replica: Replica,
    mut commands: mpsc::Receiver<Command>,
    notices: mpsc::Sender<Notice>,
) -> Result<Replica> {
    loop {
        let Some(attempt) = connect(&options, &mut replica, &mut commands, &notices).await else {
            return Ok(replica);
        };
        match attempt {
            Ok(stream) => {
                tracing::info!(relay = %options.relay_addr, "connected to relay");
                emit(&notices, Notice::Connected(options.relay_addr.clone())).await;
                match run_session(stream, &mut replica, &mut commands, &notices).await {
                    Ok(SessionEnd::Finished) => return Ok(replica),
                    Ok(SessionEnd::Disconnected) => {
                        tracing::info!("relay closed the connection");
                    }
                    Err(e) => tracing::warn!(error = %e, "connection to relay failed"),
                }
                emit(&notices, Notice::Disconnected).await;
            }
            Err(e) => {
                tracing::warn!(relay = %options.relay_addr, error = %e, "relay unreachable");
            }
        }

        if !wait_offline(options.reconnect_delay, &mut replica, &mut commands, &notices).await {
            return Ok(replica);
        }
        tracing::debug!("reconnecting");
    }
}

/// Apply commands locally until the command channel closes. Nothing is sent.
pub async fn run_offline(
    mut replica: Replica,
    mut commands: mpsc::Receiver<Command>,
    notices: mpsc::Sender<Notice>,
) -> Replica {
    while let Some(command) = commands.recv().await {
        apply_local(&mut replica, command, &notices).await;
    }
    replica
}

/// Connect to the relay, applying commands locally while the attempt is
/// pending. Returns `None` when the command channel closed first.
async fn connect(
    options: &ClientOptions,
    replica: &mut Replica,
    commands: &mut mpsc::Receiver<Command>,
    notices: &mpsc::Sender<Notice>,
) -> Option<io::Result<TcpStream>> {
    let attempt = tokio::time::timeout(
        options.connect_timeout,
        TcpStream::connect(&options.relay_addr),
    );
    tokio::pin!(attempt);
    loop {
        tokio::select! {
            result = &mut attempt => {
                return Some(result.unwrap_or_else(|_| {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
                }));
            }
            command = commands.recv() => match command {
                Some(command) => apply_local(replica, command, notices).await,
                None => return None,
            },
        }
    }
}

async fn run_session(
    stream: TcpStream,
    replica: &mut Replica,
    commands: &mut mpsc::Receiver<Command>,
    notices: &mpsc::Sender<Notice>,
) -> Result<SessionEnd> {
    let (reader, writer) = stream.into_split();
    let mut writer = MessageWriter::new(writer);
    let (lines, mut inbound) = mpsc::channel(64);
    let reader_task = spawn_reader(reader, lines);

    let result: Result<SessionEnd> = async {
        writer.send(&replica.hello()).await?;
        loop {
            tokio::select! {
                line = inbound.recv() => {
                    let Some(line) = line else {
                        return Ok(SessionEnd::Disconnected);
                    };
                    match decode(&line) {
                        Ok(Decoded::Message(message)) => {
                            tracing::debug!(kind = message.kind(), "inbound message");
                            for notice in replica.receive(message) {
                                emit(notices, notice).await;
                            }
                        }
                        Ok(Decoded::Unknown(kind)) => {
                            tracing::warn!(%kind, "unknown message type ignored");
                        }
                        Err(e) => tracing::warn!(error = %e, "dropping malformed message"),
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        return Ok(SessionEnd::Finished);
                    };
                    let outcome = replica.execute(command);
                    if let Some(message) = outcome.outgoing {
                        writer.send(&message).await?;
                    }
                    for notice in outcome.notices {
                        emit(notices, notice).await;
                    }
                }
            }
        }
    }
    .await;

    reader_task.abort();
    result
}

/// Read frames on a separate task so the session loop only selects over
/// channel receives.
fn spawn_reader(
    reader: tokio::net::tcp::OwnedReadHalf,
    lines: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = MessageReader::new(reader);
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    if lines.send(line).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "closing connection to relay");
                    return;
                }
            }
        }
    })
}

/// Keep applying commands locally until `delay` elapses.
/// Returns false when the command channel closed.
async fn wait_offline(
    delay: Duration,
    replica: &mut Replica,
    commands: &mut mpsc::Receiver<Command>,
    notices: &mpsc::Sender<Notice>,
) -> bool {
    let timer = tokio::time::sleep(delay);
    tokio::pin!(timer);
    loop {
        tokio::select! {
            _ = &mut timer => return true,
            command = commands.recv() => match command {
                Some(command) => apply_local(replica, command, notices).await,
                None => return false,
            },
        }
    }
}

async fn apply_local(replica: &mut Replica, command: Command, notices: &mpsc::Sender<Notice>) {
    let outcome = replica.execute(command);
    if let Some(message) = outcome.outgoing {
        tracing::debug!(kind = message.kind(), "offline; not sent");
    }
    for notice in outcome.notices {
        emit(notices, notice).await;
    }
}

async fn emit(notices: &mpsc::Sender<Notice>, notice: Notice) {
    // Nobody listening is fine.
    let _ = notices.send(notice).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Relay;
    use crate::replica::Identity;
    use crate::server::serve;
    use gridsync_core::Workbook;
    use gridsync_engine::engine::CellId;
    use tokio::net::{TcpListener, TcpSocket};
    use tokio::time::timeout;

    fn id(name: &str) -> CellId {
        CellId::parse(name).unwrap()
    }

    fn replica(user: &str) -> Replica {
        Replica::new(
            Identity {
                user_id: user.into(),
                user_name: user.to_uppercase(),
            },
            Workbook::new(),
        )
    }

    async fn wait_for(
        notices: &mut mpsc::Receiver<Notice>,
        mut pred: impl FnMut(&Notice) -> bool,
    ) -> Notice {
        timeout(Duration::from_secs(5), async {
            loop {
                let notice = notices.recv().await.expect("notice channel closed");
                if pred(&notice) {
                    return notice;
                }
            }
        })
        .await
        .expect("timed out waiting for notice")
    }

    struct Running {
        commands: mpsc::Sender<Command>,
        notices: mpsc::Receiver<Notice>,
        handle: JoinHandle<Result<Replica>>,
    }

    fn spawn_client(addr: &str, replica: Replica) -> Running {
        let (commands, command_rx) = mpsc::channel(16);
        let (notice_tx, notices) = mpsc::channel(64);
        let mut options = ClientOptions::new(addr);
        options.reconnect_delay = Duration::from_millis(50);
        let handle = tokio::spawn(run_client(options, replica, command_rx, notice_tx));
        Running {
            commands,
            notices,
            handle,
        }
    }

    #[tokio::test]
    async fn test_two_clients_converge_through_relay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve(listener, Relay::new()));

        let mut ann = spawn_client(&addr, replica("ann"));
        wait_for(&mut ann.notices, |n| matches!(n, Notice::Synced { .. })).await;
        let mut bob = spawn_client(&addr, replica("bob"));
        wait_for(&mut bob.notices, |n| matches!(n, Notice::Synced { .. })).await;
        wait_for(&mut ann.notices, |n| matches!(n, Notice::UserJoined { .. })).await;

        ann.commands
            .send(Command::Edit {
                cell: id("A1"),
                raw: "4".into(),
            })
            .await
            .unwrap();
        bob.commands
            .send(Command::Edit {
                cell: id("B1"),
                raw: "=A1*10".into(),
            })
            .await
            .unwrap();

        wait_for(&mut ann.notices, |n| {
            matches!(n, Notice::Updated { by: Some(_), cells } if cells.iter().any(|(c, _)| *c == id("B1")))
        })
        .await;
        wait_for(&mut bob.notices, |n| {
            matches!(n, Notice::Updated { by: Some(_), cells } if cells.iter().any(|(c, _)| *c == id("A1")))
        })
        .await;

        drop(ann.commands);
        drop(bob.commands);
        let ann = ann.handle.await.unwrap().unwrap();
        let bob = bob.handle.await.unwrap().unwrap();
        assert_eq!(ann.workbook().store().display_value(id("B1")), "40");
        assert_eq!(ann.workbook().store(), bob.workbook().store());
    }

    #[tokio::test]
    async fn test_edits_apply_locally_while_relay_is_down() {
        // Bind then drop to get an address nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let mut client = spawn_client(&addr, replica("solo"));
        client
            .commands
            .send(Command::Edit {
                cell: id("A1"),
                raw: "=6*7".into(),
            })
            .await
            .unwrap();
        wait_for(&mut client.notices, |n| matches!(n, Notice::Updated { by: None, .. })).await;

        drop(client.commands);
        let replica = client.handle.await.unwrap().unwrap();
        assert_eq!(replica.workbook().store().display_value(id("A1")), "42");
    }

    #[tokio::test]
    async fn test_edits_apply_while_connect_is_pending() {
        // A listener that never accepts, with its backlog filled, leaves
        // further connection attempts hanging.
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(0).unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut fillers = Vec::new();
        for _ in 0..4 {
            if let Ok(Ok(stream)) =
                timeout(Duration::from_millis(200), TcpStream::connect(&addr)).await
            {
                fillers.push(stream);
            }
        }

        let (commands, command_rx) = mpsc::channel(16);
        let (notice_tx, mut notices) = mpsc::channel(64);
        let mut options = ClientOptions::new(&addr);
        options.connect_timeout = Duration::from_secs(60);
        let handle = tokio::spawn(run_client(options, replica("stuck"), command_rx, notice_tx));

        commands
            .send(Command::Edit {
                cell: id("A1"),
                raw: "1".into(),
            })
            .await
            .unwrap();
        wait_for(&mut notices, |n| matches!(n, Notice::Updated { by: None, .. })).await;

        drop(commands);
        let replica = timeout(Duration::from_secs(5), handle)
            .await
            .expect("client did not stop while connecting")
            .unwrap()
            .unwrap();
        assert_eq!(replica.workbook().store().display_value(id("A1")), "1");
        drop(fillers);
    }

    #[tokio::test]
    async fn test_client_reconnects_when_relay_appears() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = spawn_client(&addr.to_string(), replica("late"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let listener = TcpListener::bind(addr).await.unwrap();
        tokio::spawn(serve(listener, Relay::new()));
        wait_for(&mut client.notices, |n| matches!(n, Notice::Synced { .. })).await;

        drop(client.commands);
        client.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_offline_applies_commands() {
        let (commands, command_rx) = mpsc::channel(4);
        let (notice_tx, mut notices) = mpsc::channel(16);
        let task = tokio::spawn(run_offline(replica("me"), command_rx, notice_tx));

        commands
            .send(Command::Edit {
                cell: id("C3"),
                raw: "=1+2".into(),
            })
            .await
            .unwrap();
        let notice = notices.recv().await.unwrap();
        assert_eq!(
            notice,
            Notice::Updated {
                by: None,
                cells: vec![(id("C3"), "3".into())]
            }
        );
        drop(commands);
        let replica = task.await.unwrap();
        assert_eq!(replica.workbook().store().display_value(id("C3")), "3");
    }
}
