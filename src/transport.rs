//! Native WebSocket transport (tokio-tungstenite).
//!
//! ## Threading model
//!
//! ```text
//! frame loop (same runtime)      │  transport task
//! ────────────────────────────── │ ──────────────────────────────
//! handle.poll()                  │ run()
//!   → session.handle_transport() │   connect_async(url)
//!                                │   read  → event_tx.send(Message)
//! handle.send(command)           │
//!   → command_tx.send(cmd)       │   command_rx.recv() → write.send()
//!                                │   closed → wait, reconnect
//! ```
//!
//! The session never sees the socket; it only sees [`TransportEvent`]s.

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::Command;
use crate::session::{ReconnectPolicy, TransportEvent};

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owned by the frame loop.
pub struct TransportHandle {
    events: UnboundedReceiver<TransportEvent>,
    commands: UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Drain all pending events without waiting.
    pub fn poll(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(ev) => out.push(ev),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Wait for the next event. `None` once the transport gave up.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Queue a command for the socket (fire-and-forget).
    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("[transport] Transport stopped, command dropped");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the socket and stop reconnecting.
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.task.await;
    }
}

/// Start the transport task on the current runtime.
pub fn spawn(url: String, policy: ReconnectPolicy) -> TransportHandle {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(url, policy, event_tx, command_rx));
    TransportHandle {
        events: event_rx,
        commands: command_tx,
        task,
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// How a connection ended.
struct Ended {
    code: Option<u16>,
    reason: String,
    /// The handle was dropped; do not reconnect.
    shutdown: bool,
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    event_tx: UnboundedSender<TransportEvent>,
    mut command_rx: UnboundedReceiver<Command>,
) {
    let mut attempts = 0usize;

    loop {
        info!("[transport] Connecting to {url}");
        let ended = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                attempts = 0;
                info!("[transport] Connected");
                if event_tx.send(TransportEvent::Opened).is_err() {
                    return;
                }
                pump(socket, &event_tx, &mut command_rx).await
            }
            Err(e) => Ended {
                code: None,
                reason: format!("connect failed: {e}"),
                shutdown: false,
            },
        };

        warn!("[transport] Closed: {}", ended.reason);
        if event_tx
            .send(TransportEvent::Closed {
                reason: ended.reason,
            })
            .is_err()
            || ended.shutdown
        {
            return;
        }

        let Some(delay) = policy.next_delay(attempts, ended.code) else {
            info!("[transport] Giving up after {attempts} reconnect attempts");
            return;
        };
        attempts += 1;
        debug!("[transport] Reconnect attempt {attempts} in {delay:?}");
        tokio::time::sleep(delay).await;
    }
}

async fn pump<S>(
    socket: tokio_tungstenite::WebSocketStream<S>,
    event_tx: &UnboundedSender<TransportEvent>,
    command_rx: &mut UnboundedReceiver<Command>,
) -> Ended
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if event_tx.send(TransportEvent::Message(text)).is_err() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ended {
                            code: None,
                            reason: "viewer stopped".into(),
                            shutdown: true,
                        };
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => {
                            let code = u16::from(f.code);
                            (Some(code), format!("{} {}", code, f.reason))
                        }
                        None => (None, "server closed the connection".to_string()),
                    };
                    return Ended { code, reason, shutdown: false };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Ended { code: None, reason: e.to_string(), shutdown: false };
                }
                None => {
                    return Ended { code: None, reason: "stream ended".into(), shutdown: false };
                }
            },

            cmd = command_rx.recv() => match cmd {
                Some(command) => {
                    let text = match command.encode() {
                        Ok(t) => t,
                        Err(e) => {
                            warn!("[transport] Cannot encode {}: {e}", command.name());
                            continue;
                        }
                    };
                    debug!("[transport] -> {text}");
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return Ended { code: None, reason: e.to_string(), shutdown: false };
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ended { code: None, reason: "viewer shut down".into(), shutdown: true };
                }
            },
        }
    }
}
