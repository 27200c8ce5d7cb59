//! Session channel: one logical connection to the simulator.
//!
//! The channel is transport-agnostic. A transport (tokio-tungstenite in the
//! headless viewer, a browser `WebSocket` in the wasm client) turns socket
//! activity into [`TransportEvent`]s and flushes the outbox after each
//! frame. Reconnecting is the transport's business; both transports follow
//! the same [`ReconnectPolicy`].
//!
//! ```text
//!  TransportEvent ──▶ SessionChannel ──▶ SessionState (connection, playback,
//!                          │                           steps, snapshot, logs)
//!                          ├──▶ notices  (connected, disconnected, reset …)
//!  send(Command) ────────▶ └──▶ outbox   ──▶ transport
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::CommandError;
use crate::protocol::{Broadcast, Command, LogBatch, LogLine, PlaybackState, ServerMessage};
use crate::types::{ArenaSize, Snapshot};

/// Lines kept per log pane when no capacity is configured.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

// ---------------------------------------------------------------------------
// Events in, notices out
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => f.write_str("Connected"),
            ConnectionStatus::Disconnected => f.write_str("Not Connected"),
        }
    }
}

/// Socket activity as reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed { reason: String },
}

/// Things a user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Connected,
    Disconnected { reason: String },
    PlaybackChanged {
        from: Option<PlaybackState>,
        to: PlaybackState,
    },
    /// The experiment went back to its initial state; log panes were cleared.
    ExperimentReset,
}

impl fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionNotice::Connected => f.write_str("Connected to the simulator"),
            SessionNotice::Disconnected { reason } => {
                write!(f, "Cannot connect to server ({reason})")
            }
            SessionNotice::PlaybackChanged { to, .. } => write!(f, "Experiment {to}"),
            SessionNotice::ExperimentReset => f.write_str("Experiment reset"),
        }
    }
}

/// Returned by [`SessionChannel::handle_event`] when a broadcast arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotArrival {
    /// The first broadcast of this session; the scene can be initialized.
    First,
    Later,
}

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

/// Close codes after which reconnecting is pointless: policy violation and
/// internal server error.
pub const NO_RETRY_CLOSE_CODES: [u16; 2] = [1008, 1011];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before attempt `n + 1`. Attempts beyond the list give up.
    pub delays: Vec<Duration>,
    pub no_retry_codes: Vec<u16>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::ZERO,
                Duration::from_millis(3000),
                Duration::from_millis(10_000),
            ],
            no_retry_codes: NO_RETRY_CLOSE_CODES.to_vec(),
        }
    }
}

impl ReconnectPolicy {
    /// Connect once, never retry.
    pub fn never() -> Self {
        Self {
            delays: Vec::new(),
            no_retry_codes: Vec::new(),
        }
    }

    /// Delay before the next attempt, or `None` to give up.
    pub fn next_delay(&self, attempts: usize, close_code: Option<u16>) -> Option<Duration> {
        if close_code.is_some_and(|c| self.no_retry_codes.contains(&c)) {
            return None;
        }
        self.delays.get(attempts).copied()
    }
}

// ---------------------------------------------------------------------------
// Log console
// ---------------------------------------------------------------------------

/// The two log panes, newest line first, each bounded.
#[derive(Debug, Clone)]
pub struct LogConsole {
    capacity: usize,
    log: VecDeque<LogLine>,
    errors: VecDeque<LogLine>,
}

impl Default for LogConsole {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl LogConsole {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            log: VecDeque::new(),
            errors: VecDeque::new(),
        }
    }

    pub fn push(&mut self, line: LogLine) {
        let pane = if line.is_error() {
            &mut self.errors
        } else {
            &mut self.log
        };
        pane.push_front(line);
        pane.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.errors.clear();
    }

    pub fn log(&self) -> impl Iterator<Item = &LogLine> {
        self.log.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &LogLine> {
        self.errors.iter()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn error_len(&self) -> usize {
        self.errors.len()
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub connection: ConnectionStatus,
    /// `None` until the first broadcast.
    pub playback: Option<PlaybackState>,
    pub steps: u64,
    pub arena: ArenaSize,
    /// The latest broadcast's entities, replaced wholesale.
    pub snapshot: Option<Snapshot>,
    pub console: LogConsole,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionStatus::Connected
    }

    /// Toolbar label for the current playback state.
    pub fn status_label(&self) -> &'static str {
        self.playback.map_or("Unknown", PlaybackState::label)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SessionChannel {
    state: SessionState,
    outbox: Vec<Command>,
    notices: Vec<SessionNotice>,
    broadcasts: u64,
}

impl SessionChannel {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            state: SessionState {
                console: LogConsole::new(log_capacity),
                ..SessionState::default()
            },
            ..Self::default()
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.state.snapshot.as_ref()
    }

    /// Broadcasts received over the session's lifetime.
    pub fn broadcasts(&self) -> u64 {
        self.broadcasts
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<SnapshotArrival> {
        match event {
            TransportEvent::Opened => {
                info!("[session] Connection opened");
                self.state.connection = ConnectionStatus::Connected;
                self.notices.push(SessionNotice::Connected);
                None
            }
            TransportEvent::Closed { reason } => {
                warn!("[session] Connection closed: {reason}");
                self.state.connection = ConnectionStatus::Disconnected;
                self.notices.push(SessionNotice::Disconnected { reason });
                None
            }
            TransportEvent::Message(text) => match ServerMessage::decode(&text) {
                Ok(Some(ServerMessage::Broadcast(broadcast))) => {
                    Some(self.apply_broadcast(broadcast))
                }
                Ok(Some(ServerMessage::Log(batch))) => {
                    self.apply_logs(batch);
                    None
                }
                Ok(None) => None,
                Err(e) => {
                    error!("[session] Dropping frame: {e}");
                    None
                }
            },
        }
    }

    fn apply_broadcast(&mut self, broadcast: Broadcast) -> SnapshotArrival {
        let previous = self.state.playback;
        let next = broadcast.state;

        if previous != Some(next) {
            debug!(
                "[session] Playback {} -> {next}",
                previous.map_or("none", PlaybackState::label)
            );
            self.notices.push(SessionNotice::PlaybackChanged {
                from: previous,
                to: next,
            });
            if next == PlaybackState::Initialized {
                self.state.console.clear();
                if previous.is_some() {
                    info!("[session] Experiment reset");
                    self.notices.push(SessionNotice::ExperimentReset);
                }
            }
        }

        let snapshot = broadcast.snapshot();
        let arrival = if self.state.snapshot.is_none() {
            SnapshotArrival::First
        } else {
            SnapshotArrival::Later
        };

        self.state.playback = Some(next);
        self.state.steps = broadcast.steps;
        self.state.arena = broadcast.arena.size;
        self.state.snapshot = Some(snapshot);
        self.broadcasts += 1;
        arrival
    }

    fn apply_logs(&mut self, batch: LogBatch) {
        for line in batch.messages {
            if line.is_error() {
                warn!("[sim] {line}");
            } else {
                info!("[sim] {line}");
            }
            self.state.console.push(line);
        }
    }

    /// Queue a command for the transport.
    ///
    /// Refused while disconnected, and while the experiment is done unless
    /// the command is `reset`. Fast-forward step counts are bounded here.
    pub fn send(&mut self, command: Command) -> Result<(), CommandError> {
        if !self.state.is_connected() {
            warn!("[session] Not connected, dropping {}", command.name());
            return Err(CommandError::NotConnected);
        }
        let command = command.sanitized();
        if let Some(playback) = self.state.playback {
            if !playback.permits(&command) {
                warn!("[session] {} refused while {playback}", command.name());
                return Err(CommandError::Disabled {
                    command: command.name(),
                    state: playback.label(),
                });
            }
        }
        debug!("[session] Queued {}", command.name());
        self.outbox.push(command);
        Ok(())
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outbox.is_empty()
    }

    pub fn drain_outbox(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    pub fn drain_notices(&mut self) -> Vec<SessionNotice> {
        std::mem::take(&mut self.notices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(kind: &str, step: u64) -> LogLine {
        LogLine {
            log_type: kind.to_string(),
            step,
            log_message: format!("line {step}"),
        }
    }

    #[test]
    fn console_is_newest_first_and_bounded() {
        let mut console = LogConsole::new(2);
        console.push(line("LOG", 1));
        console.push(line("LOG", 2));
        console.push(line("LOG", 3));
        console.push(line("LOGERR", 4));

        let steps: Vec<u64> = console.log().map(|l| l.step).collect();
        assert_eq!(steps, vec![3, 2]);
        assert_eq!(console.error_len(), 1);
    }

    #[test]
    fn send_requires_connection() {
        let mut channel = SessionChannel::new(10);
        assert_eq!(channel.send(Command::Play), Err(CommandError::NotConnected));

        channel.handle_event(TransportEvent::Opened);
        assert_eq!(channel.send(Command::Play), Ok(()));
        assert_eq!(channel.drain_outbox(), vec![Command::Play]);
    }

    #[test]
    fn unknown_and_broken_frames_are_dropped() {
        let mut channel = SessionChannel::new(10);
        assert_eq!(
            channel.handle_event(TransportEvent::Message(r#"{"type":"hello"}"#.into())),
            None
        );
        assert_eq!(
            channel.handle_event(TransportEvent::Message("not json".into())),
            None
        );
        assert!(channel.snapshot().is_none());
    }

    #[test]
    fn default_schedule_then_give_up() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.next_delay(0, None), Some(Duration::ZERO));
        assert_eq!(policy.next_delay(1, Some(1006)), Some(Duration::from_secs(3)));
        assert_eq!(policy.next_delay(2, None), Some(Duration::from_secs(10)));
        assert_eq!(policy.next_delay(3, None), None);
    }

    #[test]
    fn policy_and_server_errors_are_not_retried() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.next_delay(0, Some(1008)), None);
        assert_eq!(policy.next_delay(0, Some(1011)), None);
        assert_eq!(ReconnectPolicy::never().next_delay(0, None), None);
    }
}
