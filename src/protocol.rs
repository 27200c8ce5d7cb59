//! Webviz wire protocol.
//!
//! This module owns **every message that crosses the WebSocket** between the
//! ARGoS webviz server and a viewer.
//!
//! ## Messages
//!
//! | Direction        | Shape                                                        |
//! |------------------|--------------------------------------------------------------|
//! | server → client  | `{type:"broadcast", state, steps, arena, entities}`          |
//! | server → client  | `{type:"log", messages:[{log_type, step, log_message}]}`     |
//! | client → server  | `{command:"step"\|"play"\|"pause"\|"reset"}`                 |
//! | client → server  | `{command:"fastforward", steps?}`  (steps in 1..=500)        |
//! | client → server  | `{command:"moveEntity", entity_id, position, orientation}`   |
//!
//! ## Design rules
//!
//! 1. Every struct is `Serialize + Deserialize` with the server's field names.
//! 2. An unknown message `type` is ignored, never an error.
//! 3. A bad entity never fails its broadcast: it is logged and skipped.
//! 4. Out-of-range fast-forward steps are never transmitted.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::types::{Arena, EntityDescriptor, EntityId, Quaternion, Snapshot, Vec3};

/// Port the webviz server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 3000;

/// Query string selecting the broadcast and log channels.
pub const SUBSCRIPTIONS: &str = "broadcasts,logs";

pub const FAST_FORWARD_MIN_STEPS: u32 = 1;
pub const FAST_FORWARD_MAX_STEPS: u32 = 500;

/// `log_type` of regular log lines; everything else is an error line.
pub const LOG_TYPE_LOG: &str = "LOG";

/// Build the WebSocket endpoint for a webviz server.
///
/// `secure` mirrors the page's own scheme (`https:` → `wss://`).
pub fn endpoint_url(host: &str, port: u16, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}:{port}/?{SUBSCRIPTIONS}")
}

// ---------------------------------------------------------------------------
// Playback state
// ---------------------------------------------------------------------------

/// Experiment state as reported in every broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PlaybackState {
    #[default]
    Initialized,
    Playing,
    Paused,
    FastForwarding,
    Done,
    /// Any state string this viewer does not recognise.
    Unknown,
}

impl PlaybackState {
    pub fn wire_name(self) -> &'static str {
        match self {
            PlaybackState::Initialized => "EXPERIMENT_INITIALIZED",
            PlaybackState::Playing => "EXPERIMENT_PLAYING",
            PlaybackState::Paused => "EXPERIMENT_PAUSED",
            PlaybackState::FastForwarding => "EXPERIMENT_FAST_FORWARDING",
            PlaybackState::Done => "EXPERIMENT_DONE",
            PlaybackState::Unknown => "EXPERIMENT_UNKNOWN",
        }
    }

    /// Human-readable status shown in the toolbar.
    pub fn label(self) -> &'static str {
        match self {
            PlaybackState::Initialized => "Initialized",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::FastForwarding => "Fast Forwarding",
            PlaybackState::Done => "Done",
            PlaybackState::Unknown => "Unknown",
        }
    }

    /// Once an experiment is done only `reset` stays enabled.
    pub fn permits(self, command: &Command) -> bool {
        match self {
            PlaybackState::Done => matches!(command, Command::Reset),
            _ => true,
        }
    }
}

impl From<String> for PlaybackState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "EXPERIMENT_INITIALIZED" => PlaybackState::Initialized,
            "EXPERIMENT_PLAYING" => PlaybackState::Playing,
            "EXPERIMENT_PAUSED" => PlaybackState::Paused,
            "EXPERIMENT_FAST_FORWARDING" => PlaybackState::FastForwarding,
            "EXPERIMENT_DONE" => PlaybackState::Done,
            _ => PlaybackState::Unknown,
        }
    }
}

impl From<PlaybackState> for String {
    fn from(value: PlaybackState) -> Self {
        value.wire_name().to_string()
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

/// Full simulation state, pushed by the server every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    pub state: PlaybackState,
    #[serde(default)]
    pub steps: u64,
    #[serde(default)]
    pub arena: Arena,
    /// Kept raw so one bad element cannot fail the whole broadcast.
    #[serde(default)]
    pub entities: Vec<serde_json::Value>,
}

impl Broadcast {
    /// Decode the entity list into a [`Snapshot`].
    ///
    /// Null elements, elements that do not decode and repeated ids are
    /// logged and dropped. The first occurrence of an id wins.
    pub fn snapshot(&self) -> Snapshot {
        let mut seen = HashSet::new();
        let mut entities = Vec::with_capacity(self.entities.len());

        for (index, raw) in self.entities.iter().enumerate() {
            if raw.is_null() {
                warn!("[protocol] Entity #{index} is null, skipped");
                continue;
            }
            let descriptor = match EntityDescriptor::deserialize(raw) {
                Ok(d) => d,
                Err(e) => {
                    warn!("[protocol] Entity #{index} is malformed ({e}), skipped");
                    continue;
                }
            };
            if !seen.insert(descriptor.id.clone()) {
                warn!(
                    "[protocol] Entity id {} repeated at #{index}, skipped",
                    descriptor.id
                );
                continue;
            }
            entities.push(descriptor);
        }

        Snapshot::new(self.arena, entities)
    }
}

/// One line of simulator output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogLine {
    pub log_type: String,
    #[serde(default)]
    pub step: u64,
    #[serde(default)]
    pub log_message: String,
}

impl LogLine {
    pub fn is_error(&self) -> bool {
        self.log_type != LOG_TYPE_LOG
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[t={}] {}", self.step, self.log_message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LogBatch {
    #[serde(default)]
    pub messages: Vec<LogLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Broadcast(Broadcast),
    Log(LogBatch),
}

impl ServerMessage {
    /// Decode one text frame.
    ///
    /// Returns `Ok(None)` for message types this viewer does not handle.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        match kind.as_str() {
            "broadcast" => Ok(Some(ServerMessage::Broadcast(serde_json::from_value(
                value,
            )?))),
            "log" => Ok(Some(ServerMessage::Log(serde_json::from_value(value)?))),
            other => {
                debug!("[protocol] Ignoring message type {other:?}");
                Ok(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

/// Commands a viewer may send upstream. Fire-and-forget: their effect is
/// only observed through later broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    #[serde(rename = "step")]
    Step,
    #[serde(rename = "play")]
    Play,
    #[serde(rename = "pause")]
    Pause,
    #[serde(rename = "fastforward")]
    FastForward {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        steps: Option<u32>,
    },
    #[serde(rename = "reset")]
    Reset,
    #[serde(rename = "moveEntity")]
    MoveEntity {
        entity_id: EntityId,
        position: Vec3,
        orientation: Quaternion,
    },
}

impl Command {
    /// Fast-forward with a user-supplied step count.
    ///
    /// Counts outside `1..=500` fall back to the unparameterised form and
    /// let the server pick its default.
    pub fn fast_forward(requested: Option<i64>) -> Self {
        let steps = requested
            .filter(|s| {
                (FAST_FORWARD_MIN_STEPS as i64..=FAST_FORWARD_MAX_STEPS as i64).contains(s)
            })
            .map(|s| s as u32);
        Command::FastForward { steps }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Step => "step",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::FastForward { .. } => "fastforward",
            Command::Reset => "reset",
            Command::MoveEntity { .. } => "moveEntity",
        }
    }

    /// Re-apply the fast-forward bound to a command built by hand.
    pub fn sanitized(self) -> Self {
        match self {
            Command::FastForward { steps } => Command::fast_forward(steps.map(i64::from)),
            other => other,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    /// Parse the short command syntax used on the command line:
    /// `step`, `play`, `pause`, `reset`, `fastforward` or `fastforward:<steps>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        match (name.trim(), arg) {
            ("step", None) => Ok(Command::Step),
            ("play", None) => Ok(Command::Play),
            ("pause", None) => Ok(Command::Pause),
            ("reset", None) => Ok(Command::Reset),
            ("fastforward", None) => Ok(Command::FastForward { steps: None }),
            ("fastforward", Some(steps)) => {
                let steps = steps
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ProtocolError::UnknownCommand(s.to_string()))?;
                Ok(Command::fast_forward(Some(steps)))
            }
            _ => Err(ProtocolError::UnknownCommand(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
