//! Error types for the sync core.
//!
//! None of these are fatal. Entity errors degrade one proxy, protocol
//! errors drop one frame, command errors refuse one command.

use thiserror::Error;

/// Malformed per-entity data, raised while building or updating a proxy.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("entity field `{field}` is missing")]
    MissingField { field: &'static str },

    #[error("entity field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("asset `{asset}` failed to load: {reason}")]
    AssetFailed { asset: String, reason: String },

    #[error("entity kind `{kind}` does not load assets")]
    UnexpectedAsset { kind: String },
}

/// A frame from the simulator that could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no `type` field")]
    MissingType,

    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}

/// A command refused before it reached the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("not connected to the simulator")]
    NotConnected,

    #[error("`{command}` is disabled while the experiment is {state}")]
    Disabled {
        command: &'static str,
        state: &'static str,
    },
}
