//! ARGoS Webviz
//!
//! Scene synchronization core for the ARGoS robot-swarm simulator's web
//! visualization. The simulator pushes a full snapshot of the arena every
//! step; this crate keeps a set of renderable proxies in sync with it and
//! turns user input back into simulator commands.
//!
//! ## Architecture
//!
//! ```text
//! SceneSession<B>  (scene.rs)
//!   ├── SessionChannel  (session.rs)    ← connection, playback, snapshot, logs
//!   │     └── protocol.rs                 ← wire messages and commands
//!   ├── ReconcileLoop   (reconcile.rs)  ← once per frame: rebuild or update
//!   │     ├── EntityRegistry (registry.rs)  ← id ↔ visual, build barrier
//!   │     ├── SelectionSet   (selection.rs) ← outlines, click rules
//!   │     └── KindRegistry   (factory.rs, kinds.rs, decor.rs)
//!   └── B: RenderBackend (backend.rs)   ← three.js in the browser,
//!                                          SceneRecorder (recorder.rs) natively
//! ```
//!
//! The core is single-threaded and renderer-agnostic. Transports live at the
//! edges: `transport.rs` (tokio-tungstenite, `headless` feature) and the
//! `clients/wasm` crate (browser `WebSocket`).

// Sync core: always available, including for the wasm client.
pub mod backend;
pub mod config;
pub mod decor;
pub mod error;
pub mod factory;
pub mod kinds;
pub mod protocol;
pub mod reconcile;
pub mod recorder;
pub mod registry;
pub mod scene;
pub mod selection;
pub mod session;
pub mod types;

// Native transport requires the `headless` feature.
#[cfg(feature = "headless")]
pub mod transport;

pub use backend::{
    AssetOutcome, AssetTicket, Decorations, Layer, LightHandle, OutlineHandle, Ray,
    RenderBackend, Shape, VisualHandle,
};
pub use config::ViewerConfig;
pub use error::{CommandError, EntityError, ProtocolError};
pub use factory::{EntityKind, KindRegistry, RenderableProxy};
pub use protocol::{Command, PlaybackState, ServerMessage};
pub use reconcile::{FrameOutcome, LoopState};
pub use recorder::SceneRecorder;
pub use registry::{EntityRegistry, Rebuild, UpdateReport};
pub use scene::{SceneSession, SceneStats};
pub use selection::{Modifiers, PointerClick, SelectionSet};
pub use session::{ConnectionStatus, ReconnectPolicy, SessionNotice, TransportEvent};
pub use types::{Arena, ArenaSize, EntityDescriptor, EntityId, Quaternion, Snapshot, Vec3};

#[cfg(feature = "headless")]
pub use transport::TransportHandle;
