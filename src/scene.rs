//! `SceneSession`: everything one connection needs, in one owner.
//!
//! ```text
//! SceneSession<B>
//!   ├── backend:   B: RenderBackend
//!   ├── channel:   SessionChannel   (connection, playback, snapshot, logs, outbox)
//!   └── reconcile: ReconcileLoop    (registry, selection, kinds, scale)
//! ```
//!
//! Hosts call [`SceneSession::handle_transport`] for socket activity,
//! [`SceneSession::frame`] once per rendered frame, and flush
//! [`SceneSession::drain_outbox`] to the socket afterwards.

use std::fmt;

use log::warn;

use crate::backend::{AssetOutcome, AssetTicket, RenderBackend, VisualHandle};
use crate::error::CommandError;
use crate::factory::KindRegistry;
use crate::protocol::Command;
use crate::reconcile::{FrameOutcome, LoopState, ReconcileLoop};
use crate::registry::{Completion, EntityRegistry};
use crate::selection::{PointerClick, SelectionSet};
use crate::session::{
    SessionChannel, SessionNotice, SessionState, SnapshotArrival, TransportEvent,
    DEFAULT_LOG_CAPACITY,
};
use crate::types::EntityId;

/// Point-in-time summary, used for status lines.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneStats {
    pub connection: String,
    pub playback: &'static str,
    pub steps: u64,
    pub loop_state: LoopState,
    pub entities: usize,
    pub pending: usize,
    pub selected: usize,
    pub broadcasts: u64,
}

impl fmt::Display for SceneStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} @ step {} | scene {} ({} entities, {} pending, {} selected) | {} broadcasts",
            self.connection,
            self.playback,
            self.steps,
            self.loop_state,
            self.entities,
            self.pending,
            self.selected,
            self.broadcasts
        )
    }
}

pub struct SceneSession<B: RenderBackend> {
    backend: B,
    channel: SessionChannel,
    reconcile: ReconcileLoop,
}

impl<B: RenderBackend> SceneSession<B> {
    pub fn new(backend: B) -> Self {
        Self::with_parts(backend, KindRegistry::standard(), DEFAULT_LOG_CAPACITY)
    }

    pub fn with_parts(backend: B, kinds: KindRegistry, log_capacity: usize) -> Self {
        Self {
            backend,
            channel: SessionChannel::new(log_capacity),
            reconcile: ReconcileLoop::new(kinds),
        }
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    pub fn handle_transport(&mut self, event: TransportEvent) -> Option<SnapshotArrival> {
        self.channel.handle_event(event)
    }

    pub fn frame(&mut self) -> FrameOutcome {
        self.reconcile
            .frame(self.channel.snapshot(), &mut self.backend)
    }

    pub fn asset_loaded(&mut self, ticket: AssetTicket, outcome: AssetOutcome) -> Completion {
        self.reconcile
            .asset_loaded(ticket, &outcome, &mut self.backend)
    }

    /// Apply a click. A resulting `moveEntity` is queued and returned.
    pub fn click(&mut self, click: PointerClick) -> Option<Command> {
        let command = self.reconcile.click(&click, &mut self.backend)?;
        match self.channel.send(command.clone()) {
            Ok(()) => Some(command),
            Err(e) => {
                warn!("[scene] Move not sent: {e}");
                None
            }
        }
    }

    pub fn send(&mut self, command: Command) -> Result<(), CommandError> {
        self.channel.send(command)
    }

    pub fn drain_outbox(&mut self) -> Vec<Command> {
        self.channel.drain_outbox()
    }

    pub fn drain_notices(&mut self) -> Vec<SessionNotice> {
        self.channel.drain_notices()
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn select(&mut self, visual: VisualHandle) -> bool {
        self.reconcile.select(visual, &mut self.backend)
    }

    pub fn deselect(&mut self, visual: VisualHandle) -> bool {
        self.reconcile.deselect(visual, &mut self.backend)
    }

    pub fn toggle(&mut self, visual: VisualHandle, additive: bool) -> bool {
        self.reconcile.toggle(visual, additive, &mut self.backend)
    }

    pub fn clear_selection(&mut self) {
        self.reconcile.clear_selection(&mut self.backend);
    }

    pub fn selected_ids(&self) -> Vec<EntityId> {
        self.reconcile.selection().selected_ids(self.reconcile.registry())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state(&self) -> &SessionState {
        self.channel.state()
    }

    pub fn registry(&self) -> &EntityRegistry {
        self.reconcile.registry()
    }

    pub fn selection(&self) -> &SelectionSet {
        self.reconcile.selection()
    }

    pub fn loop_state(&self) -> LoopState {
        self.reconcile.state()
    }

    pub fn scale(&self) -> f32 {
        self.reconcile.scale()
    }

    pub fn ground(&self) -> Option<VisualHandle> {
        self.reconcile.ground()
    }

    pub fn stats(&self) -> SceneStats {
        let state = self.channel.state();
        SceneStats {
            connection: state.connection.to_string(),
            playback: state.status_label(),
            steps: state.steps,
            loop_state: self.reconcile.state(),
            entities: self.reconcile.registry().len(),
            pending: self.reconcile.registry().pending_count(),
            selected: self.reconcile.selection().len(),
            broadcasts: self.channel.broadcasts(),
        }
    }

    /// Release every visual. The session can be driven again afterwards.
    pub fn teardown(&mut self) {
        self.reconcile.teardown(&mut self.backend);
    }
}
