//! Per-frame reconciliation of the latest snapshot against the registry.
//!
//! ```text
//!   Idle ──first snapshot──▶ Loading ──barrier done──▶ Ready
//!                               ▲                        │
//!                               └──── ids changed ───────┘
//! ```
//!
//! While `Loading` frames do no proxy work. While `Ready` each frame either
//! rebuilds (the snapshot's id set differs from the registry's) or updates
//! every proxy in snapshot order and refreshes selection outlines.

use std::fmt;

use log::{debug, info};

use crate::backend::{AssetOutcome, AssetTicket, Layer, RenderBackend, Shape, VisualHandle};
use crate::factory::{BuildContext, KindRegistry};
use crate::protocol::Command;
use crate::registry::{Completion, EntityRegistry, Rebuild, UpdateReport};
use crate::selection::{PointerClick, SelectionSet};
use crate::types::{ArenaSize, Quaternion, Snapshot, Transform, Vec3};

/// Scene units per metre of arena width.
pub const SCALE_PER_ARENA_UNIT: f32 = 4.0;

/// Scale derived from the arena width. Degenerate arenas fall back to 1.
pub fn scale_for_arena(arena: &ArenaSize) -> f32 {
    let scale = arena.x * SCALE_PER_ARENA_UNIT;
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Loading,
    Ready,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Idle => "idle",
            LoopState::Loading => "loading",
            LoopState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// What one call to [`ReconcileLoop::frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No snapshot yet.
    Idle,
    /// A rebuild is still waiting on assets.
    Loading,
    Rebuilt(Rebuild),
    Updated(UpdateReport),
}

pub struct ReconcileLoop {
    state: LoopState,
    scale: f32,
    arena: ArenaSize,
    /// Stand-in floor for snapshots that carry none.
    ground: Option<VisualHandle>,
    registry: EntityRegistry,
    selection: SelectionSet,
    kinds: KindRegistry,
}

impl Default for ReconcileLoop {
    fn default() -> Self {
        Self::new(KindRegistry::standard())
    }
}

impl ReconcileLoop {
    pub fn new(kinds: KindRegistry) -> Self {
        Self {
            state: LoopState::Idle,
            scale: 1.0,
            arena: ArenaSize::default(),
            ground: None,
            registry: EntityRegistry::new(),
            selection: SelectionSet::new(),
            kinds,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn arena(&self) -> ArenaSize {
        self.arena
    }

    pub fn ground(&self) -> Option<VisualHandle> {
        self.ground
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Run one frame against the latest snapshot.
    pub fn frame(
        &mut self,
        snapshot: Option<&Snapshot>,
        backend: &mut dyn RenderBackend,
    ) -> FrameOutcome {
        let Some(snapshot) = snapshot else {
            return FrameOutcome::Idle;
        };

        match self.state {
            LoopState::Idle => {
                self.initialize(snapshot, backend);
                FrameOutcome::Rebuilt(self.rebuild(snapshot, backend))
            }
            LoopState::Loading => FrameOutcome::Loading,
            LoopState::Ready if !self.registry.matches(snapshot) => {
                debug!(
                    "[reconcile] Snapshot has {} entities, registry {}; rebuilding",
                    snapshot.len(),
                    self.registry.len()
                );
                FrameOutcome::Rebuilt(self.rebuild(snapshot, backend))
            }
            LoopState::Ready => {
                let mut ctx = BuildContext::new(backend, self.scale, self.arena);
                let report = self.registry.update_all(snapshot, &self.kinds, &mut ctx);
                self.selection.refresh(backend);
                FrameOutcome::Updated(report)
            }
        }
    }

    /// Complete a pending construction. The loop becomes `Ready` once the
    /// last one arrives.
    pub fn asset_loaded(
        &mut self,
        ticket: AssetTicket,
        outcome: &AssetOutcome,
        backend: &mut dyn RenderBackend,
    ) -> Completion {
        let mut ctx = BuildContext::new(backend, self.scale, self.arena);
        let completion = self
            .registry
            .asset_loaded(ticket, outcome, &self.kinds, &mut ctx);
        if completion == Completion::Finished {
            self.state = LoopState::Ready;
        }
        completion
    }

    fn initialize(&mut self, snapshot: &Snapshot, backend: &mut dyn RenderBackend) {
        self.arena = snapshot.arena.size;
        self.scale = scale_for_arena(&self.arena);
        info!(
            "[reconcile] Arena {}x{}, scale {}",
            self.arena.x, self.arena.y, self.scale
        );

        if !snapshot.has_floor() && self.ground.is_none() {
            let plane = Shape::Plane {
                width: self.arena.x * self.scale,
                depth: self.arena.y * self.scale,
                texture: None,
            };
            let transform = Transform::new(Vec3::zero(), Quaternion::identity());
            let ground = backend.spawn(&plane, &transform);
            backend.set_layer(ground, Layer::Static);
            self.ground = Some(ground);
        }
    }

    fn rebuild(&mut self, snapshot: &Snapshot, backend: &mut dyn RenderBackend) -> Rebuild {
        let mut ctx = BuildContext::new(backend, self.scale, self.arena);
        let outcome = self
            .registry
            .rebuild_all(snapshot, &self.kinds, &mut self.selection, &mut ctx);
        match outcome {
            Rebuild::Complete => self.state = LoopState::Ready,
            Rebuild::Pending(_) => self.state = LoopState::Loading,
            Rebuild::Busy => {}
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn click(
        &mut self,
        click: &PointerClick,
        backend: &mut dyn RenderBackend,
    ) -> Option<Command> {
        self.selection
            .click(click, &self.registry, backend, self.scale)
    }

    pub fn select(&mut self, visual: VisualHandle, backend: &mut dyn RenderBackend) -> bool {
        self.selection.select(visual, &self.registry, backend)
    }

    pub fn deselect(&mut self, visual: VisualHandle, backend: &mut dyn RenderBackend) -> bool {
        self.selection.deselect(visual, backend)
    }

    pub fn toggle(
        &mut self,
        visual: VisualHandle,
        additive: bool,
        backend: &mut dyn RenderBackend,
    ) -> bool {
        self.selection
            .toggle(visual, additive, &self.registry, backend)
    }

    pub fn clear_selection(&mut self, backend: &mut dyn RenderBackend) {
        self.selection.clear_all(backend);
    }

    /// Release every visual this loop owns and go back to `Idle`.
    pub fn teardown(&mut self, backend: &mut dyn RenderBackend) {
        self.registry.dispose_all(&mut self.selection, backend);
        if let Some(ground) = self.ground.take() {
            backend.dispose(ground);
        }
        self.state = LoopState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_follows_arena_width() {
        let arena = ArenaSize {
            x: 2.5,
            y: 1.0,
            z: 1.0,
        };
        assert_eq!(scale_for_arena(&arena), 10.0);
    }

    #[test]
    fn degenerate_arena_scale_falls_back() {
        assert_eq!(scale_for_arena(&ArenaSize::default()), 1.0);
        let nan = ArenaSize {
            x: f32::NAN,
            y: 1.0,
            z: 1.0,
        };
        assert_eq!(scale_for_arena(&nan), 1.0);
    }
}
