//! Entity registry: id → proxy, and visual → id for picking.
//!
//! ```text
//! rebuild_all(snapshot)
//!   ├── dispose every proxy, clear both tables and the selection
//!   ├── barrier.remaining = snapshot.len()
//!   ├── Ready     → register now,     remaining -= 1
//!   └── Pending   → wait for ticket
//!
//! asset_loaded(ticket)   (same thread, any later time)
//!   └── complete + register,          remaining -= 1
//!
//! remaining == 0 → loaded
//! ```
//!
//! The two tables are always consistent: every proxy with a visual has
//! exactly one reverse entry, and placeholders have none. Completions are
//! tagged with the rebuild generation so a ticket from an abandoned
//! rebuild can never register into the current one.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::backend::{AssetOutcome, AssetTicket, Layer, RenderBackend, VisualHandle};
use crate::factory::{BuildContext, Creation, KindRegistry, RenderableProxy};
use crate::selection::SelectionSet;
use crate::types::{EntityDescriptor, EntityId, Snapshot};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What [`EntityRegistry::rebuild_all`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebuild {
    /// Every proxy was built synchronously; the registry is loaded.
    Complete,
    /// Waiting on this many asset completions.
    Pending(usize),
    /// A rebuild was already in progress; nothing was touched.
    Busy,
}

/// What [`EntityRegistry::asset_loaded`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Unknown ticket (a previous generation, or never issued).
    Stale,
    Progress { remaining: usize },
    /// The last pending construction finished.
    Finished,
}

/// Per-frame update tally. Failures were already logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateReport {
    pub updated: usize,
    pub failed: usize,
    /// Descriptors whose id has no proxy.
    pub missing: usize,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BuildBarrier {
    generation: u64,
    remaining: usize,
    pending: HashMap<AssetTicket, EntityDescriptor>,
}

#[derive(Debug, Default)]
pub struct EntityRegistry {
    proxies: HashMap<EntityId, RenderableProxy>,
    by_visual: HashMap<VisualHandle, EntityId>,
    build: Option<BuildBarrier>,
    generation: u64,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// A rebuild is waiting on asset completions.
    pub fn is_loading(&self) -> bool {
        self.build.is_some()
    }

    /// Rebuilds started so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending_count(&self) -> usize {
        self.build.as_ref().map_or(0, |b| b.remaining)
    }

    pub fn get(&self, id: &EntityId) -> Option<&RenderableProxy> {
        self.proxies.get(id)
    }

    /// Map a picked visual back to its proxy.
    pub fn resolve(&self, visual: VisualHandle) -> Option<&RenderableProxy> {
        self.by_visual.get(&visual).and_then(|id| self.proxies.get(id))
    }

    pub fn proxies(&self) -> impl Iterator<Item = &RenderableProxy> {
        self.proxies.values()
    }

    pub fn visual_count(&self) -> usize {
        self.by_visual.len()
    }

    /// Whether the next frame may update in place: same size and every
    /// snapshot id already has a proxy.
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        snapshot.len() == self.proxies.len()
            && snapshot
                .entities
                .iter()
                .all(|e| self.proxies.contains_key(&e.id))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Throw away every proxy and build the snapshot from scratch.
    pub fn rebuild_all(
        &mut self,
        snapshot: &Snapshot,
        kinds: &KindRegistry,
        selection: &mut SelectionSet,
        ctx: &mut BuildContext<'_>,
    ) -> Rebuild {
        if self.build.is_some() {
            debug!("[registry] Rebuild already in progress");
            return Rebuild::Busy;
        }

        self.dispose_all(selection, ctx.backend);
        self.generation += 1;

        let mut barrier = BuildBarrier {
            generation: self.generation,
            remaining: snapshot.len(),
            pending: HashMap::new(),
        };

        for desc in &snapshot.entities {
            match kinds.create(desc, ctx) {
                Creation::Ready(proxy) => {
                    self.register(proxy, ctx.backend);
                    barrier.remaining -= 1;
                }
                Creation::Pending(ticket) => {
                    barrier.pending.insert(ticket, desc.clone());
                }
            }
        }

        if barrier.remaining == 0 {
            info!(
                "[registry] Built {} entities (generation {})",
                self.proxies.len(),
                self.generation
            );
            Rebuild::Complete
        } else {
            let remaining = barrier.remaining;
            debug!(
                "[registry] Generation {} waiting on {remaining} assets",
                barrier.generation
            );
            self.build = Some(barrier);
            Rebuild::Pending(remaining)
        }
    }

    /// Finish one pending construction.
    pub fn asset_loaded(
        &mut self,
        ticket: AssetTicket,
        outcome: &AssetOutcome,
        kinds: &KindRegistry,
        ctx: &mut BuildContext<'_>,
    ) -> Completion {
        let Some(desc) = self
            .build
            .as_mut()
            .and_then(|barrier| barrier.pending.remove(&ticket))
        else {
            debug!("[registry] Ignoring stale asset ticket {ticket:?}");
            return Completion::Stale;
        };

        let proxy = kinds.complete(&desc, ctx, outcome);
        self.register(proxy, ctx.backend);

        let remaining = match self.build.as_mut() {
            Some(barrier) => {
                barrier.remaining -= 1;
                barrier.remaining
            }
            None => 0,
        };
        if remaining > 0 {
            return Completion::Progress { remaining };
        }

        self.build = None;
        info!(
            "[registry] Built {} entities (generation {})",
            self.proxies.len(),
            self.generation
        );
        Completion::Finished
    }

    /// Apply a snapshot to the existing proxies. Never creates or destroys.
    pub fn update_all(
        &mut self,
        snapshot: &Snapshot,
        kinds: &KindRegistry,
        ctx: &mut BuildContext<'_>,
    ) -> UpdateReport {
        let mut report = UpdateReport::default();
        if self.is_loading() {
            return report;
        }

        for desc in &snapshot.entities {
            let Some(proxy) = self.proxies.get_mut(&desc.id) else {
                report.missing += 1;
                continue;
            };
            match kinds.update(proxy, desc, ctx) {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    warn!("[registry] Update of entity {} failed: {e}", desc.id);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Release every proxy and outline. Any rebuild in progress is abandoned.
    pub fn dispose_all(&mut self, selection: &mut SelectionSet, backend: &mut dyn RenderBackend) {
        selection.clear_all(backend);
        for (_, proxy) in self.proxies.drain() {
            proxy.dispose(backend);
        }
        self.by_visual.clear();
        self.build = None;
    }

    fn register(&mut self, proxy: RenderableProxy, backend: &mut dyn RenderBackend) {
        if let Some(visual) = proxy.visual {
            let layer = if proxy.selectable {
                Layer::Selectable
            } else {
                Layer::Static
            };
            backend.set_layer(visual, layer);
            self.by_visual.insert(visual, proxy.id.clone());
        }

        if let Some(previous) = self.proxies.insert(proxy.id.clone(), proxy) {
            warn!("[registry] Entity {} registered twice", previous.id);
            if let Some(visual) = previous.visual {
                self.by_visual.remove(&visual);
            }
            previous.dispose(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::SceneRecorder;
    use crate::types::{Arena, ArenaSize, Vec3};

    fn snapshot(entities: Vec<EntityDescriptor>) -> Snapshot {
        Snapshot::new(
            Arena {
                size: ArenaSize {
                    x: 2.0,
                    y: 2.0,
                    z: 1.0,
                },
            },
            entities,
        )
    }

    fn marker(id: i64) -> EntityDescriptor {
        EntityDescriptor::new(id, "marker").with_position(Vec3::new(id as f32, 0.0, 0.0))
    }

    #[test]
    fn matches_requires_same_ids() {
        let kinds = KindRegistry::standard();
        let mut backend = SceneRecorder::new();
        let mut selection = SelectionSet::new();
        let mut registry = EntityRegistry::new();
        let first = snapshot(vec![marker(1), marker(2)]);

        let mut ctx = BuildContext::new(&mut backend, 1.0, first.arena.size);
        assert_eq!(
            registry.rebuild_all(&first, &kinds, &mut selection, &mut ctx),
            Rebuild::Complete
        );
        assert!(registry.matches(&first));
        assert!(!registry.matches(&snapshot(vec![marker(1), marker(3)])));
        assert!(!registry.matches(&snapshot(vec![marker(1)])));
    }

    #[test]
    fn rebuilding_the_same_snapshot_twice_is_idempotent() {
        let kinds = KindRegistry::standard();
        let mut backend = SceneRecorder::new();
        let mut selection = SelectionSet::new();
        let mut registry = EntityRegistry::new();
        let snap = snapshot(vec![marker(1), marker(2)]);

        let mut ctx = BuildContext::new(&mut backend, 1.0, snap.arena.size);
        registry.rebuild_all(&snap, &kinds, &mut selection, &mut ctx);
        let first: Vec<VisualHandle> = registry.proxies().filter_map(|p| p.visual).collect();
        assert_eq!(
            registry.rebuild_all(&snap, &kinds, &mut selection, &mut ctx),
            Rebuild::Complete
        );

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.visual_count(), 2);
        assert_eq!(registry.generation(), 2);
        assert!(registry.matches(&snap));
        for p in registry.proxies() {
            let visual = p.visual.unwrap();
            assert!(!first.contains(&visual));
            assert_eq!(registry.resolve(visual).unwrap().id, p.id);
        }
        for v in &first {
            assert_eq!(backend.disposals(*v), 1);
        }
        assert_eq!(backend.visual_count(), 2);
    }

    #[test]
    fn stale_ticket_is_ignored() {
        let kinds = KindRegistry::standard();
        let mut backend = SceneRecorder::new();
        let mut selection = SelectionSet::new();
        let mut registry = EntityRegistry::new();
        let robots = snapshot(vec![
            EntityDescriptor::new(1, "kheperaiv").with_position(Vec3::zero())
        ]);

        let mut ctx = BuildContext::new(&mut backend, 1.0, robots.arena.size);
        assert_eq!(
            registry.rebuild_all(&robots, &kinds, &mut selection, &mut ctx),
            Rebuild::Pending(1)
        );
        assert!(registry.is_loading());
        assert_eq!(
            registry.rebuild_all(&robots, &kinds, &mut selection, &mut ctx),
            Rebuild::Busy
        );

        let outcome =
            registry.asset_loaded(AssetTicket(999), &AssetOutcome::Loaded, &kinds, &mut ctx);
        assert_eq!(outcome, Completion::Stale);
        assert!(registry.is_loading());
    }

    #[test]
    fn placeholders_have_no_reverse_entry() {
        let kinds = KindRegistry::standard();
        let mut backend = SceneRecorder::new();
        let mut selection = SelectionSet::new();
        let mut registry = EntityRegistry::new();
        // no position: placeholder
        let snap = snapshot(vec![marker(1), EntityDescriptor::new(2, "box")]);

        let mut ctx = BuildContext::new(&mut backend, 1.0, snap.arena.size);
        registry.rebuild_all(&snap, &kinds, &mut selection, &mut ctx);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.visual_count(), 1);
        assert!(registry.get(&EntityId::Index(2)).unwrap().is_placeholder());
    }
}
