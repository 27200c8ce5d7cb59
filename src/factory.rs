//! Entity factory: type tag → construction strategy.
//!
//! ```text
//! KindRegistry
//!   ├── "floor"     → FloorKind       (may wait on a texture)
//!   ├── "light"     → LightKind
//!   ├── "box"       → BoxKind
//!   ├── "cylinder"  → CylinderKind
//!   ├── "foot-bot"  → FootbotKind
//!   ├── "kheperaiv" → KheperaKind     (waits on its model)
//!   └── default     → UnidentifiedKind
//! ```
//!
//! A kind either finishes immediately ([`Construction::Ready`]) or returns an
//! [`AssetTicket`] and is resumed once the host reports the asset. The
//! registry treats both paths the same way. Construction errors never
//! escape: [`KindRegistry::create`] turns them into a placeholder proxy with
//! no visual.

use std::collections::HashMap;

use log::{debug, warn};

use crate::backend::{AssetOutcome, AssetTicket, LightHandle, RenderBackend, VisualHandle};
use crate::error::EntityError;
use crate::kinds;
use crate::types::{ArenaSize, EntityDescriptor, EntityId, Quaternion, Transform};

// ---------------------------------------------------------------------------
// Build context
// ---------------------------------------------------------------------------

/// What a kind needs to turn a descriptor into visuals.
pub struct BuildContext<'a> {
    pub backend: &'a mut dyn RenderBackend,
    /// Simulator units → scene units.
    pub scale: f32,
    pub arena: ArenaSize,
}

impl<'a> BuildContext<'a> {
    pub fn new(backend: &'a mut dyn RenderBackend, scale: f32, arena: ArenaSize) -> Self {
        Self {
            backend,
            scale,
            arena,
        }
    }

    /// Scaled position and orientation of a descriptor. `position` is
    /// required, a missing orientation means identity.
    pub fn placement(&self, desc: &EntityDescriptor) -> Result<Transform, EntityError> {
        let position = desc.position()?.scaled(self.scale);
        let orientation = desc
            .optional_field::<Quaternion>("orientation")?
            .unwrap_or_default();
        Ok(Transform::new(position, orientation))
    }
}

// ---------------------------------------------------------------------------
// Construction results
// ---------------------------------------------------------------------------

/// Handles produced by a finished construction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Built {
    pub visual: Option<VisualHandle>,
    pub light: Option<LightHandle>,
    pub transform: Transform,
}

impl Built {
    pub fn visual(visual: VisualHandle, transform: Transform) -> Self {
        Self {
            visual: Some(visual),
            light: None,
            transform,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Construction {
    Ready(Built),
    Pending { ticket: AssetTicket },
}

/// Result of [`KindRegistry::create`].
#[derive(Debug)]
pub enum Creation {
    Ready(RenderableProxy),
    Pending(AssetTicket),
}

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

/// The scene-side stand-in for one simulator entity.
///
/// `id` is copied from the descriptor, never derived from backend handles.
/// A proxy without a visual is an inert placeholder: it counts towards the
/// registry size but cannot be picked and ignores updates.
#[derive(Debug, PartialEq)]
pub struct RenderableProxy {
    pub id: EntityId,
    pub type_tag: String,
    pub visual: Option<VisualHandle>,
    pub light: Option<LightHandle>,
    pub transform: Transform,
    pub selectable: bool,
}

impl RenderableProxy {
    pub fn from_built(desc: &EntityDescriptor, built: Built) -> Self {
        Self {
            id: desc.id.clone(),
            type_tag: desc.type_tag.clone(),
            visual: built.visual,
            light: built.light,
            transform: built.transform,
            selectable: desc.is_selectable(),
        }
    }

    pub fn placeholder(desc: &EntityDescriptor) -> Self {
        Self::from_built(desc, Built::default())
    }

    pub fn is_placeholder(&self) -> bool {
        self.visual.is_none()
    }

    /// Move the visual and remember where it is.
    pub fn place(&mut self, backend: &mut dyn RenderBackend, transform: Transform) {
        if let Some(visual) = self.visual {
            backend.set_transform(visual, &transform);
        }
        self.transform = transform;
    }

    /// Release every backend resource this proxy owns. Consumes the proxy,
    /// so each handle is released once.
    pub fn dispose(self, backend: &mut dyn RenderBackend) {
        if let Some(light) = self.light {
            backend.dispose_light(light);
        }
        if let Some(visual) = self.visual {
            backend.dispose(visual);
        }
    }
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

pub trait EntityKind {
    fn build(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Construction, EntityError>;

    /// Finish a construction that returned [`Construction::Pending`].
    fn resume(
        &self,
        desc: &EntityDescriptor,
        _ctx: &mut BuildContext<'_>,
        _outcome: &AssetOutcome,
    ) -> Result<Built, EntityError> {
        Err(EntityError::UnexpectedAsset {
            kind: desc.type_tag.clone(),
        })
    }

    /// Apply a newer descriptor for the same id. Static kinds keep the default.
    fn update(
        &self,
        _proxy: &mut RenderableProxy,
        _desc: &EntityDescriptor,
        _ctx: &mut BuildContext<'_>,
    ) -> Result<(), EntityError> {
        Ok(())
    }
}

pub struct KindRegistry {
    kinds: HashMap<String, Box<dyn EntityKind>>,
    default: Box<dyn EntityKind>,
}

impl KindRegistry {
    /// An empty table that sends every tag to `default`.
    pub fn new(default: Box<dyn EntityKind>) -> Self {
        Self {
            kinds: HashMap::new(),
            default,
        }
    }

    /// Every entity type the ARGoS webviz server knows about.
    pub fn standard() -> Self {
        let mut registry = Self::new(Box::new(kinds::UnidentifiedKind));
        registry.register(kinds::FLOOR, kinds::FloorKind);
        registry.register(kinds::LIGHT, kinds::LightKind);
        registry.register(kinds::BOX, kinds::BoxKind);
        registry.register(kinds::CYLINDER, kinds::CylinderKind);
        registry.register(kinds::FOOTBOT, kinds::FootbotKind);
        registry.register(kinds::KHEPERAIV, kinds::KheperaKind);
        registry
    }

    pub fn register(&mut self, tag: impl Into<String>, kind: impl EntityKind + 'static) {
        self.kinds.insert(tag.into(), Box::new(kind));
    }

    pub fn is_known(&self, tag: &str) -> bool {
        self.kinds.contains_key(tag)
    }

    pub fn kind_for(&self, tag: &str) -> &dyn EntityKind {
        self.kinds
            .get(tag)
            .map(|k| k.as_ref())
            .unwrap_or(self.default.as_ref())
    }

    /// Start building a proxy. Malformed data yields a placeholder.
    pub fn create(&self, desc: &EntityDescriptor, ctx: &mut BuildContext<'_>) -> Creation {
        if !self.is_known(&desc.type_tag) {
            debug!(
                "[factory] Unknown type '{}' for entity {}, using default",
                desc.type_tag, desc.id
            );
        }
        match self.kind_for(&desc.type_tag).build(desc, ctx) {
            Ok(Construction::Ready(built)) => {
                Creation::Ready(RenderableProxy::from_built(desc, built))
            }
            Ok(Construction::Pending { ticket }) => Creation::Pending(ticket),
            Err(e) => {
                warn!(
                    "[factory] Entity {} ({}) could not be built: {e}",
                    desc.id, desc.type_tag
                );
                Creation::Ready(RenderableProxy::placeholder(desc))
            }
        }
    }

    /// Finish a pending construction. Failures yield a placeholder.
    pub fn complete(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
        outcome: &AssetOutcome,
    ) -> RenderableProxy {
        match self.kind_for(&desc.type_tag).resume(desc, ctx, outcome) {
            Ok(built) => RenderableProxy::from_built(desc, built),
            Err(e) => {
                warn!(
                    "[factory] Entity {} ({}) could not be completed: {e}",
                    desc.id, desc.type_tag
                );
                RenderableProxy::placeholder(desc)
            }
        }
    }

    /// Forward an update to the proxy's kind. Placeholders ignore updates.
    pub fn update(
        &self,
        proxy: &mut RenderableProxy,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<(), EntityError> {
        if proxy.is_placeholder() {
            return Ok(());
        }
        self.kind_for(&proxy.type_tag).update(proxy, desc, ctx)
    }
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Shape;
    use crate::recorder::SceneRecorder;
    use crate::types::Vec3;

    fn arena() -> ArenaSize {
        ArenaSize {
            x: 5.0,
            y: 5.0,
            z: 1.0,
        }
    }

    #[test]
    fn unknown_tag_uses_default_kind() {
        let kinds = KindRegistry::standard();
        let mut backend = SceneRecorder::new();
        let mut ctx = BuildContext::new(&mut backend, 2.0, arena());
        let desc = EntityDescriptor::new(3, "epuck").with_position(Vec3::new(1.0, 1.0, 0.0));

        let Creation::Ready(proxy) = kinds.create(&desc, &mut ctx) else {
            panic!("default kind should build immediately");
        };
        assert!(!kinds.is_known("epuck"));
        let visual = proxy.visual.expect("default kind has a visual");
        assert_eq!(backend.visual(visual).unwrap().shape, Shape::Marker);
        assert_eq!(proxy.transform.position, Vec3::new(2.0, 2.0, 0.0));
    }

    #[test]
    fn malformed_descriptor_becomes_placeholder() {
        let kinds = KindRegistry::standard();
        let mut backend = SceneRecorder::new();
        let mut ctx = BuildContext::new(&mut backend, 1.0, arena());
        // box without position or scale
        let desc = EntityDescriptor::new(1, "box");

        let Creation::Ready(proxy) = kinds.create(&desc, &mut ctx) else {
            panic!("errors never leave a pending construction");
        };
        assert!(proxy.is_placeholder());
        assert_eq!(proxy.id, EntityId::Index(1));
        assert_eq!(backend.visual_count(), 0);
    }

    #[test]
    fn dispose_releases_light_and_visual() {
        let kinds = KindRegistry::standard();
        let mut backend = SceneRecorder::new();
        let desc = EntityDescriptor::new(9, "light")
            .with_position(Vec3::new(0.0, 0.0, 1.0))
            .with_field("color", "0xffff00");

        let proxy = {
            let mut ctx = BuildContext::new(&mut backend, 1.0, arena());
            match kinds.create(&desc, &mut ctx) {
                Creation::Ready(p) => p,
                Creation::Pending(_) => panic!("lights build immediately"),
            }
        };
        assert_eq!(backend.light_count(), 1);

        let light = proxy.light.unwrap();
        let visual = proxy.visual.unwrap();
        proxy.dispose(&mut backend);
        assert_eq!(backend.light_disposals(light), 1);
        assert_eq!(backend.disposals(visual), 1);
        assert_eq!(backend.light_count(), 0);
    }
}
