//! Rendering backend seam.
//!
//! The sync core never touches a scene graph directly. It asks a
//! [`RenderBackend`] to create, place, decorate and release visuals and gets
//! opaque handles back. The browser client implements this trait with JS
//! callbacks into three.js; [`crate::recorder::SceneRecorder`] implements it
//! in memory for the headless viewer and for tests.
//!
//! Every handle returned by the backend is owned by exactly one proxy (or
//! selection outline) and handed back to `dispose*` exactly once.

use serde::{Deserialize, Serialize};

use crate::types::{Transform, Vec3};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Root visual of one entity. Picking resolves to this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisualHandle(pub u64);

/// Point light attached to a light entity, added to the scene separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LightHandle(pub u64);

/// Bounding outline drawn around a selected visual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutlineHandle(pub u64);

/// An asset load in flight, completed later through `asset_loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetTicket(pub u64);

/// Result of an asset load, reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetOutcome {
    Loaded,
    Failed(String),
}

// ---------------------------------------------------------------------------
// Visual descriptions
// ---------------------------------------------------------------------------

/// Picking layer. Only `Selectable` visuals can be picked by the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Static,
    Selectable,
}

/// Coarse shape of a visual. Sizes are already scaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    Box {
        size: Vec3,
    },
    Cylinder {
        radius: f32,
        height: f32,
    },
    Sphere {
        radius: f32,
        color: u32,
    },
    Plane {
        width: f32,
        depth: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        texture: Option<String>,
    },
    /// A previously requested asset, looked up by URL.
    Model {
        asset: String,
    },
    /// Stand-in for entity types this viewer has no representation for.
    Marker,
}

/// A proximity-sensor ray. `checked` rays hit something.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub checked: bool,
    pub start: Vec3,
    pub end: Vec3,
}

/// Per-tick robot overlays: LED colours, intersection points, sensor rays.
/// Points and rays are already scaled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Decorations {
    pub leds: Vec<u32>,
    pub points: Vec<Vec3>,
    pub rays: Vec<Ray>,
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

pub trait RenderBackend {
    fn spawn(&mut self, shape: &Shape, transform: &Transform) -> VisualHandle;
    fn set_transform(&mut self, visual: VisualHandle, transform: &Transform);
    fn set_layer(&mut self, visual: VisualHandle, layer: Layer);
    fn set_decorations(&mut self, visual: VisualHandle, decorations: &Decorations);
    /// Release the visual and remove it from the scene.
    fn dispose(&mut self, visual: VisualHandle);

    fn spawn_light(&mut self, color: u32, position: Vec3) -> LightHandle;
    fn dispose_light(&mut self, light: LightHandle);

    fn spawn_outline(&mut self, target: VisualHandle) -> OutlineHandle;
    /// Recompute the outline from the target's live bounds.
    fn refresh_outline(&mut self, outline: OutlineHandle);
    fn dispose_outline(&mut self, outline: OutlineHandle);

    /// Start loading an external asset (texture, model).
    fn request_asset(&mut self, url: &str) -> AssetTicket;

    /// Project a pointer position in normalized device coordinates onto
    /// the horizontal plane at world height `plane_z`.
    fn project_pointer(&self, ndc: [f32; 2], plane_z: f32) -> Option<Vec3>;
}
