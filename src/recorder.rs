//! In-memory rendering backend.
//!
//! Keeps every live visual, light and outline in plain maps so the headless
//! viewer can report on the scene and tests can inspect it. Disposals are
//! counted per handle, which makes double-frees and leaks visible.

use std::collections::HashMap;

use crate::backend::{
    AssetTicket, Decorations, Layer, LightHandle, OutlineHandle, RenderBackend, Shape,
    VisualHandle,
};
use crate::types::{Transform, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedVisual {
    pub shape: Shape,
    pub transform: Transform,
    pub layer: Layer,
    pub decorations: Decorations,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedLight {
    pub color: u32,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedOutline {
    pub target: VisualHandle,
    pub refreshes: u64,
}

#[derive(Debug, Default)]
pub struct SceneRecorder {
    next_handle: u64,
    visuals: HashMap<VisualHandle, RecordedVisual>,
    lights: HashMap<LightHandle, RecordedLight>,
    outlines: HashMap<OutlineHandle, RecordedOutline>,
    asset_requests: Vec<(AssetTicket, String)>,
    visual_disposals: HashMap<VisualHandle, u32>,
    light_disposals: HashMap<LightHandle, u32>,
    /// Half-width of the area the pointer maps onto, in world units.
    view_extent: f32,
}

impl SceneRecorder {
    pub fn new() -> Self {
        Self {
            view_extent: 1.0,
            ..Default::default()
        }
    }

    /// Map NDC `[-1, 1]` onto `[-extent, extent]` in world x/y.
    pub fn with_view_extent(mut self, extent: f32) -> Self {
        self.view_extent = extent;
        self
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn visual(&self, handle: VisualHandle) -> Option<&RecordedVisual> {
        self.visuals.get(&handle)
    }

    pub fn visual_count(&self) -> usize {
        self.visuals.len()
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn outline_count(&self) -> usize {
        self.outlines.len()
    }

    pub fn outline(&self, handle: OutlineHandle) -> Option<&RecordedOutline> {
        self.outlines.get(&handle)
    }

    /// Times `dispose` was called for this handle. Anything above 1 is a bug.
    pub fn disposals(&self, handle: VisualHandle) -> u32 {
        self.visual_disposals.get(&handle).copied().unwrap_or(0)
    }

    pub fn light_disposals(&self, handle: LightHandle) -> u32 {
        self.light_disposals.get(&handle).copied().unwrap_or(0)
    }

    pub fn pending_assets(&self) -> &[(AssetTicket, String)] {
        &self.asset_requests
    }

    /// Hand outstanding asset requests to the caller, who completes them.
    pub fn take_asset_requests(&mut self) -> Vec<(AssetTicket, String)> {
        std::mem::take(&mut self.asset_requests)
    }
}

impl RenderBackend for SceneRecorder {
    fn spawn(&mut self, shape: &Shape, transform: &Transform) -> VisualHandle {
        let handle = VisualHandle(self.next());
        self.visuals.insert(
            handle,
            RecordedVisual {
                shape: shape.clone(),
                transform: *transform,
                layer: Layer::Static,
                decorations: Decorations::default(),
            },
        );
        handle
    }

    fn set_transform(&mut self, visual: VisualHandle, transform: &Transform) {
        if let Some(v) = self.visuals.get_mut(&visual) {
            v.transform = *transform;
        }
    }

    fn set_layer(&mut self, visual: VisualHandle, layer: Layer) {
        if let Some(v) = self.visuals.get_mut(&visual) {
            v.layer = layer;
        }
    }

    fn set_decorations(&mut self, visual: VisualHandle, decorations: &Decorations) {
        if let Some(v) = self.visuals.get_mut(&visual) {
            v.decorations = decorations.clone();
        }
    }

    fn dispose(&mut self, visual: VisualHandle) {
        self.visuals.remove(&visual);
        self.outlines.retain(|_, o| o.target != visual);
        *self.visual_disposals.entry(visual).or_insert(0) += 1;
    }

    fn spawn_light(&mut self, color: u32, position: Vec3) -> LightHandle {
        let handle = LightHandle(self.next());
        self.lights.insert(handle, RecordedLight { color, position });
        handle
    }

    fn dispose_light(&mut self, light: LightHandle) {
        self.lights.remove(&light);
        *self.light_disposals.entry(light).or_insert(0) += 1;
    }

    fn spawn_outline(&mut self, target: VisualHandle) -> OutlineHandle {
        let handle = OutlineHandle(self.next());
        self.outlines.insert(
            handle,
            RecordedOutline {
                target,
                refreshes: 0,
            },
        );
        handle
    }

    fn refresh_outline(&mut self, outline: OutlineHandle) {
        if let Some(o) = self.outlines.get_mut(&outline) {
            o.refreshes += 1;
        }
    }

    fn dispose_outline(&mut self, outline: OutlineHandle) {
        self.outlines.remove(&outline);
    }

    fn request_asset(&mut self, url: &str) -> AssetTicket {
        let ticket = AssetTicket(self.next());
        self.asset_requests.push((ticket, url.to_string()));
        ticket
    }

    fn project_pointer(&self, ndc: [f32; 2], plane_z: f32) -> Option<Vec3> {
        Some(Vec3::new(
            ndc[0] * self.view_extent,
            ndc[1] * self.view_extent,
            plane_z,
        ))
    }
}
