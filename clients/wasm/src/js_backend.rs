//! [`RenderBackend`] backed by a JavaScript scene object.
//!
//! The page hands the client an object (typically a thin wrapper around a
//! three.js `Scene`) with the methods below. Handles cross the boundary as
//! plain numbers; shapes, transforms and decorations as JSON strings.
//!
//! | JS method                          | Returns            |
//! |------------------------------------|--------------------|
//! | `spawn(shapeJson, transformJson)`  | visual id          |
//! | `setTransform(id, transformJson)`  |                    |
//! | `setLayer(id, selectable)`         |                    |
//! | `setDecorations(id, decorJson)`    |                    |
//! | `dispose(id)`                      |                    |
//! | `spawnLight(color, x, y, z)`       | light id           |
//! | `disposeLight(id)`                 |                    |
//! | `spawnOutline(visualId)`           | outline id         |
//! | `refreshOutline(id)`               |                    |
//! | `disposeOutline(id)`               |                    |
//! | `requestAsset(url)`                | ticket             |
//! | `projectPointer(x, y, planeZ)`     | `[x, y, z]`/`null` |
//!
//! `requestAsset` must eventually be answered with
//! `client.assetLoaded(ticket, ok, error)`.

use argos_webviz::{
    backend::{AssetTicket, Decorations, Layer, LightHandle, OutlineHandle, RenderBackend},
    types::Transform,
    Shape, Vec3, VisualHandle,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    /// Host-side scene, supplied by the page.
    pub type SceneBackend;

    #[wasm_bindgen(method, js_name = spawn)]
    fn js_spawn(this: &SceneBackend, shape: &str, transform: &str) -> f64;

    #[wasm_bindgen(method, js_name = setTransform)]
    fn js_set_transform(this: &SceneBackend, visual: f64, transform: &str);

    #[wasm_bindgen(method, js_name = setLayer)]
    fn js_set_layer(this: &SceneBackend, visual: f64, selectable: bool);

    #[wasm_bindgen(method, js_name = setDecorations)]
    fn js_set_decorations(this: &SceneBackend, visual: f64, decorations: &str);

    #[wasm_bindgen(method, js_name = dispose)]
    fn js_dispose(this: &SceneBackend, visual: f64);

    #[wasm_bindgen(method, js_name = spawnLight)]
    fn js_spawn_light(this: &SceneBackend, color: u32, x: f32, y: f32, z: f32) -> f64;

    #[wasm_bindgen(method, js_name = disposeLight)]
    fn js_dispose_light(this: &SceneBackend, light: f64);

    #[wasm_bindgen(method, js_name = spawnOutline)]
    fn js_spawn_outline(this: &SceneBackend, visual: f64) -> f64;

    #[wasm_bindgen(method, js_name = refreshOutline)]
    fn js_refresh_outline(this: &SceneBackend, outline: f64);

    #[wasm_bindgen(method, js_name = disposeOutline)]
    fn js_dispose_outline(this: &SceneBackend, outline: f64);

    #[wasm_bindgen(method, js_name = requestAsset)]
    fn js_request_asset(this: &SceneBackend, url: &str) -> f64;

    #[wasm_bindgen(method, js_name = projectPointer)]
    fn js_project_pointer(this: &SceneBackend, x: f32, y: f32, plane_z: f32) -> JsValue;
}

/// Adapter owning the JS scene object.
pub struct JsBackend {
    scene: SceneBackend,
}

impl JsBackend {
    pub fn new(scene: SceneBackend) -> Self {
        Self { scene }
    }
}

impl RenderBackend for JsBackend {
    fn spawn(&mut self, shape: &Shape, transform: &Transform) -> VisualHandle {
        VisualHandle(handle(
            self.scene.js_spawn(&to_json(shape), &to_json(transform)),
        ))
    }

    fn set_transform(&mut self, visual: VisualHandle, transform: &Transform) {
        self.scene
            .js_set_transform(visual.0 as f64, &to_json(transform));
    }

    fn set_layer(&mut self, visual: VisualHandle, layer: Layer) {
        self.scene
            .js_set_layer(visual.0 as f64, layer == Layer::Selectable);
    }

    fn set_decorations(&mut self, visual: VisualHandle, decorations: &Decorations) {
        self.scene
            .js_set_decorations(visual.0 as f64, &to_json(decorations));
    }

    fn dispose(&mut self, visual: VisualHandle) {
        self.scene.js_dispose(visual.0 as f64);
    }

    fn spawn_light(&mut self, color: u32, position: Vec3) -> LightHandle {
        LightHandle(handle(self.scene.js_spawn_light(
            color, position.x, position.y, position.z,
        )))
    }

    fn dispose_light(&mut self, light: LightHandle) {
        self.scene.js_dispose_light(light.0 as f64);
    }

    fn spawn_outline(&mut self, target: VisualHandle) -> OutlineHandle {
        OutlineHandle(handle(self.scene.js_spawn_outline(target.0 as f64)))
    }

    fn refresh_outline(&mut self, outline: OutlineHandle) {
        self.scene.js_refresh_outline(outline.0 as f64);
    }

    fn dispose_outline(&mut self, outline: OutlineHandle) {
        self.scene.js_dispose_outline(outline.0 as f64);
    }

    fn request_asset(&mut self, url: &str) -> AssetTicket {
        AssetTicket(handle(self.scene.js_request_asset(url)))
    }

    fn project_pointer(&self, ndc: [f32; 2], plane_z: f32) -> Option<Vec3> {
        let value = self.scene.js_project_pointer(ndc[0], ndc[1], plane_z);
        if value.is_null() || value.is_undefined() {
            return None;
        }
        let arr = js_sys::Array::from(&value);
        let coord = |i: u32| arr.get(i).as_f64().map(|v| v as f32);
        Some(Vec3::new(coord(0)?, coord(1)?, coord(2)?))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// JS numbers are doubles; handles are small non-negative integers.
pub(crate) fn handle(raw: f64) -> u64 {
    if raw.is_finite() && raw >= 0.0 {
        raw as u64
    } else {
        log::warn!("[backend] Scene returned invalid handle {raw}");
        0
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        log::error!("[backend] Serialization failed: {e}");
        "null".to_string()
    })
}
