//! The entity kinds the ARGoS webviz server emits.
//!
//! | tag         | visual                      | per-tick update                      |
//! |-------------|-----------------------------|--------------------------------------|
//! | `floor`     | arena-sized plane (texture) | none                                 |
//! | `light`     | sphere + point light        | none                                 |
//! | `box`       | box of `scale`              | transform, only if `is_movable`      |
//! | `cylinder`  | cylinder                    | none                                 |
//! | `foot-bot`  | cylinder body               | transform + LEDs, points, rays       |
//! | `kheperaiv` | glTF model                  | transform + LEDs, points, rays       |
//! | *other*     | marker                      | transform                            |

use log::{debug, warn};

use crate::backend::{AssetOutcome, Decorations, Shape};
use crate::decor::{parse_color, parse_decorations};
use crate::error::EntityError;
use crate::factory::{BuildContext, Built, Construction, EntityKind, RenderableProxy};
use crate::types::{EntityDescriptor, Quaternion, Transform, Vec3};

pub const FLOOR: &str = crate::types::FLOOR_TYPE;
pub const LIGHT: &str = "light";
pub const BOX: &str = "box";
pub const CYLINDER: &str = "cylinder";
pub const FOOTBOT: &str = "foot-bot";
pub const KHEPERAIV: &str = "kheperaiv";

pub const KHEPERA_MODEL: &str = "/models/KheperaIV.gltf";

/// Radius of the light marker sphere, in simulator units.
const LIGHT_MARKER_RADIUS: f32 = 0.1;

/// Foot-bot body, in simulator units.
const FOOTBOT_RADIUS: f32 = 0.0704;
const FOOTBOT_HEIGHT: f32 = 0.053;

/// How many decorations each robot model has slots for.
#[derive(Debug, Clone, Copy)]
struct DecorationSlots {
    leds: usize,
    points: usize,
    rays: usize,
}

const FOOTBOT_SLOTS: DecorationSlots = DecorationSlots {
    leds: 12,
    points: 24,
    rays: 24,
};

const KHEPERA_SLOTS: DecorationSlots = DecorationSlots {
    leds: 3,
    points: 8,
    rays: 8,
};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn decorations(
    desc: &EntityDescriptor,
    scale: f32,
    slots: DecorationSlots,
) -> Result<Decorations, EntityError> {
    let mut decor = parse_decorations(desc, scale)?;
    if decor.leds.len() > slots.leds
        || decor.points.len() > slots.points
        || decor.rays.len() > slots.rays
    {
        debug!(
            "[kinds] Entity {} has more decorations than its model shows, truncating",
            desc.id
        );
        decor.leds.truncate(slots.leds);
        decor.points.truncate(slots.points);
        decor.rays.truncate(slots.rays);
    }
    Ok(decor)
}

/// Build a robot visual and apply its first decorations. Everything is
/// validated before the backend is touched.
fn spawn_robot(
    desc: &EntityDescriptor,
    ctx: &mut BuildContext<'_>,
    shape: &Shape,
    slots: DecorationSlots,
) -> Result<Built, EntityError> {
    let transform = ctx.placement(desc)?;
    let decor = decorations(desc, ctx.scale, slots)?;
    let visual = ctx.backend.spawn(shape, &transform);
    ctx.backend.set_decorations(visual, &decor);
    Ok(Built::visual(visual, transform))
}

fn update_robot(
    proxy: &mut RenderableProxy,
    desc: &EntityDescriptor,
    ctx: &mut BuildContext<'_>,
    slots: DecorationSlots,
) -> Result<(), EntityError> {
    let transform = ctx.placement(desc)?;
    let decor = decorations(desc, ctx.scale, slots)?;
    proxy.place(ctx.backend, transform);
    if let Some(visual) = proxy.visual {
        ctx.backend.set_decorations(visual, &decor);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Floor
// ---------------------------------------------------------------------------

pub struct FloorKind;

impl FloorKind {
    fn plane(ctx: &BuildContext<'_>, texture: Option<String>) -> Shape {
        Shape::Plane {
            width: ctx.arena.x * ctx.scale,
            depth: ctx.arena.y * ctx.scale,
            texture,
        }
    }

    fn transform(
        desc: &EntityDescriptor,
        ctx: &BuildContext<'_>,
    ) -> Result<Transform, EntityError> {
        let position = desc
            .optional_field::<Vec3>("position")?
            .unwrap_or_default()
            .scaled(ctx.scale);
        Ok(Transform::new(position, Quaternion::identity()))
    }
}

impl EntityKind for FloorKind {
    fn build(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Construction, EntityError> {
        let transform = Self::transform(desc, ctx)?;
        match desc.optional_field::<String>("floor_image")? {
            Some(image) if !image.is_empty() => Ok(Construction::Pending {
                ticket: ctx.backend.request_asset(&image),
            }),
            _ => {
                let shape = Self::plane(ctx, None);
                let visual = ctx.backend.spawn(&shape, &transform);
                Ok(Construction::Ready(Built::visual(visual, transform)))
            }
        }
    }

    fn resume(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
        outcome: &AssetOutcome,
    ) -> Result<Built, EntityError> {
        let transform = Self::transform(desc, ctx)?;
        let image = desc.optional_field::<String>("floor_image")?;
        let texture = match outcome {
            AssetOutcome::Loaded => image,
            AssetOutcome::Failed(reason) => {
                warn!("[kinds] Floor texture {image:?} failed ({reason}), using a plain floor");
                None
            }
        };
        let shape = Self::plane(ctx, texture);
        let visual = ctx.backend.spawn(&shape, &transform);
        Ok(Built::visual(visual, transform))
    }
}

// ---------------------------------------------------------------------------
// Light
// ---------------------------------------------------------------------------

pub struct LightKind;

impl EntityKind for LightKind {
    fn build(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Construction, EntityError> {
        let transform = ctx.placement(desc)?;
        let raw: serde_json::Value = desc.field("color")?;
        let color = match &raw {
            serde_json::Value::String(s) => parse_color(s),
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        }
        .ok_or_else(|| EntityError::InvalidField {
            field: "color",
            reason: format!("cannot parse {raw}"),
        })?;

        let shape = Shape::Sphere {
            radius: LIGHT_MARKER_RADIUS * ctx.scale,
            color,
        };
        let visual = ctx.backend.spawn(&shape, &transform);
        let light = ctx.backend.spawn_light(color, transform.position);
        Ok(Construction::Ready(Built {
            visual: Some(visual),
            light: Some(light),
            transform,
        }))
    }
}

// ---------------------------------------------------------------------------
// Box
// ---------------------------------------------------------------------------

pub struct BoxKind;

impl EntityKind for BoxKind {
    fn build(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Construction, EntityError> {
        let transform = ctx.placement(desc)?;
        let size: Vec3 = desc.field("scale")?;
        let shape = Shape::Box {
            size: size.scaled(ctx.scale),
        };
        let visual = ctx.backend.spawn(&shape, &transform);
        Ok(Construction::Ready(Built::visual(visual, transform)))
    }

    /// Boxes only move when the simulator marks them movable.
    fn update(
        &self,
        proxy: &mut RenderableProxy,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<(), EntityError> {
        if desc.is_movable != Some(true) {
            return Ok(());
        }
        let transform = ctx.placement(desc)?;
        proxy.place(ctx.backend, transform);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cylinder
// ---------------------------------------------------------------------------

pub struct CylinderKind;

impl EntityKind for CylinderKind {
    fn build(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Construction, EntityError> {
        let transform = ctx.placement(desc)?;
        let radius: f32 = desc.field("radius")?;
        let height: f32 = desc.field("height")?;
        let shape = Shape::Cylinder {
            radius: radius * ctx.scale,
            height: height * ctx.scale,
        };
        let visual = ctx.backend.spawn(&shape, &transform);
        Ok(Construction::Ready(Built::visual(visual, transform)))
    }
}

// ---------------------------------------------------------------------------
// Robots
// ---------------------------------------------------------------------------

pub struct FootbotKind;

impl EntityKind for FootbotKind {
    fn build(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Construction, EntityError> {
        let shape = Shape::Cylinder {
            radius: FOOTBOT_RADIUS * ctx.scale,
            height: FOOTBOT_HEIGHT * ctx.scale,
        };
        spawn_robot(desc, ctx, &shape, FOOTBOT_SLOTS).map(Construction::Ready)
    }

    fn update(
        &self,
        proxy: &mut RenderableProxy,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<(), EntityError> {
        update_robot(proxy, desc, ctx, FOOTBOT_SLOTS)
    }
}

pub struct KheperaKind;

impl EntityKind for KheperaKind {
    fn build(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Construction, EntityError> {
        // Reject bad data now rather than after the model arrives.
        ctx.placement(desc)?;
        decorations(desc, ctx.scale, KHEPERA_SLOTS)?;
        Ok(Construction::Pending {
            ticket: ctx.backend.request_asset(KHEPERA_MODEL),
        })
    }

    fn resume(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
        outcome: &AssetOutcome,
    ) -> Result<Built, EntityError> {
        if let AssetOutcome::Failed(reason) = outcome {
            return Err(EntityError::AssetFailed {
                asset: KHEPERA_MODEL.to_string(),
                reason: reason.clone(),
            });
        }
        let shape = Shape::Model {
            asset: KHEPERA_MODEL.to_string(),
        };
        spawn_robot(desc, ctx, &shape, KHEPERA_SLOTS)
    }

    fn update(
        &self,
        proxy: &mut RenderableProxy,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<(), EntityError> {
        update_robot(proxy, desc, ctx, KHEPERA_SLOTS)
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Any type tag without a dedicated kind.
pub struct UnidentifiedKind;

impl EntityKind for UnidentifiedKind {
    fn build(
        &self,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Construction, EntityError> {
        let transform = ctx.placement(desc)?;
        let visual = ctx.backend.spawn(&Shape::Marker, &transform);
        Ok(Construction::Ready(Built::visual(visual, transform)))
    }

    fn update(
        &self,
        proxy: &mut RenderableProxy,
        desc: &EntityDescriptor,
        ctx: &mut BuildContext<'_>,
    ) -> Result<(), EntityError> {
        let transform = ctx.placement(desc)?;
        proxy.place(ctx.backend, transform);
        Ok(())
    }
}
