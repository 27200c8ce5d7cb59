//! Core scene types shared across all modules.
//!
//! All positions arrive in simulator units (metres). They are multiplied by
//! the session scale before they reach the rendering backend.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EntityError;

/// Type tag of the arena floor. Never selectable, whatever `is_movable` says.
pub const FLOOR_TYPE: &str = "floor";

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// World-space placement of a visual, already multiplied by the scene scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl Transform {
    pub fn new(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity identity
// ---------------------------------------------------------------------------

/// Stable simulator-side entity identifier.
///
/// The protocol carries integers, ARGoS itself names entities (`"fb0"`).
/// Both are accepted and serialized back in the form they arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Index(i64),
    Name(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Index(i) => write!(f, "{i}"),
            EntityId::Name(n) => f.write_str(n),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Index(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Name(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ArenaSize {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Arena {
    pub size: ArenaSize,
}

// ---------------------------------------------------------------------------
// Entity descriptor
// ---------------------------------------------------------------------------

/// One entity as described by a broadcast.
///
/// Only `id` and `type` are needed to decode a descriptor. Everything else
/// (including `position` and `orientation`) stays in `fields` and is
/// checked when a proxy is built or updated, so one malformed entity turns
/// into a placeholder instead of failing the whole snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDescriptor {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_movable: Option<bool>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl EntityDescriptor {
    pub fn new(id: impl Into<EntityId>, type_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            is_movable: None,
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_position(self, position: Vec3) -> Self {
        self.with_field("position", position)
    }

    pub fn with_orientation(self, orientation: Quaternion) -> Self {
        self.with_field("orientation", orientation)
    }

    pub fn with_movable(mut self, movable: bool) -> Self {
        self.is_movable = Some(movable);
        self
    }

    /// Attach a type-specific field. Values that fail to serialize are dropped.
    pub fn with_field(mut self, name: &str, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(name.to_string(), v);
        }
        self
    }

    /// Movability rule: `floor` is never selectable; otherwise an absent
    /// `is_movable` means movable.
    pub fn is_selectable(&self) -> bool {
        if self.type_tag == FLOOR_TYPE {
            return false;
        }
        self.is_movable.unwrap_or(true)
    }

    pub fn position(&self) -> Result<Vec3, EntityError> {
        self.field("position")
    }

    pub fn orientation(&self) -> Result<Quaternion, EntityError> {
        self.field("orientation")
    }

    /// Decode a required type-specific field.
    pub fn field<T: DeserializeOwned>(&self, name: &'static str) -> Result<T, EntityError> {
        self.optional_field(name)?
            .ok_or(EntityError::MissingField { field: name })
    }

    /// Decode an optional field; `null` counts as absent.
    pub fn optional_field<T: DeserializeOwned>(
        &self,
        name: &'static str,
    ) -> Result<Option<T>, EntityError> {
        match self.fields.get(name) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| EntityError::InvalidField {
                    field: name,
                    reason: e.to_string(),
                }),
        }
    }

    pub fn raw_field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The decoded entity list of one broadcast, the sole authoritative state
/// for that tick. Null, undecodable and duplicate-id entries have already
/// been dropped, so `entities.len()` is what the registry must match.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub arena: Arena,
    pub entities: Vec<EntityDescriptor>,
}

impl Snapshot {
    pub fn new(arena: Arena, entities: Vec<EntityDescriptor>) -> Self {
        Self { arena, entities }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn has_floor(&self) -> bool {
        self.entities.iter().any(|e| e.type_tag == FLOOR_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn floor_is_never_selectable() {
        let floor = EntityDescriptor::new(0, "floor");
        assert!(!floor.is_selectable());
        assert!(!floor.clone().with_movable(true).is_selectable());
    }

    #[test]
    fn absent_movable_defaults_to_selectable() {
        assert!(EntityDescriptor::new(1, "box").is_selectable());
        assert!(EntityDescriptor::new(1, "box").with_movable(true).is_selectable());
        assert!(!EntityDescriptor::new(1, "box").with_movable(false).is_selectable());
    }

    #[test]
    fn descriptor_keeps_type_specific_fields() {
        let d: EntityDescriptor = serde_json::from_value(json!({
            "id": 7,
            "type": "box",
            "position": {"x": 1.0, "y": 2.0, "z": 0.0},
            "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0},
            "scale": {"x": 0.1, "y": 0.2, "z": 0.3},
            "is_movable": null
        }))
        .unwrap();

        assert_eq!(d.id, EntityId::Index(7));
        assert_eq!(d.is_movable, None);
        assert_eq!(d.position().unwrap(), Vec3::new(1.0, 2.0, 0.0));
        let scale: Vec3 = d.field("scale").unwrap();
        assert!((scale.z - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn string_ids_round_trip_as_strings() {
        let d: EntityDescriptor =
            serde_json::from_value(json!({"id": "fb0", "type": "foot-bot"})).unwrap();
        assert_eq!(d.id, EntityId::from("fb0"));
        assert_eq!(serde_json::to_value(&d.id).unwrap(), json!("fb0"));
    }

    #[test]
    fn missing_and_invalid_fields_are_reported() {
        let d = EntityDescriptor::new(1, "box").with_field("position", "nope");
        assert!(matches!(
            d.orientation(),
            Err(EntityError::MissingField {
                field: "orientation"
            })
        ));
        assert!(matches!(
            d.position(),
            Err(EntityError::InvalidField {
                field: "position",
                ..
            })
        ));
    }
}
