//! Robot decoration fields: LED colours, intersection points, sensor rays.
//!
//! The server serializes these loosely:
//!
//! | field    | wire form                                          |
//! |----------|----------------------------------------------------|
//! | `leds`   | array of colours, or one `"#rrggbb;#rrggbb"` string |
//! | `points` | array of `"x,y,z"` strings                         |
//! | `rays`   | array of `"<checked>:x,y,z:x,y,z"` strings         |
//!
//! A colour may be a number, `"0xRRGGBB"` or `"#RRGGBB"`. Parsed
//! coordinates are multiplied by the scene scale.

use serde_json::Value;

use crate::backend::{Decorations, Ray};
use crate::error::EntityError;
use crate::types::{EntityDescriptor, Vec3};

/// Read all three decoration fields. Absent fields decode as empty.
pub fn parse_decorations(
    desc: &EntityDescriptor,
    scale: f32,
) -> Result<Decorations, EntityError> {
    Ok(Decorations {
        leds: parse_leds(desc.raw_field("leds"))?,
        points: parse_points(desc.raw_field("points"), scale)?,
        rays: parse_rays(desc.raw_field("rays"), scale)?,
    })
}

pub fn parse_leds(value: Option<&Value>) -> Result<Vec<u32>, EntityError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => s
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| parse_color(part).ok_or_else(|| invalid("leds", part)))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| color_value(item).ok_or_else(|| invalid("leds", &item.to_string())))
            .collect(),
        Some(other) => Err(invalid("leds", &other.to_string())),
    }
}

pub fn parse_points(value: Option<&Value>, scale: f32) -> Result<Vec<Vec3>, EntityError> {
    string_items("points", value)?
        .into_iter()
        .map(|s| {
            parse_vec3(s)
                .map(|v| v.scaled(scale))
                .ok_or_else(|| invalid("points", s))
        })
        .collect()
}

pub fn parse_rays(value: Option<&Value>, scale: f32) -> Result<Vec<Ray>, EntityError> {
    string_items("rays", value)?
        .into_iter()
        .map(|s| parse_ray(s, scale).ok_or_else(|| invalid("rays", s)))
        .collect()
}

/// `0xRRGGBB`, `#RRGGBB` or bare hex.
pub fn parse_color(s: &str) -> Option<u32> {
    let s = s.trim();
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .or_else(|| s.strip_prefix('#'))
        .unwrap_or(s);
    if hex.is_empty() || hex.len() > 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

fn color_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => parse_color(s),
        _ => None,
    }
}

fn string_items<'a>(
    field: &'static str,
    value: Option<&'a Value>,
) -> Result<Vec<&'a str>, EntityError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().ok_or_else(|| invalid(field, &item.to_string())))
            .collect(),
        Some(other) => Err(invalid(field, &other.to_string())),
    }
}

fn parse_vec3(s: &str) -> Option<Vec3> {
    let mut parts = s.split(',').map(|p| p.trim().parse::<f32>());
    let x = parts.next()?.ok()?;
    let y = parts.next()?.ok()?;
    let z = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Vec3::new(x, y, z))
}

fn parse_ray(s: &str, scale: f32) -> Option<Ray> {
    let mut parts = s.split(':');
    let checked = match parts.next()?.trim() {
        "true" | "1" => true,
        "false" | "0" => false,
        _ => return None,
    };
    let start = parse_vec3(parts.next()?)?.scaled(scale);
    let end = parse_vec3(parts.next()?)?.scaled(scale);
    if parts.next().is_some() {
        return None;
    }
    Some(Ray {
        checked,
        start,
        end,
    })
}

fn invalid(field: &'static str, got: &str) -> EntityError {
    EntityError::InvalidField {
        field,
        reason: format!("cannot parse {got:?}"),
    }
}
