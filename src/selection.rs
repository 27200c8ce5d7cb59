//! Selection manager.
//!
//! A selection is keyed by visual handle and owns one outline visual.
//! Rules for growing a non-empty selection:
//!
//! * every selected entity shares one type tag;
//! * single-select types (boxes) never join or start a multi-selection.
//!
//! A visual is only selectable while the registry's reverse table knows
//! it and its proxy passed the movability rule. Rule violations are
//! silent no-ops.

use log::debug;

use crate::backend::{OutlineHandle, RenderBackend, VisualHandle};
use crate::protocol::Command;
use crate::registry::EntityRegistry;
use crate::types::EntityId;

/// Types capped at one selected entity.
pub const SINGLE_SELECT_TYPES: &[&str] = &["box"];

fn is_single_select(type_tag: &str) -> bool {
    SINGLE_SELECT_TYPES.contains(&type_tag)
}

// ---------------------------------------------------------------------------
// Pointer input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }

    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    pub fn shift_ctrl() -> Self {
        Self {
            shift: true,
            ctrl: true,
            alt: false,
        }
    }

    /// Ctrl held with neither shift nor alt.
    pub fn is_ctrl_only(&self) -> bool {
        self.ctrl && !self.shift && !self.alt
    }
}

/// One click on the scene. `picked` is the root visual the host's ray
/// hit on the selectable layer, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerClick {
    /// Normalized device coordinates, `[-1, 1]` on both axes.
    pub ndc: [f32; 2],
    pub picked: Option<VisualHandle>,
    pub modifiers: Modifiers,
}

// ---------------------------------------------------------------------------
// SelectionSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Selected {
    visual: VisualHandle,
    outline: OutlineHandle,
    type_tag: String,
}

#[derive(Debug, Default)]
pub struct SelectionSet {
    entries: Vec<Selected>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, visual: VisualHandle) -> bool {
        self.entries.iter().any(|s| s.visual == visual)
    }

    /// Shared type tag of the current selection.
    pub fn type_tag(&self) -> Option<&str> {
        self.entries.first().map(|s| s.type_tag.as_str())
    }

    pub fn outline_of(&self, visual: VisualHandle) -> Option<OutlineHandle> {
        self.entries
            .iter()
            .find(|s| s.visual == visual)
            .map(|s| s.outline)
    }

    /// Ids of the selected entities still present in the registry.
    pub fn selected_ids(&self, registry: &EntityRegistry) -> Vec<EntityId> {
        self.entries
            .iter()
            .filter_map(|s| registry.resolve(s.visual))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Add `visual` to the selection. Returns whether it is selected
    /// afterwards.
    pub fn select(
        &mut self,
        visual: VisualHandle,
        registry: &EntityRegistry,
        backend: &mut dyn RenderBackend,
    ) -> bool {
        if self.contains(visual) {
            return true;
        }
        let Some(proxy) = registry.resolve(visual) else {
            debug!("[selection] Visual {visual:?} is not a registered entity");
            return false;
        };
        if !proxy.selectable {
            debug!("[selection] Entity {} is not movable", proxy.id);
            return false;
        }
        if let Some(current) = self.type_tag() {
            if current != proxy.type_tag {
                debug!(
                    "[selection] Cannot mix {} with selected {current}",
                    proxy.type_tag
                );
                return false;
            }
            if is_single_select(current) {
                debug!("[selection] Only one {current} can be selected");
                return false;
            }
        }

        let outline = backend.spawn_outline(visual);
        self.entries.push(Selected {
            visual,
            outline,
            type_tag: proxy.type_tag.clone(),
        });
        true
    }

    /// Remove `visual` from the selection, releasing its outline.
    pub fn deselect(&mut self, visual: VisualHandle, backend: &mut dyn RenderBackend) -> bool {
        match self.entries.iter().position(|s| s.visual == visual) {
            Some(index) => {
                let removed = self.entries.remove(index);
                backend.dispose_outline(removed.outline);
                true
            }
            None => false,
        }
    }

    pub fn clear_all(&mut self, backend: &mut dyn RenderBackend) {
        for s in self.entries.drain(..) {
            backend.dispose_outline(s.outline);
        }
    }

    /// Deselect a selected visual; otherwise select it, replacing the
    /// current selection unless `additive`.
    pub fn toggle(
        &mut self,
        visual: VisualHandle,
        additive: bool,
        registry: &EntityRegistry,
        backend: &mut dyn RenderBackend,
    ) -> bool {
        if self.contains(visual) {
            self.deselect(visual, backend);
            return false;
        }
        if !additive {
            self.clear_all(backend);
        }
        self.select(visual, registry, backend)
    }

    /// Recompute every outline from its target's live bounds.
    pub fn refresh(&self, backend: &mut dyn RenderBackend) {
        for s in &self.entries {
            backend.refresh_outline(s.outline);
        }
    }

    /// Apply one click.
    ///
    /// | target          | modifiers          | effect                               |
    /// |-----------------|--------------------|--------------------------------------|
    /// | selected        | shift              | deselect                             |
    /// | unselected      | shift              | replace selection                    |
    /// | unselected      | shift + ctrl       | add to selection                     |
    /// | empty space     | ctrl only          | `moveEntity` if exactly one selected |
    ///
    /// Anything else does nothing. Clicks on visuals the registry does not
    /// know count as empty space.
    pub fn click(
        &mut self,
        click: &PointerClick,
        registry: &EntityRegistry,
        backend: &mut dyn RenderBackend,
        scale: f32,
    ) -> Option<Command> {
        let target = click
            .picked
            .filter(|v| registry.resolve(*v).is_some_and(|p| p.selectable));

        match target {
            Some(visual) => {
                if click.modifiers.shift {
                    self.toggle(visual, click.modifiers.ctrl, registry, backend);
                }
                None
            }
            None => {
                if !click.modifiers.is_ctrl_only() {
                    return None;
                }
                self.move_command(click.ndc, registry, &*backend, scale)
            }
        }
    }

    fn move_command(
        &self,
        ndc: [f32; 2],
        registry: &EntityRegistry,
        backend: &dyn RenderBackend,
        scale: f32,
    ) -> Option<Command> {
        let live: Vec<_> = self
            .entries
            .iter()
            .filter_map(|s| registry.resolve(s.visual))
            .collect();
        let [proxy] = live.as_slice() else {
            return None;
        };

        let target = backend.project_pointer(ndc, proxy.transform.position.z)?;
        Some(Command::MoveEntity {
            entity_id: proxy.id.clone(),
            position: target.scaled(1.0 / scale),
            orientation: proxy.transform.orientation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctrl_only() {
        assert!(Modifiers::ctrl().is_ctrl_only());
        assert!(!Modifiers::shift_ctrl().is_ctrl_only());
        assert!(!Modifiers {
            ctrl: true,
            alt: true,
            shift: false
        }
        .is_ctrl_only());
        assert!(!Modifiers::none().is_ctrl_only());
    }

    #[test]
    fn box_is_single_select() {
        assert!(is_single_select("box"));
        assert!(!is_single_select("foot-bot"));
    }
}
