//! Editing-module interface consumed by the darkroom view.
//!
//! Each operation in the pipeline (exposure, crop, ...) implements
//! [`EditModule`]. The view never owns module internals; it delegates input
//! to the single active module and snapshots parameters for the history.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::composite::FrameSurface;

/// Pointer buttons as the hosting framework reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Middle,
    Secondary,
    Other(u8),
}

/// Keys with a fixed darkroom binding, plus a passthrough for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    /// Cycle 1:1 and the 2:1 closeup.
    Key1,
    /// Fill the window, recentering.
    Key2,
    /// Reset to Fit, centered.
    Key3,
    Other(u32),
}

/// Per-module UI flags persisted across sessions, keyed by the module op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFlags {
    pub visible: bool,
    pub expanded: bool,
}

impl Default for ModuleFlags {
    fn default() -> Self {
        Self {
            visible: true,
            expanded: false,
        }
    }
}

/// An editing operation mounted in the session's module list.
///
/// All input hooks are optional: the defaults report the event as
/// unhandled so the view falls through to viewport navigation. Hook
/// coordinates are working-area pixels.
pub trait EditModule {
    /// Stable operation identifier; keys history entries and persisted
    /// flags.
    fn op(&self) -> &'static str;

    /// Snapshot of the current parameters for a history entry.
    fn params(&self) -> Value;

    /// Restore parameters from a history entry.
    fn apply_params(&mut self, params: &Value);

    fn flags(&self) -> ModuleFlags {
        ModuleFlags::default()
    }

    fn set_flags(&mut self, _flags: ModuleFlags) {}

    /// Whether the module currently wants a color-picker box dragged for it.
    fn color_picker_requested(&self) -> bool {
        false
    }

    /// Normalized picker rectangle `[x0, y0, x1, y1]` in image coordinates.
    fn picker_box(&self) -> [f32; 4] {
        [0.0; 4]
    }

    fn set_picker_box(&mut self, _rect: [f32; 4]) {}

    fn on_pointer_move(&mut self, _x: f32, _y: f32) -> bool {
        false
    }

    fn on_button_down(&mut self, _x: f32, _y: f32, _button: MouseButton) -> bool {
        false
    }

    fn on_button_up(&mut self, _x: f32, _y: f32, _button: MouseButton) -> bool {
        false
    }

    fn on_key(&mut self, _key: KeyCode) -> bool {
        false
    }

    /// Draw module-specific overlays onto the composited frame.
    fn on_post_render(&mut self, _frame: &mut FrameSurface, _pointer_x: f32, _pointer_y: f32) {}
}
