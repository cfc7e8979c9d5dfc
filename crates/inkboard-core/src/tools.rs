//! Drawing tools and the current tool settings.

use crate::config::BoardConfig;
use crate::segment::{SerializableColor, StrokeStyle};
use serde::{Deserialize, Serialize};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ToolKind {
    #[default]
    Pen,
    /// Alpha erase: clears pixels along the stroke.
    Eraser,
}

/// Tool selection plus per-tool stroke settings.
///
/// Owned by the client, never shared as global state.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettings {
    current: ToolKind,
    pub pen_width: f64,
    pub pen_color: SerializableColor,
    pub eraser_width: f64,
}

impl ToolSettings {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            current: ToolKind::Pen,
            pen_width: config.pen_width,
            pen_color: config.pen_color,
            eraser_width: config.eraser_width,
        }
    }

    pub fn current(&self) -> ToolKind {
        self.current
    }

    /// Switch tools. Returns true if the tool changed.
    pub fn set_tool(&mut self, tool: ToolKind) -> bool {
        let changed = self.current != tool;
        self.current = tool;
        changed
    }

    /// Style for segments drawn with the current tool.
    pub fn style(&self) -> StrokeStyle {
        match self.current {
            ToolKind::Pen => StrokeStyle::paint(self.pen_width, self.pen_color),
            ToolKind::Eraser => StrokeStyle::erase(self.eraser_width),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::new(&BoardConfig::default())
    }
}
