//! Board configuration supplied at startup.

use crate::segment::SerializableColor;
use kurbo::Size;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default board width in world units.
pub const DEFAULT_WORLD_WIDTH: f64 = 2500.0;
/// Default board height in world units.
pub const DEFAULT_WORLD_HEIGHT: f64 = 2000.0;
/// Default upper zoom bound.
pub const DEFAULT_ZOOM_MAX: f64 = 5.0;
/// Default empty space allowed beyond the board edges, in screen pixels.
pub const DEFAULT_PAN_MARGIN: f64 = 50.0;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Invalid config JSON: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Board dimensions, camera bounds and tool defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// World width `W`.
    pub world_width: f64,
    /// World height `H`.
    pub world_height: f64,
    /// Upper zoom bound. The lower bound is derived from the screen size.
    pub zoom_max: f64,
    /// Empty space allowed past the board edges when zoomed in.
    pub pan_margin: f64,
    pub pen_width: f64,
    pub eraser_width: f64,
    pub pen_color: SerializableColor,
    /// Zoom multiplier for one mouse wheel notch.
    pub wheel_zoom_step: f64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            world_width: DEFAULT_WORLD_WIDTH,
            world_height: DEFAULT_WORLD_HEIGHT,
            zoom_max: DEFAULT_ZOOM_MAX,
            pan_margin: DEFAULT_PAN_MARGIN,
            pen_width: 5.0,
            eraser_width: 20.0,
            pen_color: SerializableColor::black(),
            wheel_zoom_step: 1.1,
        }
    }
}

impl BoardConfig {
    /// Parse and validate a JSON config. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Load a config file if one is given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Check that every bound is finite and strictly positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("world_width", self.world_width),
            ("world_height", self.world_height),
            ("zoom_max", self.zoom_max),
            ("pen_width", self.pen_width),
            ("eraser_width", self.eraser_width),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if !self.pan_margin.is_finite() || self.pan_margin < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "pan_margin must be non-negative, got {}",
                self.pan_margin
            )));
        }
        if !self.wheel_zoom_step.is_finite() || self.wheel_zoom_step <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "wheel_zoom_step must be greater than 1, got {}",
                self.wheel_zoom_step
            )));
        }
        Ok(())
    }

    /// Board size in world units.
    pub fn world_size(&self) -> Size {
        Size::new(self.world_width, self.world_height)
    }
}
