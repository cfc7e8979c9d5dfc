//! Renderer trait abstraction.

use inkboard_core::camera::ViewState;
use inkboard_core::segment::StrokeSegment;
use peniko::Color;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Surface allocation failed for {width}x{height}")]
    Surface { width: u32, height: u32 },
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Colors used when presenting the board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentStyle {
    /// Fills the screen outside the board.
    pub backdrop: Color,
    /// Board color under the strokes. Erased pixels show this.
    pub paper: Color,
}

impl Default for PresentStyle {
    fn default() -> Self {
        Self {
            backdrop: Color::from_rgba8(230, 230, 230, 255),
            paper: Color::WHITE,
        }
    }
}

/// A world-space raster that strokes are composited onto.
///
/// The world surface is the single source of truth for what the board looks
/// like; presenting it is a resampling step with no stroke logic.
pub trait Renderer {
    /// Screen surface type produced by [`Renderer::present`].
    type Target;

    /// Composite one segment onto the world surface.
    fn apply_segment(&mut self, segment: &StrokeSegment);

    /// Clear the world surface and replay `segments` in order.
    fn rebuild_from_history<'a, I>(&mut self, segments: I)
    where
        I: IntoIterator<Item = &'a StrokeSegment>,
    {
        self.clear();
        for segment in segments {
            self.apply_segment(segment);
        }
    }

    /// Reset the world surface to fully transparent.
    fn clear(&mut self);

    /// Resample the world surface onto `target` through the camera.
    fn present(&self, target: &mut Self::Target, view: &ViewState);
}
