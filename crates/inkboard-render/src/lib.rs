//! Inkboard Render Library
//!
//! Raster compositor for the Inkboard whiteboard. Strokes are composited on a
//! CPU world surface and blitted to the screen through the camera transform.

mod compositor;
mod renderer;

pub use compositor::{Compositor, screen_surface};
pub use renderer::{PresentStyle, RenderResult, Renderer, RendererError};
pub use tiny_skia::Pixmap;
