//! Inkboard Application Library
//!
//! Client shell for the Inkboard whiteboard. [`Whiteboard`] wires pointer
//! input, the camera, the raster compositor and the sync session together.

mod whiteboard;

pub use whiteboard::Whiteboard;
