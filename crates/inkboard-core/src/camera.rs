//! Camera module for pan/zoom transforms.
//!
//! The board is a fixed world rectangle. The camera maps it onto the local
//! screen and keeps it reachable: zoom never drops below the fit-to-screen
//! level and pan never exposes more than a fixed margin past the edges.

use crate::config::BoardConfig;
use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Smallest zoom ever allowed, used before the first resize and for
/// degenerate screen sizes. Keeps every division by zoom well defined.
pub const ZOOM_FLOOR: f64 = 1e-3;

/// Pan offset and zoom factor defining the screen/world mapping.
///
/// `pan` is the screen position of the world origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub pan: Vec2,
    pub zoom: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl ViewState {
    /// Get the affine transform for rendering.
    ///
    /// This transform converts world coordinates to screen coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.pan) * Affine::scale(self.zoom)
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        Point::new(
            (screen_point.x - self.pan.x) / self.zoom,
            (screen_point.y - self.pan.y) / self.zoom,
        )
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        Point::new(
            world_point.x * self.zoom + self.pan.x,
            world_point.y * self.zoom + self.pan.y,
        )
    }
}

/// Viewport controller: owns the local camera and clamps it to the board.
///
/// Camera state is local to one participant and never transmitted.
#[derive(Debug, Clone)]
pub struct Viewport {
    view: ViewState,
    world: Size,
    screen: Size,
    zoom_min: f64,
    zoom_max: f64,
    margin: f64,
    /// False until the first resize; the initial zoom is a sentinel.
    sized: bool,
}

impl Viewport {
    /// Create a viewport for a board. Call [`Viewport::on_resize`] before use.
    pub fn new(config: &BoardConfig) -> Self {
        let zoom_max = config.zoom_max.max(ZOOM_FLOOR);
        Self {
            view: ViewState::default(),
            world: config.world_size(),
            screen: config.world_size(),
            zoom_min: ZOOM_FLOOR.min(zoom_max),
            zoom_max,
            margin: config.pan_margin.max(0.0),
            sized: false,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn zoom(&self) -> f64 {
        self.view.zoom
    }

    pub fn pan(&self) -> Vec2 {
        self.view.pan
    }

    pub fn zoom_min(&self) -> f64 {
        self.zoom_min
    }

    pub fn zoom_max(&self) -> f64 {
        self.zoom_max
    }

    pub fn screen_size(&self) -> Size {
        self.screen
    }

    pub fn world_size(&self) -> Size {
        self.world
    }

    /// Center of the screen, the anchor for wheel and pinch zoom.
    pub fn center(&self) -> Point {
        Point::new(self.screen.width / 2.0, self.screen.height / 2.0)
    }

    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.view.screen_to_world(screen_point)
    }

    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.view.world_to_screen(world_point)
    }

    /// Pan the camera by a delta in screen coordinates.
    pub fn apply_pan(&mut self, delta: Vec2) {
        if delta.x.is_finite() && delta.y.is_finite() {
            self.view.pan += delta;
        }
        self.clamp_pan();
    }

    /// Zoom to `new_zoom_raw` (clamped), keeping the world point under
    /// `anchor` fixed on screen.
    ///
    /// The anchor stays fixed exactly whenever the resulting pan is within
    /// the clamp range; otherwise the pan clamp wins.
    pub fn apply_zoom(&mut self, new_zoom_raw: f64, anchor: Point) {
        self.zoom_about(new_zoom_raw, anchor);
        self.clamp_pan();
    }

    /// Multiply the zoom by `factor` around `anchor`.
    pub fn zoom_by(&mut self, factor: f64, anchor: Point) {
        self.apply_zoom(self.view.zoom * factor, anchor);
    }

    /// One mouse wheel notch: zoom in for negative `delta_y`, out for positive,
    /// anchored at the screen center.
    pub fn wheel(&mut self, delta_y: f64, step: f64) {
        if delta_y == 0.0 || !delta_y.is_finite() {
            return;
        }
        let factor = if delta_y > 0.0 { 1.0 / step } else { step };
        self.zoom_by(factor, self.center());
    }

    /// Pan then zoom as one gesture step, clamping once at the end.
    pub fn pan_and_zoom(&mut self, delta: Vec2, scale_change: f64, anchor: Point) {
        if delta.x.is_finite() && delta.y.is_finite() {
            self.view.pan += delta;
        }
        self.zoom_about(self.view.zoom * scale_change, anchor);
        self.clamp_pan();
    }

    /// Center the board on an axis where it is smaller than the screen;
    /// elsewhere allow at most `margin` of empty space past either edge.
    pub fn clamp_pan(&mut self) {
        let scaled = Size::new(self.world.width * self.view.zoom, self.world.height * self.view.zoom);
        self.view.pan.x = clamp_axis(self.view.pan.x, scaled.width, self.screen.width, self.margin);
        self.view.pan.y = clamp_axis(self.view.pan.y, scaled.height, self.screen.height, self.margin);
    }

    /// Recompute the zoom floor for a new screen size.
    ///
    /// The floor is the largest zoom that fits the whole board on both axes.
    /// A camera at or below the previous floor, or not yet sized, snaps to
    /// the new floor.
    pub fn on_resize(&mut self, screen_width: f64, screen_height: f64) {
        self.screen = Size::new(sanitize_extent(screen_width), sanitize_extent(screen_height));

        let fit = (self.screen.width / self.world.width).min(self.screen.height / self.world.height);
        let new_min = fit.clamp(ZOOM_FLOOR, self.zoom_max);
        let at_floor = self.view.zoom <= self.zoom_min * (1.0 + 1e-9);

        if !self.sized || at_floor {
            self.view.zoom = new_min;
        }
        self.zoom_min = new_min;
        self.sized = true;
        self.view.zoom = self.view.zoom.clamp(self.zoom_min, self.zoom_max);
        self.clamp_pan();
    }

    /// Zoom all the way out, centering the board.
    pub fn reset(&mut self) {
        self.view.zoom = self.zoom_min;
        self.clamp_pan();
    }

    fn zoom_about(&mut self, new_zoom_raw: f64, anchor: Point) {
        if !new_zoom_raw.is_finite() || !anchor.x.is_finite() || !anchor.y.is_finite() {
            return;
        }
        let new_zoom = new_zoom_raw.clamp(self.zoom_min, self.zoom_max);
        let ratio = new_zoom / self.view.zoom;
        let anchor = anchor.to_vec2();
        self.view.pan = anchor - (anchor - self.view.pan) * ratio;
        self.view.zoom = new_zoom;
    }
}

fn clamp_axis(pan: f64, scaled: f64, screen: f64, margin: f64) -> f64 {
    if scaled < screen {
        (screen - scaled) / 2.0
    } else {
        pan.clamp(screen - scaled - margin, margin)
    }
}

fn sanitize_extent(value: f64) -> f64 {
    if value.is_finite() { value.max(1.0) } else { 1.0 }
}
