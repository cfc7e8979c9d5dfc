//! Stroke segments, the atomic unit of drawing and replication.

use kurbo::{Point, Size};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a segment.
pub type SegmentId = Uuid;

/// Opaque per-connection owner identifier.
pub type OwnerId = String;

/// Widest stroke accepted from the network, in world units.
pub const MAX_STROKE_WIDTH: f64 = 500.0;

/// Errors for segments that must not be applied or rebroadcast.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error("Segment has non-finite coordinates")]
    NonFiniteCoordinates,
    #[error("Segment lies outside the board: ({x}, {y})")]
    OutOfBounds { x: f64, y: f64 },
    #[error("Invalid stroke width: {0}")]
    InvalidWidth(f64),
    #[error("Invalid erase radius: {0}")]
    InvalidRadius(f64),
    #[error("Segment id already used on this board: {0}")]
    DuplicateId(SegmentId),
}

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }
}

impl Default for SerializableColor {
    fn default() -> Self {
        Self::black()
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self::new(rgba.r, rgba.g, rgba.b, rgba.a)
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// How a segment composites onto the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeMode {
    /// Composite the stroke color over existing content.
    #[default]
    Paint,
    /// Clear the stroke area to transparent.
    Erase,
}

/// Style of a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    /// Stroke width in world units. Never scaled by zoom.
    pub width: f64,
    pub mode: StrokeMode,
    /// Ignored for erase strokes.
    #[serde(default)]
    pub color: SerializableColor,
}

impl StrokeStyle {
    pub fn paint(width: f64, color: SerializableColor) -> Self {
        Self {
            width,
            mode: StrokeMode::Paint,
            color,
        }
    }

    pub fn erase(width: f64) -> Self {
        Self {
            width,
            mode: StrokeMode::Erase,
            color: SerializableColor::default(),
        }
    }
}

/// A single line segment in world coordinates.
///
/// A pen motion is a run of consecutive segments sharing one owner.
/// There is no grouping object above the segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeSegment {
    pub id: SegmentId,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub style: StrokeStyle,
    #[serde(default)]
    pub owner_id: OwnerId,
    /// Position in the authority's history, assigned on acceptance.
    #[serde(default)]
    pub seq: u64,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

impl StrokeSegment {
    /// Create a new segment between two world points.
    pub fn new(from: Point, to: Point, style: StrokeStyle, owner_id: impl Into<OwnerId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            x0: from.x,
            y0: from.y,
            x1: to.x,
            y1: to.y,
            style,
            owner_id: owner_id.into(),
            seq: 0,
            timestamp: now_millis(),
        }
    }

    pub fn start(&self) -> Point {
        Point::new(self.x0, self.y0)
    }

    pub fn end(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    pub fn length(&self) -> f64 {
        self.start().distance(self.end())
    }

    /// Distance from `point` to the segment's centerline.
    pub fn distance_to(&self, point: Point) -> f64 {
        let start = self.start();
        let dx = self.x1 - self.x0;
        let dy = self.y1 - self.y0;
        let len_sq = dx * dx + dy * dy;
        if len_sq < f64::EPSILON {
            return point.distance(start);
        }

        let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / len_sq).clamp(0.0, 1.0);
        point.distance(Point::new(start.x + t * dx, start.y + t * dy))
    }

    /// Whether the stroked segment, round caps included, overlaps the
    /// circle at `center`.
    pub fn intersects_circle(&self, center: Point, radius: f64) -> bool {
        self.distance_to(center) <= radius + self.style.width / 2.0
    }

    /// Reject geometry and style that cannot be rendered identically everywhere.
    ///
    /// Endpoints may fall outside the board (strokes drawn in the pan
    /// margin), but not further than one board size away.
    pub fn validate(&self, world: Size) -> Result<(), SegmentError> {
        let coords = [self.x0, self.y0, self.x1, self.y1];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(SegmentError::NonFiniteCoordinates);
        }

        for (x, y) in [(self.x0, self.y0), (self.x1, self.y1)] {
            let inside_x = x >= -world.width && x <= world.width * 2.0;
            let inside_y = y >= -world.height && y <= world.height * 2.0;
            if !inside_x || !inside_y {
                return Err(SegmentError::OutOfBounds { x, y });
            }
        }

        let width = self.style.width;
        if !width.is_finite() || width <= 0.0 || width > MAX_STROKE_WIDTH {
            return Err(SegmentError::InvalidWidth(width));
        }

        Ok(())
    }
}

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
