//! Wire protocol between clients and the authority.
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "request-snapshot" }
//! { "type": "segment", "segment": { "id": "...", "x0": 0, "y0": 0, "x1": 10, "y1": 10, ... } }
//! { "type": "erase-request", "x": 5, "y": 5, "radius": 1, "owner_id": "..." }
//! ```

use crate::segment::{OwnerId, SegmentError, SegmentId, StrokeSegment};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Largest erase radius accepted, in world units.
pub const MAX_ERASE_RADIUS: f64 = 1000.0;

/// Owner-scoped geometric erase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraseRequest {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub owner_id: OwnerId,
}

impl EraseRequest {
    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn validate(&self) -> Result<(), SegmentError> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(SegmentError::NonFiniteCoordinates);
        }
        if !self.radius.is_finite() || self.radius < 0.0 || self.radius > MAX_ERASE_RADIUS {
            return Err(SegmentError::InvalidRadius(self.radius));
        }
        Ok(())
    }
}

/// Messages sent to the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Ask for the full current history.
    RequestSnapshot,
    /// A locally drawn segment.
    Segment { segment: StrokeSegment },
    /// Remove the owner's segments under a circle.
    EraseRequest(EraseRequest),
}

/// Messages sent by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent once on connect with the owner id assigned to this connection.
    Welcome { board: String, owner_id: OwnerId },
    /// Full ordered history.
    Snapshot { segments: Vec<StrokeSegment> },
    /// A segment accepted from another participant.
    Segment { segment: StrokeSegment },
    /// Ids removed by an erase request.
    EraseResult { removed: Vec<SegmentId> },
    /// Rejected input; the connection stays open.
    Error { message: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
