//! Client side of the stroke sync protocol.
//!
//! The session tracks the connection through `Connecting -> Syncing -> Live`,
//! mirrors the board history, and queues outgoing messages. It never touches
//! pixels: it tells the caller what to apply through [`SessionEffect`].

use crate::history::History;
use crate::protocol::{ClientMessage, EraseRequest, ServerMessage};
use crate::segment::{OwnerId, StrokeSegment, StrokeStyle};
use kurbo::{Point, Size};

/// Protocol state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    /// Snapshot requested, not yet received.
    Syncing,
    /// Streaming segments.
    Live,
    Disconnected,
}

/// What the caller must do to its raster after a message.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// The authority assigned this connection's owner id.
    Welcomed { owner_id: OwnerId },
    /// Composite one segment on top of the current raster.
    Apply(StrokeSegment),
    /// Clear and replay [`Session::history`] from scratch.
    Rebuild,
    /// The authority rejected something we sent. A fresh snapshot has been
    /// requested so local-only segments are dropped.
    Rejected { message: String },
}

/// Client sync session.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    owner_id: Option<OwnerId>,
    board: Option<String>,
    /// Local replica: authority order for confirmed segments, with local
    /// segments inserted provisionally where they were drawn.
    history: History,
    world: Size,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
}

impl Session {
    pub fn new(world: Size) -> Self {
        Self {
            state: SessionState::Connecting,
            owner_id: None,
            board: None,
            history: History::new(),
            world,
            outgoing: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == SessionState::Live
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn board(&self) -> Option<&str> {
        self.board.as_deref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// The transport is up: request the snapshot.
    pub fn on_connected(&mut self) {
        self.state = SessionState::Syncing;
        self.queue(&ClientMessage::RequestSnapshot);
    }

    /// The transport went away. Pending messages are dropped.
    pub fn on_disconnected(&mut self) {
        self.state = SessionState::Disconnected;
        self.outgoing.clear();
    }

    /// Begin a new connection attempt, keeping the replica until the next
    /// snapshot replaces it.
    pub fn reconnecting(&mut self) {
        self.state = SessionState::Connecting;
        self.owner_id = None;
    }

    /// Record a locally drawn segment and queue it for the authority.
    ///
    /// Returns the segment the caller must apply to its raster right away,
    /// or `None` when not live (anything drawn before the snapshot would be
    /// wiped by the rebuild).
    pub fn draw(&mut self, from: Point, to: Point, style: StrokeStyle) -> Option<StrokeSegment> {
        if !self.is_live() {
            return None;
        }
        let owner = self.owner_id.clone().unwrap_or_default();
        let segment = StrokeSegment::new(from, to, style, owner);
        if let Err(e) = segment.validate(self.world) {
            log::debug!("Dropping local segment: {}", e);
            return None;
        }

        self.history.insert(segment.clone());
        self.queue(&ClientMessage::Segment {
            segment: segment.clone(),
        });
        Some(segment)
    }

    /// Ask the authority to remove `owner`'s segments under a circle.
    pub fn request_erase(&mut self, center: Point, radius: f64, owner: OwnerId) -> bool {
        let request = EraseRequest {
            x: center.x,
            y: center.y,
            radius,
            owner_id: owner,
        };
        if !self.is_live() || request.validate().is_err() {
            return false;
        }
        self.queue(&ClientMessage::EraseRequest(request));
        true
    }

    /// Erase this connection's own segments under a circle.
    pub fn request_erase_own(&mut self, center: Point, radius: f64) -> bool {
        match self.owner_id.clone() {
            Some(owner) => self.request_erase(center, radius, owner),
            None => false,
        }
    }

    /// Handle an incoming server message.
    pub fn handle_message(&mut self, msg: ServerMessage) -> Option<SessionEffect> {
        match msg {
            ServerMessage::Welcome { board, owner_id } => {
                self.board = Some(board);
                self.owner_id = Some(owner_id.clone());
                Some(SessionEffect::Welcomed { owner_id })
            }
            ServerMessage::Snapshot { segments } => {
                let total = segments.len();
                let valid: Vec<_> = segments
                    .into_iter()
                    .filter(|segment| segment.validate(self.world).is_ok())
                    .collect();
                if valid.len() != total {
                    log::warn!("Dropped {} malformed segments from snapshot", total - valid.len());
                }
                self.history = History::from_segments(valid);
                self.state = SessionState::Live;
                Some(SessionEffect::Rebuild)
            }
            ServerMessage::Segment { segment } => {
                // Anything broadcast before the snapshot is contained in it.
                if !self.is_live() {
                    return None;
                }
                if let Err(e) = segment.validate(self.world) {
                    log::warn!("Ignoring malformed segment {}: {}", segment.id, e);
                    return None;
                }
                self.history
                    .insert(segment.clone())
                    .then_some(SessionEffect::Apply(segment))
            }
            ServerMessage::EraseResult { removed } => {
                (self.history.remove_many(&removed) > 0).then_some(SessionEffect::Rebuild)
            }
            ServerMessage::Error { message } => {
                log::warn!("Authority rejected input: {}", message);
                // The replica may hold a segment the board never accepted.
                if self.is_live() {
                    self.state = SessionState::Syncing;
                    self.queue(&ClientMessage::RequestSnapshot);
                }
                Some(SessionEffect::Rejected { message })
            }
        }
    }

    /// Parse and handle a raw JSON message.
    pub fn handle_json(&mut self, json: &str) -> Option<SessionEffect> {
        match ServerMessage::from_json(json) {
            Ok(msg) => self.handle_message(msg),
            Err(e) => {
                log::warn!("Failed to parse server message: {}", e);
                None
            }
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn queue(&mut self, msg: &ClientMessage) {
        match msg.to_json() {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("Failed to encode message: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SerializableColor;

    const WORLD: Size = Size::new(2500.0, 2000.0);

    fn style() -> StrokeStyle {
        StrokeStyle::paint(5.0, SerializableColor::black())
    }

    fn remote(owner: &str, x: f64) -> StrokeSegment {
        StrokeSegment::new(Point::new(x, 0.0), Point::new(x + 10.0, 10.0), style(), owner)
    }

    fn live_session() -> Session {
        let mut session = Session::new(WORLD);
        session.on_connected();
        session.handle_message(ServerMessage::Welcome {
            board: "default".into(),
            owner_id: "me".into(),
        });
        session.handle_message(ServerMessage::Snapshot { segments: vec![] });
        session.take_outgoing();
        session
    }

    #[test]
    fn test_connect_requests_snapshot() {
        let mut session = Session::new(WORLD);
        assert_eq!(session.state(), SessionState::Connecting);
        session.on_connected();
        assert_eq!(session.state(), SessionState::Syncing);
        assert_eq!(session.take_outgoing(), vec![r#"{"type":"request-snapshot"}"#.to_string()]);
    }

    #[test]
    fn test_snapshot_goes_live_and_rebuilds() {
        let mut session = Session::new(WORLD);
        session.on_connected();
        let a = remote("u1", 0.0);
        let b = remote("u2", 50.0);
        let effect = session.handle_message(ServerMessage::Snapshot {
            segments: vec![a.clone(), b.clone()],
        });
        assert_eq!(effect, Some(SessionEffect::Rebuild));
        assert!(session.is_live());
        assert_eq!(session.history().to_vec(), vec![a, b]);
    }

    #[test]
    fn test_snapshot_drops_malformed_segments() {
        let mut session = Session::new(WORLD);
        session.on_connected();
        let mut bad = remote("u1", 0.0);
        bad.x1 = f64::NAN;
        session.handle_message(ServerMessage::Snapshot {
            segments: vec![bad, remote("u1", 10.0)],
        });
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_segments_before_snapshot_are_ignored() {
        let mut session = Session::new(WORLD);
        session.on_connected();
        let effect = session.handle_message(ServerMessage::Segment {
            segment: remote("u1", 0.0),
        });
        assert_eq!(effect, None);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_live_segment_applies_once() {
        let mut session = live_session();
        let seg = remote("u1", 0.0);
        let effect = session.handle_message(ServerMessage::Segment { segment: seg.clone() });
        assert_eq!(effect, Some(SessionEffect::Apply(seg.clone())));
        assert_eq!(session.handle_message(ServerMessage::Segment { segment: seg }), None);
    }

    #[test]
    fn test_draw_queues_segment_with_owner() {
        let mut session = live_session();
        let seg = session
            .draw(Point::new(0.0, 0.0), Point::new(10.0, 10.0), style())
            .unwrap();
        assert_eq!(seg.owner_id, "me");
        assert_eq!(session.history().len(), 1);

        let outgoing = session.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        let msg = ClientMessage::from_json(&outgoing[0]).unwrap();
        assert_eq!(msg, ClientMessage::Segment { segment: seg });
    }

    #[test]
    fn test_draw_before_live_is_refused() {
        let mut session = Session::new(WORLD);
        session.on_connected();
        assert!(session.draw(Point::ZERO, Point::new(1.0, 1.0), style()).is_none());
    }

    #[test]
    fn test_erase_result_rebuilds() {
        let mut session = live_session();
        let seg = remote("u1", 0.0);
        session.handle_message(ServerMessage::Segment { segment: seg.clone() });

        let effect = session.handle_message(ServerMessage::EraseResult {
            removed: vec![seg.id],
        });
        assert_eq!(effect, Some(SessionEffect::Rebuild));
        assert!(session.history().is_empty());

        let none = session.handle_message(ServerMessage::EraseResult {
            removed: vec![seg.id],
        });
        assert_eq!(none, None);
    }

    #[test]
    fn test_request_erase_own() {
        let mut session = live_session();
        assert!(session.request_erase_own(Point::new(5.0, 5.0), 1.0));
        let outgoing = session.take_outgoing();
        let msg = ClientMessage::from_json(&outgoing[0]).unwrap();
        assert_eq!(
            msg,
            ClientMessage::EraseRequest(EraseRequest {
                x: 5.0,
                y: 5.0,
                radius: 1.0,
                owner_id: "me".into(),
            })
        );
        assert!(!session.request_erase_own(Point::new(5.0, 5.0), f64::NAN));
    }

    #[test]
    fn test_disconnect_drops_pending() {
        let mut session = live_session();
        session.draw(Point::ZERO, Point::new(1.0, 1.0), style());
        session.on_disconnected();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.has_outgoing());
    }

    #[test]
    fn test_rejection_resyncs_local_replica() {
        let mut session = live_session();
        let local = session
            .draw(Point::ZERO, Point::new(10.0, 10.0), style())
            .unwrap();
        session.take_outgoing();

        let effect = session.handle_message(ServerMessage::Error {
            message: "duplicate id".into(),
        });
        assert!(matches!(effect, Some(SessionEffect::Rejected { .. })));
        assert_eq!(session.state(), SessionState::Syncing);
        assert_eq!(session.take_outgoing(), vec![r#"{"type":"request-snapshot"}"#.to_string()]);

        let effect = session.handle_message(ServerMessage::Snapshot { segments: vec![] });
        assert_eq!(effect, Some(SessionEffect::Rebuild));
        assert!(session.history().get(&local.id).is_none());
    }

    #[test]
    fn test_reconnecting_keeps_replica_until_snapshot() {
        let mut session = live_session();
        let seg = remote("u1", 0.0);
        session.handle_message(ServerMessage::Segment { segment: seg.clone() });
        session.on_disconnected();

        session.reconnecting();
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.owner_id(), None);
        assert_eq!(session.history().len(), 1);

        session.on_connected();
        session.handle_message(ServerMessage::Welcome {
            board: "default".into(),
            owner_id: "me-again".into(),
        });
        let fresh = remote("u2", 50.0);
        let effect = session.handle_message(ServerMessage::Snapshot {
            segments: vec![fresh.clone()],
        });
        assert_eq!(effect, Some(SessionEffect::Rebuild));
        assert_eq!(session.owner_id(), Some("me-again"));
        assert_eq!(session.history().to_vec(), vec![fresh]);
    }

    #[test]
    fn test_handle_json_ignores_garbage() {
        let mut session = live_session();
        assert_eq!(session.handle_json("{not json"), None);
        let effect = session.handle_json(r#"{"type":"error","message":"bad segment"}"#);
        assert_eq!(
            effect,
            Some(SessionEffect::Rejected {
                message: "bad segment".into()
            })
        );
    }
}
