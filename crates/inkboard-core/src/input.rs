//! Pointer input and the gesture state machine.
//!
//! One active pointer draws, two or more pan and pinch-zoom. A change in
//! pointer count always ends the stroke in progress.

use crate::camera::Viewport;
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Identifies one mouse or touch contact.
pub type PointerId = u64;

/// Which button started a pointer contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PointerButton {
    /// Left mouse button, pen, or a finger.
    #[default]
    Primary,
    /// Middle mouse button or a modifier-held drag: pans instead of drawing.
    Auxiliary,
}

/// Pointer event type for unified mouse/touch handling. Positions are in
/// screen coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PointerEvent {
    Down {
        id: PointerId,
        position: Point,
        button: PointerButton,
    },
    Move {
        id: PointerId,
        position: Point,
    },
    Up {
        id: PointerId,
        position: Point,
    },
    /// The contact was lost (touch cancel, pointer left the surface).
    Cancel { id: PointerId },
    Wheel { position: Point, delta: Vec2 },
}

/// What the client should do in response to input.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureAction {
    /// Draw a segment between two world points.
    Segment { from: Point, to: Point },
    /// The in-progress pen motion finished.
    StrokeEnded,
    /// The camera moved; the screen needs presenting.
    ViewChanged,
}

/// Current gesture.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Drawing {
        pointer: PointerId,
        /// Last emitted endpoint in world coordinates.
        last_world: Point,
    },
    Panning {
        /// Previous screen position of the first tracked pointer.
        previous: Point,
        /// Previous distance between the first two pointers, if two are down.
        previous_distance: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy)]
struct ActivePointer {
    id: PointerId,
    position: Point,
    button: PointerButton,
}

/// Turns raw pointer events into drawing and camera actions.
#[derive(Debug, Clone)]
pub struct GestureMachine {
    state: GestureState,
    /// Active pointers in press order.
    pointers: Vec<ActivePointer>,
    wheel_step: f64,
}

impl GestureMachine {
    pub fn new(wheel_step: f64) -> Self {
        Self {
            state: GestureState::Idle,
            pointers: Vec::new(),
            wheel_step,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, GestureState::Drawing { .. })
    }

    /// Number of pointers currently down.
    pub fn active_pointers(&self) -> usize {
        self.pointers.len()
    }

    /// Process one event, mutating the camera as needed.
    pub fn handle(&mut self, event: PointerEvent, viewport: &mut Viewport) -> Vec<GestureAction> {
        match event {
            PointerEvent::Down { id, position, button } => self.on_down(id, position, button, viewport),
            PointerEvent::Move { id, position } => self.on_move(id, position, viewport),
            PointerEvent::Up { id, position } => {
                self.update_position(id, position);
                self.on_release(id)
            }
            PointerEvent::Cancel { id } => self.on_release(id),
            PointerEvent::Wheel { delta, .. } => {
                viewport.wheel(delta.y, self.wheel_step);
                vec![GestureAction::ViewChanged]
            }
        }
    }

    /// End the stroke in progress, e.g. on tool change. Pointers still down
    /// stay idle until released.
    pub fn end_stroke(&mut self) -> Option<GestureAction> {
        if self.is_drawing() {
            self.state = GestureState::Idle;
            Some(GestureAction::StrokeEnded)
        } else {
            None
        }
    }

    fn on_down(
        &mut self,
        id: PointerId,
        position: Point,
        button: PointerButton,
        viewport: &Viewport,
    ) -> Vec<GestureAction> {
        self.pointers.retain(|p| p.id != id);
        self.pointers.push(ActivePointer { id, position, button });

        let mut actions = Vec::new();
        if self.pointers.len() == 1 && button == PointerButton::Primary {
            self.state = GestureState::Drawing {
                pointer: id,
                last_world: viewport.screen_to_world(position),
            };
        } else {
            actions.extend(self.end_stroke());
            self.state = self.panning_baseline();
        }
        actions
    }

    fn on_move(&mut self, id: PointerId, position: Point, viewport: &mut Viewport) -> Vec<GestureAction> {
        if !self.update_position(id, position) {
            return Vec::new();
        }

        match self.state {
            GestureState::Idle => Vec::new(),
            GestureState::Drawing { pointer, last_world } => {
                if pointer != id {
                    return Vec::new();
                }
                let world = viewport.screen_to_world(position);
                if world == last_world {
                    return Vec::new();
                }
                self.state = GestureState::Drawing {
                    pointer,
                    last_world: world,
                };
                vec![GestureAction::Segment {
                    from: last_world,
                    to: world,
                }]
            }
            GestureState::Panning {
                previous,
                previous_distance,
            } => {
                let tracked = self.pointers.iter().take(2).any(|p| p.id == id);
                if !tracked {
                    return Vec::new();
                }
                let GestureState::Panning {
                    previous: current,
                    previous_distance: current_distance,
                } = self.panning_baseline()
                else {
                    return Vec::new();
                };

                let scale_change = match (previous_distance, current_distance) {
                    (Some(prev), Some(now)) if prev > 0.0 && now > 0.0 => now / prev,
                    _ => 1.0,
                };
                viewport.pan_and_zoom(current - previous, scale_change, viewport.center());
                self.state = GestureState::Panning {
                    previous: current,
                    previous_distance: current_distance,
                };
                vec![GestureAction::ViewChanged]
            }
        }
    }

    fn on_release(&mut self, id: PointerId) -> Vec<GestureAction> {
        let before = self.pointers.len();
        self.pointers.retain(|p| p.id != id);
        if self.pointers.len() == before {
            return Vec::new();
        }

        match self.state {
            GestureState::Drawing { .. } => {
                self.state = GestureState::Idle;
                vec![GestureAction::StrokeEnded]
            }
            GestureState::Panning { .. } => {
                let single_aux = self.pointers.len() == 1
                    && self.pointers[0].button == PointerButton::Auxiliary;
                if self.pointers.len() >= 2 || single_aux {
                    self.state = self.panning_baseline();
                } else {
                    self.state = GestureState::Idle;
                }
                Vec::new()
            }
            GestureState::Idle => Vec::new(),
        }
    }

    /// Returns false for pointers that are not down (e.g. mouse hover).
    fn update_position(&mut self, id: PointerId, position: Point) -> bool {
        match self.pointers.iter_mut().find(|p| p.id == id) {
            Some(pointer) => {
                pointer.position = position;
                true
            }
            None => false,
        }
    }

    fn panning_baseline(&self) -> GestureState {
        match self.pointers.as_slice() {
            [] => GestureState::Idle,
            [only] => GestureState::Panning {
                previous: only.position,
                previous_distance: None,
            },
            [first, second, ..] => GestureState::Panning {
                previous: first.position,
                previous_distance: Some(first.position.distance(second.position)),
            },
        }
    }
}

impl Default for GestureMachine {
    fn default() -> Self {
        Self::new(crate::config::BoardConfig::default().wheel_zoom_step)
    }
}
