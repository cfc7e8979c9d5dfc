//! Inkboard Core Library
//!
//! Platform-agnostic data structures and logic for the Inkboard shared
//! whiteboard: the viewport engine, the stroke log, and both ends of the
//! stroke sync protocol.

pub mod camera;
pub mod config;
pub mod history;
pub mod input;
pub mod protocol;
pub mod segment;
pub mod session;
pub mod storage;
pub mod sync;
pub mod tools;

pub use camera::{ViewState, Viewport};
pub use config::{BoardConfig, ConfigError};
pub use history::History;
pub use input::{GestureAction, GestureMachine, GestureState, PointerButton, PointerEvent, PointerId};
pub use protocol::{ClientMessage, EraseRequest, ServerMessage};
pub use segment::{
    OwnerId, SegmentError, SegmentId, SerializableColor, StrokeMode, StrokeSegment, StrokeStyle,
};
pub use session::{Session, SessionEffect, SessionState};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError, StorageResult};
pub use sync::{ConnectionState, NativeWebSocket, SyncEvent};
pub use tools::{ToolKind, ToolSettings};
