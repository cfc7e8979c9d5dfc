//! Durable storage for board stroke logs.
//!
//! Only the authority talks to storage. Every backend must tolerate being
//! unavailable: callers log failures and carry on from memory.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::segment::{SegmentId, StrokeSegment};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for stroke log backends.
///
/// Boards are addressed by name. A board that was never written loads as
/// an empty log.
pub trait Storage: Send + Sync {
    /// Load a board's live segments in history order.
    fn load(&self, board: &str) -> BoxFuture<'_, StorageResult<Vec<StrokeSegment>>>;

    /// Append one accepted segment.
    fn append(&self, board: &str, segment: &StrokeSegment) -> BoxFuture<'_, StorageResult<()>> {
        self.append_many(board, std::slice::from_ref(segment))
    }

    /// Append several accepted segments, in order.
    fn append_many(
        &self,
        board: &str,
        segments: &[StrokeSegment],
    ) -> BoxFuture<'_, StorageResult<()>>;

    /// Record the removal of segments by id.
    fn remove(&self, board: &str, ids: &[SegmentId]) -> BoxFuture<'_, StorageResult<()>>;

    /// Replace a board's whole log with `segments`.
    fn replace(&self, board: &str, segments: &[StrokeSegment]) -> BoxFuture<'_, StorageResult<()>>;

    /// List all stored board names.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;
}

/// Minimal executor for the synchronous backends in tests.
#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
