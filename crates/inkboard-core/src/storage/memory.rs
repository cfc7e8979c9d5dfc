//! In-memory storage implementation.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::segment::{SegmentId, StrokeSegment};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for testing and `--memory` servers.
#[derive(Default)]
pub struct MemoryStorage {
    boards: RwLock<HashMap<String, Vec<StrokeSegment>>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl Storage for MemoryStorage {
    fn load(&self, board: &str) -> BoxFuture<'_, StorageResult<Vec<StrokeSegment>>> {
        let board = board.to_string();
        Box::pin(async move {
            let boards = self.boards.read().map_err(lock_error)?;
            Ok(boards.get(&board).cloned().unwrap_or_default())
        })
    }

    fn append_many(
        &self,
        board: &str,
        segments: &[StrokeSegment],
    ) -> BoxFuture<'_, StorageResult<()>> {
        let board = board.to_string();
        let segments = segments.to_vec();
        Box::pin(async move {
            let mut boards = self.boards.write().map_err(lock_error)?;
            boards.entry(board).or_default().extend(segments);
            Ok(())
        })
    }

    fn remove(&self, board: &str, ids: &[SegmentId]) -> BoxFuture<'_, StorageResult<()>> {
        let board = board.to_string();
        let ids = ids.to_vec();
        Box::pin(async move {
            let mut boards = self.boards.write().map_err(lock_error)?;
            if let Some(segments) = boards.get_mut(&board) {
                segments.retain(|s| !ids.contains(&s.id));
            }
            Ok(())
        })
    }

    fn replace(&self, board: &str, segments: &[StrokeSegment]) -> BoxFuture<'_, StorageResult<()>> {
        let board = board.to_string();
        let segments = segments.to_vec();
        Box::pin(async move {
            let mut boards = self.boards.write().map_err(lock_error)?;
            boards.insert(board, segments);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let boards = self.boards.read().map_err(lock_error)?;
            Ok(boards.keys().cloned().collect())
        })
    }
}
