//! The authoritative board state.
//!
//! Each board owns one ordered [`History`] behind an async mutex. Every
//! mutation persists and broadcasts while the lock is held, so all
//! subscribers observe accepted segments in history order.

use dashmap::DashMap;
use inkboard_core::config::BoardConfig;
use inkboard_core::history::History;
use inkboard_core::protocol::{EraseRequest, ServerMessage};
use inkboard_core::segment::{OwnerId, SegmentError, SegmentId, StrokeSegment};
use inkboard_core::storage::Storage;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tracing::{error, info, warn};

/// Name of the board served at `/ws`.
pub const DEFAULT_BOARD: &str = "default";

const CHANNEL_CAPACITY: usize = 256;

/// Removals recorded in storage before the log is rewritten.
const COMPACT_AFTER_REMOVALS: usize = 256;

/// A message fanned out to a board's connections.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// The originating connection, which does not receive it back.
    pub from: Option<OwnerId>,
    pub message: ServerMessage,
}

struct BoardState {
    history: History,
    loaded: bool,
    removals_since_compact: usize,
}

/// One shared board.
pub struct Board {
    name: String,
    state: Mutex<BoardState>,
    tx: broadcast::Sender<Arc<Outbound>>,
}

impl Board {
    fn new(name: &str) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            name: name.to_string(),
            state: Mutex::new(BoardState {
                history: History::new(),
                loaded: false,
                removals_since_compact: 0,
            }),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe to accepted segments and erase results.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Outbound>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn broadcast(&self, from: Option<&OwnerId>, message: ServerMessage) {
        // No receivers is not an error: the board may be idle.
        let _ = self.tx.send(Arc::new(Outbound {
            from: from.cloned(),
            message,
        }));
    }
}

/// Shared application state: every open board plus persistence.
pub struct Authority {
    boards: DashMap<String, Arc<Board>>,
    storage: Arc<dyn Storage>,
    config: BoardConfig,
}

impl Authority {
    pub fn new(storage: Arc<dyn Storage>, config: BoardConfig) -> Self {
        Self {
            boards: DashMap::new(),
            storage,
            config,
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Get or create a board. Its history is loaded on first lock.
    pub fn board(&self, name: &str) -> Arc<Board> {
        self.boards
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Board::new(name)))
            .clone()
    }

    /// Lock a board, loading its history from storage the first time.
    ///
    /// A storage failure leaves the board empty and in-memory only.
    async fn lock<'a>(&self, board: &'a Board) -> MutexGuard<'a, BoardState> {
        let mut state = board.state.lock().await;
        if !state.loaded {
            state.loaded = true;
            match self.storage.load(&board.name).await {
                Ok(segments) => {
                    let world = self.config.world_size();
                    let total = segments.len();
                    let valid: Vec<_> = segments
                        .into_iter()
                        .filter(|segment| segment.validate(world).is_ok())
                        .collect();
                    if valid.len() != total {
                        warn!(
                            "Board {}: dropped {} invalid persisted segments",
                            board.name,
                            total - valid.len()
                        );
                    }
                    info!("Board {}: loaded {} segments", board.name, valid.len());
                    state.history = History::from_segments(valid);
                }
                Err(e) => {
                    error!(
                        "Board {}: failed to load history, continuing in memory: {}",
                        board.name, e
                    );
                }
            }
        }
        state
    }

    /// Full ordered history of a board.
    pub async fn snapshot(&self, board: &Board) -> Vec<StrokeSegment> {
        self.lock(board).await.history.to_vec()
    }

    /// Accept a segment from `owner`: stamp, append, persist, rebroadcast.
    ///
    /// The client's id is kept so the originator's replica stays
    /// addressable by later erase results. An id the board has already
    /// seen is rejected.
    pub async fn accept_segment(
        &self,
        board: &Board,
        owner: &OwnerId,
        mut segment: StrokeSegment,
    ) -> Result<StrokeSegment, SegmentError> {
        segment.validate(self.config.world_size())?;
        segment.owner_id = owner.clone();

        let mut state = self.lock(board).await;
        if state.history.contains_id(&segment.id) {
            return Err(SegmentError::DuplicateId(segment.id));
        }
        let accepted = state.history.append(segment).clone();

        if let Err(e) = self.storage.append(&board.name, &accepted).await {
            error!("Board {}: failed to persist segment {}: {}", board.name, accepted.id, e);
        }

        board.broadcast(
            Some(owner),
            ServerMessage::Segment {
                segment: accepted.clone(),
            },
        );
        Ok(accepted)
    }

    /// Remove the requested owner's segments under a circle.
    ///
    /// The result goes to every connection, the requester included, and
    /// only when something was removed.
    pub async fn erase(
        &self,
        board: &Board,
        request: &EraseRequest,
    ) -> Result<Vec<SegmentId>, SegmentError> {
        request.validate()?;

        let mut state = self.lock(board).await;
        let removed = state
            .history
            .erase_owned(request.center(), request.radius, &request.owner_id);
        if removed.is_empty() {
            return Ok(removed);
        }

        info!(
            "Board {}: erased {} segments of {}",
            board.name,
            removed.len(),
            request.owner_id
        );
        if let Err(e) = self.storage.remove(&board.name, &removed).await {
            error!("Board {}: failed to persist erase: {}", board.name, e);
        }

        state.removals_since_compact += removed.len();
        if state.removals_since_compact >= COMPACT_AFTER_REMOVALS {
            let live = state.history.to_vec();
            match self.storage.replace(&board.name, &live).await {
                Ok(()) => state.removals_since_compact = 0,
                Err(e) => warn!("Board {}: failed to compact log: {}", board.name, e),
            }
        }

        board.broadcast(
            None,
            ServerMessage::EraseResult {
                removed: removed.clone(),
            },
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_core::segment::{SerializableColor, StrokeStyle};
    use inkboard_core::storage::{BoxFuture, MemoryStorage, StorageError, StorageResult};
    use kurbo::Point;

    struct UnavailableStorage;

    impl Storage for UnavailableStorage {
        fn load(&self, _board: &str) -> BoxFuture<'_, StorageResult<Vec<StrokeSegment>>> {
            Box::pin(async { Err(StorageError::Unavailable("offline".into())) })
        }

        fn append_many(
            &self,
            _board: &str,
            _segments: &[StrokeSegment],
        ) -> BoxFuture<'_, StorageResult<()>> {
            Box::pin(async { Err(StorageError::Unavailable("offline".into())) })
        }

        fn remove(&self, _board: &str, _ids: &[SegmentId]) -> BoxFuture<'_, StorageResult<()>> {
            Box::pin(async { Err(StorageError::Unavailable("offline".into())) })
        }

        fn replace(
            &self,
            _board: &str,
            _segments: &[StrokeSegment],
        ) -> BoxFuture<'_, StorageResult<()>> {
            Box::pin(async { Err(StorageError::Unavailable("offline".into())) })
        }

        fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
            Box::pin(async { Err(StorageError::Unavailable("offline".into())) })
        }
    }

    fn segment(from: (f64, f64), to: (f64, f64)) -> StrokeSegment {
        StrokeSegment::new(
            Point::new(from.0, from.1),
            Point::new(to.0, to.1),
            StrokeStyle::paint(5.0, SerializableColor::black()),
            "client-claimed",
        )
    }

    fn memory_authority() -> (Authority, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let authority = Authority::new(storage.clone(), BoardConfig::default());
        (authority, storage)
    }

    #[tokio::test]
    async fn test_accept_stamps_and_persists() {
        let (authority, storage) = memory_authority();
        let board = authority.board(DEFAULT_BOARD);
        let owner: OwnerId = "owner-a".into();

        let sent = segment((0.0, 0.0), (10.0, 10.0));
        let accepted = authority
            .accept_segment(&board, &owner, sent.clone())
            .await
            .unwrap();

        assert_eq!(accepted.id, sent.id);
        assert_eq!(accepted.owner_id, "owner-a");
        assert_eq!(accepted.seq, 0);
        assert_eq!(authority.snapshot(&board).await, vec![accepted.clone()]);
        assert_eq!(storage.load(DEFAULT_BOARD).await.unwrap(), vec![accepted]);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let (authority, _) = memory_authority();
        let board = authority.board(DEFAULT_BOARD);
        let mut rx = board.subscribe();
        let owner: OwnerId = "owner-a".into();

        let sent = segment((0.0, 0.0), (10.0, 10.0));
        let first = authority.accept_segment(&board, &owner, sent.clone()).await.unwrap();
        let second = authority.accept_segment(&board, &owner, sent.clone()).await;

        assert!(matches!(second, Err(SegmentError::DuplicateId(id)) if id == sent.id));
        assert_eq!(authority.snapshot(&board).await, vec![first]);
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());

        let next = authority
            .accept_segment(&board, &owner, segment((1.0, 1.0), (2.0, 2.0)))
            .await
            .unwrap();
        assert_eq!(next.seq, 1);
    }

    #[tokio::test]
    async fn test_subscriber_count_tracks_receivers() {
        let (authority, _) = memory_authority();
        let board = authority.board(DEFAULT_BOARD);
        assert_eq!(board.subscriber_count(), 0);
        let rx = board.subscribe();
        assert_eq!(board.subscriber_count(), 1);
        drop(rx);
        assert_eq!(board.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_malformed_segment() {
        let (authority, _) = memory_authority();
        let board = authority.board(DEFAULT_BOARD);
        let mut bad = segment((0.0, 0.0), (10.0, 10.0));
        bad.style.width = 0.0;

        let result = authority.accept_segment(&board, &"a".to_string(), bad).await;
        assert!(matches!(result, Err(SegmentError::InvalidWidth(_))));
        assert!(authority.snapshot(&board).await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_carries_origin() {
        let (authority, _) = memory_authority();
        let board = authority.board(DEFAULT_BOARD);
        let mut rx = board.subscribe();
        let owner: OwnerId = "owner-a".into();

        let accepted = authority
            .accept_segment(&board, &owner, segment((0.0, 0.0), (10.0, 10.0)))
            .await
            .unwrap();

        let out = rx.recv().await.unwrap();
        assert_eq!(out.from.as_deref(), Some("owner-a"));
        assert_eq!(out.message, ServerMessage::Segment { segment: accepted });
    }

    #[tokio::test]
    async fn test_erase_is_owner_scoped() {
        let (authority, storage) = memory_authority();
        let board = authority.board(DEFAULT_BOARD);
        let mine = authority
            .accept_segment(&board, &"u1".to_string(), segment((0.0, 0.0), (10.0, 10.0)))
            .await
            .unwrap();
        let theirs = authority
            .accept_segment(&board, &"u2".to_string(), segment((0.0, 10.0), (10.0, 0.0)))
            .await
            .unwrap();
        let mut rx = board.subscribe();

        let request = EraseRequest {
            x: 5.0,
            y: 5.0,
            radius: 1.0,
            owner_id: "u1".into(),
        };
        let removed = authority.erase(&board, &request).await.unwrap();

        assert_eq!(removed, vec![mine.id]);
        assert_eq!(authority.snapshot(&board).await, vec![theirs.clone()]);
        assert_eq!(storage.load(DEFAULT_BOARD).await.unwrap(), vec![theirs]);

        let out = rx.recv().await.unwrap();
        assert_eq!(out.from, None);
        assert_eq!(out.message, ServerMessage::EraseResult { removed });
    }

    #[tokio::test]
    async fn test_erase_miss_is_silent() {
        let (authority, _) = memory_authority();
        let board = authority.board(DEFAULT_BOARD);
        authority
            .accept_segment(&board, &"u1".to_string(), segment((0.0, 0.0), (10.0, 10.0)))
            .await
            .unwrap();
        let mut rx = board.subscribe();

        let request = EraseRequest {
            x: 500.0,
            y: 500.0,
            radius: 1.0,
            owner_id: "u1".into(),
        };
        assert!(authority.erase(&board, &request).await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_history_loaded_from_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let mut persisted = segment((0.0, 0.0), (10.0, 10.0));
        persisted.seq = 7;
        storage.append("art", &persisted).await.unwrap();

        let authority = Authority::new(storage, BoardConfig::default());
        let board = authority.board("art");
        assert_eq!(authority.snapshot(&board).await, vec![persisted]);

        let next = authority
            .accept_segment(&board, &"u1".to_string(), segment((1.0, 1.0), (2.0, 2.0)))
            .await
            .unwrap();
        assert_eq!(next.seq, 8);
    }

    #[tokio::test]
    async fn test_unavailable_storage_degrades_to_memory() {
        let authority = Authority::new(Arc::new(UnavailableStorage), BoardConfig::default());
        let board = authority.board(DEFAULT_BOARD);

        let accepted = authority
            .accept_segment(&board, &"u1".to_string(), segment((0.0, 0.0), (10.0, 10.0)))
            .await
            .unwrap();
        assert_eq!(authority.snapshot(&board).await, vec![accepted]);
    }

    #[tokio::test]
    async fn test_boards_are_isolated() {
        let (authority, _) = memory_authority();
        let one = authority.board("one");
        let two = authority.board("two");
        authority
            .accept_segment(&one, &"u1".to_string(), segment((0.0, 0.0), (10.0, 10.0)))
            .await
            .unwrap();

        assert_eq!(authority.snapshot(&one).await.len(), 1);
        assert!(authority.snapshot(&two).await.is_empty());
        assert!(Arc::ptr_eq(&one, &authority.board("one")));
    }
}
