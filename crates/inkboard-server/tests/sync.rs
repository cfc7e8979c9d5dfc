use futures_util::{SinkExt, StreamExt};
use inkboard_app::Whiteboard;
use inkboard_core::config::BoardConfig;
use inkboard_core::protocol::{ClientMessage, EraseRequest, ServerMessage};
use inkboard_core::segment::{SerializableColor, StrokeSegment, StrokeStyle};
use inkboard_core::storage::{FileStorage, MemoryStorage, Storage};
use inkboard_server::{Authority, router};
use kurbo::{Point, Size};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server(storage: Arc<dyn Storage>) -> SocketAddr {
    let authority = Arc::new(Authority::new(storage, BoardConfig::default()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(authority)).await.unwrap();
    });
    addr
}

async fn send(ws: &mut WsStream, msg: &ClientMessage) {
    ws.send(Message::text(msg.to_json().unwrap())).await.unwrap();
}

async fn recv(ws: &mut WsStream) -> ServerMessage {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for server message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return ServerMessage::from_json(text.as_str()).unwrap();
        }
    }
}

/// Expect no text message within a short window.
async fn assert_quiet(ws: &mut WsStream) {
    if let Ok(Some(Ok(Message::Text(text)))) =
        timeout(Duration::from_millis(200), ws.next()).await
    {
        panic!("unexpected message: {}", text.as_str());
    }
}

/// Connect, read the welcome, sync, and return the owner id and snapshot.
async fn join(addr: SocketAddr, path: &str) -> (WsStream, String, Vec<StrokeSegment>) {
    let (mut ws, _) = connect_async(format!("ws://{}{}", addr, path)).await.unwrap();
    let owner_id = match recv(&mut ws).await {
        ServerMessage::Welcome { owner_id, .. } => owner_id,
        other => panic!("expected welcome, got {:?}", other),
    };
    send(&mut ws, &ClientMessage::RequestSnapshot).await;
    let segments = match recv(&mut ws).await {
        ServerMessage::Snapshot { segments } => segments,
        other => panic!("expected snapshot, got {:?}", other),
    };
    (ws, owner_id, segments)
}

/// Join with a full client replica and raster, synced and live.
async fn join_whiteboard(addr: SocketAddr, path: &str) -> (WsStream, Whiteboard) {
    let (mut ws, _) = connect_async(format!("ws://{}{}", addr, path)).await.unwrap();
    let mut board = Whiteboard::new(&BoardConfig::default(), Size::new(1250.0, 1000.0)).unwrap();
    board.on_connected();
    board.handle_server_message(recv(&mut ws).await);
    flush(&mut ws, &mut board).await;
    board.handle_server_message(recv(&mut ws).await);
    assert!(board.is_live());
    (ws, board)
}

async fn flush(ws: &mut WsStream, board: &mut Whiteboard) {
    for msg in board.take_outgoing() {
        ws.send(Message::text(msg)).await.unwrap();
    }
}

fn eraser(owner: &str, from: (f64, f64), to: (f64, f64)) -> StrokeSegment {
    StrokeSegment::new(
        Point::new(from.0, from.1),
        Point::new(to.0, to.1),
        StrokeStyle::erase(20.0),
        owner,
    )
}

fn pen(owner: &str, from: (f64, f64), to: (f64, f64)) -> StrokeSegment {
    StrokeSegment::new(
        Point::new(from.0, from.1),
        Point::new(to.0, to.1),
        StrokeStyle::paint(5.0, SerializableColor::black()),
        owner,
    )
}

#[tokio::test]
async fn test_segment_reaches_others_and_late_joiners() {
    let addr = spawn_server(Arc::new(MemoryStorage::new())).await;

    let (mut a, owner_a, snapshot) = join(addr, "/ws").await;
    assert!(snapshot.is_empty());
    let (mut b, _, _) = join(addr, "/ws").await;

    let segment = pen(&owner_a, (0.0, 0.0), (10.0, 10.0));
    send(&mut a, &ClientMessage::Segment { segment: segment.clone() }).await;

    let received = match recv(&mut b).await {
        ServerMessage::Segment { segment } => segment,
        other => panic!("expected segment, got {:?}", other),
    };
    assert_eq!(received.id, segment.id);
    assert_eq!(received.owner_id, owner_a);
    assert_eq!(received.seq, 0);
    assert_eq!((received.x1, received.y1), (10.0, 10.0));

    // The originator is not echoed.
    assert_quiet(&mut a).await;

    let (_c, _, snapshot) = join(addr, "/ws").await;
    assert_eq!(snapshot, vec![received]);
}

#[tokio::test]
async fn test_erase_removes_only_owned_segments() {
    let addr = spawn_server(Arc::new(MemoryStorage::new())).await;
    let (mut a, owner_a, _) = join(addr, "/ws").await;
    let (mut b, owner_b, _) = join(addr, "/ws").await;

    let mine = pen(&owner_a, (0.0, 0.0), (10.0, 10.0));
    send(&mut a, &ClientMessage::Segment { segment: mine.clone() }).await;
    recv(&mut b).await;

    let theirs = pen(&owner_b, (100.0, 100.0), (110.0, 110.0));
    send(&mut b, &ClientMessage::Segment { segment: theirs.clone() }).await;
    recv(&mut a).await;

    // Any participant may name the owner whose strokes go.
    let request = EraseRequest {
        x: 5.0,
        y: 5.0,
        radius: 1.0,
        owner_id: owner_a.clone(),
    };
    send(&mut b, &ClientMessage::EraseRequest(request)).await;

    let expected = ServerMessage::EraseResult {
        removed: vec![mine.id],
    };
    assert_eq!(recv(&mut a).await, expected);
    assert_eq!(recv(&mut b).await, expected);

    // Nothing of owner b's lies under the same point.
    let request = EraseRequest {
        x: 5.0,
        y: 5.0,
        radius: 1.0,
        owner_id: owner_b.clone(),
    };
    send(&mut b, &ClientMessage::EraseRequest(request)).await;
    assert_quiet(&mut a).await;
    assert_quiet(&mut b).await;

    let (_c, _, snapshot) = join(addr, "/ws").await;
    let ids: Vec<_> = snapshot.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![theirs.id]);
}

#[tokio::test]
async fn test_erase_miss_broadcasts_nothing() {
    let addr = spawn_server(Arc::new(MemoryStorage::new())).await;
    let (mut a, owner_a, _) = join(addr, "/ws").await;

    let request = EraseRequest {
        x: 5.0,
        y: 5.0,
        radius: 1.0,
        owner_id: owner_a,
    };
    send(&mut a, &ClientMessage::EraseRequest(request)).await;
    assert_quiet(&mut a).await;
}

#[tokio::test]
async fn test_malformed_input_keeps_connection() {
    let addr = spawn_server(Arc::new(MemoryStorage::new())).await;
    let (mut a, owner_a, _) = join(addr, "/ws").await;
    let (mut b, _, _) = join(addr, "/ws").await;

    a.send(Message::text("{\"type\":\"nonsense\"}")).await.unwrap();
    assert!(matches!(recv(&mut a).await, ServerMessage::Error { .. }));

    let mut bad = pen(&owner_a, (0.0, 0.0), (10.0, 10.0));
    bad.x0 = f64::MAX;
    send(&mut a, &ClientMessage::Segment { segment: bad }).await;
    assert!(matches!(recv(&mut a).await, ServerMessage::Error { .. }));
    assert_quiet(&mut b).await;

    // Still live afterwards.
    let good = pen(&owner_a, (1.0, 1.0), (2.0, 2.0));
    send(&mut a, &ClientMessage::Segment { segment: good.clone() }).await;
    match recv(&mut b).await {
        ServerMessage::Segment { segment } => assert_eq!(segment.id, good.id),
        other => panic!("expected segment, got {:?}", other),
    }
}

#[tokio::test]
async fn test_named_boards_are_isolated() {
    let addr = spawn_server(Arc::new(MemoryStorage::new())).await;
    let (mut a, owner_a, _) = join(addr, "/ws/left").await;
    let (mut b, _, _) = join(addr, "/ws/right").await;

    send(
        &mut a,
        &ClientMessage::Segment {
            segment: pen(&owner_a, (0.0, 0.0), (10.0, 10.0)),
        },
    )
    .await;
    assert_quiet(&mut b).await;

    let (_c, _, left) = join(addr, "/ws/left").await;
    assert_eq!(left.len(), 1);
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let accepted = {
        let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()).unwrap());
        let addr = spawn_server(storage).await;
        let (mut a, owner_a, _) = join(addr, "/ws").await;
        let segment = pen(&owner_a, (0.0, 0.0), (10.0, 10.0));
        send(&mut a, &ClientMessage::Segment { segment: segment.clone() }).await;

        // A snapshot round trip orders after the accepted segment.
        send(&mut a, &ClientMessage::RequestSnapshot).await;
        match recv(&mut a).await {
            ServerMessage::Snapshot { segments } => segments,
            other => panic!("expected snapshot, got {:?}", other),
        }
    };
    assert_eq!(accepted.len(), 1);

    let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()).unwrap());
    let addr = spawn_server(storage).await;
    let (_a, _, snapshot) = join(addr, "/ws").await;
    assert_eq!(snapshot, accepted);
}

#[tokio::test]
async fn test_broadcast_order_matches_history() {
    let addr = spawn_server(Arc::new(MemoryStorage::new())).await;
    let (mut a, owner_a, _) = join(addr, "/ws").await;
    let (mut b, owner_b, _) = join(addr, "/ws").await;
    let (mut c, _, _) = join(addr, "/ws").await;

    for i in 0..4 {
        let y = f64::from(i) * 20.0;
        let from_a = pen(&owner_a, (0.0, y), (50.0, y));
        send(&mut a, &ClientMessage::Segment { segment: from_a }).await;
        let from_b = pen(&owner_b, (100.0, y), (150.0, y));
        send(&mut b, &ClientMessage::Segment { segment: from_b }).await;
    }

    let mut received = Vec::new();
    for _ in 0..8 {
        match recv(&mut c).await {
            ServerMessage::Segment { segment } => received.push(segment),
            other => panic!("expected segment, got {:?}", other),
        }
    }
    let seqs: Vec<u64> = received.iter().map(|s| s.seq).collect();
    assert_eq!(seqs, (0..8).collect::<Vec<u64>>());

    send(&mut c, &ClientMessage::RequestSnapshot).await;
    match recv(&mut c).await {
        ServerMessage::Snapshot { segments } => assert_eq!(segments, received),
        other => panic!("expected snapshot, got {:?}", other),
    }

    // A sees only B's segments, in the same relative order.
    let mut at_a = Vec::new();
    for _ in 0..4 {
        match recv(&mut a).await {
            ServerMessage::Segment { segment } => at_a.push(segment),
            other => panic!("expected segment, got {:?}", other),
        }
    }
    let from_b: Vec<_> = received
        .iter()
        .filter(|s| s.owner_id == owner_b)
        .cloned()
        .collect();
    assert_eq!(at_a, from_b);
}

#[tokio::test]
async fn test_live_raster_matches_late_joiner() {
    let addr = spawn_server(Arc::new(MemoryStorage::new())).await;
    let (mut a, owner_a, _) = join(addr, "/ws").await;
    let (mut b_ws, mut b) = join_whiteboard(addr, "/ws").await;

    let early = [
        pen(&owner_a, (100.0, 100.0), (300.0, 100.0)),
        pen(&owner_a, (400.0, 400.0), (600.0, 600.0)),
        eraser(&owner_a, (150.0, 80.0), (150.0, 120.0)),
    ];
    for segment in &early {
        send(&mut a, &ClientMessage::Segment { segment: segment.clone() }).await;
    }
    for _ in 0..early.len() {
        b.handle_server_message(recv(&mut b_ws).await);
    }

    // Removes only the first stroke; B rebuilds.
    let request = EraseRequest {
        x: 250.0,
        y: 100.0,
        radius: 1.0,
        owner_id: owner_a.clone(),
    };
    send(&mut a, &ClientMessage::EraseRequest(request)).await;
    let result = recv(&mut b_ws).await;
    assert_eq!(
        result,
        ServerMessage::EraseResult {
            removed: vec![early[0].id]
        }
    );
    b.handle_server_message(result);

    // Applied incrementally on top of the rebuilt raster.
    let late = [
        pen(&owner_a, (200.0, 300.0), (800.0, 300.0)),
        eraser(&owner_a, (500.0, 250.0), (500.0, 350.0)),
    ];
    for segment in &late {
        send(&mut a, &ClientMessage::Segment { segment: segment.clone() }).await;
    }
    for _ in 0..late.len() {
        b.handle_server_message(recv(&mut b_ws).await);
    }

    let (_c_ws, c) = join_whiteboard(addr, "/ws").await;
    assert_eq!(b.session().history().to_vec(), c.session().history().to_vec());
    assert_eq!(c.session().history().len(), 4);
    assert!(b.compositor().surface().data() == c.compositor().surface().data());

    let alpha = |x, y| c.compositor().pixel(x, y).unwrap()[3];
    assert_eq!(alpha(250, 100), 0);
    assert_eq!(alpha(500, 500), 255);
    assert_eq!(alpha(300, 300), 255);
    assert_eq!(alpha(500, 300), 0);
}
