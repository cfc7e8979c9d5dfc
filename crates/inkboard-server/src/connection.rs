//! Per-connection protocol handling.

use crate::authority::{Authority, Board, Outbound};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use inkboard_core::protocol::{ClientMessage, ServerMessage};
use inkboard_core::segment::OwnerId;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Sender = SplitSink<WebSocket, Message>;

/// Serialize and send one message. Returns false once the socket is gone.
async fn send(sender: &mut Sender, msg: &ServerMessage) -> bool {
    match msg.to_json() {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode server message: {}", e);
            true
        }
    }
}

async fn send_snapshot(sender: &mut Sender, authority: &Authority, board: &Board) -> bool {
    let segments = authority.snapshot(board).await;
    debug!("Board {}: sending snapshot of {} segments", board.name(), segments.len());
    send(sender, &ServerMessage::Snapshot { segments }).await
}

/// Drive one WebSocket connection on `board_name` until it closes.
pub async fn handle_socket(socket: WebSocket, authority: Arc<Authority>, board_name: String) {
    let owner_id: OwnerId = Uuid::new_v4().to_string();
    let board = authority.board(&board_name);

    // Subscribe before any snapshot so no accepted segment falls in between.
    let mut board_rx = board.subscribe();
    info!(
        "New connection {} on board {} ({} connected)",
        owner_id,
        board_name,
        board.subscriber_count()
    );
    let (mut sender, mut receiver) = socket.split();

    let welcome = ServerMessage::Welcome {
        board: board_name.clone(),
        owner_id: owner_id.clone(),
    };
    if !send(&mut sender, &welcome).await {
        return;
    }

    // Broadcasts are only forwarded once the client has its snapshot.
    let mut synced = false;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match ClientMessage::from_json(text.as_str()) {
                            Ok(ClientMessage::RequestSnapshot) => {
                                synced = true;
                                if !send_snapshot(&mut sender, &authority, &board).await {
                                    break;
                                }
                                None
                            }
                            Ok(ClientMessage::Segment { segment }) => {
                                match authority.accept_segment(&board, &owner_id, segment).await {
                                    Ok(_) => None,
                                    Err(e) => {
                                        warn!("Rejected segment from {}: {}", owner_id, e);
                                        Some(format!("Rejected segment: {}", e))
                                    }
                                }
                            }
                            Ok(ClientMessage::EraseRequest(request)) => {
                                match authority.erase(&board, &request).await {
                                    Ok(_) => None,
                                    Err(e) => {
                                        warn!("Rejected erase from {}: {}", owner_id, e);
                                        Some(format!("Rejected erase: {}", e))
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", owner_id, e);
                                Some(format!("Invalid message: {}", e))
                            }
                        };

                        if let Some(message) = reply {
                            if !send(&mut sender, &ServerMessage::Error { message }).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Binary, ping and pong carry nothing
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", owner_id, e);
                        break;
                    }
                }
            }

            msg = board_rx.recv() => {
                match msg {
                    Ok(outbound) => {
                        if !synced || is_own(&outbound, &owner_id) {
                            continue;
                        }
                        if !send(&mut sender, &outbound.message).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Connection {} lagged by {} messages, resyncing", owner_id, skipped);
                        if synced && !send_snapshot(&mut sender, &authority, &board).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    drop(board_rx);
    info!(
        "Connection closed: {} ({} left on board {})",
        owner_id,
        board.subscriber_count(),
        board_name
    );
}

fn is_own(outbound: &Outbound, owner_id: &OwnerId) -> bool {
    outbound.from.as_ref() == Some(owner_id)
}
