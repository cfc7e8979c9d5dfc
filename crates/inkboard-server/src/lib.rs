//! Inkboard authority server.
//!
//! Serves boards over WebSocket. Each board keeps the ordered stroke history,
//! persists accepted segments, and rebroadcasts them to the other
//! participants.
//!
//! ## Endpoints
//!
//! - `GET /` banner text
//! - `GET /health` returns `ok`
//! - `GET /ws` joins the `default` board
//! - `GET /ws/{board}` joins a named board

pub mod authority;
pub mod connection;
mod error;

pub use authority::{Authority, Board, DEFAULT_BOARD, Outbound};
pub use error::ServerError;

use axum::{
    Router,
    extract::{Path, State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const MAX_BOARD_NAME_LEN: usize = 64;

/// Build the HTTP router around a shared authority.
pub fn router(authority: Arc<Authority>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ws", get(ws_default))
        .route("/ws/{board}", get(ws_board))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(authority)
}

/// Board names are path segments and file stems: keep them plain.
pub fn is_valid_board_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_BOARD_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Index page
async fn index() -> &'static str {
    "Inkboard Server - Connect via WebSocket at /ws or /ws/{board}"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

async fn ws_default(ws: WebSocketUpgrade, State(authority): State<Arc<Authority>>) -> Response {
    upgrade(ws, authority, DEFAULT_BOARD.to_string())
}

async fn ws_board(
    ws: WebSocketUpgrade,
    Path(board): Path<String>,
    State(authority): State<Arc<Authority>>,
) -> Response {
    if !is_valid_board_name(&board) {
        return (StatusCode::BAD_REQUEST, "Invalid board name").into_response();
    }
    upgrade(ws, authority, board)
}

fn upgrade(ws: WebSocketUpgrade, authority: Arc<Authority>, board: String) -> Response {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, authority, board))
}
