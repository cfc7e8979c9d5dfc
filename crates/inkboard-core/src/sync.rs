//! WebSocket transport to the authority.
//!
//! A background thread owns the socket; the client polls for events
//! between frames and never blocks on the network.

use crate::protocol::ServerMessage;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

const PREVIEW_CHARS: usize = 100;

/// Transport connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the WebSocket client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server
    Disconnected,
    /// A parsed message from the authority
    Received(ServerMessage),
    /// Error occurred
    Error { message: String },
}

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// WebSocket client for native platforms.
///
/// Uses a background thread for non-blocking operation. Sends are
/// fire-and-forget: a message lost in transit is not retried.
pub struct NativeWebSocket {
    state: ConnectionState,
    events: Vec<SyncEvent>,
    /// Channel to send commands to the WebSocket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the WebSocket thread.
    event_rx: Option<Receiver<SyncEvent>>,
    /// Handle to the WebSocket thread.
    _thread: Option<JoinHandle<()>>,
}

impl NativeWebSocket {
    /// Create a new disconnected WebSocket client.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            events: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Connect to a WebSocket server.
    pub fn connect(&mut self, url: &str) -> Result<(), String> {
        if self.cmd_tx.is_some() {
            return Err("Already connected".to_string());
        }

        let parsed_url = Url::parse(url).map_err(|e| format!("Invalid URL: {}", e))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(format!("Invalid WebSocket URL scheme: {}", parsed_url.scheme()));
        }

        self.state = ConnectionState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<SyncEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || run_socket(&url, &cmd_rx, &event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);

        Ok(())
    }

    /// Disconnect from the server.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Send a text message.
    pub fn send(&self, msg: &str) -> Result<(), String> {
        if let Some(ref tx) = self.cmd_tx {
            tx.send(WsCommand::Send(msg.to_string()))
                .map_err(|e| format!("Send failed: {}", e))
        } else {
            Err("Not connected".to_string())
        }
    }

    /// Poll for pending events (non-blocking).
    pub fn poll_events(&mut self) -> Vec<SyncEvent> {
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    SyncEvent::Connected => self.state = ConnectionState::Connected,
                    SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                    SyncEvent::Received(_) => {}
                }
                self.events.push(event);
            }
        }

        std::mem::take(&mut self.events)
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Default for NativeWebSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeWebSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// First characters of a message for logging.
fn preview(msg: &str) -> String {
    msg.chars().take(PREVIEW_CHARS).collect()
}

fn run_socket(url: &str, cmd_rx: &Receiver<WsCommand>, event_tx: &Sender<SyncEvent>) {
    log::info!("WebSocket thread: connecting to {}", url);

    let (mut socket, response) = match connect(url) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("WebSocket connection failed: {}", e);
            let _ = event_tx.send(SyncEvent::Error {
                message: format!("Connection failed: {}", e),
            });
            return;
        }
    };

    log::info!("WebSocket connected, status: {}", response.status());
    let _ = event_tx.send(SyncEvent::Connected);

    // Short read timeout so outgoing commands are not starved.
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                log::debug!("WebSocket sending: {}", preview(&msg));
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("WebSocket send error: {}", e);
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("WebSocket close requested");
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("WebSocket command channel disconnected");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match ServerMessage::from_json(&txt) {
                Ok(msg) => {
                    let _ = event_tx.send(SyncEvent::Received(msg));
                }
                Err(e) => log::warn!("Failed to parse server message: {}", e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                break;
            }
        }
    }

    log::info!("WebSocket thread exiting");
    let _ = event_tx.send(SyncEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_url() {
        let mut ws = NativeWebSocket::new();
        let err = ws.connect("http://localhost:3000/ws").unwrap_err();
        assert!(err.contains("scheme"));
        assert_eq!(ws.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_rejects_garbage_url() {
        let mut ws = NativeWebSocket::new();
        assert!(ws.connect("not a url").is_err());
    }

    #[test]
    fn test_send_without_connection() {
        let ws = NativeWebSocket::new();
        assert_eq!(ws.send("{}"), Err("Not connected".to_string()));
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        // 'é' is two bytes and straddles byte 100 here.
        let msg = format!("{}é{}", "a".repeat(99), "b".repeat(50));
        let cut = preview(&msg);
        assert_eq!(cut.chars().count(), 100);
        assert!(cut.ends_with('é'));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_poll_without_connection_is_empty() {
        let mut ws = NativeWebSocket::new();
        assert!(ws.poll_events().is_empty());
    }
}
