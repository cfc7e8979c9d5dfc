//! Headless Inkboard client.
//!
//! Connects to an authority, syncs a board, optionally draws one line, and
//! writes the result as PNG.

use clap::Parser;
use inkboard_app::Whiteboard;
use inkboard_core::config::{BoardConfig, ConfigError};
use inkboard_core::input::{PointerButton, PointerEvent};
use inkboard_core::session::SessionState;
use inkboard_core::sync::{ConnectionState, NativeWebSocket};
use inkboard_render::RendererError;
use kurbo::{Point, Size};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid board configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("connection closed before the board was synced")]
    Closed,
    #[error("timed out waiting for the board snapshot")]
    Timeout,
    #[error("render failed: {0}")]
    Render(#[from] RendererError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Parser, Debug)]
#[command(name = "inkboard", about = "Headless Inkboard client")]
struct Cli {
    /// Authority WebSocket endpoint.
    #[arg(long, env = "INKBOARD_URL", default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    /// Board name; joins `<url>/<board>` instead of the default board.
    #[arg(long)]
    board: Option<String>,

    /// Optional board configuration JSON.
    #[arg(long, env = "INKBOARD_BOARD_CONFIG")]
    board_config: Option<PathBuf>,

    /// Where to write the PNG.
    #[arg(long, default_value = "board.png")]
    out: PathBuf,

    /// Write the camera view instead of the whole board.
    #[arg(long)]
    view: bool,

    /// Draw a line `x0,y0,x1,y1` in world coordinates once synced.
    #[arg(long, value_parser = parse_line)]
    draw: Option<[f64; 4]>,

    #[arg(long, default_value_t = 1280.0)]
    width: f64,

    #[arg(long, default_value_t = 800.0)]
    height: f64,

    /// Seconds to wait for the snapshot.
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// How many times to dial again if the connection drops before sync.
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

fn parse_line(s: &str) -> Result<[f64; 4], String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number: {e}"))?;
    match values.as_slice() {
        [x0, y0, x1, y1] => Ok([*x0, *y0, *x1, *y1]),
        _ => Err("expected four comma-separated numbers".to_string()),
    }
}

fn board_url(cli: &Cli) -> String {
    match &cli.board {
        Some(board) => format!("{}/{}", cli.url.trim_end_matches('/'), board),
        None => cli.url.clone(),
    }
}

/// Pump the transport until the session is live.
fn wait_live(
    board: &mut Whiteboard,
    socket: &mut NativeWebSocket,
    timeout: Duration,
) -> Result<(), CliError> {
    let deadline = Instant::now() + timeout;
    loop {
        board.pump(socket);
        if board.is_live() {
            return Ok(());
        }
        let closed = socket.state() == ConnectionState::Disconnected
            && board.session().state() == SessionState::Disconnected;
        if socket.state() == ConnectionState::Error || closed {
            return Err(CliError::Closed);
        }
        if Instant::now() >= deadline {
            return Err(CliError::Timeout);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Connect and sync, dialing again when the connection drops first.
fn connect_live(
    board: &mut Whiteboard,
    socket: &mut NativeWebSocket,
    url: &str,
    timeout: Duration,
    retries: u32,
) -> Result<(), CliError> {
    let mut attempt = 0;
    loop {
        socket.connect(url).map_err(CliError::Connect)?;
        match wait_live(board, socket, timeout) {
            Err(CliError::Closed) if attempt < retries => {
                attempt += 1;
                log::warn!("Connection lost before sync, retrying ({}/{})", attempt, retries);
                socket.disconnect();
                board.on_reconnecting();
                thread::sleep(RETRY_DELAY);
            }
            result => return result,
        }
    }
}

/// Draw a world-space line through the same pointer path a user would.
fn draw_line(board: &mut Whiteboard, line: [f64; 4]) {
    let [x0, y0, x1, y1] = line;
    let from = board.viewport().world_to_screen(Point::new(x0, y0));
    let to = board.viewport().world_to_screen(Point::new(x1, y1));
    board.handle_pointer(PointerEvent::Down {
        id: 0,
        position: from,
        button: PointerButton::Primary,
    });
    board.handle_pointer(PointerEvent::Move { id: 0, position: to });
    board.handle_pointer(PointerEvent::Up { id: 0, position: to });
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = BoardConfig::load_or_default(cli.board_config.as_deref())?;
    let mut board = Whiteboard::new(&config, Size::new(cli.width, cli.height))?;

    let url = board_url(&cli);
    let mut socket = NativeWebSocket::new();
    log::info!("Connecting to {}", url);
    connect_live(
        &mut board,
        &mut socket,
        &url,
        Duration::from_secs(cli.timeout),
        cli.retries,
    )?;
    log::info!("Synced {} segments", board.session().history().len());

    if let Some(line) = cli.draw {
        draw_line(&mut board, line);
        board.pump(&mut socket);
        // Give the transport thread a moment to flush.
        thread::sleep(Duration::from_millis(200));
    }

    let png = if cli.view {
        board.render().encode_png().map_err(|e| RendererError::Encode(e.to_string()))?
    } else {
        board.export_png()?
    };
    std::fs::write(&cli.out, png).map_err(|source| CliError::Write {
        path: cli.out.clone(),
        source,
    })?;
    log::info!("Wrote {}", cli.out.display());

    socket.disconnect();
    Ok(())
}

fn main() {
    env_logger::init();
    log::info!("Starting Inkboard client");

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
