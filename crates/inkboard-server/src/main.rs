//! Inkboard authority server binary.

use clap::Parser;
use inkboard_core::config::BoardConfig;
use inkboard_core::storage::{FileStorage, MemoryStorage, Storage};
use inkboard_server::{Authority, ServerError, router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "inkboard-server", about = "Authoritative stroke sync server for Inkboard")]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Directory holding one stroke log per board.
    #[arg(long, env = "INKBOARD_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Optional board configuration JSON.
    #[arg(long, env = "INKBOARD_BOARD_CONFIG")]
    board_config: Option<PathBuf>,

    /// Keep history in memory only.
    #[arg(long)]
    memory: bool,
}

fn open_storage(args: &Args) -> Arc<dyn Storage> {
    if args.memory {
        info!("Using in-memory storage");
        return Arc::new(MemoryStorage::new());
    }
    match FileStorage::new(args.data_dir.clone()) {
        Ok(storage) => {
            info!("Persisting boards to {}", args.data_dir.display());
            Arc::new(storage)
        }
        Err(e) => {
            warn!("File storage unavailable ({}), falling back to memory", e);
            Arc::new(MemoryStorage::new())
        }
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    let config = BoardConfig::load_or_default(args.board_config.as_deref())?;
    let storage = open_storage(&args);
    match storage.list().await {
        Ok(boards) if !boards.is_empty() => {
            info!("Found {} stored boards: {}", boards.len(), boards.join(", "))
        }
        Ok(_) => info!("No stored boards yet"),
        Err(e) => warn!("Could not list stored boards: {}", e),
    }
    let authority = Arc::new(Authority::new(storage, config));
    let app = router(authority);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!("Inkboard server listening on {}", addr);
    info!("WebSocket endpoint: ws://localhost:{}/ws", args.port);

    axum::serve(listener, app).await.map_err(ServerError::Serve)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkboard_server=info,tower_http=info".into()),
        )
        .init();

    if let Err(e) = run(Args::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
