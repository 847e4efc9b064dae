//! wsrpc demo: call JavaScript in the browser from Rust.
//!
//! Serves the page in `--static`; clicking its button hits `/api/calc`,
//! which asks the browser to `eval` a random sum and then notifies `show`
//! with the answer. `/api/quit` stops the server.
//!
//! Usage:
//!   wsrpc                          # http://127.0.0.1:17680/, assets from ./static
//!   wsrpc --static ./web --debug   # Other asset dir, debug logging
//!   wsrpc --call-timeout-secs 5    # Give up on browser calls after 5s

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use clap::Parser;
use rand::Rng;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wsrpc_protocol::control::DEFAULT_WS_PATH;
use wsrpc_server::{RpcClient, ServerConfig, create_server};
use wsrpc_transport::{ClientId, TransportConfig};

#[derive(Parser, Debug)]
#[command(name = "wsrpc", about = "wsrpc demo: call browser functions over a WebSocket")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "17680")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Directory of static files (index.html is the home page)
    #[arg(long = "static", default_value = "static")]
    static_root: PathBuf,

    /// Path of the WebSocket upgrade endpoint
    #[arg(long, default_value = DEFAULT_WS_PATH)]
    ws_path: String,

    /// Access-Control-Allow-Origin sent with static files
    #[arg(long)]
    allow_origin: Option<String>,

    /// Abort browser calls that get no result within this many seconds
    #[arg(long)]
    call_timeout_secs: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    rpc: RpcClient,
    quit: Arc<Notify>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.debug, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e:#}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool, log_file: Option<&std::path::Path>) -> anyhow::Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ServerConfig {
        transport: TransportConfig {
            hostname: cli.hostname.clone(),
            port: cli.port,
            ws_path: cli.ws_path,
            static_root: cli.static_root,
            allow_origin: cli.allow_origin,
            ..TransportConfig::default()
        },
        call_timeout: cli.call_timeout_secs.map(Duration::from_secs),
    };

    let (server, rpc) = create_server(config);
    let quit = Arc::new(Notify::new());
    let routes = Router::new()
        .route("/api/calc", get(calc_handler))
        .route("/api/quit", get(quit_handler))
        .with_state(AppState {
            rpc,
            quit: quit.clone(),
        });

    let mut transport = server.start(routes).await.context("starting server")?;

    println!();
    println!("  Serving on: http://{}:{}/", cli.hostname, transport.port());
    println!("  Press Ctrl+C (or the page's Quit button) to stop.");
    println!();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = quit.notified() => {
            info!("Quit requested from the browser");
        }
    }

    transport.stop().await;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Application routes
// ─────────────────────────────────────────────────────────────────────────────

/// Ask the browser to add two random numbers, then show it the sentence.
async fn calc_handler(
    State(state): State<AppState>,
    client_id: ClientId,
) -> (StatusCode, &'static str) {
    let (x, y) = {
        let mut rng = rand::rng();
        (rng.random_range(0..100u32), rng.random_range(0..100u32))
    };
    info!("/api/calc for {client_id}: {x}+{y}");

    let handle = match state.rpc.call(&client_id, "eval", format!("{x}+{y}")).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!("/api/calc: {e}");
            return (StatusCode::CONFLICT, "no websocket connection; reload the page");
        }
    };

    let rpc = state.rpc.clone();
    tokio::spawn(async move {
        match handle.await {
            Ok(sum) => {
                let line = format!("{x} + {y} = {sum}");
                rpc.notify(&client_id, "show", line).await;
            }
            Err(e) => warn!("eval {x}+{y} for {client_id}: {e}"),
        }
    });

    (StatusCode::OK, "ok")
}

async fn quit_handler(State(state): State<AppState>) -> (StatusCode, &'static str) {
    state.quit.notify_one();
    (StatusCode::OK, "ok")
}
