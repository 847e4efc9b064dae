//! HTTP surface using Axum.
//!
//! Serves static assets (stamping each HTML page with a fresh session
//! cookie), upgrades the configured path to a WebSocket session, and merges
//! in whatever application routes the caller supplies.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
    },
    middleware::map_response_with_state,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};
use wsrpc_protocol::control::DEFAULT_WS_PATH;

use crate::connection::{ClientId, Connection};
use crate::cookie;
use crate::error::TransportError;
use crate::registry::ConnectionRegistry;
use crate::session::{InboundHandler, Session};

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Hostname to bind to
    pub hostname: String,
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Path of the WebSocket upgrade endpoint
    pub ws_path: String,
    /// Directory served for every path no other route claims
    pub static_root: PathBuf,
    /// Silence after which a session is closed
    pub read_timeout: Duration,
    /// `Access-Control-Allow-Origin` value added to static responses
    pub allow_origin: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".into(),
            port: 17680,
            ws_path: DEFAULT_WS_PATH.into(),
            static_root: PathBuf::from("static"),
            read_timeout: Duration::from_secs(30),
            allow_origin: None,
        }
    }
}

/// Shared state for the upgrade and health handlers.
struct AppState<H: InboundHandler> {
    handler: Arc<H>,
    registry: Arc<ConnectionRegistry>,
    config: TransportConfig,
}

/// A listening server. Dropping it does not stop the listener; call [`stop`](Self::stop).
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound address
    local_addr: SocketAddr,
}

impl TransportServer {
    /// Bind and start serving `routes` alongside the upgrade endpoint,
    /// the health probe and the static fallback.
    ///
    /// `routes` must not set its own fallback.
    pub async fn start<H: InboundHandler>(
        config: TransportConfig,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<H>,
        routes: Router,
    ) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", config.hostname, config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind { addr: addr.clone(), source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        let app = build_router(config.clone(), registry, handler, routes);

        info!(
            "wsrpc listening on http://{local_addr} (websocket {}, static {})",
            config.ws_path,
            config.static_root.display()
        );

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            local_addr,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("wsrpc server stopped");
    }
}

/// Assemble the full router without binding. Exposed for embedding into an
/// existing server.
pub fn build_router<H: InboundHandler>(
    config: TransportConfig,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<H>,
    routes: Router,
) -> Router {
    let static_files = Router::new()
        .fallback_service(ServeDir::new(&config.static_root))
        .layer(map_response_with_state(config.allow_origin.clone(), stamp_static_response));

    let state = Arc::new(AppState {
        handler,
        registry,
        config: config.clone(),
    });

    Router::new()
        .route(&config.ws_path, get(ws_upgrade_handler::<H>))
        .route("/health", get(health_handler::<H>))
        .with_state(state)
        .merge(routes)
        .fallback_service(static_files)
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Each HTML page served is a new page load and gets a new token. Scripts,
/// images and 404s keep the token of the page that requested them.
async fn stamp_static_response(
    State(allow_origin): State<Option<String>>,
    mut response: Response,
) -> Response {
    if is_html(response.headers()) {
        let client_id = ClientId::generate();
        cookie::insert_set_cookie(response.headers_mut(), &client_id);
    }
    if let Some(origin) = allow_origin.and_then(|o| HeaderValue::from_str(&o).ok()) {
        response.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    response
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

async fn ws_upgrade_handler<H: InboundHandler>(
    State(state): State<Arc<AppState<H>>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(client_id) = cookie::session_cookie(&headers) else {
        warn!("{} from {remote}: try refreshing the page", TransportError::MissingSessionCookie);
        return (StatusCode::BAD_REQUEST, "missing websocketid cookie").into_response();
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!("{}", TransportError::UpgradeFailure(rejection.body_text()));
            return rejection.into_response();
        }
    };

    debug!("Upgrading {client_id} from {remote}");
    let failed_id = client_id.clone();
    ws.on_failed_upgrade(move |e: axum::Error| {
        warn!("{} for {failed_id}", TransportError::UpgradeFailure(e.to_string()));
    })
    .on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let conn = Arc::new(Connection::new(client_id, Some(remote), Box::pin(sink)));
        let session = Session::new(
            conn,
            state.registry.clone(),
            state.handler.clone(),
            state.config.read_timeout,
        );
        // The outcome is already logged by the session.
        let _ = session.run(stream).await;
    })
}

async fn health_handler<H: InboundHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.registry.len(),
        "pendingCalls": state.handler.pending_calls(),
    }))
}
