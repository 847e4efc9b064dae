//! wsrpc Server: lets backend code call functions in the browser.
//!
//! [`create_server`] wires the transport to a shared [`RpcContext`] and
//! returns the two halves the application needs: an [`RpcServer`] to start
//! listening with the application's own routes, and an [`RpcClient`] to
//! issue calls and notifications from those routes.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use axum::{Router, extract::State, routing::get};
//! use wsrpc_server::{RpcClient, ServerConfig, create_server};
//! use wsrpc_transport::ClientId;
//!
//! async fn sum(State(rpc): State<RpcClient>, client: ClientId) -> String {
//!     match rpc.call(&client, "eval", "3+4").await {
//!         Ok(handle) => format!("{:?}", handle.await),
//!         Err(e) => e.to_string(),
//!     }
//! }
//!
//! let (server, rpc) = create_server(ServerConfig::default());
//! let routes = Router::new().route("/api/sum", get(sum)).with_state(rpc);
//! let mut running = server.start(routes).await?;
//! running.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod correlation;
pub mod error;
pub mod rpc;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use wsrpc_transport::{TransportConfig, TransportError, TransportServer, build_router};

pub use correlation::{CallOwner, CorrelationTable};
pub use error::{CallError, RpcError};
pub use rpc::{ResultHandle, RpcClient, RpcContext};

/// Server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub transport: TransportConfig,
    /// Default deadline for every call; `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
}

/// The not-yet-listening half returned by [`create_server`].
pub struct RpcServer {
    config: TransportConfig,
    ctx: Arc<RpcContext>,
}

impl RpcServer {
    /// Bind and serve `routes` next to the upgrade endpoint and static files.
    pub async fn start(self, routes: Router) -> Result<TransportServer, TransportError> {
        TransportServer::start(self.config, self.ctx.registry().clone(), self.ctx, routes).await
    }

    /// The complete router, for serving on a listener the caller owns.
    /// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`;
    /// the upgrade endpoint reads the peer address.
    pub fn into_router(self, routes: Router) -> Router {
        build_router(self.config, self.ctx.registry().clone(), self.ctx, routes)
    }
}

/// Build the server and the client that calls through it.
pub fn create_server(config: ServerConfig) -> (RpcServer, RpcClient) {
    let ctx = Arc::new(RpcContext::new(config.call_timeout));
    let server = RpcServer {
        config: config.transport,
        ctx: ctx.clone(),
    };
    (server, RpcClient::new(ctx))
}
