//! RpcClient: call and notify functions in the browser.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use wsrpc_protocol::{CallId, Envelope, Payload};
use wsrpc_transport::{ClientId, Connection, ConnectionRegistry, InboundHandler};

use crate::correlation::{CallOwner, CorrelationTable};
use crate::error::{CallError, RpcError};

/// State shared by every [`RpcClient`] clone and every session.
pub struct RpcContext {
    registry: Arc<ConnectionRegistry>,
    table: CorrelationTable,
    call_timeout: Option<Duration>,
}

impl RpcContext {
    pub fn new(call_timeout: Option<Duration>) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            table: CorrelationTable::new(),
            call_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }
}

impl InboundHandler for RpcContext {
    fn on_result(&self, envelope: Envelope) {
        self.table.fulfill(envelope.id, envelope.data);
    }

    fn on_session_closed(&self, conn: &Connection) {
        let aborted = self.table.abort_connection(conn.serial());
        if aborted > 0 {
            info!("Aborted {aborted} pending call(s) for {}", conn.client_id());
        }
    }

    fn pending_calls(&self) -> usize {
        self.table.pending()
    }
}

/// Handle for calling into connected browsers. Cheap to clone.
#[derive(Clone)]
pub struct RpcClient {
    ctx: Arc<RpcContext>,
}

impl RpcClient {
    pub fn new(ctx: Arc<RpcContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<RpcContext> {
        &self.ctx
    }

    /// The live connection for `client_id`, for repeated calls without a
    /// registry lookup each time.
    pub fn connection(&self, client_id: &ClientId) -> Option<Arc<Connection>> {
        self.ctx.registry.lookup(client_id)
    }

    /// Call `action` in the browser identified by `client_id`.
    ///
    /// Fails only when the client has no live connection or `args` cannot
    /// be serialized. A failed write still returns a handle; it resolves to
    /// [`CallError::Closed`].
    pub async fn call(
        &self,
        client_id: &ClientId,
        action: &str,
        args: impl Serialize,
    ) -> Result<ResultHandle, RpcError> {
        let conn = self
            .connection(client_id)
            .ok_or_else(|| RpcError::ConnectionNotFound(client_id.clone()))?;
        self.call_conn(&conn, action, args).await
    }

    /// Same as [`call`](Self::call) on an already-resolved connection.
    pub async fn call_conn(
        &self,
        conn: &Connection,
        action: &str,
        args: impl Serialize,
    ) -> Result<ResultHandle, RpcError> {
        let data = serde_json::to_value(args).map_err(RpcError::InvalidArguments)?;
        let id = self.ctx.table.next_id();
        let text = Envelope::call(id, action, data).encode()?;

        // Register before writing so a fast answer cannot beat the entry.
        let rx = self.ctx.table.register(
            id,
            CallOwner {
                client_id: conn.client_id().clone(),
                serial: conn.serial(),
            },
        );

        match conn.send_text(text).await {
            Ok(()) => debug!("Call {id} {action} → {}", conn.client_id()),
            Err(e) => {
                warn!("Call {id} {action} to {} failed: {e}", conn.client_id());
                self.ctx.table.abort(id);
            }
        }

        Ok(ResultHandle {
            id,
            rx,
            ctx: self.ctx.clone(),
            timeout: self.ctx.call_timeout,
        })
    }

    /// Fire-and-forget `action` in the browser identified by `client_id`.
    /// Nothing is reported back; failures are only logged.
    pub async fn notify(&self, client_id: &ClientId, action: &str, args: impl Serialize) {
        match self.connection(client_id) {
            Some(conn) => self.notify_conn(&conn, action, args).await,
            None => warn!("Notify {action}: no live connection for {client_id}"),
        }
    }

    /// Same as [`notify`](Self::notify) on an already-resolved connection.
    pub async fn notify_conn(&self, conn: &Connection, action: &str, args: impl Serialize) {
        let text = match serde_json::to_value(args)
            .map_err(RpcError::InvalidArguments)
            .and_then(|data| Ok(Envelope::notify(action, data).encode()?))
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Notify {action}: {e}");
                return;
            }
        };
        match conn.send_text(text).await {
            Ok(()) => debug!("Notify {action} → {}", conn.client_id()),
            Err(e) => warn!("Notify {action} to {} failed: {e}", conn.client_id()),
        }
    }
}

/// The pending result of one call. Await it (or call [`wait`](Self::wait)).
pub struct ResultHandle {
    id: CallId,
    rx: oneshot::Receiver<Payload>,
    ctx: Arc<RpcContext>,
    timeout: Option<Duration>,
}

impl ResultHandle {
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Give up after `timeout`, aborting the pending entry.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for as long as it takes.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub async fn wait(self) -> Result<Payload, CallError> {
        let Self { id, rx, ctx, timeout } = self;
        let Some(limit) = timeout else {
            return rx.await.map_err(|_| CallError::Closed);
        };
        match tokio::time::timeout(limit, rx).await {
            Ok(result) => result.map_err(|_| CallError::Closed),
            Err(_) => {
                ctx.table.abort(id);
                warn!("Call {id} timed out after {limit:?}");
                Err(CallError::Timeout(limit))
            }
        }
    }
}

impl IntoFuture for ResultHandle {
    type Output = Result<Payload, CallError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl std::fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
