//! Per-connection session: handshake, read loop, dispatch, teardown.
//!
//! ```text
//! Connecting → Upgraded → AwaitingHandshake → Active → Closing → Closed
//!                                   │                      ▲
//!                                   └── wrong first frame ─┘
//! ```
//!
//! `Connecting → Upgraded` happens in the HTTP handler; a [`Session`] is
//! only created once the socket exists. Frames are classified by literal
//! content: the handshake literal, the `ping-pong` probe (echoed), and
//! everything else, which is decoded as a result envelope and handed to the
//! [`InboundHandler`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};
use wsrpc_protocol::{Envelope, FrameKind};

use crate::connection::{ClientId, Connection};
use crate::error::TransportError;
use crate::registry::ConnectionRegistry;

/// Receives what a session decodes. Implemented by the RPC layer.
pub trait InboundHandler: Send + Sync + 'static {
    /// A `result` envelope arrived on an active session.
    fn on_result(&self, envelope: Envelope);

    /// The session for `conn` has closed and left the registry.
    fn on_session_closed(&self, _conn: &Connection) {}

    /// Outstanding calls, reported by the health probe.
    fn pending_calls(&self) -> usize {
        0
    }
}

/// Lifecycle of a [`Session`]. The connecting phase before the upgrade
/// belongs to the HTTP handler; a session starts at `Upgraded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Upgraded,
    AwaitingHandshake,
    Active,
    Closing,
    Closed,
}

/// One upgraded socket and its read loop.
pub struct Session<H: InboundHandler> {
    conn: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<H>,
    read_timeout: Duration,
    state: SessionState,
}

impl<H: InboundHandler> Session<H> {
    pub fn new(
        conn: Arc<Connection>,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<H>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            registry,
            handler,
            read_timeout,
            state: SessionState::Upgraded,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        self.conn.client_id()
    }

    /// Drive the session until the peer goes away, then tear down.
    ///
    /// `Ok(())` means the peer closed the socket; every other ending is the
    /// error that closed it.
    pub async fn run<S>(mut self, mut frames: S) -> Result<(), TransportError>
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        self.transition(SessionState::AwaitingHandshake);
        let outcome = self.read_loop(&mut frames).await;
        match &outcome {
            Ok(()) => debug!("Client closed: {}", self.client_id()),
            Err(e) => info!("Session {} ended: {e}", self.client_id()),
        }
        self.teardown().await;
        outcome
    }

    async fn read_loop<S>(&mut self, frames: &mut S) -> Result<(), TransportError>
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        loop {
            let frame = match tokio::time::timeout(self.read_timeout, frames.next()).await {
                Err(_) => return Err(TransportError::ReadTimeout(self.read_timeout)),
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => return Err(TransportError::ReadError(e)),
                Ok(Some(Ok(frame))) => frame,
            };

            let bytes: &[u8] = match &frame {
                Message::Text(text) => text.as_str().as_bytes(),
                Message::Binary(data) => &data[..],
                Message::Close(_) => return Ok(()),
                // Protocol-level pings are answered by the socket; they only
                // count as activity here.
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            let kind = FrameKind::classify(bytes);

            if self.state == SessionState::AwaitingHandshake {
                if kind != FrameKind::Handshake {
                    warn!(
                        "Client {} sent {} bytes before handshake, closing",
                        self.client_id(),
                        bytes.len()
                    );
                    return Err(TransportError::HandshakeRejected);
                }
                self.registry.register(self.conn.clone());
                self.transition(SessionState::Active);
                info!(
                    "Client connected: {} ({})",
                    self.client_id(),
                    self.conn
                        .remote_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| "unknown".into())
                );
                continue;
            }

            match kind {
                FrameKind::PingPong => {
                    self.conn.send(frame.clone()).await?;
                }
                FrameKind::Handshake => {
                    debug!("Repeated handshake from {} ignored", self.client_id());
                }
                FrameKind::Envelope => self.dispatch(bytes),
            }
        }
    }

    fn dispatch(&self, bytes: &[u8]) {
        match Envelope::decode(bytes) {
            Ok(envelope) if envelope.is_result() => {
                debug!("Result {} from {}", envelope.id, self.client_id());
                self.handler.on_result(envelope);
            }
            Ok(envelope) => {
                debug!(
                    "Ignoring {} envelope from {} (action {:?})",
                    envelope.typ,
                    self.client_id(),
                    envelope.action
                );
            }
            Err(e) => {
                warn!(
                    "Dropping frame from {}: {e}: {}",
                    self.client_id(),
                    String::from_utf8_lossy(bytes)
                );
            }
        }
    }

    /// Unregister, fail pending calls and close the socket. Runs once.
    async fn teardown(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        self.transition(SessionState::Closing);

        if self
            .registry
            .remove_if_current(self.conn.client_id(), self.conn.serial())
        {
            debug!("Connection unregistered: {}", self.client_id());
        }
        // Closed before pending calls are failed: a call issued over a held
        // handle after this point fails its own write.
        self.conn.close().await;
        self.handler.on_session_closed(&self.conn);

        self.transition(SessionState::Closed);
        info!(
            "Client disconnected: {} after {:?} (live: {})",
            self.client_id(),
            self.conn.connected_at().elapsed(),
            self.registry.len()
        );
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {:?} → {:?}", self.client_id(), self.state, next);
        self.state = next;
    }
}
