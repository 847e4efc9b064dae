//! Transport errors.
//!
//! None of these escape a session: they are logged and end either the
//! single operation (writes) or the one session they occurred in.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket negotiation failed; no session was created.
    #[error("websocket upgrade failed: {0}")]
    UpgradeFailure(String),

    /// The upgrade request carried no `websocketid` cookie.
    #[error("missing session cookie")]
    MissingSessionCookie,

    #[error("socket write failed: {0}")]
    WriteFailure(#[source] axum::Error),

    /// The connection was closed by its session; nothing more is written.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("no frame received for {0:?}")]
    ReadTimeout(Duration),

    #[error("socket read failed: {0}")]
    ReadError(#[source] axum::Error),

    /// The first frame was not the handshake literal.
    #[error("handshake rejected")]
    HandshakeRejected,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
