//! Live connection handle and client identity.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::TransportError;

/// Opaque per-page-load token taken from the `websocketid` cookie.
///
/// It is random, not derived from the peer address, and is not a validated
/// identity: anyone presenting the cookie addresses that connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Fresh random token for a page load.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Outbound half of a socket.
pub type Outbound = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// One live duplex connection.
///
/// The outbound sink is behind an async mutex so calls, notifications and
/// ping echoes from different tasks never interleave on the wire. Once
/// [`close`](Self::close) has run, every later write fails.
pub struct Connection {
    client_id: ClientId,
    serial: u64,
    remote_addr: Option<SocketAddr>,
    connected_at: Instant,
    closed: AtomicBool,
    sink: Mutex<Outbound>,
}

impl Connection {
    pub fn new(client_id: ClientId, remote_addr: Option<SocketAddr>, sink: Outbound) -> Self {
        Self {
            client_id,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            remote_addr,
            connected_at: Instant::now(),
            closed: AtomicBool::new(false),
            sink: Mutex::new(sink),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Process-unique number distinguishing reconnects under the same client id.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Write one text frame.
    pub async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text.into())).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Write one frame. Holds the write lock until the frame is flushed.
    pub async fn send(&self, message: Message) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        // Checked under the lock: no write can start after close returns.
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        sink.send(message).await.map_err(TransportError::WriteFailure)
    }

    /// Close the outbound half. Idempotent. Errors are ignored; the peer may
    /// already be gone.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = sink.close().await {
            debug!("Close for {} ignored: {e}", self.client_id);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("client_id", &self.client_id)
            .field("serial", &self.serial)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    //! In-memory sinks standing in for a socket. Enabled for other crates'
    //! tests by the `test-util` feature.

    use super::*;
    use tokio::sync::mpsc;

    /// Sink that forwards every frame to the returned receiver.
    pub fn channel_sink() -> (Outbound, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = futures_util::sink::unfold(tx, |tx, msg: Message| async move {
            tx.send(msg)
                .map_err(|_| axum::Error::new(std::io::Error::other("receiver dropped")))?;
            Ok::<_, axum::Error>(tx)
        });
        (Box::pin(sink), rx)
    }

    /// Sink whose every write fails.
    pub fn broken_sink() -> Outbound {
        let sink = futures_util::sink::unfold((), |_, _msg: Message| async move {
            Err::<(), _>(axum::Error::new(std::io::Error::other("broken pipe")))
        });
        Box::pin(sink)
    }

    pub fn connection(client: &str) -> (Connection, mpsc::UnboundedReceiver<Message>) {
        let (sink, rx) = channel_sink();
        (Connection::new(ClientId::from(client), None, sink), rx)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn send_text_reaches_sink() {
        let (conn, mut rx) = connection("a");
        conn.send_text("hello".into()).await.unwrap();
        match rx.recv().await {
            Some(Message::Text(t)) => assert_eq!(t.as_str(), "hello"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn broken_sink_reports_write_failure() {
        let conn = Connection::new(ClientId::from("b"), None, broken_sink());
        let err = conn.send_text("x".into()).await.unwrap_err();
        assert!(matches!(err, TransportError::WriteFailure(_)));
    }

    #[tokio::test]
    async fn writes_after_close_fail() {
        let (conn, mut rx) = connection("c");
        assert!(!conn.is_closed());
        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());
        let err = conn.send_text("late".into()).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn serials_are_distinct() {
        let (a, _ra) = connection("same");
        let (b, _rb) = connection("same");
        assert_ne!(a.serial(), b.serial());
        assert_eq!(a.client_id(), b.client_id());
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }
}
