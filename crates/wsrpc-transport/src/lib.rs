//! wsrpc Transport Layer
//!
//! Owns everything that touches the socket:
//! - HTTP surface (static assets + session cookie, upgrade endpoint, health)
//! - Connection lifecycle (handshake, read deadline, ping echo, teardown)
//! - The registry mapping a client id to its live connection
//!
//! Decoded results leave the transport through the [`InboundHandler`] trait,
//! so this crate knows nothing about call correlation.

pub mod connection;
pub mod cookie;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;

pub use connection::{ClientId, Connection};
pub use error::TransportError;
pub use registry::ConnectionRegistry;
pub use server::{TransportConfig, TransportServer, build_router};
pub use session::{InboundHandler, Session, SessionState};
