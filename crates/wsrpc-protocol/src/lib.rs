//! wsrpc protocol types
//!
//! The JSON envelope exchanged between the backend and the browser, the
//! plain-text control literals, and the codec errors. Everything that goes
//! over the socket is defined here.

pub mod control;
pub mod envelope;
pub mod error;

pub use control::FrameKind;
pub use envelope::{CallId, Envelope, EnvelopeType, Payload};
pub use error::CodecError;
