//! Codec errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is not valid JSON, or not an envelope object.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}
