use std::time::Duration;

use thiserror::Error;
use wsrpc_protocol::CodecError;
use wsrpc_transport::ClientId;

/// Why a call or notification could not be issued.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("no live connection for client {0}")]
    ConnectionNotFound(ClientId),

    #[error("arguments are not serializable: {0}")]
    InvalidArguments(#[source] serde_json::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Why an issued call produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The slot closed without a value: the write failed, the session
    /// closed, or the call was aborted.
    #[error("call closed without a result")]
    Closed,

    #[error("no result within {0:?}")]
    Timeout(Duration),
}
