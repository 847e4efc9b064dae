//! Control literals and well-known names.
//!
//! Control frames are plain text, not JSON envelopes, and are matched by
//! exact content.

/// First frame a compliant browser sends after the socket opens.
pub const HANDSHAKE: &str = "myws,connected!";

/// Liveness probe, echoed back verbatim.
pub const PING_PONG: &str = "ping-pong";

/// Cookie carrying the per-page-load client token.
pub const SESSION_COOKIE: &str = "websocketid";

/// Default path of the upgrade endpoint.
pub const DEFAULT_WS_PATH: &str = "/_myws/_conn/";

/// Classification of an inbound frame by its literal content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Handshake,
    PingPong,
    Envelope,
}

impl FrameKind {
    pub fn classify(bytes: &[u8]) -> Self {
        if bytes == HANDSHAKE.as_bytes() {
            Self::Handshake
        } else if bytes == PING_PONG.as_bytes() {
            Self::PingPong
        } else {
            Self::Envelope
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_exact_literals_only() {
        assert_eq!(FrameKind::classify(b"myws,connected!"), FrameKind::Handshake);
        assert_eq!(FrameKind::classify(b"ping-pong"), FrameKind::PingPong);
        assert_eq!(FrameKind::classify(b"ping-pong "), FrameKind::Envelope);
        assert_eq!(FrameKind::classify(b"\"ping-pong\""), FrameKind::Envelope);
    }
}
