use peerchat_protocol::wire::{REASON_HANDSHAKE_INVALID, REASON_VERSION_MISMATCH};
use thiserror::Error;

/// Errors surfaced by the transport seam.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unknown peer id: {0}")]
    UnknownPeer(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("payload too large for transport frame: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by sessions and the supervisor.
///
/// Everything here is fatal to at most the current session; the shared
/// transport endpoint and future sessions are unaffected.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer speaks a different protocol version. Non-retryable.
    #[error("protocol version mismatch")]
    VersionMismatch,

    /// A handshake signature failed to verify.
    #[error("handshake signature verification failed")]
    HandshakeInvalid,

    /// The connect attempt did not authenticate within the timeout.
    #[error("timed out waiting for handshake")]
    HandshakeTimeout,

    /// `send_message` before the handshake completed.
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// The session ended; the payload is the disconnect reason.
    #[error("session closed: {0}")]
    Closed(String),

    #[error(transparent)]
    Crypto(#[from] peerchat_crypto::CryptoError),

    #[error(transparent)]
    Protocol(#[from] peerchat_protocol::ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Map a wire disconnect reason back to the matching error.
    pub(crate) fn from_disconnect_reason(reason: &str) -> Self {
        match reason {
            REASON_VERSION_MISMATCH => SessionError::VersionMismatch,
            REASON_HANDSHAKE_INVALID => SessionError::HandshakeInvalid,
            other => SessionError::Closed(other.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_reasons_map_to_typed_errors() {
        assert!(matches!(
            SessionError::from_disconnect_reason(REASON_VERSION_MISMATCH),
            SessionError::VersionMismatch
        ));
        assert!(matches!(
            SessionError::from_disconnect_reason(REASON_HANDSHAKE_INVALID),
            SessionError::HandshakeInvalid
        ));
        assert!(matches!(
            SessionError::from_disconnect_reason("going offline"),
            SessionError::Closed(reason) if reason == "going offline"
        ));
    }
}
