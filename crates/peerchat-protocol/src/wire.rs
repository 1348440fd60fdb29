use serde::{Deserialize, Serialize};

/// Disconnect reason sent when the peer's protocol version does not
/// match ours exactly.
pub const REASON_VERSION_MISMATCH: &str = "version-mismatch";

/// Disconnect reason sent when a handshake signature fails to verify.
pub const REASON_HANDSHAKE_INVALID: &str = "handshake-invalid";

/// Disconnect reason sent when no ping arrived within the liveness
/// threshold.
pub const REASON_PING_TIMEOUT: &str = "ping-timeout";

/// Messages exchanged between two peers over the channel.
///
/// The wire form is a JSON object with a `type` discriminator and that
/// variant's required fields in camelCase, e.g.
/// `{"type":"ping","timestamp":1700000000000}`. Deserialization rejects
/// unknown discriminators and missing fields, so nothing malformed is
/// representable past this boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// host → client. Opens the handshake: carries the host's protocol
    /// version, both public keys (SPKI PEM), and a fresh nonce for the
    /// client to sign.
    #[serde(rename = "handshake-init", rename_all = "camelCase")]
    HandshakeInit {
        version: String,
        enc_pub_key: String,
        sig_pub_key: String,
        nonce: String,
    },

    /// client → host. Proves possession of the client's signing key:
    /// the host's nonce signed with it, plus the client's own public
    /// keys and a fresh nonce for the host to sign.
    #[serde(rename = "handshake-response", rename_all = "camelCase")]
    HandshakeResponse {
        enc_pub_key: String,
        sig_pub_key: String,
        nonce: String,
        signed_peer_nonce: String,
    },

    /// host → client. Completes the handshake: the client's nonce
    /// signed with the host's signing key.
    #[serde(rename = "handshake-final", rename_all = "camelCase")]
    HandshakeFinal { signed_peer_nonce: String },

    /// Authenticated chat payload. `text` is base64 RSA-OAEP ciphertext;
    /// `timestamp` is milliseconds since the Unix epoch at send time.
    #[serde(rename = "message")]
    ChatMessage { text: String, timestamp: u64 },

    /// Liveness heartbeat, sent periodically after authentication.
    #[serde(rename = "ping")]
    Ping { timestamp: u64 },

    /// Graceful or forced teardown notice.
    #[serde(rename = "disconnect")]
    Disconnect { reason: String },
}

impl WireMessage {
    /// The wire discriminator for this variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::HandshakeInit { .. } => "handshake-init",
            WireMessage::HandshakeResponse { .. } => "handshake-response",
            WireMessage::HandshakeFinal { .. } => "handshake-final",
            WireMessage::ChatMessage { .. } => "message",
            WireMessage::Ping { .. } => "ping",
            WireMessage::Disconnect { .. } => "disconnect",
        }
    }
}
