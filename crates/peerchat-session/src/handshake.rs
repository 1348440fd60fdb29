//! The 3-message handshake: init (host → client), response
//! (client → host), final (host → client). Each direction proves
//! possession of a signing private key by signing the fresh nonce the
//! other side just issued. Pure state machine; the session task does
//! all I/O and feeds decoded messages in.

use std::sync::Arc;

use tracing::{debug, warn};

use peerchat_crypto::{verify_nonce, Nonce, SessionKeys};
use peerchat_protocol::codec::PROTOCOL_VERSION;
use peerchat_protocol::wire::{
    WireMessage, REASON_HANDSHAKE_INVALID, REASON_VERSION_MISMATCH,
};

use crate::error::SessionError;

/// Disconnect reason for local failures (e.g. signing) that have no
/// protocol-defined reason of their own.
const REASON_INTERNAL: &str = "internal-error";

/// Which side of the session we are. The host opens the handshake and
/// authenticates first; the client answers and authenticates on the
/// final message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Init,
    /// Client: waiting for the host's `handshake-init`.
    WaitForHandshake,
    /// Host: init sent, waiting for the client's `handshake-response`.
    WaitForResponse,
    /// Client: response sent, waiting for the host's `handshake-final`.
    WaitForFinal,
    Authenticated,
    Closed,
}

/// What the session task must do in reaction to a handshake step.
pub enum HandshakeAction {
    /// Write this message to the channel.
    Send(WireMessage),
    /// The handshake completed; switch to message dispatch and pings.
    Authenticated,
    /// Fatal: send `disconnect{reason}`, close the channel, surface
    /// `error` to any pending connect attempt.
    Fail {
        reason: &'static str,
        error: SessionError,
    },
}

pub struct Handshake {
    role: Role,
    state: HandshakeState,
    keys: Arc<SessionKeys>,
    own_nonce: Nonce,
    peer_enc_key: Option<String>,
    peer_sig_key: Option<String>,
    peer_nonce: Option<Nonce>,
}

impl Handshake {
    /// A fresh handshake attempt with a fresh nonce. Keys must already
    /// exist; generating them is the caller's readiness gate.
    pub fn new(role: Role, keys: Arc<SessionKeys>) -> Self {
        Self {
            role,
            state: HandshakeState::Init,
            keys,
            own_nonce: Nonce::generate(),
            peer_enc_key: None,
            peer_sig_key: None,
            peer_nonce: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The peer's pinned encryption public key, available once the
    /// peer's first handshake message arrived.
    pub fn peer_enc_key(&self) -> Option<&str> {
        self.peer_enc_key.as_deref()
    }

    pub fn peer_sig_key(&self) -> Option<&str> {
        self.peer_sig_key.as_deref()
    }

    /// The channel to the peer is open. The host opens the exchange;
    /// the client waits for the host's init.
    pub fn on_channel_open(&mut self) -> Vec<HandshakeAction> {
        match self.role {
            Role::Host => {
                self.state = HandshakeState::WaitForResponse;
                vec![HandshakeAction::Send(WireMessage::HandshakeInit {
                    version: PROTOCOL_VERSION.to_owned(),
                    enc_pub_key: self.keys.encryption_public_pem().to_owned(),
                    sig_pub_key: self.keys.signing_public_pem().to_owned(),
                    nonce: self.own_nonce.as_str().to_owned(),
                })]
            }
            Role::Client => {
                self.state = HandshakeState::WaitForHandshake;
                Vec::new()
            }
        }
    }

    /// Feed one decoded message into the state machine. Messages that
    /// do not match the current state are dropped, never queued: the
    /// channel underneath is ordered, so they can only be protocol
    /// violations.
    pub fn on_message(&mut self, msg: WireMessage) -> Vec<HandshakeAction> {
        match (self.state, msg) {
            (
                HandshakeState::WaitForHandshake,
                WireMessage::HandshakeInit {
                    version,
                    enc_pub_key,
                    sig_pub_key,
                    nonce,
                },
            ) => {
                if version != PROTOCOL_VERSION {
                    warn!(
                        theirs = %version,
                        ours = PROTOCOL_VERSION,
                        "protocol version mismatch"
                    );
                    return self.fail(REASON_VERSION_MISMATCH, SessionError::VersionMismatch);
                }

                let peer_nonce = Nonce::from_wire(&nonce);
                let signed_peer_nonce = match self.keys.sign_nonce(&peer_nonce) {
                    Ok(sig) => sig,
                    Err(e) => return self.fail(REASON_INTERNAL, SessionError::Crypto(e)),
                };
                self.peer_enc_key = Some(enc_pub_key);
                self.peer_sig_key = Some(sig_pub_key);
                self.peer_nonce = Some(peer_nonce);
                self.state = HandshakeState::WaitForFinal;

                vec![HandshakeAction::Send(WireMessage::HandshakeResponse {
                    enc_pub_key: self.keys.encryption_public_pem().to_owned(),
                    sig_pub_key: self.keys.signing_public_pem().to_owned(),
                    nonce: self.own_nonce.as_str().to_owned(),
                    signed_peer_nonce,
                })]
            }

            (
                HandshakeState::WaitForResponse,
                WireMessage::HandshakeResponse {
                    enc_pub_key,
                    sig_pub_key,
                    nonce,
                    signed_peer_nonce,
                },
            ) => {
                if !verify_nonce(&sig_pub_key, &self.own_nonce, &signed_peer_nonce) {
                    warn!("client's nonce signature did not verify");
                    return self.fail(REASON_HANDSHAKE_INVALID, SessionError::HandshakeInvalid);
                }

                let peer_nonce = Nonce::from_wire(&nonce);
                let signed_peer_nonce = match self.keys.sign_nonce(&peer_nonce) {
                    Ok(sig) => sig,
                    Err(e) => return self.fail(REASON_INTERNAL, SessionError::Crypto(e)),
                };
                self.peer_enc_key = Some(enc_pub_key);
                self.peer_sig_key = Some(sig_pub_key);
                self.peer_nonce = Some(peer_nonce);
                // The client proved possession of its signing key; the
                // host trusts it from here on.
                self.state = HandshakeState::Authenticated;

                vec![
                    HandshakeAction::Send(WireMessage::HandshakeFinal { signed_peer_nonce }),
                    HandshakeAction::Authenticated,
                ]
            }

            (
                HandshakeState::WaitForFinal,
                WireMessage::HandshakeFinal { signed_peer_nonce },
            ) => {
                let peer_sig_key = self.peer_sig_key.as_deref().unwrap_or_default();
                if !verify_nonce(peer_sig_key, &self.own_nonce, &signed_peer_nonce) {
                    warn!("host's nonce signature did not verify");
                    return self.fail(REASON_HANDSHAKE_INVALID, SessionError::HandshakeInvalid);
                }
                self.state = HandshakeState::Authenticated;
                vec![HandshakeAction::Authenticated]
            }

            (state, msg) => {
                debug!(kind = msg.kind(), ?state, "dropping unexpected message");
                Vec::new()
            }
        }
    }

    fn fail(&mut self, reason: &'static str, error: SessionError) -> Vec<HandshakeAction> {
        self.state = HandshakeState::Closed;
        vec![HandshakeAction::Fail { reason, error }]
    }
}
