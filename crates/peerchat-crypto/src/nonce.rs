use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;

/// Raw nonce length in bytes before base64 encoding.
pub const NONCE_LEN: usize = 24;

/// A single-use random value binding a handshake signature to one
/// handshake instance. Regenerated per attempt, never reused across
/// sessions. Stored and transmitted in its base64 text form, which is
/// also the exact byte sequence that gets signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh nonce from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut raw = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut raw);
        Nonce(BASE64.encode(raw))
    }

    /// Wrap a nonce received from the peer, as-is. No format check:
    /// the peer's nonce is opaque to us, we only sign and echo it.
    pub fn from_wire(value: &str) -> Self {
        Nonce(value.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
