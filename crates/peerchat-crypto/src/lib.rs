//! peerchat cryptographic layer: per-session key material.
//!
//! This crate provides:
//! - Per-session RSA keypair generation (one for signing, one for
//!   message encryption), run on the blocking pool
//! - SPKI PEM export of the public halves for embedding in text wire
//!   messages
//! - PKCS#1 v1.5 signatures over handshake nonces and their
//!   verification against a peer's exported public key
//! - RSA-OAEP encryption/decryption of chat text
//! - Single-use random nonces
//!
//! Keys are self-asserted: there is no trust root, and a peer's keys
//! are only pinned for the lifetime of one session.

pub mod error;
pub mod keys;
pub mod nonce;

pub use error::CryptoError;
pub use keys::{encrypt_text, verify_nonce, SessionKeys, DEFAULT_KEY_BITS};
pub use nonce::{Nonce, NONCE_LEN};
