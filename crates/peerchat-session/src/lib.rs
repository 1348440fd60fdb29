//! peerchat session layer: authenticated, end-to-end encrypted 1:1
//! chat sessions over an externally-supplied reliable channel.
//!
//! This crate provides:
//! - The [`transport`] seam the external channel collaborator plugs
//!   into, plus an in-process transport ([`mem`]) and a TCP transport
//!   ([`tcp`])
//! - The 3-message nonce-signature handshake state machine
//!   ([`handshake`])
//! - [`PeerSession`]: encrypted messaging, liveness pings with
//!   unilateral timeout teardown, and the observer surface
//! - [`ConnectionSupervisor`]: owns the shared transport endpoint and
//!   enforces one live peer session at a time
//!
//! Known limitation: there is no trust root. Peer keys are
//! self-asserted in the first handshake message and pinned only for
//! the session's lifetime, so an active man-in-the-middle on that
//! first message could substitute its own keys.

pub mod config;
pub mod error;
pub mod handshake;
pub mod mem;
pub mod observer;
pub mod session;
pub mod supervisor;
pub mod tcp;
pub mod transport;

pub use config::SessionConfig;
pub use error::{SessionError, TransportError};
pub use handshake::Role;
pub use observer::SessionObserver;
pub use session::{PeerSession, SessionPhase};
pub use supervisor::ConnectionSupervisor;
