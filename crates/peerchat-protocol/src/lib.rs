//! peerchat wire protocol: the closed set of typed messages two peers
//! exchange over their channel, plus the JSON codec and the framing
//! helpers for byte-stream transports.

pub mod codec;
pub mod error;
pub mod wire;

pub use codec::{decode, encode, PROTOCOL_VERSION};
pub use error::ProtocolError;
pub use wire::WireMessage;
