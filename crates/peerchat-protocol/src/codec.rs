use bytes::{Buf, BytesMut};

use crate::error::ProtocolError;
use crate::wire::WireMessage;

/// Maximum encoded message size: 64 KiB.
///
/// PEM-framed 2048-bit public keys and base64 signatures keep even the
/// largest handshake message well under this.
pub const MAX_MSG_SIZE: u32 = 65_536;

/// Current protocol version, checked for exact equality during the
/// handshake. Peers with any other version cannot interoperate.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Encode a message as JSON bytes for transmission.
pub fn encode(msg: &WireMessage) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(msg)?)
}

/// Decode a message from JSON bytes.
///
/// Any malformed payload (not JSON, missing or unknown `type`,
/// missing required field) is an error. Callers drop such payloads
/// and keep the session running; the codec never panics.
pub fn decode(payload: &[u8]) -> Result<WireMessage, ProtocolError> {
    if payload.len() > MAX_MSG_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge(payload.len()));
    }
    Ok(serde_json::from_slice(payload)?)
}

/// Wrap an encoded message in a length-prefixed frame for byte-stream
/// transports (the in-process transport delivers whole payloads and
/// does not need this).
pub fn encode_frame(msg: &WireMessage) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode(msg)?;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Attempt to extract one complete length-prefixed frame from a byte
/// buffer.
///
/// Returns `Ok(Some(payload))` if a complete frame is available,
/// `Ok(None)` if more data is needed, or `Err` if the declared length
/// exceeds [`MAX_MSG_SIZE`]. Advances the buffer past the consumed
/// frame.
pub fn try_decode_frame(buf: &mut BytesMut) -> Result<Option<Vec<u8>>, ProtocolError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if length > MAX_MSG_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge(length));
    }

    if buf.len() < 4 + length {
        return Ok(None);
    }

    buf.advance(4);
    let payload = buf.split_to(length).to_vec();
    Ok(Some(payload))
}
