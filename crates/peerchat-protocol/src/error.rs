use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {0} bytes (max 65536)")]
    MessageTooLarge(usize),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_too_large_display() {
        let e = ProtocolError::MessageTooLarge(100_000);
        assert!(e.to_string().contains("100000"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken");
        let proto_err: ProtocolError = io_err.into();
        assert!(proto_err.to_string().contains("broken"));
    }
}
