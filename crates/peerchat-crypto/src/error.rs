use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("public key PEM error: {0}")]
    Pem(#[from] rsa::pkcs8::spki::Error),

    #[error("signature error: {0}")]
    Signature(#[from] rsa::signature::Error),

    #[error("encryption failed: {0}")]
    Encrypt(rsa::Error),

    #[error("plaintext too long: {got} bytes (max {max} for this key)")]
    MessageTooLong { got: usize, max: usize },

    #[error("decryption failed")]
    Decrypt,

    #[error("invalid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}
