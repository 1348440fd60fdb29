use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::error::CryptoError;
use crate::nonce::Nonce;

/// Default modulus size for both keypairs.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// One session's key material: an encryption keypair (RSA-OAEP, for
/// chat text) and a signing keypair (RSASSA-PKCS1-v1_5 over SHA-256,
/// for handshake nonces). Generated fresh per session; the private
/// halves never leave this struct.
pub struct SessionKeys {
    encryption: RsaPrivateKey,
    signing: RsaPrivateKey,
    enc_pub_pem: String,
    sig_pub_pem: String,
}

impl SessionKeys {
    /// Generate both keypairs on the blocking pool. RSA key generation
    /// is the one computationally heavy operation in the protocol, so
    /// it must not run on the async executor.
    pub async fn generate(bits: usize) -> Result<Self, CryptoError> {
        tokio::task::spawn_blocking(move || Self::generate_blocking(bits))
            .await
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?
    }

    /// Synchronous keypair generation. Exposed for tests and callers
    /// that already run off the async executor.
    pub fn generate_blocking(bits: usize) -> Result<Self, CryptoError> {
        let mut rng = rand::thread_rng();
        let encryption = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let signing = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        let enc_pub_pem = encryption
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)?;
        let sig_pub_pem = signing.to_public_key().to_public_key_pem(LineEnding::LF)?;

        debug!(bits, "session keypairs generated");
        Ok(Self {
            encryption,
            signing,
            enc_pub_pem,
            sig_pub_pem,
        })
    }

    /// The encryption public key as SPKI PEM, ready to embed in a
    /// handshake message.
    pub fn encryption_public_pem(&self) -> &str {
        &self.enc_pub_pem
    }

    /// The signing public key as SPKI PEM.
    pub fn signing_public_pem(&self) -> &str {
        &self.sig_pub_pem
    }

    /// Sign a nonce with our signing key. The signed bytes are the
    /// nonce's base64 text exactly as it appears on the wire.
    pub fn sign_nonce(&self, nonce: &Nonce) -> Result<String, CryptoError> {
        let signer = SigningKey::<Sha256>::new(self.signing.clone());
        let signature = signer.try_sign(nonce.as_str().as_bytes())?;
        Ok(BASE64.encode(signature.to_bytes()))
    }

    /// Decrypt base64 RSA-OAEP ciphertext with our encryption private
    /// key. All failure modes collapse into [`CryptoError::Decrypt`]:
    /// the caller substitutes a placeholder and the session continues.
    pub fn decrypt_text(&self, ciphertext_b64: &str) -> Result<String, CryptoError> {
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|_| CryptoError::Decrypt)?;
        let plaintext = self
            .encryption
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }
}

/// Encrypt chat text under the peer's exported encryption public key.
/// Returns base64 ciphertext. Text beyond the OAEP capacity of the
/// peer's key is an error; there is no plaintext fallback.
pub fn encrypt_text(peer_enc_pem: &str, text: &str) -> Result<String, CryptoError> {
    let public = RsaPublicKey::from_public_key_pem(peer_enc_pem)?;

    let max = max_plaintext_len(&public);
    if text.len() > max {
        return Err(CryptoError::MessageTooLong {
            got: text.len(),
            max,
        });
    }

    let mut rng = rand::thread_rng();
    let ciphertext = public
        .encrypt(&mut rng, Oaep::new::<Sha256>(), text.as_bytes())
        .map_err(CryptoError::Encrypt)?;
    Ok(BASE64.encode(ciphertext))
}

/// Verify a peer's base64 signature over a nonce against their
/// exported signing public key. Never panics; any parse or
/// verification failure is `false`.
pub fn verify_nonce(peer_sig_pem: &str, nonce: &Nonce, signature_b64: &str) -> bool {
    let public = match RsaPublicKey::from_public_key_pem(peer_sig_pem) {
        Ok(key) => key,
        Err(e) => {
            warn!("peer signing key not parseable: {e}");
            return false;
        }
    };
    let raw = match BASE64.decode(signature_b64) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("signature not valid base64: {e}");
            return false;
        }
    };
    let signature = match Signature::try_from(raw.as_slice()) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("signature not well-formed: {e}");
            return false;
        }
    };
    VerifyingKey::<Sha256>::new(public)
        .verify(nonce.as_str().as_bytes(), &signature)
        .is_ok()
}

/// Largest plaintext RSA-OAEP with SHA-256 can carry under this key:
/// modulus size minus two hash lengths minus two.
fn max_plaintext_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(2 * 32 + 2)
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;

    // 1024-bit keys keep the test suite fast; the key size never
    // changes the code paths under test.
    const TEST_BITS: usize = 1024;

    fn keys() -> &'static SessionKeys {
        static KEYS: OnceLock<SessionKeys> = OnceLock::new();
        KEYS.get_or_init(|| SessionKeys::generate_blocking(TEST_BITS).unwrap())
    }

    fn other_keys() -> &'static SessionKeys {
        static KEYS: OnceLock<SessionKeys> = OnceLock::new();
        KEYS.get_or_init(|| SessionKeys::generate_blocking(TEST_BITS).unwrap())
    }

    #[test]
    fn public_keys_export_as_framed_pem() {
        let pem = keys().signing_public_pem();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
        assert!(pem.lines().all(|line| line.len() <= 64));
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let nonce = Nonce::generate();
        let sig = keys().sign_nonce(&nonce).unwrap();
        assert!(verify_nonce(keys().signing_public_pem(), &nonce, &sig));
    }

    #[test]
    fn verify_fails_for_different_nonce() {
        let nonce = Nonce::generate();
        let sig = keys().sign_nonce(&nonce).unwrap();
        assert!(!verify_nonce(
            keys().signing_public_pem(),
            &Nonce::generate(),
            &sig
        ));
    }

    #[test]
    fn verify_fails_under_wrong_key() {
        let nonce = Nonce::generate();
        let sig = keys().sign_nonce(&nonce).unwrap();
        assert!(!verify_nonce(
            other_keys().signing_public_pem(),
            &nonce,
            &sig
        ));
    }

    #[test]
    fn verify_tolerates_garbage_inputs() {
        let nonce = Nonce::generate();
        assert!(!verify_nonce("not a pem", &nonce, "c2ln"));
        assert!(!verify_nonce(
            keys().signing_public_pem(),
            &nonce,
            "%%% not base64 %%%"
        ));
        assert!(!verify_nonce(keys().signing_public_pem(), &nonce, "c2ln"));
    }

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let text = "hallo, peer";
        let ct = encrypt_text(keys().encryption_public_pem(), text).unwrap();
        assert_ne!(ct, text);
        assert_eq!(keys().decrypt_text(&ct).unwrap(), text);
    }

    #[test]
    fn decrypt_fails_for_wrong_key() {
        let ct = encrypt_text(other_keys().encryption_public_pem(), "hi").unwrap();
        assert!(matches!(
            keys().decrypt_text(&ct),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn decrypt_fails_for_garbage() {
        assert!(matches!(
            keys().decrypt_text("definitely not ciphertext"),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn oversized_plaintext_is_rejected_not_downgraded() {
        let text = "x".repeat(4096);
        assert!(matches!(
            encrypt_text(keys().encryption_public_pem(), &text),
            Err(CryptoError::MessageTooLong { .. })
        ));
    }
}
