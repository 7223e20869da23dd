//! Credential secret encryption (§4.2).
//!
//! A single server-held AES-256-GCM key encrypts provider secrets at rest.
//! Output is a compact colon-joined string (`version:nonce_b64:ciphertext_b64`)
//! safe to store in a text column. Simplified from
//! `GeneralBots-botserver/src/security/encryption.rs`'s envelope-encryption /
//! key-rotation `EncryptionManager` down to the one key spec.md §4.2 calls
//! for ("encrypted with...a single server-held key").

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use crate::domain::{LlmLabError, Result};

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const FORMAT_VERSION: u32 = 1;

/// The server's symmetric credential-encryption key, loaded once at startup
/// from `LLMLAB_ENCRYPTION_KEY` (§6's "Environment" section).
#[derive(Clone)]
pub struct EncryptionKey(Vec<u8>);

impl EncryptionKey {
    /// Derives a 32-byte AES key from an arbitrary-length secret via SHA-256,
    /// so operators can supply any sufficiently-random passphrase rather than
    /// exact hex-encoded key bytes.
    pub fn from_passphrase(passphrase: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        Self(hasher.finalize().to_vec())
    }

    #[cfg(test)]
    pub fn zeroed() -> Self {
        Self(vec![0u8; KEY_SIZE])
    }
}

/// Encrypts `plaintext` into the compact storage format (§4.2: "output is
/// base64 text safe for column storage").
pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> Result<String> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(&key.0);
    let cipher = Aes256Gcm::new(cipher_key);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| LlmLabError::internal("encryption failed"))?;

    Ok(format!(
        "{FORMAT_VERSION}:{}:{}",
        BASE64.encode(nonce_bytes),
        BASE64.encode(ciphertext)
    ))
}

/// Decrypts a blob produced by [`encrypt`]. `Decrypt(Encrypt(s)) == s` for all
/// secrets (§8).
pub fn decrypt(encrypted: &str, key: &EncryptionKey) -> Result<String> {
    let mut parts = encrypted.splitn(3, ':');
    let version = parts
        .next()
        .ok_or_else(|| LlmLabError::internal("malformed ciphertext"))?;
    if version != FORMAT_VERSION.to_string() {
        return Err(LlmLabError::internal(format!(
            "unsupported encryption format version {version}"
        )));
    }
    let nonce_b64 = parts
        .next()
        .ok_or_else(|| LlmLabError::internal("malformed ciphertext"))?;
    let ciphertext_b64 = parts
        .next()
        .ok_or_else(|| LlmLabError::internal("malformed ciphertext"))?;

    let nonce_bytes = BASE64
        .decode(nonce_b64)
        .map_err(|e| LlmLabError::internal(format!("invalid nonce: {e}")))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(LlmLabError::internal("invalid nonce length"));
    }
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| LlmLabError::internal(format!("invalid ciphertext: {e}")))?;

    let cipher_key = Key::<Aes256Gcm>::from_slice(&key.0);
    let cipher = Aes256Gcm::new(cipher_key);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| LlmLabError::internal("decryption failed — wrong key or corrupted data"))?;

    String::from_utf8(plaintext).map_err(|e| LlmLabError::internal(format!("invalid utf-8: {e}")))
}

/// Masks a secret for safe display (§A.6): first 4 chars, then a fixed mask.
pub fn mask(secret: &str) -> String {
    if secret.len() <= 4 {
        "*".repeat(secret.len())
    } else {
        format!("{}...****", &secret[..4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_secret() {
        let key = EncryptionKey::zeroed();
        let secret = "sk-test-abc123xyz";
        let encrypted = encrypt(secret, &key).unwrap();
        assert_ne!(encrypted, secret);
        assert_eq!(decrypt(&encrypted, &key).unwrap(), secret);
    }

    #[test]
    fn passphrase_derives_usable_key() {
        let key = EncryptionKey::from_passphrase("correct horse battery staple");
        let encrypted = encrypt("hello", &key).unwrap();
        assert_eq!(decrypt(&encrypted, &key).unwrap(), "hello");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key_a = EncryptionKey::from_passphrase("a");
        let key_b = EncryptionKey::from_passphrase("b");
        let encrypted = encrypt("hello", &key_a).unwrap();
        assert!(decrypt(&encrypted, &key_b).is_err());
    }

    #[test]
    fn masks_short_and_long_secrets() {
        assert_eq!(mask("ab"), "**");
        assert_eq!(mask("sk-abc123xyz"), "sk-a...****");
    }
}
