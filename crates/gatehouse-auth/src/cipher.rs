//! At-rest encryption using AES-256-GCM.
//!
//! Ciphertexts are `base64(nonce || ciphertext)`, so a stored value carries
//! everything needed to decrypt it except the key.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;

use crate::AuthResult;
use crate::error::AuthError;

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (256 bits)
pub const KEY_SIZE: usize = 32;

/// Symmetric encryption of stored secrets.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> AuthResult<String>;

    fn decrypt(&self, ciphertext: &str) -> AuthResult<Vec<u8>>;
}

/// AES-256-GCM cipher with a random nonce per message.
#[derive(Clone)]
pub struct AeadCipher {
    cipher: Aes256Gcm,
}

impl AeadCipher {
    /// Creates a cipher from a 32-byte key.
    pub fn new(key: &[u8]) -> AuthResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| AuthError::crypto(format!("Failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    /// Creates a cipher from a base64-encoded 32-byte key.
    pub fn from_base64(key: &str) -> AuthResult<Self> {
        let bytes = BASE64
            .decode(key)
            .map_err(|e| AuthError::crypto(format!("Invalid key base64: {e}")))?;
        if bytes.len() != KEY_SIZE {
            return Err(AuthError::crypto(format!(
                "Invalid key size: expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Self::new(&bytes)
    }

    /// Generates a new random key, base64-encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }
}

impl std::fmt::Debug for AeadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadCipher").finish_non_exhaustive()
    }
}

impl Cipher for AeadCipher {
    fn encrypt(&self, plaintext: &[u8]) -> AuthResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| AuthError::crypto(format!("Encryption failed: {e}")))?;

        let mut message = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        message.extend_from_slice(&nonce_bytes);
        message.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(message))
    }

    fn decrypt(&self, ciphertext: &str) -> AuthResult<Vec<u8>> {
        let message = BASE64
            .decode(ciphertext)
            .map_err(|e| AuthError::crypto(format!("Invalid ciphertext base64: {e}")))?;

        if message.len() < NONCE_SIZE {
            return Err(AuthError::crypto("Ciphertext too short"));
        }
        let (nonce_bytes, body) = message.split_at(NONCE_SIZE);

        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|e| AuthError::crypto(format!("Decryption failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = AeadCipher::from_base64(&AeadCipher::generate_key()).unwrap();
        let sealed = cipher.encrypt(b"{\"kid\":\"k1\"}").unwrap();

        assert_ne!(sealed.as_bytes(), b"{\"kid\":\"k1\"}");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), b"{\"kid\":\"k1\"}");
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = AeadCipher::from_base64(&AeadCipher::generate_key()).unwrap();
        let b = AeadCipher::from_base64(&AeadCipher::generate_key()).unwrap();

        let sealed = a.encrypt(b"secret").unwrap();
        assert!(b.decrypt(&sealed).is_err());
    }

    #[test]
    fn test_invalid_key_size() {
        assert!(AeadCipher::from_base64(&BASE64.encode([0u8; 16])).is_err());
        assert!(AeadCipher::new(&[0u8; 5]).is_err());
    }
}
