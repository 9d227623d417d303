//! Symmetric encryption using AES-256-GCM
//!
//! A [`Secret`] is either an AES exchange key shared between two actors or
//! the per-entity key that protects `encrypted_self`. Ciphertext layout is
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`; on documents it is
//! carried hex encoded.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;
/// Size of an AES-256 key in bytes
pub const SECRET_SIZE: usize = 32;

/// Errors that can occur during encryption/decryption
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret error: {0}")]
    Default(#[from] anyhow::Error),
    /// Wrong key or tampered ciphertext. Deliberately carries no detail.
    #[error("decryption failed")]
    DecryptionFailed,
    /// Ciphertext that cannot even be parsed (bad hex, truncated)
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
}

/// A 256-bit AES key
#[derive(PartialEq, Eq, Clone)]
pub struct Secret([u8; SECRET_SIZE]);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Secret {
    /// Generate a new random secret using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Create a secret from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        if data.len() != SECRET_SIZE {
            return Err(anyhow::anyhow!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )
            .into());
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Encrypt data with a fresh random nonce
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.bytes()));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt data produced by [`Secret::encrypt`]
    ///
    /// # Errors
    ///
    /// `Malformed` if the input is too short to hold a nonce and tag,
    /// `DecryptionFailed` if authentication fails.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(SecretError::Malformed(format!(
                "expected at least {} bytes, got {}",
                NONCE_SIZE + TAG_SIZE,
                data.len()
            )));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.bytes()));
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|_| SecretError::DecryptionFailed)
    }

    /// Encrypt and hex encode, the form ciphertext takes on documents
    pub fn encrypt_hex(&self, data: &[u8]) -> Result<String, SecretError> {
        Ok(hex::encode(self.encrypt(data)?))
    }

    pub fn decrypt_hex(&self, data: &str) -> Result<Vec<u8>, SecretError> {
        let bytes = hex::decode(data).map_err(|e| SecretError::Malformed(e.to_string()))?;
        self.decrypt(&bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_secret_encrypt_decrypt() {
        let secret = Secret::generate();
        let data = b"hello world, this is a test message for encryption";

        let encrypted = secret.encrypt(data).unwrap();
        let decrypted = secret.decrypt(&encrypted).unwrap();

        assert_eq!(data.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_key_is_decryption_failure() {
        let encrypted = Secret::generate().encrypt(b"patient note").unwrap();
        let result = Secret::generate().decrypt(&encrypted);
        assert!(matches!(result, Err(SecretError::DecryptionFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let secret = Secret::generate();
        let mut encrypted = secret.encrypt(b"test data for integrity check").unwrap();
        encrypted[NONCE_SIZE + 3] ^= 0xFF;
        assert!(matches!(
            secret.decrypt(&encrypted),
            Err(SecretError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_truncated_and_bad_hex_are_malformed() {
        let secret = Secret::generate();
        assert!(matches!(
            secret.decrypt(&[0u8; 5]),
            Err(SecretError::Malformed(_))
        ));
        assert!(matches!(
            secret.decrypt_hex("not hex"),
            Err(SecretError::Malformed(_))
        ));
    }

    #[test]
    fn test_secret_size_validation() {
        assert!(Secret::from_slice(&[1u8; 16]).is_err());
        assert!(Secret::from_slice(&[1u8; 64]).is_err());
        assert!(Secret::from_slice(&[1u8; SECRET_SIZE]).is_ok());
    }

    #[test]
    fn test_empty_data_encryption() {
        let secret = Secret::generate();
        let hex = secret.encrypt_hex(b"").unwrap();
        assert_eq!(secret.decrypt_hex(&hex).unwrap(), Vec::<u8>::new());
    }
}
