//! Public key encryption of small payloads to a single actor key
//!
//! This is the asymmetric primitive of the access model. It seals AES
//! exchange keys once per recipient key pair, transfer keys for old private
//! keys, and exchange data ids in exchange data maps.
//!
//! # Protocol Overview
//!
//! To seal a payload for a recipient:
//! 1. **Generate ephemeral keypair**: Create a temporary Ed25519 keypair
//! 2. **Perform ECDH**: Convert keys to X25519 and compute shared secret
//! 3. **Derive key**: SHA-256 over the shared secret and both public keys
//! 4. **Encrypt**: AES-256-GCM over the payload with the derived key
//!
//! # Wire Format
//!
//! ```text
//! [ ephemeral_pubkey: 32 bytes ][ nonce: 12 bytes ][ ciphertext + tag ]
//! ```

use sha2::{Digest, Sha256};

use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
use super::secret::{Secret, SecretError, NONCE_SIZE, TAG_SIZE};

/// Fixed overhead a sealed box adds to its payload
pub const SEALED_OVERHEAD: usize = PUBLIC_KEY_SIZE + NONCE_SIZE + TAG_SIZE;

const KDF_DOMAIN: &[u8] = b"carelock sealed box v1";

/// Errors that can occur while sealing or opening a box
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("seal error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

impl SealError {
    /// Whether the failure means "not for this key" rather than a broken
    /// input. Callers iterate candidate keys on this.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, SealError::Secret(SecretError::DecryptionFailed))
    }
}

/// A payload sealed to one public key
///
/// Only the holder of the matching [`SecretKey`] can open it.
///
/// ```ignore
/// let exchange_key = Secret::generate();
/// let sealed = SealedBox::seal(exchange_key.bytes(), &bob_public)?;
/// let opened = sealed.open(&bob_secret)?;
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SealedBox(Vec<u8>);

impl TryFrom<&[u8]> for SealedBox {
    type Error = SealError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < SEALED_OVERHEAD {
            return Err(SecretError::Malformed(format!(
                "sealed box too short, expected at least {}, got {}",
                SEALED_OVERHEAD,
                bytes.len()
            ))
            .into());
        }
        Ok(SealedBox(bytes.to_vec()))
    }
}

impl SealedBox {
    /// Parse a sealed box from a hexadecimal string
    pub fn from_hex(hex: &str) -> Result<Self, SealError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex).map_err(|e| SecretError::Malformed(e.to_string()))?;
        SealedBox::try_from(bytes.as_slice())
    }

    #[allow(clippy::wrong_self_convention)]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Seal `plaintext` so that only `recipient` can open it
    pub fn seal(plaintext: &[u8], recipient: &PublicKey) -> Result<Self, SealError> {
        let ephemeral_private = SecretKey::generate();
        let ephemeral_public = ephemeral_private.public();

        let shared_secret = ephemeral_private
            .to_x25519()
            .diffie_hellman(&recipient.to_x25519()?);
        if !shared_secret.was_contributory() {
            return Err(anyhow::anyhow!("recipient key produced a non-contributory exchange").into());
        }

        let key = derive_key(shared_secret.as_bytes(), &ephemeral_public, recipient);
        let ciphertext = key.encrypt(plaintext)?;

        let mut out = Vec::with_capacity(PUBLIC_KEY_SIZE + ciphertext.len());
        out.extend_from_slice(&ephemeral_public.to_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(SealedBox(out))
    }

    /// Open the box with the recipient's private key
    ///
    /// # Errors
    ///
    /// A `DecryptionFailed` secret error when the box was sealed for another
    /// key or tampered with; a key error if the embedded ephemeral key is not
    /// a valid point.
    pub fn open(&self, recipient_secret: &SecretKey) -> Result<Vec<u8>, SealError> {
        let ephemeral_public = PublicKey::try_from(&self.0[..PUBLIC_KEY_SIZE])?;

        let shared_secret = recipient_secret
            .to_x25519()
            .diffie_hellman(&ephemeral_public.to_x25519()?);

        let key = derive_key(
            shared_secret.as_bytes(),
            &ephemeral_public,
            &recipient_secret.public(),
        );
        Ok(key.decrypt(&self.0[PUBLIC_KEY_SIZE..])?)
    }
}

/// Seal and hex encode in one step
pub fn seal_hex(plaintext: &[u8], recipient: &PublicKey) -> Result<String, SealError> {
    Ok(SealedBox::seal(plaintext, recipient)?.to_hex())
}

/// Parse and open a hex encoded sealed box
pub fn open_hex(sealed: &str, recipient_secret: &SecretKey) -> Result<Vec<u8>, SealError> {
    SealedBox::from_hex(sealed)?.open(recipient_secret)
}

fn derive_key(shared: &[u8; 32], ephemeral: &PublicKey, recipient: &PublicKey) -> Secret {
    let mut hasher = Sha256::new();
    hasher.update(KDF_DOMAIN);
    hasher.update(shared);
    hasher.update(ephemeral.to_bytes());
    hasher.update(recipient.to_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    Secret::from(digest)
}
