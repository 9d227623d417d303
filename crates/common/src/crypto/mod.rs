//! Cryptographic primitives for the access model
//!
//! - **Actor keys**: Ed25519 keypairs (`SecretKey`/`PublicKey`) identified by
//!   their [`Fingerprint`]
//! - **Symmetric encryption**: AES-256-GCM [`Secret`]s, used both as AES
//!   exchange keys between two actors and as per-entity keys
//! - **Sealing**: ECDH-based [`SealedBox`] encryption of small payloads to a
//!   single public key
//! - **Recovery**: Shamir partitions of a private key held by notaries
//!
//! # Security Model
//!
//! ## Exchange keys
//! Two actors share an AES exchange key. It is stored on the delegator's
//! document, sealed once for every (delegator key, delegate key) pair, so
//! either party can open it with any of their current private keys.
//!
//! ## Entity keys
//! Every entity has its own [`Secret`]. The secret never leaves the client in
//! the clear: it is stored only as delegation edges, each encrypted with an
//! exchange key.

mod keys;
mod sealed;
mod secret;
pub mod shamir;

pub use keys::{Fingerprint, KeyError, PublicKey, SecretKey, FINGERPRINT_HEX_LEN};
pub use sealed::{open_hex, seal_hex, SealError, SealedBox, SEALED_OVERHEAD};
pub use secret::{Secret, SecretError, NONCE_SIZE, SECRET_SIZE};
