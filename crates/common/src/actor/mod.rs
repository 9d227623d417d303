//! # Actors
//!
//! Anything that can hold keys: healthcare parties, patients and devices.
//!
//! - [`CryptoActor`]: the key bookkeeping every data owner carries
//! - [`DataOwner`]: the stored actor document
//! - [`KeyRing`]: private keys a client presents, indexed by fingerprint
//! - [`KeyMaterial`]: lookups over actor keys plus the private key
//!   recovery cache

mod crypto_actor;
mod key_material;
mod key_ring;

pub use crypto_actor::{ActorId, CryptoActor, DataOwner, DataOwnerKind, LegacyExchangeKey};
pub use key_material::{
    EncryptedAesKey, ExchangeKeySource, KeyMaterial, KeyMaterialError, ShamirEntry,
};
pub use key_ring::KeyRing;
