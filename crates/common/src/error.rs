use std::fmt::Display;

use crate::actor::{ActorId, KeyMaterialError};
use crate::crypto::{Fingerprint, SealError, SecretError};
use crate::entity::ValidationError;
use crate::merge::MergeError;
use crate::store::StoreError;

/// Failures of the access model
///
/// Internally every branch keeps its own variant. Anything leaving the
/// library towards a caller goes through [`AccessError::external`] so that
/// "no key", "wrong key" and "unknown anonymous delegation" look the same.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden")]
    Forbidden,
    #[error("anonymous delegation could not be resolved")]
    Unresolvable,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("no shared exchange key with {0}")]
    NoSharedKey(ActorId),
    #[error("revision conflict on {0}")]
    RevisionConflict(String),
    #[error("{id} still conflicted after {attempts} merge attempts")]
    MergeRetriesExhausted { id: String, attempts: u32 },
    #[error("private key {0} is not recoverable")]
    KeyNotRecoverable(Fingerprint),
    #[error("delegations cannot be revoked, re-key the entity to remove access")]
    RevocationNotSupported,
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("malformed data: {0}")]
    Malformed(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AccessError {
    /// The error as a caller may see it
    pub fn external(self) -> Self {
        match self {
            AccessError::Unresolvable | AccessError::DecryptionFailed | AccessError::NoSharedKey(_) => {
                AccessError::Forbidden
            }
            other => other,
        }
    }

    /// Like [`AccessError::external`], also hiding whether an anonymous
    /// delegation key exists at all
    pub fn external_for_anonymous(self) -> Self {
        match self {
            AccessError::NotFound(_) => AccessError::Forbidden,
            other => other.external(),
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, AccessError::Forbidden)
    }
}

impl<E: Display> From<StoreError<E>> for AccessError {
    fn from(e: StoreError<E>) -> Self {
        match e {
            StoreError::NotFound(id) => AccessError::NotFound(id),
            StoreError::RevisionConflict(id) => AccessError::RevisionConflict(id),
            StoreError::Serialization(msg) => AccessError::Malformed(msg),
            StoreError::Provider(e) => AccessError::Store(e.to_string()),
        }
    }
}

impl<E: Display> From<MergeError<E>> for AccessError {
    fn from(e: MergeError<E>) -> Self {
        match e {
            MergeError::Store(e) => e.into(),
            MergeError::RetriesExhausted { id, attempts } => {
                AccessError::MergeRetriesExhausted { id, attempts }
            }
        }
    }
}

impl From<SecretError> for AccessError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::DecryptionFailed => AccessError::DecryptionFailed,
            SecretError::Malformed(msg) => AccessError::Malformed(msg),
            SecretError::Default(e) => AccessError::Internal(e.to_string()),
        }
    }
}

impl From<SealError> for AccessError {
    fn from(e: SealError) -> Self {
        match e {
            SealError::Secret(e) => e.into(),
            SealError::Key(e) => AccessError::Malformed(e.to_string()),
            SealError::Default(e) => AccessError::Internal(e.to_string()),
        }
    }
}

impl From<KeyMaterialError> for AccessError {
    fn from(e: KeyMaterialError) -> Self {
        match e {
            KeyMaterialError::KeyNotRecoverable(fp) => AccessError::KeyNotRecoverable(fp),
            KeyMaterialError::MissingPublicKey(id) => AccessError::NoSharedKey(id),
            KeyMaterialError::ExchangeKeyExists { delegate, .. } => AccessError::NoSharedKey(delegate),
            KeyMaterialError::Seal(e) => e.into(),
            KeyMaterialError::Secret(e) => e.into(),
            other => AccessError::Malformed(other.to_string()),
        }
    }
}
