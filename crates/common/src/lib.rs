/**
 * Key-holding actors: the key bookkeeping on actor
 *  documents, private key recovery and the key ring
 *  a client presents.
 */
pub mod actor;
/**
 * Composition root of the access model: decrypting
 *  entities, granting access, explicit and anonymous
 *  delegations.
 */
pub mod access;
pub mod context;
/**
 * Cryptographic types and operations.
 *  - Actor key pairs and fingerprints
 *  - AES exchange and entity keys
 *  - Sealing to a public key
 *  - Shamir partitions of private keys
 */
pub mod crypto;
/**
 * Stored documents: the shared field groups
 *  (meta, audit, encryption) and every entity type.
 */
pub mod entity;
pub mod error;
/**
 * Field-level conflict merge and the state machine
 *  resolving sibling revisions reported by the store.
 */
pub mod merge;
/**
 * Document store boundary and an in-memory
 *  multi-revision implementation.
 */
pub mod store;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::access::{AccessController, SecretKind};
    pub use crate::actor::{ActorId, DataOwner, DataOwnerKind, KeyMaterial, KeyRing};
    pub use crate::context::RequestContext;
    pub use crate::crypto::{Fingerprint, PublicKey, Secret, SecretKey};
    pub use crate::entity::{Entity, HealthElement, Patient, Treatment};
    pub use crate::error::AccessError;
    pub use crate::merge::{ConflictMerger, Mergeable, MergerConfig};
    pub use crate::store::{DocumentStore, MemoryDocumentStore};
    pub use crate::version::BuildInfo;
}
