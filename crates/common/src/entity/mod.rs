//! # Entities
//!
//! Stored documents and the field groups they share.
//!
//! Business entities ([`Patient`], [`HealthElement`], [`Treatment`]) embed a
//! [`DocumentMeta`], an [`AuditInfo`] and an [`EncryptionMetadata`]. The
//! anonymity documents ([`ExchangeData`], [`ExchangeDataMap`],
//! [`SecureDelegationKeyMap`]) and [`DataOwner`](crate::actor::DataOwner)
//! only embed a [`DocumentMeta`].
//!
//! Every entity is [`Mergeable`] so the store can reconcile concurrent
//! revisions of it.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::RequestContext;
use crate::merge::Mergeable;

/// Implements [`Entity`] for a business entity with `meta`, `audit` and
/// `encryption` fields
macro_rules! encryptable_entity {
    ($ty:ty, $name:literal) => {
        impl $crate::entity::Entity for $ty {
            const ENTITY_TYPE: &'static str = $name;

            fn meta(&self) -> &$crate::entity::DocumentMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::entity::DocumentMeta {
                &mut self.meta
            }

            fn audit(&self) -> Option<&$crate::entity::AuditInfo> {
                Some(&self.audit)
            }

            fn audit_mut(&mut self) -> Option<&mut $crate::entity::AuditInfo> {
                Some(&mut self.audit)
            }

            fn encryption(&self) -> Option<&$crate::entity::EncryptionMetadata> {
                Some(&self.encryption)
            }

            fn encryption_mut(&mut self) -> Option<&mut $crate::entity::EncryptionMetadata> {
                Some(&mut self.encryption)
            }
        }
    };
}

mod encryption;
mod exchange;
mod health_element;
mod meta;
mod patient;
mod treatment;

pub use encryption::{Delegation, DelegationMap, EncryptionMetadata};
pub(crate) use encryption::union_edges;
pub use exchange::{
    ExchangeData, ExchangeDataMap, ExchangeParticipants, SecureDelegationKeyMap,
    SecureDelegationPayload,
};
pub use health_element::{CareTeamMember, HealthElement, PlanOfAction};
pub use meta::{merge_identifiers, AuditInfo, CodeStub, DocumentMeta, Identifier};
pub use patient::Patient;
pub use treatment::Treatment;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is missing an id")]
    MissingId(&'static str),
    #[error("invalid {entity_type} {id}: {reason}")]
    Invalid {
        entity_type: &'static str,
        id: String,
        reason: String,
    },
}

/// A document type the store can hold
pub trait Entity:
    Mergeable + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const ENTITY_TYPE: &'static str;

    fn meta(&self) -> &DocumentMeta;

    fn meta_mut(&mut self) -> &mut DocumentMeta;

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn audit(&self) -> Option<&AuditInfo> {
        None
    }

    fn audit_mut(&mut self) -> Option<&mut AuditInfo> {
        None
    }

    /// Encryption fields, for entity types that can be shared
    fn encryption(&self) -> Option<&EncryptionMetadata> {
        None
    }

    fn encryption_mut(&mut self) -> Option<&mut EncryptionMetadata> {
        None
    }

    /// Check the entity before it is written and fill defaults from `ctx`
    fn validate_for_store(mut self, ctx: &RequestContext) -> Result<Self, ValidationError> {
        if self.meta().id.is_empty() {
            return Err(ValidationError::MissingId(Self::ENTITY_TYPE));
        }
        if let Some(audit) = self.audit_mut() {
            audit.autofix(ctx);
        }
        Ok(self)
    }
}
