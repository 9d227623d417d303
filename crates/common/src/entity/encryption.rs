use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::merge::{policy, Mergeable};

/// One encrypted edge granting access to a secret of an entity
///
/// Explicit edges name both participants. Anonymous edges name neither;
/// they are filed under an opaque delegation key instead of an actor id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Delegation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_to: Option<ActorId>,
    /// Hex ciphertext of the secret, encrypted with an exchange key
    pub key: String,
}

impl Delegation {
    pub fn explicit(owner: ActorId, delegated_to: ActorId, key: String) -> Self {
        Delegation {
            owner: Some(owner),
            delegated_to: Some(delegated_to),
            key,
        }
    }

    pub fn anonymous(key: String) -> Self {
        Delegation {
            owner: None,
            delegated_to: None,
            key,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.owner.is_none() && self.delegated_to.is_none()
    }
}

/// Edges keyed by delegate actor id, or by delegation key when anonymous
pub type DelegationMap = BTreeMap<String, BTreeSet<Delegation>>;

/// Encryption fields carried by every encryptable entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    /// Plaintext links to children, readable by anyone with the entity
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub secret_foreign_keys: BTreeSet<String>,
    /// Encrypted link to the parent entity
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub crypted_foreign_keys: DelegationMap,
    /// Access to the entity itself
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub delegations: DelegationMap,
    /// Access to the key of `encrypted_self`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub encryption_keys: DelegationMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_self: Option<String>,
}

pub(crate) fn union_edges(mine: &DelegationMap, theirs: &DelegationMap) -> DelegationMap {
    policy::union_map_with(mine, theirs, policy::union)
}

impl Mergeable for EncryptionMetadata {
    fn merge(&self, other: &Self) -> Self {
        EncryptionMetadata {
            secret_foreign_keys: policy::union(&self.secret_foreign_keys, &other.secret_foreign_keys),
            crypted_foreign_keys: union_edges(&self.crypted_foreign_keys, &other.crypted_foreign_keys),
            delegations: union_edges(&self.delegations, &other.delegations),
            encryption_keys: union_edges(&self.encryption_keys, &other.encryption_keys),
            encrypted_self: policy::prefer_mine(&self.encrypted_self, &other.encrypted_self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_union_by_owner_key() {
        let mut mine = EncryptionMetadata::default();
        mine.delegations.entry("b".into()).or_default().insert(Delegation::explicit(
            "a".into(),
            "b".into(),
            "01".into(),
        ));
        let mut theirs = EncryptionMetadata::default();
        theirs.delegations.entry("b".into()).or_default().insert(Delegation::explicit(
            "c".into(),
            "b".into(),
            "02".into(),
        ));
        theirs
            .delegations
            .entry("dk".into())
            .or_default()
            .insert(Delegation::anonymous("03".into()));

        let merged = mine.merge(&theirs);
        assert_eq!(merged.delegations["b"].len(), 2);
        assert!(merged.delegations["dk"].iter().all(Delegation::is_anonymous));
        assert_eq!(merged.merge(&merged), merged);
    }
}
