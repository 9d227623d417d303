use std::collections::BTreeMap;

use super::anonymous::AnonymousIdentityResolver;
use super::exchange_keys::ExchangeKeyResolver;
use super::blocking;
use crate::actor::{ActorId, DataOwner, KeyRing};
use crate::crypto::Secret;
use crate::entity::{
    union_edges, Delegation, DelegationMap, EncryptionMetadata, Entity, ValidationError,
};
use crate::error::AccessError;
use crate::merge::Mergeable;
use crate::store::DocumentStore;

/// Which of the three edge maps of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKind {
    /// `delegations`: access to the entity itself
    Delegation,
    /// `encryption_keys`: the key of `encrypted_self`
    EncryptionKey,
    /// `crypted_foreign_keys`: the parent link
    ForeignKey,
}

impl SecretKind {
    pub const ALL: [SecretKind; 3] = [
        SecretKind::Delegation,
        SecretKind::EncryptionKey,
        SecretKind::ForeignKey,
    ];

    fn edges(self, meta: &EncryptionMetadata) -> &DelegationMap {
        match self {
            SecretKind::Delegation => &meta.delegations,
            SecretKind::EncryptionKey => &meta.encryption_keys,
            SecretKind::ForeignKey => &meta.crypted_foreign_keys,
        }
    }

    fn edges_mut(self, meta: &mut EncryptionMetadata) -> &mut DelegationMap {
        match self {
            SecretKind::Delegation => &mut meta.delegations,
            SecretKind::EncryptionKey => &mut meta.encryption_keys,
            SecretKind::ForeignKey => &mut meta.crypted_foreign_keys,
        }
    }
}

/// Delegation edges of an entity and how to open them
#[derive(Debug, Clone)]
pub struct DelegationGraph<S> {
    store: S,
    resolver: ExchangeKeyResolver,
    anonymous: AnonymousIdentityResolver<S>,
}

impl<S: DocumentStore> DelegationGraph<S> {
    pub fn new(store: S, resolver: ExchangeKeyResolver) -> Self {
        Self {
            anonymous: AnonymousIdentityResolver::new(store.clone()),
            store,
            resolver,
        }
    }

    pub fn secrets_for(meta: &EncryptionMetadata, kind: SecretKind) -> &DelegationMap {
        kind.edges(meta)
    }

    /// Union of two edge sets, by owner key
    pub fn merge(mine: &EncryptionMetadata, theirs: &EncryptionMetadata) -> EncryptionMetadata {
        mine.merge(theirs)
    }

    pub fn merge_edges(mine: &DelegationMap, theirs: &DelegationMap) -> DelegationMap {
        union_edges(mine, theirs)
    }

    /// Insert an edge under `owner_key`, returning the updated entity
    pub fn add_edge<T: Entity>(
        entity: &T,
        kind: SecretKind,
        owner_key: &str,
        edge: Delegation,
    ) -> Result<T, AccessError> {
        let mut updated = entity.clone();
        let meta = updated.encryption_mut().ok_or_else(|| ValidationError::Invalid {
            entity_type: T::ENTITY_TYPE,
            id: entity.id().to_string(),
            reason: "entity type cannot be shared".to_string(),
        })?;
        kind.edges_mut(meta)
            .entry(owner_key.to_string())
            .or_default()
            .insert(edge);
        Ok(updated)
    }

    /// Share `secret` from `from` to `to`, encrypted with their exchange key
    pub fn add_delegation<T: Entity>(
        entity: &T,
        kind: SecretKind,
        from: &ActorId,
        to: &ActorId,
        exchange_key: &Secret,
        secret: &[u8],
    ) -> Result<T, AccessError> {
        let edge = Delegation::explicit(from.clone(), to.clone(), exchange_key.encrypt_hex(secret)?);
        Self::add_edge(entity, kind, to.as_str(), edge)
    }

    /// Share `secret` under an opaque delegation key
    pub fn add_anonymous_delegation<T: Entity>(
        entity: &T,
        kind: SecretKind,
        delegation_key: &str,
        exchange_key: &Secret,
        secret: &[u8],
    ) -> Result<T, AccessError> {
        let edge = Delegation::anonymous(exchange_key.encrypt_hex(secret)?);
        Self::add_edge(entity, kind, delegation_key, edge)
    }

    /// Every distinct secret of `kind` on `entity` that `keys` can open
    ///
    /// Explicit edges are only considered for a known `requester`, either
    /// addressed to them or created by them. Anonymous edges are tried
    /// through their exchange data with `keys` alone.
    pub async fn decrypt_secrets<T: Entity>(
        &self,
        entity: &T,
        kind: SecretKind,
        requester: Option<&ActorId>,
        keys: &KeyRing,
    ) -> Result<Vec<Vec<u8>>, AccessError> {
        let meta = entity.encryption().ok_or(AccessError::Forbidden)?;
        let edges = kind.edges(meta);
        let mut secrets: Vec<Vec<u8>> = Vec::new();

        if let Some(requester) = requester {
            let explicit: Vec<&Delegation> = edges
                .iter()
                .flat_map(|(owner_key, set)| {
                    set.iter().filter(move |edge| {
                        !edge.is_anonymous()
                            && (owner_key == requester.as_str()
                                || edge.owner.as_ref() == Some(requester))
                    })
                })
                .collect();
            if !explicit.is_empty() {
                let holder: DataOwner = self.store.load_entity(requester.as_str()).await?;
                let mut owners: BTreeMap<ActorId, DataOwner> = BTreeMap::new();
                for edge in explicit {
                    let (Some(owner_id), Some(delegate)) = (&edge.owner, &edge.delegated_to) else {
                        continue;
                    };
                    if !owners.contains_key(owner_id) {
                        match self.store.load_entity::<DataOwner>(owner_id.as_str()).await {
                            Ok(owner) => {
                                owners.insert(owner_id.clone(), owner);
                            }
                            Err(e) if e.is_not_found() => {
                                tracing::debug!("delegation owner {} is gone", owner_id);
                                continue;
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                    let Some(owner) = owners.get(owner_id).cloned() else {
                        continue;
                    };
                    let resolver = self.resolver.clone();
                    let (delegate, holder, keys) = (delegate.clone(), holder.clone(), keys.clone());
                    let exchange_keys =
                        blocking(move || resolver.resolve_all(&owner, &delegate, &holder, &keys))
                            .await?;
                    secrets.extend(
                        exchange_keys
                            .iter()
                            .filter_map(|k| k.decrypt_hex(&edge.key).ok()),
                    );
                }
            }
        }

        for (delegation_key, set) in edges {
            let anonymous: Vec<&Delegation> = set.iter().filter(|e| e.is_anonymous()).collect();
            if anonymous.is_empty() {
                continue;
            }
            let resolved = match self.anonymous.exchange_key_for(delegation_key, keys).await {
                Ok(resolved) => resolved,
                Err(AccessError::NotFound(_) | AccessError::Unresolvable) => continue,
                Err(e) => return Err(e),
            };
            secrets.extend(
                anonymous
                    .iter()
                    .filter_map(|edge| resolved.exchange_key.decrypt_hex(&edge.key).ok()),
            );
        }

        let mut distinct: Vec<Vec<u8>> = Vec::with_capacity(secrets.len());
        for secret in secrets {
            if !distinct.contains(&secret) {
                distinct.push(secret);
            }
        }
        if distinct.is_empty() {
            tracing::debug!("no {:?} edge of {} opens", kind, entity.id());
            return Err(AccessError::Forbidden);
        }
        Ok(distinct)
    }

    pub async fn decrypt_secret<T: Entity>(
        &self,
        entity: &T,
        kind: SecretKind,
        requester: Option<&ActorId>,
        keys: &KeyRing,
    ) -> Result<Vec<u8>, AccessError> {
        self.decrypt_secrets(entity, kind, requester, keys)
            .await?
            .into_iter()
            .next()
            .ok_or(AccessError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Patient;
    use crate::store::MemoryDocumentStore;

    type Graph = DelegationGraph<MemoryDocumentStore>;

    #[test]
    fn test_add_edge_is_copy_with_replacement() {
        let patient = Patient::new("p");
        let key = Secret::generate();
        let shared = Graph::add_delegation(
            &patient,
            SecretKind::Delegation,
            &"a".into(),
            &"b".into(),
            &key,
            b"sfk",
        )
        .unwrap();
        assert!(patient.encryption.delegations.is_empty());
        let edges = Graph::secrets_for(&shared.encryption, SecretKind::Delegation);
        let edge = edges["b"].iter().next().unwrap();
        assert_eq!(key.decrypt_hex(&edge.key).unwrap(), b"sfk");
    }

    #[test]
    fn test_non_shareable_entity_rejected() {
        let owner = DataOwner::new(
            "a".into(),
            crate::actor::DataOwnerKind::Device,
            &crate::crypto::SecretKey::generate().public(),
        );
        let result = Graph::add_edge(
            &owner,
            SecretKind::Delegation,
            "b",
            Delegation::anonymous("00".into()),
        );
        assert!(matches!(result, Err(AccessError::Validation(_))));
    }
}
