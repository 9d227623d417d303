//! # Access control
//!
//! [`AccessController`] is the entry point. It answers whether an actor can
//! read an entity, shares entities with other actors, and writes entities
//! through the [`ConflictMerger`].
//!
//! Sharing always adds edges. An edge once granted survives every merge, so
//! access cannot be revoked without re-keying the entity.

mod anonymous;
mod exchange_keys;
mod graph;

pub use anonymous::{AnonymousIdentityResolver, ResolvedExchange, SecureDelegation};
pub use exchange_keys::ExchangeKeyResolver;
pub use graph::{DelegationGraph, SecretKind};

use crate::actor::{ActorId, DataOwner, KeyMaterial, KeyRing};
use crate::context::RequestContext;
use crate::crypto::Secret;
use crate::entity::{Entity, ValidationError};
use crate::error::AccessError;
use crate::merge::{ConflictMerger, Mergeable, MergerConfig};
use crate::store::DocumentStore;

/// Run CPU-bound key work off the async executor
pub(crate) async fn blocking<F, R>(f: F) -> Result<R, AccessError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AccessError::Internal(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct AccessController<S> {
    store: S,
    resolver: ExchangeKeyResolver,
    graph: DelegationGraph<S>,
    anonymous: AnonymousIdentityResolver<S>,
    merger: ConflictMerger<S>,
}

impl<S: DocumentStore> AccessController<S> {
    pub fn new(store: S, config: MergerConfig) -> Self {
        Self::with_key_material(store, config, KeyMaterial::new())
    }

    /// Share a recovery cache with other controllers
    pub fn with_key_material(store: S, config: MergerConfig, material: KeyMaterial) -> Self {
        let resolver = ExchangeKeyResolver::new(material);
        Self {
            graph: DelegationGraph::new(store.clone(), resolver.clone()),
            anonymous: AnonymousIdentityResolver::new(store.clone()),
            merger: ConflictMerger::new(store.clone(), config),
            resolver,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn graph(&self) -> &DelegationGraph<S> {
        &self.graph
    }

    pub fn resolver(&self) -> &ExchangeKeyResolver {
        &self.resolver
    }

    pub fn anonymous(&self) -> &AnonymousIdentityResolver<S> {
        &self.anonymous
    }

    pub fn merger(&self) -> &ConflictMerger<S> {
        &self.merger
    }

    /// Whether `actor`, or an anonymous holder of `keys`, can read `entity`
    pub async fn can_decrypt<T: Entity>(
        &self,
        entity: &T,
        actor: Option<&ActorId>,
        keys: &KeyRing,
    ) -> bool {
        self.graph
            .decrypt_secret(entity, SecretKind::Delegation, actor, keys)
            .await
            .is_ok()
    }

    /// Key of the entity's `encrypted_self`
    pub async fn entity_key<T: Entity>(
        &self,
        entity: &T,
        actor: Option<&ActorId>,
        keys: &KeyRing,
    ) -> Result<Secret, AccessError> {
        self.entity_keys(entity, actor, keys)
            .await
            .and_then(|keys| keys.into_iter().next().ok_or(AccessError::Forbidden))
            .map_err(AccessError::external)
    }

    async fn entity_keys<T: Entity>(
        &self,
        entity: &T,
        actor: Option<&ActorId>,
        keys: &KeyRing,
    ) -> Result<Vec<Secret>, AccessError> {
        let secrets = self
            .graph
            .decrypt_secrets(entity, SecretKind::EncryptionKey, actor, keys)
            .await?;
        Ok(secrets
            .iter()
            .filter_map(|s| Secret::from_slice(s).ok())
            .collect())
    }

    /// Plaintext of the entity's `encrypted_self`
    pub async fn decrypt_entity<T: Entity>(
        &self,
        entity: &T,
        actor: Option<&ActorId>,
        keys: &KeyRing,
    ) -> Result<Vec<u8>, AccessError> {
        self.open_encrypted_self(entity, actor, keys)
            .await
            .map_err(AccessError::external)
    }

    async fn open_encrypted_self<T: Entity>(
        &self,
        entity: &T,
        actor: Option<&ActorId>,
        keys: &KeyRing,
    ) -> Result<Vec<u8>, AccessError> {
        let encrypted = entity
            .encryption()
            .and_then(|meta| meta.encrypted_self.clone())
            .ok_or_else(|| AccessError::NotFound(format!("{}/encrypted_self", entity.id())))?;
        let candidates = self.entity_keys(entity, actor, keys).await?;
        candidates
            .iter()
            .find_map(|key| key.decrypt_hex(&encrypted).ok())
            .ok_or(AccessError::DecryptionFailed)
    }

    /// The secret of `kind` on `entity`, e.g. the parent id behind
    /// `crypted_foreign_keys`
    pub async fn decrypt_secret<T: Entity>(
        &self,
        entity: &T,
        kind: SecretKind,
        actor: Option<&ActorId>,
        keys: &KeyRing,
    ) -> Result<Vec<u8>, AccessError> {
        self.graph
            .decrypt_secret(entity, kind, actor, keys)
            .await
            .map_err(AccessError::external)
    }

    /// Set up the edges of a new entity for the actor of `ctx`
    ///
    /// Creates a secret foreign key, an entity key encrypting `plaintext`
    /// into `encrypted_self`, and a parent link when `parent_id` is given.
    /// All three are delegated from the actor to itself. The entity is
    /// returned unsaved.
    pub async fn initialize_encryption<T: Entity>(
        &self,
        ctx: &RequestContext,
        entity: T,
        keys: &KeyRing,
        plaintext: Option<&[u8]>,
        parent_id: Option<&str>,
    ) -> Result<T, AccessError> {
        let owner: DataOwner = self.store.load_entity(ctx.actor_id.as_str()).await?;
        let exchange_key = self.exchange_key_with(ctx, &owner, &owner, keys).await?;
        let me = &ctx.actor_id;

        let secret_foreign_key = uuid::Uuid::new_v4().to_string();
        let mut entity = DelegationGraph::<S>::add_delegation(
            &entity,
            SecretKind::Delegation,
            me,
            me,
            &exchange_key,
            secret_foreign_key.as_bytes(),
        )?;

        let entity_key = Secret::generate();
        entity = DelegationGraph::<S>::add_delegation(
            &entity,
            SecretKind::EncryptionKey,
            me,
            me,
            &exchange_key,
            entity_key.bytes(),
        )?;

        if let Some(parent_id) = parent_id {
            entity = DelegationGraph::<S>::add_delegation(
                &entity,
                SecretKind::ForeignKey,
                me,
                me,
                &exchange_key,
                parent_id.as_bytes(),
            )?;
        }

        let id = entity.id().to_string();
        let meta = entity.encryption_mut().ok_or_else(|| ValidationError::Invalid {
            entity_type: T::ENTITY_TYPE,
            id,
            reason: "entity type cannot be shared".to_string(),
        })?;
        meta.secret_foreign_keys.insert(secret_foreign_key);
        if let Some(plaintext) = plaintext {
            meta.encrypted_self = Some(entity_key.encrypt_hex(plaintext)?);
        }
        Ok(entity)
    }

    /// Share `entity` from the actor of `ctx` with `to`
    ///
    /// Every secret the granting actor can open is re-encrypted for `to`.
    /// With `as_anonymous_delegate` the edges are filed under a fresh
    /// delegation key and neither participant appears on the entity.
    /// Auxiliary documents (exchange keys, exchange data) are saved; the
    /// returned entity is not.
    pub async fn grant_access<T: Entity>(
        &self,
        ctx: &RequestContext,
        entity: &T,
        keys: &KeyRing,
        to: &ActorId,
        as_anonymous_delegate: bool,
    ) -> Result<T, AccessError> {
        let from = &ctx.actor_id;
        let mut shared: Vec<(SecretKind, Vec<Vec<u8>>)> = Vec::new();
        for kind in SecretKind::ALL {
            match self.graph.decrypt_secrets(entity, kind, Some(from), keys).await {
                Ok(secrets) => shared.push((kind, secrets)),
                Err(AccessError::Forbidden) if kind != SecretKind::Delegation => {}
                Err(e) => return Err(e.external()),
            }
        }

        let granter: DataOwner = self.store.load_entity(from.as_str()).await?;
        let delegate: DataOwner = self.store.load_entity(to.as_str()).await?;
        let mut updated = entity.clone();

        if as_anonymous_delegate {
            let delegation = AnonymousIdentityResolver::<S>::create_secure_delegation(
                &granter,
                &delegate,
                T::ENTITY_TYPE,
            )?;
            self.anonymous.store_secure_delegation(ctx, &delegation).await?;
            for (kind, secrets) in &shared {
                for secret in secrets {
                    updated = DelegationGraph::<S>::add_anonymous_delegation(
                        &updated,
                        *kind,
                        &delegation.delegation_key,
                        &delegation.exchange_key,
                        secret,
                    )?;
                }
            }
            tracing::info!("granted anonymous access to {} {}", T::ENTITY_TYPE, entity.id());
        } else {
            let exchange_key = self.exchange_key_with(ctx, &granter, &delegate, keys).await?;
            for (kind, secrets) in &shared {
                for secret in secrets {
                    updated = DelegationGraph::<S>::add_delegation(
                        &updated,
                        *kind,
                        from,
                        to,
                        &exchange_key,
                        secret,
                    )?;
                }
            }
            tracing::info!(
                "granted {} access to {} {}",
                to,
                T::ENTITY_TYPE,
                entity.id()
            );
        }
        Ok(updated)
    }

    pub async fn grant_access_and_save<T: Entity>(
        &self,
        ctx: &RequestContext,
        entity: &T,
        keys: &KeyRing,
        to: &ActorId,
        as_anonymous_delegate: bool,
    ) -> Result<T, AccessError> {
        let updated = self
            .grant_access(ctx, entity, keys, to, as_anonymous_delegate)
            .await?;
        self.save(ctx, updated).await
    }

    /// Delegations only ever grow; removing access needs a new entity key
    pub fn revoke_is_not_supported(&self) -> AccessError {
        AccessError::RevocationNotSupported
    }

    pub fn revoke_access<T: Entity>(&self, _entity: &T, _actor: &ActorId) -> Result<T, AccessError> {
        Err(self.revoke_is_not_supported())
    }

    pub fn merge_concurrent_writes<T: Mergeable>(&self, mine: &T, theirs: &T) -> T {
        ConflictMerger::<S>::merge(mine, theirs)
    }

    pub async fn resolve_conflicts<T: Entity>(&self, id: &str) -> Result<T, AccessError> {
        Ok(self.merger.resolve(id).await?)
    }

    pub async fn load<T: Entity>(&self, id: &str) -> Result<T, AccessError> {
        Ok(self.store.load_entity(id).await?)
    }

    /// Validate and write an entity, merging over concurrent writes
    pub async fn save<T: Entity>(&self, ctx: &RequestContext, entity: T) -> Result<T, AccessError> {
        let entity = entity.validate_for_store(ctx)?;
        Ok(self.merger.save(entity).await?)
    }

    pub async fn soft_delete<T: Entity>(&self, ctx: &RequestContext, id: &str) -> Result<T, AccessError> {
        let mut entity: T = self.load(id).await?;
        entity.meta_mut().deletion_date = Some(ctx.now);
        self.save(ctx, entity).await
    }

    pub async fn purge(&self, id: &str) -> Result<(), AccessError> {
        self.store.purge(id).await?;
        tracing::info!("purged {}", id);
        Ok(())
    }

    pub async fn identify_delegator(
        &self,
        delegation_key: &str,
        keys: &KeyRing,
    ) -> Result<ActorId, AccessError> {
        self.anonymous
            .identify_delegator(delegation_key, keys)
            .await
            .map_err(AccessError::external_for_anonymous)
    }

    pub async fn identify_delegate(
        &self,
        delegation_key: &str,
        keys: &KeyRing,
    ) -> Result<ActorId, AccessError> {
        self.anonymous
            .identify_delegate(delegation_key, keys)
            .await
            .map_err(AccessError::external_for_anonymous)
    }

    /// Exchange key from `owner` to `delegate`, creating and saving one if
    /// none exists yet
    async fn exchange_key_with(
        &self,
        ctx: &RequestContext,
        owner: &DataOwner,
        delegate: &DataOwner,
        keys: &KeyRing,
    ) -> Result<Secret, AccessError> {
        let resolver = self.resolver.clone();
        let (owner, delegate, keys) = (owner.clone(), delegate.clone(), keys.clone());
        let (secret, updated) =
            blocking(move || resolver.resolve_or_create(&owner, &delegate, &keys))
                .await?
                .map_err(AccessError::external)?;
        if let Some(updated) = updated {
            self.save(ctx, updated).await?;
        }
        Ok(secret)
    }
}
