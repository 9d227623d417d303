use crate::actor::{ActorId, DataOwner, KeyRing};
use crate::context::RequestContext;
use crate::crypto::{open_hex, Fingerprint, PublicKey, Secret};
use crate::entity::{
    Entity, ExchangeData, ExchangeDataMap, ExchangeParticipants, SecureDelegationKeyMap,
};
use crate::error::AccessError;
use crate::store::{DocumentStore, StoreError};

const DELEGATION_KEY_CONTEXT: &str = "carelock 2024-05 anonymous delegation key";

/// Exchange key found for a delegation key
#[derive(Debug, Clone)]
pub struct ResolvedExchange {
    pub exchange_data: ExchangeData,
    pub exchange_key: Secret,
    /// Key pair that opened the exchange data id
    pub via: Fingerprint,
}

/// Documents created for one anonymous delegation
#[derive(Debug, Clone)]
pub struct SecureDelegation {
    pub delegation_key: String,
    pub exchange_key: Secret,
    pub exchange_data: ExchangeData,
    pub exchange_data_map: ExchangeDataMap,
    pub key_map: SecureDelegationKeyMap,
}

/// Finds who is behind an anonymous delegation, for holders of the right key
///
/// Internally a missing delegation key is [`AccessError::NotFound`] and a key
/// this caller cannot open is [`AccessError::Unresolvable`]. Both collapse to
/// `Forbidden` through [`AccessError::external_for_anonymous`].
#[derive(Debug, Clone)]
pub struct AnonymousIdentityResolver<S> {
    store: S,
}

impl<S: DocumentStore> AnonymousIdentityResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Opaque edge key for an exchange key and an entity type
    pub fn delegation_key(exchange_key: &Secret, entity_type: &str) -> String {
        let mut material = exchange_key.bytes().to_vec();
        material.extend_from_slice(entity_type.as_bytes());
        hex::encode(blake3::derive_key(DELEGATION_KEY_CONTEXT, &material))
    }

    /// Recover the exchange key behind `delegation_key` with any key of `keys`
    pub async fn exchange_key_for(
        &self,
        delegation_key: &str,
        keys: &KeyRing,
    ) -> Result<ResolvedExchange, AccessError> {
        let map: ExchangeDataMap = match self.store.load_entity(delegation_key).await {
            Ok(map) => map,
            Err(StoreError::NotFound(_)) => {
                return Err(AccessError::NotFound(delegation_key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        // Open every id sealed for one of our keys before looking any up.
        let candidates: Vec<(Fingerprint, String)> = map
            .encrypted_exchange_data_ids
            .iter()
            .filter_map(|(fp, sealed)| {
                let key = keys.get(fp)?;
                let id = open_hex(sealed, key).ok()?;
                Some((fp.clone(), String::from_utf8(id).ok()?))
            })
            .collect();

        for (via, exchange_data_id) in candidates {
            let exchange_data: ExchangeData = match self.store.load_entity(&exchange_data_id).await
            {
                Ok(data) => data,
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            if let Some((_, exchange_key)) = exchange_data.open_exchange_key(keys) {
                return Ok(ResolvedExchange {
                    exchange_data,
                    exchange_key,
                    via,
                });
            }
        }
        Err(AccessError::Unresolvable)
    }

    pub async fn identify_delegator(
        &self,
        delegation_key: &str,
        keys: &KeyRing,
    ) -> Result<ActorId, AccessError> {
        Ok(self.participants(delegation_key, keys).await?.delegator)
    }

    pub async fn identify_delegate(
        &self,
        delegation_key: &str,
        keys: &KeyRing,
    ) -> Result<ActorId, AccessError> {
        let resolved = self.exchange_key_for(delegation_key, keys).await?;
        let key_map: SecureDelegationKeyMap = match self
            .store
            .load_entity(&SecureDelegationKeyMap::id_for(delegation_key))
            .await
        {
            Ok(map) => map,
            Err(StoreError::NotFound(_)) => return Err(AccessError::Unresolvable),
            Err(e) => return Err(e.into()),
        };
        key_map
            .decrypt(&resolved.exchange_key)
            .map(|payload| payload.delegate)
            .map_err(|_| AccessError::Unresolvable)
    }

    /// Both participants, as recorded in the exchange data
    pub async fn participants(
        &self,
        delegation_key: &str,
        keys: &KeyRing,
    ) -> Result<ExchangeParticipants, AccessError> {
        let resolved = self.exchange_key_for(delegation_key, keys).await?;
        resolved
            .exchange_data
            .participants(&resolved.exchange_key)
            .map_err(|_| AccessError::Unresolvable)
    }

    /// Build the documents for a new anonymous delegation from `delegator`
    /// to `delegate` on entities of `entity_type`
    pub fn create_secure_delegation(
        delegator: &DataOwner,
        delegate: &DataOwner,
        entity_type: &str,
    ) -> Result<SecureDelegation, AccessError> {
        let delegate_keys = delegate.crypto.public_keys();
        if delegate_keys.is_empty() {
            return Err(AccessError::NoSharedKey(delegate.actor_id()));
        }
        let mut recipients: Vec<PublicKey> = delegator.crypto.public_keys();
        for key in delegate_keys {
            if !recipients.contains(&key) {
                recipients.push(key);
            }
        }

        let exchange_key = Secret::generate();
        let participants = ExchangeParticipants {
            delegator: delegator.actor_id(),
            delegate: delegate.actor_id(),
        };
        let exchange_data = ExchangeData::create(
            uuid::Uuid::new_v4().to_string(),
            &participants,
            &exchange_key,
            &recipients,
        )?;
        let delegation_key = Self::delegation_key(&exchange_key, entity_type);
        let exchange_data_map =
            ExchangeDataMap::create(&delegation_key, &exchange_data.meta.id, &recipients)?;
        let key_map =
            SecureDelegationKeyMap::new(&delegation_key, participants.delegator, participants.delegate)
                .encrypt(&exchange_key)?;

        Ok(SecureDelegation {
            delegation_key,
            exchange_key,
            exchange_data,
            exchange_data_map,
            key_map,
        })
    }

    /// Persist the documents of a new anonymous delegation
    pub async fn store_secure_delegation(
        &self,
        ctx: &RequestContext,
        delegation: &SecureDelegation,
    ) -> Result<(), AccessError> {
        let exchange_data = delegation.exchange_data.clone().validate_for_store(ctx)?;
        self.store.save_entity(&exchange_data).await?;
        let map = delegation.exchange_data_map.clone().validate_for_store(ctx)?;
        self.store.save_entity(&map).await?;
        let key_map = delegation.key_map.clone().validate_for_store(ctx)?;
        self.store.save_entity(&key_map).await?;
        tracing::debug!("stored anonymous delegation {}", delegation.delegation_key);
        Ok(())
    }
}
