//! Documents backing anonymous delegations
//!
//! An anonymous delegation is filed on an entity under a delegation key
//! instead of an actor id. The [`ExchangeDataMap`] stored under that key
//! tells each participant, by key fingerprint, which [`ExchangeData`] holds
//! the exchange key. The [`SecureDelegationKeyMap`] records who the
//! participants are, readable only with that exchange key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{DocumentMeta, Entity, ValidationError};
use crate::actor::{ActorId, KeyRing};
use crate::context::RequestContext;
use crate::crypto::{open_hex, seal_hex, Fingerprint, PublicKey, SealError, Secret, SecretError};
use crate::merge::{policy, Mergeable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeParticipants {
    pub delegator: ActorId,
    pub delegate: ActorId,
}

impl ExchangeParticipants {
    /// The participant that is not `me`
    pub fn counterpart(&self, me: &ActorId) -> &ActorId {
        if &self.delegator == me {
            &self.delegate
        } else {
            &self.delegator
        }
    }
}

/// An exchange key sealed for the key pairs of both participants
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeData {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    /// Key fingerprint -> exchange key sealed for that key
    #[serde(default)]
    pub exchange_key: BTreeMap<Fingerprint, String>,
    /// [`ExchangeParticipants`] encrypted with the exchange key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypted_self: String,
}

impl ExchangeData {
    pub fn create(
        id: impl Into<String>,
        participants: &ExchangeParticipants,
        exchange_key: &Secret,
        recipients: &[PublicKey],
    ) -> Result<Self, SealError> {
        let mut sealed = BTreeMap::new();
        for key in recipients {
            sealed.insert(key.fingerprint(), seal_hex(exchange_key.bytes(), key)?);
        }
        let payload = serde_json::to_vec(participants)
            .map_err(|e| SecretError::Malformed(e.to_string()))?;
        Ok(ExchangeData {
            meta: DocumentMeta::new(id),
            exchange_key: sealed,
            encrypted_self: exchange_key.encrypt_hex(&payload)?,
        })
    }

    /// Open the exchange key with any key of the ring
    ///
    /// Every copy sealed for a key of the ring is tried before one is picked.
    pub fn open_exchange_key(&self, keys: &KeyRing) -> Option<(Fingerprint, Secret)> {
        let opened: Vec<(Fingerprint, Secret)> = self
            .exchange_key
            .iter()
            .filter_map(|(fp, sealed)| {
                let key = keys.get(fp)?;
                let bytes = open_hex(sealed, key).ok()?;
                Some((fp.clone(), Secret::from_slice(&bytes).ok()?))
            })
            .collect();
        opened.into_iter().next()
    }

    pub fn participants(&self, exchange_key: &Secret) -> Result<ExchangeParticipants, SecretError> {
        let payload = exchange_key.decrypt_hex(&self.encrypted_self)?;
        serde_json::from_slice(&payload).map_err(|e| SecretError::Malformed(e.to_string()))
    }
}

impl Mergeable for ExchangeData {
    fn merge(&self, other: &Self) -> Self {
        let encrypted_self = if self.encrypted_self.is_empty() {
            other.encrypted_self.clone()
        } else {
            self.encrypted_self.clone()
        };
        ExchangeData {
            meta: self.meta.merge(&other.meta),
            exchange_key: policy::union_map(&self.exchange_key, &other.exchange_key),
            encrypted_self,
        }
    }
}

impl Entity for ExchangeData {
    const ENTITY_TYPE: &'static str = "ExchangeData";

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut DocumentMeta {
        &mut self.meta
    }

    fn validate_for_store(self, _ctx: &RequestContext) -> Result<Self, ValidationError> {
        if self.meta.id.is_empty() {
            return Err(ValidationError::MissingId(Self::ENTITY_TYPE));
        }
        if self.exchange_key.is_empty() || self.encrypted_self.is_empty() {
            return Err(ValidationError::Invalid {
                entity_type: Self::ENTITY_TYPE,
                id: self.meta.id.clone(),
                reason: "exchange key and participants are required".to_string(),
            });
        }
        Ok(self)
    }
}

/// Index from a delegation key to the exchange data it was built from
///
/// The document id is the delegation key itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeDataMap {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    /// Key fingerprint -> exchange data id sealed for that key
    #[serde(default)]
    pub encrypted_exchange_data_ids: BTreeMap<Fingerprint, String>,
}

impl ExchangeDataMap {
    pub fn create(
        delegation_key: &str,
        exchange_data_id: &str,
        recipients: &[PublicKey],
    ) -> Result<Self, SealError> {
        let mut sealed = BTreeMap::new();
        for key in recipients {
            sealed.insert(key.fingerprint(), seal_hex(exchange_data_id.as_bytes(), key)?);
        }
        Ok(ExchangeDataMap {
            meta: DocumentMeta::new(delegation_key),
            encrypted_exchange_data_ids: sealed,
        })
    }

    pub fn delegation_key(&self) -> &str {
        &self.meta.id
    }
}

impl Mergeable for ExchangeDataMap {
    fn merge(&self, other: &Self) -> Self {
        ExchangeDataMap {
            meta: self.meta.merge(&other.meta),
            encrypted_exchange_data_ids: policy::union_map(
                &self.encrypted_exchange_data_ids,
                &other.encrypted_exchange_data_ids,
            ),
        }
    }
}

impl Entity for ExchangeDataMap {
    const ENTITY_TYPE: &'static str = "ExchangeDataMap";

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut DocumentMeta {
        &mut self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureDelegationPayload {
    pub delegator: ActorId,
    pub delegate: ActorId,
}

/// Participants of one anonymous delegation, hidden behind its exchange key
///
/// `delegator` and `delegate` only hold values before [`encrypt`] is called
/// on the client. A stored map never carries them in the clear.
///
/// [`encrypt`]: SecureDelegationKeyMap::encrypt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureDelegationKeyMap {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub delegation_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegator: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_self: Option<String>,
}

impl SecureDelegationKeyMap {
    /// Document id of the map for a delegation key
    pub fn id_for(delegation_key: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"sdkm:");
        hasher.update(delegation_key.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    pub fn new(delegation_key: impl Into<String>, delegator: ActorId, delegate: ActorId) -> Self {
        let delegation_key = delegation_key.into();
        SecureDelegationKeyMap {
            meta: DocumentMeta::new(Self::id_for(&delegation_key)),
            delegation_key,
            delegator: Some(delegator),
            delegate: Some(delegate),
            encrypted_self: None,
        }
    }

    /// Move the participants into `encrypted_self` and clear them
    pub fn encrypt(mut self, exchange_key: &Secret) -> Result<Self, SecretError> {
        let (Some(delegator), Some(delegate)) = (self.delegator.take(), self.delegate.take())
        else {
            return Err(SecretError::Malformed(
                "both participants are required".to_string(),
            ));
        };
        let payload = serde_json::to_vec(&SecureDelegationPayload { delegator, delegate })
            .map_err(|e| SecretError::Malformed(e.to_string()))?;
        self.encrypted_self = Some(exchange_key.encrypt_hex(&payload)?);
        Ok(self)
    }

    pub fn decrypt(&self, exchange_key: &Secret) -> Result<SecureDelegationPayload, SecretError> {
        let encrypted = self
            .encrypted_self
            .as_deref()
            .ok_or_else(|| SecretError::Malformed("not encrypted".to_string()))?;
        let payload = exchange_key.decrypt_hex(encrypted)?;
        serde_json::from_slice(&payload).map_err(|e| SecretError::Malformed(e.to_string()))
    }
}

impl Mergeable for SecureDelegationKeyMap {
    fn merge(&self, other: &Self) -> Self {
        let encrypted_self = policy::prefer_mine(&self.encrypted_self, &other.encrypted_self);
        let (delegator, delegate) = if encrypted_self.is_some() {
            (None, None)
        } else {
            (
                policy::prefer_mine(&self.delegator, &other.delegator),
                policy::prefer_mine(&self.delegate, &other.delegate),
            )
        };
        SecureDelegationKeyMap {
            meta: self.meta.merge(&other.meta),
            delegation_key: self.delegation_key.clone(),
            delegator,
            delegate,
            encrypted_self,
        }
    }
}

impl Entity for SecureDelegationKeyMap {
    const ENTITY_TYPE: &'static str = "SecureDelegationKeyMap";

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut DocumentMeta {
        &mut self.meta
    }

    /// Rejects any map still carrying a participant in the clear, whether or
    /// not `encrypted_self` is set
    fn validate_for_store(self, _ctx: &RequestContext) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::Invalid {
            entity_type: Self::ENTITY_TYPE,
            id: self.meta.id.clone(),
            reason: reason.to_string(),
        };
        if self.meta.id.is_empty() {
            return Err(ValidationError::MissingId(Self::ENTITY_TYPE));
        }
        if self.delegator.is_some() || self.delegate.is_some() {
            return Err(invalid("delegator and delegate must be encrypted"));
        }
        if self.encrypted_self.is_none() {
            return Err(invalid("participants are missing"));
        }
        if self.meta.id != Self::id_for(&self.delegation_key) {
            return Err(invalid("id does not match the delegation key"));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecretKey;

    fn ctx() -> RequestContext {
        RequestContext::at("hcp-1".into(), 0)
    }

    #[test]
    fn test_plaintext_participants_rejected() {
        let key = Secret::generate();
        let plain = SecureDelegationKeyMap::new("dk", "a".into(), "b".into());
        assert!(plain.clone().validate_for_store(&ctx()).is_err());

        let mut leaky = plain.clone().encrypt(&key).unwrap();
        leaky.delegator = Some("a".into());
        assert!(matches!(
            leaky.validate_for_store(&ctx()),
            Err(ValidationError::Invalid { .. })
        ));

        let sealed = plain.encrypt(&key).unwrap();
        assert!(sealed.delegator.is_none() && sealed.delegate.is_none());
        let sealed = sealed.validate_for_store(&ctx()).unwrap();
        let payload = sealed.decrypt(&key).unwrap();
        assert_eq!(payload.delegator, ActorId::from("a"));
        assert_eq!(payload.delegate, ActorId::from("b"));
        assert!(sealed.decrypt(&Secret::generate()).is_err());
    }

    #[test]
    fn test_merge_never_reintroduces_plaintext() {
        let key = Secret::generate();
        let plain = SecureDelegationKeyMap::new("dk", "a".into(), "b".into());
        let sealed = plain.clone().encrypt(&key).unwrap();
        let merged = plain.merge(&sealed);
        assert!(merged.delegator.is_none());
        assert_eq!(merged.encrypted_self, sealed.encrypted_self);
    }

    #[test]
    fn test_exchange_data_opens_with_either_party() {
        let a = SecretKey::generate();
        let b = SecretKey::generate();
        let secret = Secret::generate();
        let participants = ExchangeParticipants {
            delegator: "a".into(),
            delegate: "b".into(),
        };
        let data =
            ExchangeData::create("x-1", &participants, &secret, &[a.public(), b.public()]).unwrap();

        let (fp, opened) = data.open_exchange_key(&KeyRing::from(b.clone())).unwrap();
        assert_eq!(fp, b.public().fingerprint());
        assert_eq!(opened, secret);
        assert_eq!(data.participants(&opened).unwrap(), participants);
        assert_eq!(participants.counterpart(&"b".into()), &ActorId::from("a"));

        let stranger = KeyRing::from(SecretKey::generate());
        assert!(data.open_exchange_key(&stranger).is_none());
    }
}
