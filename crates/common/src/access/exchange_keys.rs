use std::collections::BTreeSet;

use crate::actor::{ActorId, DataOwner, ExchangeKeySource, KeyMaterial, KeyRing};
use crate::crypto::{open_hex, Fingerprint, Secret, SecretKey};
use crate::error::AccessError;

/// Recovers the AES exchange keys an owner shares with a delegate
#[derive(Debug, Clone, Default)]
pub struct ExchangeKeyResolver {
    material: KeyMaterial,
}

impl ExchangeKeyResolver {
    pub fn new(material: KeyMaterial) -> Self {
        Self { material }
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// The newest exchange key from `owner` to `delegate` that `keys` open
    ///
    /// `holder` is the party presenting `keys`, either the owner or the
    /// delegate. Its transfer keys are used to recover older private keys
    /// when none of `keys` opens a stored copy.
    pub fn resolve(
        &self,
        owner: &DataOwner,
        delegate: &ActorId,
        holder: &DataOwner,
        keys: &KeyRing,
    ) -> Result<Secret, AccessError> {
        self.resolve_all(owner, delegate, holder, keys)
            .into_iter()
            .next()
            .ok_or_else(|| AccessError::NoSharedKey(delegate.clone()))
    }

    /// Every distinct exchange key from `owner` to `delegate` that `keys`
    /// open, newest owner key first
    pub fn resolve_all(
        &self,
        owner: &DataOwner,
        delegate: &ActorId,
        holder: &DataOwner,
        keys: &KeyRing,
    ) -> Vec<Secret> {
        let sources = KeyMaterial::aes_exchange_keys_for(&owner.crypto, delegate);
        let opened = Self::open_sources(&sources, keys);
        if !opened.is_empty() {
            return opened;
        }

        let mut wanted: BTreeSet<Fingerprint> = sources
            .iter()
            .flat_map(ExchangeKeySource::referenced_fingerprints)
            .collect();
        if sources
            .iter()
            .any(|s| matches!(s, ExchangeKeySource::Legacy(_)))
        {
            wanted.extend(holder.crypto.transfer_keys.keys().cloned());
        }

        let mut extended = keys.clone();
        for fp in wanted.iter().filter(|fp| !keys.contains(fp)) {
            match self
                .material
                .recover_private_key(&holder.actor_id(), &holder.crypto, fp, keys)
            {
                Ok(key) => {
                    extended.insert(key);
                }
                Err(e) => tracing::debug!("{}", e),
            }
        }
        if extended.len() == keys.len() {
            return Vec::new();
        }
        Self::open_sources(&sources, &extended)
    }

    /// Return an existing exchange key from `owner` to `delegate`, or create
    /// one
    ///
    /// When a key is created the updated owner document is returned alongside
    /// it and must be saved by the caller.
    pub fn resolve_or_create(
        &self,
        owner: &DataOwner,
        delegate: &DataOwner,
        keys: &KeyRing,
    ) -> Result<(Secret, Option<DataOwner>), AccessError> {
        let delegate_id = delegate.actor_id();
        match self.resolve(owner, &delegate_id, owner, keys) {
            Ok(secret) => Ok((secret, None)),
            Err(AccessError::NoSharedKey(_))
                if KeyMaterial::aes_exchange_keys_for(&owner.crypto, &delegate_id).is_empty() =>
            {
                let (secret, updated) = KeyMaterial::create_exchange_key(owner, delegate)?;
                Ok((secret, Some(updated)))
            }
            Err(e) => Err(e),
        }
    }

    /// Try every copy with every applicable key, then keep distinct results
    /// in candidate order
    fn open_sources(sources: &[ExchangeKeySource], keys: &KeyRing) -> Vec<Secret> {
        let mut attempts: Vec<Option<Secret>> = Vec::new();
        for source in sources {
            match source {
                ExchangeKeySource::PerKeyPair(copies) => {
                    for copy in copies {
                        attempts.push(
                            keys.get(&copy.encrypted_for)
                                .and_then(|key| Self::open(&copy.ciphertext, key)),
                        );
                    }
                }
                ExchangeKeySource::Legacy(legacy) => {
                    for (_, key) in keys.iter() {
                        attempts.push(Self::open(legacy.owner_copy(), key));
                        attempts.push(Self::open(legacy.delegate_copy(), key));
                    }
                }
            }
        }

        let mut secrets: Vec<Secret> = Vec::new();
        for secret in attempts.into_iter().flatten() {
            if !secrets.contains(&secret) {
                secrets.push(secret);
            }
        }
        secrets
    }

    fn open(ciphertext: &str, key: &SecretKey) -> Option<Secret> {
        let bytes = open_hex(ciphertext, key).ok()?;
        Secret::from_slice(&bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{DataOwnerKind, LegacyExchangeKey};
    use crate::crypto::{seal_hex, SecretKey};

    fn owner(id: &str, key: &SecretKey) -> DataOwner {
        DataOwner::new(id.into(), DataOwnerKind::HealthcareParty, &key.public())
    }

    #[test]
    fn test_both_parties_resolve_the_same_key() {
        let a_key = SecretKey::generate();
        let b_key = SecretKey::generate();
        let a = owner("a", &a_key);
        let b = owner("b", &b_key);
        let resolver = ExchangeKeyResolver::default();

        let (created, updated) = resolver
            .resolve_or_create(&a, &b, &KeyRing::from(a_key.clone()))
            .unwrap();
        let a = updated.unwrap();

        let by_owner = resolver
            .resolve(&a, &b.actor_id(), &a, &KeyRing::from(a_key.clone()))
            .unwrap();
        let by_delegate = resolver
            .resolve(&a, &b.actor_id(), &b, &KeyRing::from(b_key))
            .unwrap();
        assert_eq!(by_owner, created);
        assert_eq!(by_delegate, created);

        let (again, none) = resolver
            .resolve_or_create(&a, &b, &KeyRing::from(a_key))
            .unwrap();
        assert_eq!(again, created);
        assert!(none.is_none());
    }

    #[test]
    fn test_stranger_gets_no_shared_key() {
        let a_key = SecretKey::generate();
        let a = owner("a", &a_key);
        let b = owner("b", &SecretKey::generate());
        let (_, a) = KeyMaterial::create_exchange_key(&a, &b).unwrap();

        let stranger_key = SecretKey::generate();
        let stranger = owner("c", &stranger_key);
        let result = ExchangeKeyResolver::default().resolve(
            &a,
            &b.actor_id(),
            &stranger,
            &KeyRing::from(stranger_key),
        );
        assert!(matches!(result, Err(AccessError::NoSharedKey(_))));
    }

    #[test]
    fn test_legacy_copy_opened_after_key_rotation() {
        let old_key = SecretKey::generate();
        let b_key = SecretKey::generate();
        let a = owner("a", &old_key);
        let b = owner("b", &b_key);

        let secret = Secret::generate();
        let mut a = a;
        a.crypto.hc_party_keys.insert(
            b.actor_id(),
            LegacyExchangeKey(
                seal_hex(secret.bytes(), &old_key.public()).unwrap(),
                seal_hex(secret.bytes(), &b_key.public()).unwrap(),
            ),
        );
        let (new_key, a) = KeyMaterial::rotate_key(&a, &old_key).unwrap();

        let resolver = ExchangeKeyResolver::default();
        let resolved = resolver
            .resolve(&a, &b.actor_id(), &a, &KeyRing::from(new_key))
            .unwrap();
        assert_eq!(resolved, secret);
    }
}
