use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use super::crypto_actor::{ActorId, CryptoActor, DataOwner, LegacyExchangeKey};
use super::key_ring::KeyRing;
use crate::crypto::shamir::{self, Partition, ShamirError};
use crate::crypto::{
    open_hex, seal_hex, Fingerprint, KeyError, PublicKey, SealError, Secret, SecretError,
    SecretKey,
};

/// Errors that can occur while reading or extending key material
#[derive(Debug, thiserror::Error)]
pub enum KeyMaterialError {
    #[error("private key {0} is not recoverable")]
    KeyNotRecoverable(Fingerprint),
    #[error("actor {0} has no usable public key")]
    MissingPublicKey(ActorId),
    #[error("an exchange key from {owner} to {delegate} already exists")]
    ExchangeKeyExists { owner: ActorId, delegate: ActorId },
    #[error("malformed shamir partition entry for notary {0}")]
    MalformedPartition(ActorId),
    #[error("shamir error: {0}")]
    Shamir(#[from] ShamirError),
    #[error("seal error: {0}")]
    Seal(#[from] SealError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

/// One sealed copy of an AES exchange key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedAesKey {
    /// Key pair of the exchange key owner this copy was filed under
    pub owner_key: Fingerprint,
    /// Key pair able to open this copy
    pub encrypted_for: Fingerprint,
    pub ciphertext: String,
}

/// Candidate storage for the exchange key between an owner and a delegate,
/// in the order they should be tried
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeKeySource {
    PerKeyPair(Vec<EncryptedAesKey>),
    Legacy(LegacyExchangeKey),
}

impl ExchangeKeySource {
    /// Fingerprints of the key pairs that can open some copy, if recorded
    pub fn referenced_fingerprints(&self) -> BTreeSet<Fingerprint> {
        match self {
            ExchangeKeySource::PerKeyPair(keys) => {
                keys.iter().map(|k| k.encrypted_for.clone()).collect()
            }
            ExchangeKeySource::Legacy(_) => BTreeSet::new(),
        }
    }
}

/// Parsed `privateKeyShamirPartitions` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShamirEntry {
    pub notary: ActorId,
    pub threshold: u8,
    /// Partition hex, encrypted with the owner to notary exchange key
    pub encrypted_partition: String,
}

impl ShamirEntry {
    pub fn parse(notary: &ActorId, stored: &str) -> Result<Self, KeyMaterialError> {
        let malformed = || KeyMaterialError::MalformedPartition(notary.clone());
        let (threshold, encrypted) = stored.split_once('|').ok_or_else(malformed)?;
        let threshold = threshold.trim().parse::<u8>().map_err(|_| malformed())?;
        if threshold == 0 || encrypted.is_empty() {
            return Err(malformed());
        }
        Ok(ShamirEntry {
            notary: notary.clone(),
            threshold,
            encrypted_partition: encrypted.to_string(),
        })
    }

    pub fn to_stored(&self) -> String {
        format!("{}|{}", self.threshold, self.encrypted_partition)
    }

    /// Decrypt the partition with the exchange key shared with the notary
    pub fn decrypt(&self, exchange_key: &Secret) -> Result<Partition, KeyMaterialError> {
        let hex = exchange_key.decrypt_hex(&self.encrypted_partition)?;
        let hex = String::from_utf8(hex).map_err(|_| self.malformed())?;
        Ok(Partition::from_hex(self.threshold, &hex)?)
    }

    fn malformed(&self) -> KeyMaterialError {
        KeyMaterialError::MalformedPartition(self.notary.clone())
    }
}

#[derive(Debug, Clone)]
struct RecoveredKey {
    key: SecretKey,
    /// Key the transfer chain started from
    origin: Fingerprint,
}

/// Per-actor key bookkeeping
///
/// Reading operations are associated functions over [`CryptoActor`]. The only
/// state is the cache of private keys recovered through transfer keys, shared
/// by clones. A cached key is only handed out to callers holding the key its
/// chain started from, so the cache never widens what a caller can open.
#[derive(Debug, Clone, Default)]
pub struct KeyMaterial {
    recovered: Arc<RwLock<HashMap<(ActorId, Fingerprint), RecoveredKey>>>,
}

impl KeyMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public_key_fingerprints(actor: &CryptoActor) -> BTreeSet<Fingerprint> {
        Self::ordered_fingerprints(actor).into_iter().collect()
    }

    /// Fingerprints of the actor's public keys, primary (newest) first
    pub fn ordered_fingerprints(actor: &CryptoActor) -> Vec<Fingerprint> {
        let mut fingerprints: Vec<Fingerprint> = Vec::new();
        let primary = actor.public_key.iter();
        for hex in primary.chain(actor.public_keys_for_oaep_with_sha256.iter()) {
            let fp = Fingerprint::from_public_key_hex(hex);
            if !fingerprints.contains(&fp) {
                fingerprints.push(fp);
            }
        }
        fingerprints
    }

    /// Every stored copy of the exchange key from `actor` to `delegate`
    ///
    /// Per key pair copies come first, owner keys newest first, followed by
    /// the legacy pair if one exists.
    pub fn aes_exchange_keys_for(actor: &CryptoActor, delegate: &ActorId) -> Vec<ExchangeKeySource> {
        let mut owner_keys = Self::ordered_fingerprints(actor);
        for fp in actor.aes_exchange_keys.keys() {
            if !owner_keys.contains(fp) {
                owner_keys.push(fp.clone());
            }
        }

        let mut copies = Vec::new();
        for owner_key in owner_keys {
            let Some(by_delegate) = actor.aes_exchange_keys.get(&owner_key) else {
                continue;
            };
            let Some(sealed) = by_delegate.get(delegate) else {
                continue;
            };
            copies.extend(sealed.iter().map(|(encrypted_for, ciphertext)| EncryptedAesKey {
                owner_key: owner_key.clone(),
                encrypted_for: encrypted_for.clone(),
                ciphertext: ciphertext.clone(),
            }));
        }

        let mut sources = Vec::new();
        if !copies.is_empty() {
            sources.push(ExchangeKeySource::PerKeyPair(copies));
        }
        if let Some(legacy) = actor.hc_party_keys.get(delegate) {
            sources.push(ExchangeKeySource::Legacy(legacy.clone()));
        }
        sources
    }

    /// Recover the private key `target` of `holder` by following its
    /// transfer keys from the keys in `available`
    pub fn recover_private_key(
        &self,
        holder: &ActorId,
        actor: &CryptoActor,
        target: &Fingerprint,
        available: &KeyRing,
    ) -> Result<SecretKey, KeyMaterialError> {
        if let Some(key) = available.get(target) {
            return Ok(key.clone());
        }
        if let Some(cached) = self.recovered.read().get(&(holder.clone(), target.clone())) {
            if available.contains(&cached.origin) {
                tracing::debug!("using cached recovered key {} of {}", target, holder);
                return Ok(cached.key.clone());
            }
        }

        let mut reached: BTreeMap<Fingerprint, RecoveredKey> = available
            .iter()
            .map(|(fp, key)| {
                (
                    fp.clone(),
                    RecoveredKey {
                        key: key.clone(),
                        origin: fp.clone(),
                    },
                )
            })
            .collect();

        // Each round opens every transfer key reachable from the keys found so
        // far; stops once a round adds nothing.
        loop {
            let mut found = Vec::new();
            for (recoverable, sealed_by) in &actor.transfer_keys {
                if reached.contains_key(recoverable) {
                    continue;
                }
                for (by, sealed) in sealed_by {
                    let Some(opener) = reached.get(by) else {
                        continue;
                    };
                    if let Some(key) = Self::open_transfer_key(sealed, &opener.key, recoverable) {
                        found.push((
                            recoverable.clone(),
                            RecoveredKey {
                                key,
                                origin: opener.origin.clone(),
                            },
                        ));
                    }
                }
            }
            if found.is_empty() {
                break;
            }
            for (fp, recovered) in found {
                reached.entry(fp).or_insert(recovered);
            }
            if reached.contains_key(target) {
                break;
            }
        }

        let recovered = reached
            .remove(target)
            .ok_or_else(|| KeyMaterialError::KeyNotRecoverable(target.clone()))?;
        tracing::debug!("recovered private key {} of {}", target, holder);
        self.recovered
            .write()
            .insert((holder.clone(), target.clone()), recovered.clone());
        Ok(recovered.key)
    }

    fn open_transfer_key(
        sealed: &str,
        opener: &SecretKey,
        expected: &Fingerprint,
    ) -> Option<SecretKey> {
        let bytes = open_hex(sealed, opener).ok()?;
        let key = SecretKey::try_from(bytes.as_slice()).ok()?;
        (key.public().fingerprint() == *expected).then_some(key)
    }

    /// Generate a fresh exchange key from `owner` to `delegate`
    ///
    /// The key is sealed for every public key of both parties and filed under
    /// the owner's primary key. Returns the key and the updated owner.
    pub fn create_exchange_key(
        owner: &DataOwner,
        delegate: &DataOwner,
    ) -> Result<(Secret, DataOwner), KeyMaterialError> {
        let owner_id = owner.actor_id();
        let delegate_id = delegate.actor_id();
        let owner_key = owner
            .crypto
            .primary_public_key()
            .ok_or_else(|| KeyMaterialError::MissingPublicKey(owner_id.clone()))?;
        let delegate_keys = delegate.crypto.public_keys();
        if delegate_keys.is_empty() {
            return Err(KeyMaterialError::MissingPublicKey(delegate_id));
        }
        if !Self::aes_exchange_keys_for(&owner.crypto, &delegate_id).is_empty() {
            return Err(KeyMaterialError::ExchangeKeyExists {
                owner: owner_id,
                delegate: delegate_id,
            });
        }

        let secret = Secret::generate();
        let mut sealed = BTreeMap::new();
        for key in owner.crypto.public_keys().iter().chain(delegate_keys.iter()) {
            sealed.insert(key.fingerprint(), seal_hex(secret.bytes(), key)?);
        }

        let mut updated = owner.clone();
        updated
            .crypto
            .aes_exchange_keys
            .entry(owner_key.fingerprint())
            .or_default()
            .insert(delegate_id.clone(), sealed);
        tracing::info!("created exchange key from {} to {}", owner_id, delegate_id);
        Ok((secret, updated))
    }

    /// Let `new_key` open `old_key` through a transfer key
    pub fn add_transfer_key(
        actor: &DataOwner,
        old_key: &SecretKey,
        new_key: &PublicKey,
    ) -> Result<DataOwner, KeyMaterialError> {
        let sealed = seal_hex(&old_key.to_bytes(), new_key)?;
        let mut updated = actor.clone();
        updated
            .crypto
            .transfer_keys
            .entry(old_key.public().fingerprint())
            .or_default()
            .insert(new_key.fingerprint(), sealed);
        Ok(updated)
    }

    /// Replace the actor's primary key with a new one
    ///
    /// The previous primary key stays listed as an alternate public key and
    /// remains recoverable from the new key.
    pub fn rotate_key(
        actor: &DataOwner,
        current: &SecretKey,
    ) -> Result<(SecretKey, DataOwner), KeyMaterialError> {
        let next = SecretKey::generate();
        let mut updated = Self::add_transfer_key(actor, current, &next.public())?;
        if let Some(previous) = updated.crypto.public_key.replace(next.public().to_hex()) {
            updated
                .crypto
                .public_keys_for_oaep_with_sha256
                .insert(previous);
        }
        tracing::info!(
            "rotated key of {} to {}",
            actor.meta.id,
            next.public().fingerprint()
        );
        Ok((next, updated))
    }

    /// Split `key` between notaries, any `threshold` of which can rebuild it
    ///
    /// `notaries` pairs every notary with the exchange key the owner shares
    /// with them.
    pub fn share_private_key(
        actor: &DataOwner,
        key: &SecretKey,
        notaries: &[(ActorId, Secret)],
        threshold: u8,
    ) -> Result<DataOwner, KeyMaterialError> {
        let count = u8::try_from(notaries.len()).map_err(|_| ShamirError::InvalidThreshold {
            threshold,
            count: u8::MAX,
        })?;
        let partitions = shamir::split(&key.to_bytes(), threshold, count)?;

        let mut updated = actor.clone();
        for ((notary, exchange_key), partition) in notaries.iter().zip(partitions) {
            let entry = ShamirEntry {
                notary: notary.clone(),
                threshold,
                encrypted_partition: exchange_key.encrypt_hex(partition.to_hex().as_bytes())?,
            };
            updated
                .crypto
                .private_key_shamir_partitions
                .insert(notary.clone(), entry.to_stored());
        }
        Ok(updated)
    }

    pub fn shamir_entries(actor: &CryptoActor) -> Result<Vec<ShamirEntry>, KeyMaterialError> {
        actor
            .private_key_shamir_partitions
            .iter()
            .map(|(notary, stored)| ShamirEntry::parse(notary, stored))
            .collect()
    }

    /// Rebuild a private key of `actor` from decrypted partitions
    pub fn recover_from_partitions(
        actor: &CryptoActor,
        partitions: &[Partition],
    ) -> Result<SecretKey, KeyMaterialError> {
        let bytes = shamir::combine(partitions)?;
        let key = SecretKey::try_from(bytes.as_slice())?;
        let fp = key.public().fingerprint();
        if !Self::public_key_fingerprints(actor).contains(&fp) {
            return Err(KeyMaterialError::KeyNotRecoverable(fp));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::DataOwnerKind;

    fn owner(id: &str, key: &SecretKey) -> DataOwner {
        DataOwner::new(id.into(), DataOwnerKind::HealthcareParty, &key.public())
    }

    #[test]
    fn test_exchange_key_sealed_for_both_parties() {
        let a_key = SecretKey::generate();
        let b_key = SecretKey::generate();
        let a = owner("a", &a_key);
        let b = owner("b", &b_key);

        let (secret, a) = KeyMaterial::create_exchange_key(&a, &b).unwrap();
        let sources = KeyMaterial::aes_exchange_keys_for(&a.crypto, &b.actor_id());
        assert_eq!(sources.len(), 1);
        let ExchangeKeySource::PerKeyPair(copies) = &sources[0] else {
            panic!("expected per key pair copies");
        };
        assert_eq!(copies.len(), 2);
        for copy in copies {
            let opener = if copy.encrypted_for == a_key.public().fingerprint() {
                &a_key
            } else {
                &b_key
            };
            let opened = open_hex(&copy.ciphertext, opener).unwrap();
            assert_eq!(opened, secret.bytes());
        }

        let again = KeyMaterial::create_exchange_key(&a, &b);
        assert!(matches!(again, Err(KeyMaterialError::ExchangeKeyExists { .. })));
    }

    #[test]
    fn test_mangled_alternate_key_does_not_break_lookup() {
        let a_key = SecretKey::generate();
        let b = owner("b", &SecretKey::generate());
        let mut a = owner("a", &a_key);
        a.crypto
            .public_keys_for_oaep_with_sha256
            .insert(format!("é{}", "0".repeat(40)));

        let (_, a) = KeyMaterial::create_exchange_key(&a, &b).unwrap();
        let fingerprints = KeyMaterial::ordered_fingerprints(&a.crypto);
        assert_eq!(fingerprints.len(), 2);
        assert_eq!(fingerprints[0], a_key.public().fingerprint());
        assert_eq!(
            KeyMaterial::aes_exchange_keys_for(&a.crypto, &b.actor_id()).len(),
            1
        );
    }

    #[test]
    fn test_legacy_keys_come_after_per_key_pair() {
        let a_key = SecretKey::generate();
        let b_key = SecretKey::generate();
        let b = owner("b", &b_key);
        let mut a = owner("a", &a_key);
        a.crypto
            .hc_party_keys
            .insert(b.actor_id(), LegacyExchangeKey("00".into(), "11".into()));
        assert!(matches!(
            KeyMaterial::aes_exchange_keys_for(&a.crypto, &b.actor_id()).as_slice(),
            [ExchangeKeySource::Legacy(_)]
        ));

        a.crypto.hc_party_keys.clear();
        let (_, mut a) = KeyMaterial::create_exchange_key(&a, &b).unwrap();
        a.crypto
            .hc_party_keys
            .insert(b.actor_id(), LegacyExchangeKey("00".into(), "11".into()));
        let sources = KeyMaterial::aes_exchange_keys_for(&a.crypto, &b.actor_id());
        assert!(matches!(
            sources.as_slice(),
            [ExchangeKeySource::PerKeyPair(_), ExchangeKeySource::Legacy(_)]
        ));
    }

    #[test]
    fn test_recover_through_transfer_chain() {
        let first = SecretKey::generate();
        let actor = owner("a", &first);
        let (second, actor) = KeyMaterial::rotate_key(&actor, &first).unwrap();
        let (third, actor) = KeyMaterial::rotate_key(&actor, &second).unwrap();

        assert_eq!(
            KeyMaterial::ordered_fingerprints(&actor.crypto)[0],
            third.public().fingerprint()
        );

        let material = KeyMaterial::new();
        let available = KeyRing::from(third.clone());
        let recovered = material
            .recover_private_key(
                &actor.actor_id(),
                &actor.crypto,
                &first.public().fingerprint(),
                &available,
            )
            .unwrap();
        assert_eq!(recovered, first);
    }

    #[test]
    fn test_cached_key_requires_chain_origin() {
        let first = SecretKey::generate();
        let actor = owner("a", &first);
        let (second, actor) = KeyMaterial::rotate_key(&actor, &first).unwrap();
        let material = KeyMaterial::new();
        let target = first.public().fingerprint();

        material
            .recover_private_key(&actor.actor_id(), &actor.crypto, &target, &KeyRing::from(second))
            .unwrap();

        let stranger = KeyRing::from(SecretKey::generate());
        let result = material.recover_private_key(&actor.actor_id(), &actor.crypto, &target, &stranger);
        assert!(matches!(result, Err(KeyMaterialError::KeyNotRecoverable(fp)) if fp == target));
    }

    #[test]
    fn test_shamir_recovery() {
        let key = SecretKey::generate();
        let actor = owner("a", &key);
        let notaries: Vec<(ActorId, Secret)> = ["n1", "n2", "n3"]
            .iter()
            .map(|id| (ActorId::from(*id), Secret::generate()))
            .collect();

        let actor = KeyMaterial::share_private_key(&actor, &key, &notaries, 2).unwrap();
        let entries = KeyMaterial::shamir_entries(&actor.crypto).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(actor.crypto.private_key_shamir_partitions[&ActorId::from("n1")].starts_with("2|"));

        let partitions: Vec<Partition> = entries
            .iter()
            .skip(1)
            .map(|entry| {
                let (_, exchange_key) = notaries
                    .iter()
                    .find(|(id, _)| *id == entry.notary)
                    .unwrap();
                entry.decrypt(exchange_key).unwrap()
            })
            .collect();
        let recovered = KeyMaterial::recover_from_partitions(&actor.crypto, &partitions).unwrap();
        assert_eq!(recovered, key);

        let too_few = KeyMaterial::recover_from_partitions(&actor.crypto, &partitions[..1]);
        assert!(matches!(too_few, Err(KeyMaterialError::Shamir(_))));
    }

    #[test]
    fn test_malformed_shamir_entry() {
        let notary = ActorId::from("n1");
        assert!(ShamirEntry::parse(&notary, "nothreshold").is_err());
        assert!(ShamirEntry::parse(&notary, "0|abcd").is_err());
        let entry = ShamirEntry::parse(&notary, "3|abcd").unwrap();
        assert_eq!(entry.threshold, 3);
        assert_eq!(entry.to_stored(), "3|abcd");
    }
}
