use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{Fingerprint, PublicKey};
use crate::entity::{DocumentMeta, Entity};
use crate::merge::{policy, Mergeable};

/// Identifier of a data owner document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        ActorId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        ActorId(value.to_string())
    }
}

/// Legacy exchange key: one AES key per counterpart, sealed once for the
/// owner and once for the counterpart. Which key pairs were used is not
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyExchangeKey(pub String, pub String);

impl LegacyExchangeKey {
    pub fn owner_copy(&self) -> &str {
        &self.0
    }

    pub fn delegate_copy(&self) -> &str {
        &self.1
    }
}

/// Key bookkeeping carried by every actor
///
/// All ciphertext is hex encoded. Values keyed by [`Fingerprint`] exist once
/// per key pair so that an actor can hold several key pairs over time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoActor {
    /// Primary public key, treated as the actor's newest key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Additional public keys usable with the same sealing scheme.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub public_keys_for_oaep_with_sha256: BTreeSet<String>,
    /// Legacy scheme: counterpart id -> (owner copy, counterpart copy).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hc_party_keys: BTreeMap<ActorId, LegacyExchangeKey>,
    /// owner key -> delegate -> key the copy is sealed for -> sealed AES key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aes_exchange_keys: BTreeMap<Fingerprint, BTreeMap<ActorId, BTreeMap<Fingerprint, String>>>,
    /// recoverable key -> key it is sealed for -> sealed private key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transfer_keys: BTreeMap<Fingerprint, BTreeMap<Fingerprint, String>>,
    /// notary -> "threshold|hex partition encrypted with the notary exchange key".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub private_key_shamir_partitions: BTreeMap<ActorId, String>,
}

impl CryptoActor {
    /// Every parseable public key, primary first
    pub fn public_keys(&self) -> Vec<PublicKey> {
        let mut keys = Vec::new();
        for hex in self
            .public_key
            .iter()
            .chain(self.public_keys_for_oaep_with_sha256.iter())
        {
            match PublicKey::from_hex(hex) {
                Ok(key) if !keys.contains(&key) => keys.push(key),
                Ok(_) => {}
                Err(e) => tracing::warn!("skipping unparseable public key: {}", e),
            }
        }
        keys
    }

    pub fn primary_public_key(&self) -> Option<PublicKey> {
        self.public_key
            .as_deref()
            .and_then(|hex| PublicKey::from_hex(hex).ok())
    }
}

impl Mergeable for CryptoActor {
    fn merge(&self, other: &Self) -> Self {
        // a side that lists the other's primary as an alternate has rotated past it
        let public_key = match (&self.public_key, &other.public_key) {
            (Some(mine), Some(_)) if other.public_keys_for_oaep_with_sha256.contains(mine) => {
                other.public_key.clone()
            }
            _ => policy::prefer_mine(&self.public_key, &other.public_key),
        };
        let mut public_keys_for_oaep_with_sha256 = policy::union(
            &self.public_keys_for_oaep_with_sha256,
            &other.public_keys_for_oaep_with_sha256,
        );
        public_keys_for_oaep_with_sha256.extend(
            [&self.public_key, &other.public_key]
                .into_iter()
                .flatten()
                .filter(|hex| public_key.as_ref() != Some(*hex))
                .cloned(),
        );

        CryptoActor {
            public_key,
            public_keys_for_oaep_with_sha256,
            hc_party_keys: policy::union_map(&self.hc_party_keys, &other.hc_party_keys),
            aes_exchange_keys: policy::union_map_with(
                &self.aes_exchange_keys,
                &other.aes_exchange_keys,
                |mine, theirs| {
                    policy::union_map_with(mine, theirs, |mine, theirs| {
                        policy::union_map(mine, theirs)
                    })
                },
            ),
            transfer_keys: policy::union_map_with(
                &self.transfer_keys,
                &other.transfer_keys,
                |mine, theirs| policy::union_map(mine, theirs),
            ),
            private_key_shamir_partitions: policy::union_map(
                &self.private_key_shamir_partitions,
                &other.private_key_shamir_partitions,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOwnerKind {
    HealthcareParty,
    Patient,
    Device,
}

impl fmt::Display for DataOwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataOwnerKind::HealthcareParty => write!(f, "healthcare party"),
            DataOwnerKind::Patient => write!(f, "patient"),
            DataOwnerKind::Device => write!(f, "device"),
        }
    }
}

/// Stored document of an actor that can own data and take part in
/// delegations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataOwner {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub kind: DataOwnerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub crypto: CryptoActor,
}

impl DataOwner {
    /// A new actor whose primary key is `public_key`
    pub fn new(id: ActorId, kind: DataOwnerKind, public_key: &PublicKey) -> Self {
        DataOwner {
            meta: DocumentMeta::new(id.as_str()),
            kind,
            name: None,
            crypto: CryptoActor {
                public_key: Some(public_key.to_hex()),
                ..CryptoActor::default()
            },
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn actor_id(&self) -> ActorId {
        ActorId::new(self.meta.id.clone())
    }
}

impl Mergeable for DataOwner {
    fn merge(&self, other: &Self) -> Self {
        DataOwner {
            meta: self.meta.merge(&other.meta),
            kind: self.kind,
            name: policy::prefer_mine(&self.name, &other.name),
            crypto: self.crypto.merge(&other.crypto),
        }
    }
}

impl Entity for DataOwner {
    const ENTITY_TYPE: &'static str = "DataOwner";

    fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut DocumentMeta {
        &mut self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::KeyMaterial;
    use crate::crypto::SecretKey;

    #[test]
    fn test_public_keys_primary_first_and_deduplicated() {
        let primary = SecretKey::generate().public();
        let older = SecretKey::generate().public();
        let mut owner = DataOwner::new("hcp-1".into(), DataOwnerKind::HealthcareParty, &primary);
        owner
            .crypto
            .public_keys_for_oaep_with_sha256
            .insert(older.to_hex());
        owner
            .crypto
            .public_keys_for_oaep_with_sha256
            .insert(primary.to_hex());
        owner
            .crypto
            .public_keys_for_oaep_with_sha256
            .insert("zz".to_string());

        assert_eq!(owner.crypto.public_keys(), vec![primary, older]);
    }

    #[test]
    fn test_merge_unions_exchange_keys_mine_wins_on_collision() {
        let key = SecretKey::generate().public();
        let fp = key.fingerprint();
        let mut mine = DataOwner::new("hcp-1".into(), DataOwnerKind::HealthcareParty, &key);
        let mut theirs = mine.clone();

        mine.crypto
            .aes_exchange_keys
            .entry(fp.clone())
            .or_default()
            .entry("p-1".into())
            .or_default()
            .insert(fp.clone(), "aa".to_string());
        theirs
            .crypto
            .aes_exchange_keys
            .entry(fp.clone())
            .or_default()
            .entry("p-1".into())
            .or_default()
            .insert(fp.clone(), "bb".to_string());
        theirs
            .crypto
            .aes_exchange_keys
            .entry(fp.clone())
            .or_default()
            .entry("p-2".into())
            .or_default()
            .insert(fp.clone(), "cc".to_string());

        let merged = mine.merge(&theirs);
        let delegates = &merged.crypto.aes_exchange_keys[&fp];
        assert_eq!(delegates[&ActorId::from("p-1")][&fp], "aa");
        assert_eq!(delegates[&ActorId::from("p-2")][&fp], "cc");
    }

    #[test]
    fn test_merge_keeps_rotated_key_in_either_order() {
        let current = SecretKey::generate();
        let base = DataOwner::new(
            "hcp-1".into(),
            DataOwnerKind::HealthcareParty,
            &current.public(),
        );
        let renamed = base.clone().with_name("Dr. Renamed");
        let (next, rotated) = KeyMaterial::rotate_key(&base, &current).unwrap();

        for merged in [renamed.merge(&rotated), rotated.merge(&renamed)] {
            let keys = merged.crypto.public_keys();
            assert_eq!(keys, vec![next.public(), current.public()]);
            assert_eq!(merged.crypto.primary_public_key(), Some(next.public()));
            assert_eq!(merged.merge(&merged), merged);
        }
    }

    #[test]
    fn test_merge_keeps_both_unrelated_primaries() {
        let a = SecretKey::generate().public();
        let b = SecretKey::generate().public();
        let mine = DataOwner::new("hcp-1".into(), DataOwnerKind::HealthcareParty, &a);
        let theirs = DataOwner::new("hcp-1".into(), DataOwnerKind::HealthcareParty, &b);

        let merged = mine.merge(&theirs);
        assert_eq!(merged.crypto.primary_public_key(), Some(a));
        assert_eq!(merged.crypto.public_keys(), vec![a, b]);
        assert_eq!(theirs.merge(&mine).crypto.public_keys(), vec![b, a]);
    }

    #[test]
    fn test_serde_flattens_keys_next_to_meta() {
        let key = SecretKey::generate().public();
        let owner = DataOwner::new("dev-1".into(), DataOwnerKind::Device, &key).with_name("pump");
        let json = serde_json::to_value(&owner).unwrap();
        assert_eq!(json["id"], "dev-1");
        assert_eq!(json["kind"], "device");
        assert_eq!(json["public_key"], key.to_hex());

        let back: DataOwner = serde_json::from_value(json).unwrap();
        assert_eq!(back, owner);
    }
}
