use std::collections::BTreeMap;

use crate::crypto::{Fingerprint, SecretKey};

/// Private keys available to one client, indexed by fingerprint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRing {
    keys: BTreeMap<Fingerprint, SecretKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SecretKey) -> Fingerprint {
        let fingerprint = key.public().fingerprint();
        self.keys.insert(fingerprint.clone(), key);
        fingerprint
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&SecretKey> {
        self.keys.get(fingerprint)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.keys.contains_key(fingerprint)
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.keys.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &SecretKey)> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<SecretKey> for KeyRing {
    fn from_iter<I: IntoIterator<Item = SecretKey>>(iter: I) -> Self {
        let mut ring = KeyRing::new();
        for key in iter {
            ring.insert(key);
        }
        ring
    }
}

impl From<SecretKey> for KeyRing {
    fn from(key: SecretKey) -> Self {
        std::iter::once(key).collect()
    }
}
