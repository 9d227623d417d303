use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::{revision_generation, sort_revisions, DocumentStore, RawDocument, StoreError};
use crate::entity::Entity;

/// In-memory multi-revision document store
///
/// Keeps every revision of every document. Concurrent masters are simulated
/// with [`MemoryDocumentStore::replicate`], which adds a revision without the
/// base revision check a normal save goes through.
#[derive(Debug, Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<RwLock<MemoryDocumentStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryDocumentStoreInner {
    documents: HashMap<String, StoredDocument>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredDocument {
    winner: String,
    /// Sibling revisions still in conflict with the winner
    conflicts: BTreeSet<String>,
    revisions: BTreeMap<String, serde_json::Value>,
}

impl StoredDocument {
    fn raw(&self, id: &str, rev: &str, with_conflicts: bool) -> Option<RawDocument> {
        let body = self.revisions.get(rev)?.clone();
        let mut conflicts: Vec<String> = if with_conflicts {
            self.conflicts.iter().cloned().collect()
        } else {
            Vec::new()
        };
        sort_revisions(&mut conflicts);
        Some(RawDocument {
            id: id.to_string(),
            rev: Some(rev.to_string()),
            conflicts,
            body,
        })
    }

    /// Pick the winner among all leaf revisions: highest generation, then
    /// highest id
    fn elect_winner(&mut self, candidate: String) {
        let mut leaves: Vec<String> = self.conflicts.iter().cloned().collect();
        leaves.push(self.winner.clone());
        leaves.push(candidate);
        sort_revisions(&mut leaves);
        leaves.dedup();
        if let Some(winner) = leaves.pop() {
            self.winner = winner;
        }
        self.conflicts = leaves.into_iter().collect();
    }

    fn leaves(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.winner).chain(self.conflicts.iter())
    }
}

/// Serializable copy of a [`MemoryDocumentStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    documents: BTreeMap<String, StoredDocument>,
}

impl MemorySnapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryDocumentStoreError {
    #[error("memory store error: {0}")]
    Internal(String),
}

type Result<T> = std::result::Result<T, StoreError<MemoryDocumentStoreError>>;

/// Next revision id after `base` for a document body
pub fn next_revision(base: Option<&str>, body: &serde_json::Value) -> String {
    let generation = base.map(revision_generation).unwrap_or(0) + 1;
    let mut hasher = blake3::Hasher::new();
    hasher.update(base.unwrap_or_default().as_bytes());
    hasher.update(body.to_string().as_bytes());
    let hash = hasher.finalize().to_hex();
    format!("{}-{}", generation, &hash.as_str()[..16])
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryDocumentStoreInner::default())),
        }
    }

    pub fn restore(snapshot: MemorySnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryDocumentStoreInner {
                documents: snapshot.documents.into_iter().collect(),
            })),
        }
    }

    pub fn snapshot(&self) -> Result<MemorySnapshot> {
        let inner = self.inner.read().map_err(|e| {
            StoreError::Provider(MemoryDocumentStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;
        Ok(MemorySnapshot {
            documents: inner
                .documents
                .iter()
                .map(|(id, doc)| (id.clone(), doc.clone()))
                .collect(),
        })
    }

    /// Add a revision written by another master
    ///
    /// The revision becomes a sibling of the current winner. If it sorts
    /// higher it becomes the winner and the previous winner a sibling.
    pub fn replicate(&self, doc: RawDocument) -> Result<String> {
        let rev = doc
            .rev
            .clone()
            .ok_or_else(|| StoreError::Serialization("replicated revision has no rev".into()))?;
        let mut inner = self.inner.write().map_err(|e| {
            StoreError::Provider(MemoryDocumentStoreError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })?;
        match inner.documents.get_mut(&doc.id) {
            Some(stored) => {
                stored.revisions.insert(rev.clone(), doc.body);
                stored.elect_winner(rev.clone());
            }
            None => {
                inner.documents.insert(
                    doc.id,
                    StoredDocument {
                        winner: rev.clone(),
                        conflicts: BTreeSet::new(),
                        revisions: BTreeMap::from([(rev.clone(), doc.body)]),
                    },
                );
            }
        }
        tracing::debug!("replicated revision {}", rev);
        Ok(rev)
    }

    /// Replicate an edited copy of an entity as the child of its `rev`
    pub fn replicate_entity<T: Entity>(&self, entity: &T) -> Result<String> {
        let mut body = entity.clone();
        body.meta_mut().conflicts.clear();
        let body =
            serde_json::to_value(&body).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let rev = next_revision(entity.meta().rev.as_deref(), &body);
        self.replicate(RawDocument {
            id: entity.meta().id.clone(),
            rev: Some(rev),
            conflicts: Vec::new(),
            body,
        })
    }

    /// Replicate every leaf revision of another master's snapshot
    ///
    /// Revisions already present are skipped. Returns the number of
    /// revisions added.
    pub fn import(&self, snapshot: &MemorySnapshot) -> Result<usize> {
        let mut imported = 0;
        for (id, doc) in &snapshot.documents {
            for rev in doc.leaves() {
                if self.has_revision(id, rev)? {
                    continue;
                }
                if let Some(raw) = doc.raw(id, rev, false) {
                    self.replicate(raw)?;
                    imported += 1;
                }
            }
        }
        tracing::info!("imported {} revisions", imported);
        Ok(imported)
    }

    fn has_revision(&self, id: &str, rev: &str) -> Result<bool> {
        let inner = self.inner.read().map_err(|e| {
            StoreError::Provider(MemoryDocumentStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;
        Ok(inner
            .documents
            .get(id)
            .is_some_and(|doc| doc.revisions.contains_key(rev)))
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    type Error = MemoryDocumentStoreError;

    async fn load(&self, id: &str) -> Result<RawDocument> {
        let inner = self.inner.read().map_err(|e| {
            StoreError::Provider(MemoryDocumentStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;
        inner
            .documents
            .get(id)
            .and_then(|doc| doc.raw(id, &doc.winner, true))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn load_revision(&self, id: &str, rev: &str) -> Result<RawDocument> {
        let inner = self.inner.read().map_err(|e| {
            StoreError::Provider(MemoryDocumentStoreError::Internal(format!(
                "failed to acquire read lock: {}",
                e
            )))
        })?;
        inner
            .documents
            .get(id)
            .and_then(|doc| doc.raw(id, rev, false))
            .ok_or_else(|| StoreError::NotFound(format!("{}@{}", id, rev)))
    }

    async fn save(&self, doc: RawDocument) -> Result<RawDocument> {
        let mut inner = self.inner.write().map_err(|e| {
            StoreError::Provider(MemoryDocumentStoreError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })?;

        let rev = next_revision(doc.rev.as_deref(), &doc.body);
        match (inner.documents.get_mut(&doc.id), doc.rev.as_deref()) {
            (None, None) => {
                inner.documents.insert(
                    doc.id.clone(),
                    StoredDocument {
                        winner: rev.clone(),
                        conflicts: BTreeSet::new(),
                        revisions: BTreeMap::from([(rev.clone(), doc.body.clone())]),
                    },
                );
            }
            (Some(stored), Some(base)) if stored.winner == base => {
                for superseded in &doc.conflicts {
                    stored.conflicts.remove(superseded);
                }
                stored.revisions.insert(rev.clone(), doc.body.clone());
                stored.winner = rev.clone();
            }
            _ => return Err(StoreError::RevisionConflict(doc.id)),
        }

        let stored = inner
            .documents
            .get(&doc.id)
            .ok_or_else(|| StoreError::NotFound(doc.id.clone()))?;
        stored
            .raw(&doc.id, &rev, true)
            .ok_or_else(|| StoreError::NotFound(doc.id.clone()))
    }

    async fn purge(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().map_err(|e| {
            StoreError::Provider(MemoryDocumentStoreError::Internal(format!(
                "failed to acquire write lock: {}",
                e
            )))
        })?;
        inner
            .documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
