use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// A document as the store sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: String,
    /// On save: the revision the write is based on, `None` for a create.
    /// On load: the current revision.
    pub rev: Option<String>,
    /// On save: sibling revisions this write supersedes.
    /// On load: sibling revisions still in conflict with `rev`.
    pub conflicts: Vec<String>,
    pub body: serde_json::Value,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError<T> {
    #[error("unhandled document store error: {0}")]
    Provider(#[from] T),
    #[error("document not found: {0}")]
    NotFound(String),
    /// The base revision of a write is no longer the stored winner
    #[error("revision conflict on {0}")]
    RevisionConflict(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl<T> StoreError<T> {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_revision_conflict(&self) -> bool {
        matches!(self, StoreError::RevisionConflict(_))
    }
}

/// Generation number of a revision id of the form `<generation>-<hash>`
pub fn revision_generation(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(generation, _)| generation.parse().ok())
        .unwrap_or(0)
}

/// Sort revisions oldest generation first, ties broken by id
pub fn sort_revisions(revs: &mut [String]) {
    revs.sort_by(|a, b| {
        revision_generation(a)
            .cmp(&revision_generation(b))
            .then_with(|| a.cmp(b))
    });
}

/// Multi-master document store with optimistic concurrency
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync + 'static;

    /// Load the winning revision of a document with its sibling revisions
    async fn load(&self, id: &str) -> Result<RawDocument, StoreError<Self::Error>>;

    /// Load one specific revision, winner or sibling
    async fn load_revision(
        &self,
        id: &str,
        rev: &str,
    ) -> Result<RawDocument, StoreError<Self::Error>>;

    /// Write a document
    ///
    /// Should fail with `StoreError::RevisionConflict` when `doc.rev` is not
    /// the current winner, or is `None` while the document exists. Returns
    /// the document with its new revision and any siblings still in conflict.
    async fn save(&self, doc: RawDocument) -> Result<RawDocument, StoreError<Self::Error>>;

    /// Remove a document and all its revisions
    async fn purge(&self, id: &str) -> Result<(), StoreError<Self::Error>>;

    async fn load_entity<T: Entity>(&self, id: &str) -> Result<T, StoreError<Self::Error>> {
        decode(self.load(id).await?)
    }

    async fn load_entity_revision<T: Entity>(
        &self,
        id: &str,
        rev: &str,
    ) -> Result<T, StoreError<Self::Error>> {
        decode(self.load_revision(id, rev).await?)
    }

    /// Write an entity based on its current `rev`
    async fn save_entity<T: Entity>(&self, entity: &T) -> Result<T, StoreError<Self::Error>> {
        decode(self.save(encode(entity, Vec::new())?).await?)
    }

    /// Write a merged entity, marking `superseded` siblings as resolved
    async fn save_merged_entity<T: Entity>(
        &self,
        entity: &T,
        superseded: &[String],
    ) -> Result<T, StoreError<Self::Error>> {
        decode(self.save(encode(entity, superseded.to_vec())?).await?)
    }
}

fn encode<T: Entity, E>(entity: &T, superseded: Vec<String>) -> Result<RawDocument, StoreError<E>> {
    let mut body = entity.clone();
    body.meta_mut().conflicts.clear();
    Ok(RawDocument {
        id: entity.meta().id.clone(),
        rev: entity.meta().rev.clone(),
        conflicts: superseded,
        body: serde_json::to_value(&body).map_err(|e| StoreError::Serialization(e.to_string()))?,
    })
}

fn decode<T: Entity, E>(raw: RawDocument) -> Result<T, StoreError<E>> {
    let mut entity: T =
        serde_json::from_value(raw.body).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let meta = entity.meta_mut();
    meta.id = raw.id;
    meta.rev = raw.rev;
    meta.conflicts = raw.conflicts;
    Ok(entity)
}
