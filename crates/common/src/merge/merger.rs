use serde::{Deserialize, Serialize};

use super::Mergeable;
use crate::entity::Entity;
use crate::store::{sort_revisions, DocumentStore, StoreError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergerConfig {
    /// Merge-and-save rounds before giving up on a document
    pub max_attempts: u32,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MergeError<T> {
    #[error("store error: {0}")]
    Store(#[from] StoreError<T>),
    #[error("{id} still conflicted after {attempts} merge attempts")]
    RetriesExhausted { id: String, attempts: u32 },
}

/// Where a document stands in conflict resolution
#[derive(Debug, Clone, PartialEq)]
pub enum MergeState<T> {
    /// No sibling revisions
    Clean(T),
    /// The store reports sibling revisions of the winner
    Conflicted { winner: T, siblings: Vec<String> },
    /// Siblings folded into one value, not yet written
    Merging { merged: T, superseded: Vec<String> },
}

/// Drives concurrent revisions of a document back to a single one
#[derive(Debug, Clone)]
pub struct ConflictMerger<S> {
    store: S,
    config: MergerConfig,
}

impl<S: DocumentStore> ConflictMerger<S> {
    pub fn new(store: S, config: MergerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    /// Merge two in-memory copies of the same document
    pub fn merge<T: Mergeable>(mine: &T, theirs: &T) -> T {
        mine.merge(theirs)
    }

    pub async fn inspect<T: Entity>(&self, id: &str) -> Result<MergeState<T>, MergeError<S::Error>> {
        let winner: T = self.store.load_entity(id).await?;
        if winner.meta().conflicts.is_empty() {
            return Ok(MergeState::Clean(winner));
        }
        let mut siblings = winner.meta().conflicts.clone();
        sort_revisions(&mut siblings);
        Ok(MergeState::Conflicted { winner, siblings })
    }

    /// Fold every sibling into the winner, oldest revision first
    async fn fold<T: Entity>(
        &self,
        winner: T,
        siblings: Vec<String>,
    ) -> Result<MergeState<T>, MergeError<S::Error>> {
        let id = winner.id().to_string();
        let mut merged = winner;
        let mut superseded = Vec::with_capacity(siblings.len());
        for rev in siblings {
            match self.store.load_entity_revision::<T>(&id, &rev).await {
                Ok(sibling) => merged = merged.merge(&sibling),
                Err(StoreError::NotFound(_)) => {
                    tracing::debug!("sibling {} of {} is gone, dropping it", rev, id);
                }
                Err(e) => return Err(e.into()),
            }
            superseded.push(rev);
        }
        let meta = merged.meta_mut();
        meta.conflicts.clear();
        meta.rev_history.extend(superseded.iter().cloned());
        Ok(MergeState::Merging { merged, superseded })
    }

    /// Resolve every sibling revision of `id` into one document
    pub async fn resolve<T: Entity>(&self, id: &str) -> Result<T, MergeError<S::Error>> {
        let mut attempts = 0;
        let mut state = self.inspect::<T>(id).await?;
        loop {
            state = match state {
                MergeState::Clean(entity) => return Ok(entity),
                MergeState::Conflicted { winner, siblings } => {
                    if attempts >= self.config.max_attempts {
                        tracing::warn!("giving up merging {} after {} attempts", id, attempts);
                        return Err(MergeError::RetriesExhausted {
                            id: id.to_string(),
                            attempts,
                        });
                    }
                    attempts += 1;
                    tracing::info!(
                        "merging {} sibling revisions of {} (attempt {})",
                        siblings.len(),
                        id,
                        attempts
                    );
                    self.fold(winner, siblings).await?
                }
                MergeState::Merging { merged, superseded } => {
                    match self.store.save_merged_entity(&merged, &superseded).await {
                        Ok(saved) if saved.meta().conflicts.is_empty() => MergeState::Clean(saved),
                        Ok(saved) => {
                            tracing::warn!("new sibling revisions of {} appeared during merge", id);
                            let mut siblings = saved.meta().conflicts.clone();
                            sort_revisions(&mut siblings);
                            MergeState::Conflicted {
                                winner: saved,
                                siblings,
                            }
                        }
                        Err(StoreError::RevisionConflict(_)) => {
                            tracing::warn!("{} changed during merge, reloading", id);
                            self.inspect(id).await?
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            };
        }
    }

    /// Write `entity`, merging it over whatever another writer saved first
    pub async fn save<T: Entity>(&self, entity: T) -> Result<T, MergeError<S::Error>> {
        let id = entity.id().to_string();
        let mut pending = entity;
        for attempt in 1..=self.config.max_attempts {
            match self.store.save_entity(&pending).await {
                Ok(saved) if saved.meta().conflicts.is_empty() => return Ok(saved),
                Ok(_) => return self.resolve(&id).await,
                Err(StoreError::RevisionConflict(_)) => {
                    tracing::warn!("revision conflict saving {} (attempt {})", id, attempt);
                    let current: T = self.store.load_entity(&id).await?;
                    let mut merged = pending.merge(&current);
                    merged.meta_mut().rev = current.meta().rev.clone();
                    pending = merged;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(MergeError::RetriesExhausted {
            id,
            attempts: self.config.max_attempts,
        })
    }
}
