//! # Document store boundary
//!
//! The access model only needs three things from storage: load a document
//! with its sibling revisions, load one revision, and save with an optimistic
//! revision check. [`DocumentStore`] is that boundary; [`MemoryDocumentStore`]
//! is an in-process implementation used by tests and the CLI.

mod memory;
mod provider;

pub use memory::{next_revision, MemoryDocumentStore, MemoryDocumentStoreError, MemorySnapshot};
pub use provider::{revision_generation, sort_revisions, DocumentStore, RawDocument, StoreError};
