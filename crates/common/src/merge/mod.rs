//! # Conflict merge
//!
//! Every entity reconciles two divergent revisions of itself through
//! [`Mergeable::merge`], composed from the field policies in [`policy`].
//! [`ConflictMerger`] drives those merges against the store whenever it
//! reports sibling revisions.
//!
//! The argument order is always `mine.merge(theirs)`. Scalar fields keep
//! `mine`, sets and maps are unioned, monotonic fields take the min or max.

pub mod policy;

mod merger;

pub use merger::{ConflictMerger, MergeError, MergeState, MergerConfig};

/// Deterministic field-level reconciliation of two revisions
pub trait Mergeable: Sized {
    /// Merge `other` into `self`, `self` winning where a side must be picked
    fn merge(&self, other: &Self) -> Self;
}

/// Nested values merged pairwise by an identity field
pub trait Identified {
    fn identity(&self) -> Option<&str>;
}
