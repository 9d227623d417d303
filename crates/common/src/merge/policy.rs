//! Field merge policies shared by every entity
//!
//! Each function takes `mine` first. Where the policy has to pick one side,
//! `mine` wins.

use std::collections::{BTreeMap, BTreeSet};

use super::{Identified, Mergeable};

/// Keep `mine` unless it is empty
pub fn prefer_mine<T: Clone>(mine: &Option<T>, theirs: &Option<T>) -> Option<T> {
    mine.as_ref().or(theirs.as_ref()).cloned()
}

/// Later of two optional values, for end dates, modification times and
/// durations
pub fn latest<T: Ord + Copy>(mine: Option<T>, theirs: Option<T>) -> Option<T> {
    match (mine, theirs) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Earlier of two optional values, for creation, start and opening dates
pub fn earliest<T: Ord + Copy>(mine: Option<T>, theirs: Option<T>) -> Option<T> {
    match (mine, theirs) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

pub fn union<T: Ord + Clone>(mine: &BTreeSet<T>, theirs: &BTreeSet<T>) -> BTreeSet<T> {
    mine.union(theirs).cloned().collect()
}

/// Union of two maps, `mine` wins on key collision
pub fn union_map<K: Ord + Clone, V: Clone>(
    mine: &BTreeMap<K, V>,
    theirs: &BTreeMap<K, V>,
) -> BTreeMap<K, V> {
    let mut merged = theirs.clone();
    merged.extend(mine.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Union of two maps, values present on both sides combined with `combine`
pub fn union_map_with<K, V, F>(
    mine: &BTreeMap<K, V>,
    theirs: &BTreeMap<K, V>,
    combine: F,
) -> BTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
    F: Fn(&V, &V) -> V,
{
    let mut merged = theirs.clone();
    for (key, value) in mine {
        let value = match theirs.get(key) {
            Some(other) => combine(value, other),
            None => value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}

/// Union of two lists with identity given by `key`
///
/// Keeps the order of `mine`, then appends entries of `theirs` with an
/// identity not seen in `mine`.
pub fn union_by_key<T, K, F>(mine: &[T], theirs: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut merged: Vec<T> = mine.to_vec();
    for item in theirs {
        let id = key(item);
        if !mine.iter().any(|m| key(m) == id) {
            merged.push(item.clone());
        }
    }
    merged
}

/// Merge nested entities pairwise by identity, recursing into their own
/// [`Mergeable::merge`]
///
/// Repeated identities pair up in order: the n-th entry with an id in
/// `mine` merges with the n-th entry with that id in `theirs`. Entries
/// without an identity are kept from both sides, minus exact duplicates.
pub fn merge_by_identity<T>(mine: &[T], theirs: &[T]) -> Vec<T>
where
    T: Mergeable + Identified + Clone + PartialEq,
{
    let mut merged: Vec<T> = mine
        .iter()
        .enumerate()
        .map(|(index, m)| {
            let paired = m.identity().and_then(|id| {
                let occurrence = occurrences(&mine[..index], id);
                theirs
                    .iter()
                    .filter(|t| t.identity() == Some(id))
                    .nth(occurrence)
            });
            match paired {
                Some(t) => m.merge(t),
                None => m.clone(),
            }
        })
        .collect();
    for (index, t) in theirs.iter().enumerate() {
        let seen = match t.identity() {
            Some(id) => occurrences(mine, id) > occurrences(&theirs[..index], id),
            None => mine.contains(t),
        };
        if !seen {
            merged.push(t.clone());
        }
    }
    merged
}

fn occurrences<T: Identified>(items: &[T], id: &str) -> usize {
    items.iter().filter(|item| item.identity() == Some(id)).count()
}
