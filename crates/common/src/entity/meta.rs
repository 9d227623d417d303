use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::context::RequestContext;
use crate::merge::{policy, Mergeable};

/// Base fields of every stored document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: String,
    /// Optimistic lock token, assigned by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Soft delete marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_date: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub rev_history: BTreeSet<String>,
    /// Sibling revisions reported by the store
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

impl DocumentMeta {
    pub fn new(id: impl Into<String>) -> Self {
        DocumentMeta {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion_date.is_some()
    }
}

impl Mergeable for DocumentMeta {
    fn merge(&self, other: &Self) -> Self {
        DocumentMeta {
            id: self.id.clone(),
            rev: self.rev.clone(),
            deletion_date: policy::prefer_mine(&self.deletion_date, &other.deletion_date),
            rev_history: policy::union(&self.rev_history, &other.rev_history),
            conflicts: policy::union_by_key(&self.conflicts, &other.conflicts, |c| c.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeStub {
    #[serde(rename = "type")]
    pub code_type: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl CodeStub {
    pub fn new(code_type: impl Into<String>, code: impl Into<String>) -> Self {
        CodeStub {
            code_type: code_type.into(),
            code: code.into(),
            version: None,
        }
    }
}

/// External identifier, identified by `(system, value)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

pub fn merge_identifiers(mine: &[Identifier], theirs: &[Identifier]) -> Vec<Identifier> {
    policy::union_by_key(mine, theirs, |i| (i.system.clone(), i.value.clone()))
}

/// Audit fields shared by business entities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<ActorId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<CodeStub>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub codes: BTreeSet<CodeStub>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_of_life: Option<i64>,
}

impl AuditInfo {
    /// Fill missing authorship from the request and move `modified` forward
    pub fn autofix(&mut self, ctx: &RequestContext) {
        self.created.get_or_insert(ctx.now);
        self.modified = policy::latest(self.modified, Some(ctx.now));
        self.author.get_or_insert_with(|| ctx.actor_id.clone());
        self.responsible.get_or_insert_with(|| ctx.actor_id.clone());
    }
}

impl Mergeable for AuditInfo {
    fn merge(&self, other: &Self) -> Self {
        AuditInfo {
            created: policy::earliest(self.created, other.created),
            modified: policy::latest(self.modified, other.modified),
            author: policy::prefer_mine(&self.author, &other.author),
            responsible: policy::prefer_mine(&self.responsible, &other.responsible),
            tags: policy::union(&self.tags, &other.tags),
            codes: policy::union(&self.codes, &other.codes),
            end_of_life: policy::prefer_mine(&self.end_of_life, &other.end_of_life),
        }
    }
}
