use serde::{Deserialize, Serialize};

use super::{AuditInfo, DocumentMeta, EncryptionMetadata};
use crate::merge::{policy, Mergeable};

/// A medication course, linked to its patient through `crypted_foreign_keys`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    #[serde(flatten)]
    pub audit: AuditInfo,
    #[serde(flatten)]
    pub encryption: EncryptionMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_moment: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_moment: Option<i64>,
    /// Days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub chronic: bool,
}

impl Treatment {
    pub fn new(id: impl Into<String>) -> Self {
        Treatment {
            meta: DocumentMeta::new(id),
            ..Default::default()
        }
    }
}

impl Mergeable for Treatment {
    fn merge(&self, other: &Self) -> Self {
        Treatment {
            meta: self.meta.merge(&other.meta),
            audit: self.audit.merge(&other.audit),
            encryption: self.encryption.merge(&other.encryption),
            name: policy::prefer_mine(&self.name, &other.name),
            begin_moment: policy::earliest(self.begin_moment, other.begin_moment),
            end_moment: policy::latest(self.end_moment, other.end_moment),
            duration: policy::latest(self.duration, other.duration),
            chronic: self.chronic,
        }
    }
}

encryptable_entity!(Treatment, "Treatment");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_fields() {
        let mut mine = Treatment::new("t");
        mine.duration = Some(5);
        mine.begin_moment = Some(200);
        mine.end_moment = Some(300);
        let mut theirs = Treatment::new("t");
        theirs.duration = Some(10);
        theirs.begin_moment = Some(100);
        theirs.end_moment = Some(250);

        for merged in [mine.merge(&theirs), theirs.merge(&mine)] {
            assert_eq!(merged.duration, Some(10));
            assert_eq!(merged.begin_moment, Some(100));
            assert_eq!(merged.end_moment, Some(300));
        }
    }
}
