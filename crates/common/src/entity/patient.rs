use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{merge_identifiers, AuditInfo, DocumentMeta, EncryptionMetadata, Identifier};
use crate::merge::{policy, Mergeable};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    #[serde(flatten)]
    pub audit: AuditInfo,
    #[serde(flatten)]
    pub encryption: EncryptionMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// `yyyyMMdd`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_death: Option<u32>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub languages: BTreeSet<String>,
}

fn default_active() -> bool {
    true
}

impl Patient {
    pub fn new(id: impl Into<String>) -> Self {
        Patient {
            meta: DocumentMeta::new(id),
            active: true,
            ..Default::default()
        }
    }
}

impl Mergeable for Patient {
    fn merge(&self, other: &Self) -> Self {
        Patient {
            meta: self.meta.merge(&other.meta),
            audit: self.audit.merge(&other.audit),
            encryption: self.encryption.merge(&other.encryption),
            first_name: policy::prefer_mine(&self.first_name, &other.first_name),
            last_name: policy::prefer_mine(&self.last_name, &other.last_name),
            date_of_birth: policy::prefer_mine(&self.date_of_birth, &other.date_of_birth),
            date_of_death: policy::prefer_mine(&self.date_of_death, &other.date_of_death),
            active: self.active,
            note: policy::prefer_mine(&self.note, &other.note),
            identifiers: merge_identifiers(&self.identifiers, &other.identifiers),
            languages: policy::union(&self.languages, &other.languages),
        }
    }
}

encryptable_entity!(Patient, "Patient");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_prefers_mine() {
        let mut mine = Patient::new("p");
        mine.active = false;
        let theirs = Patient::new("p");
        assert!(!mine.merge(&theirs).active);
        assert!(theirs.merge(&mine).active);
    }

    #[test]
    fn test_identifiers_union_by_system_and_value() {
        let ssin = Identifier {
            system: Some("ssin".into()),
            value: Some("1".into()),
        };
        let mrn = Identifier {
            system: Some("mrn".into()),
            value: Some("A7".into()),
        };
        let mut mine = Patient::new("p");
        mine.identifiers = vec![ssin.clone()];
        mine.first_name = Some("Ada".into());
        let mut theirs = Patient::new("p");
        theirs.identifiers = vec![mrn.clone(), ssin.clone()];
        theirs.first_name = Some("Adah".into());
        theirs.last_name = Some("Lovelace".into());

        let merged = mine.merge(&theirs);
        assert_eq!(merged.identifiers, vec![ssin, mrn]);
        assert_eq!(merged.first_name.as_deref(), Some("Ada"));
        assert_eq!(merged.last_name.as_deref(), Some("Lovelace"));
    }

    #[test]
    fn test_flattened_json() {
        let mut patient = Patient::new("p-1");
        patient.first_name = Some("Ada".into());
        let json = serde_json::to_value(&patient).unwrap();
        assert_eq!(json["id"], "p-1");
        assert_eq!(json["first_name"], "Ada");
        assert_eq!(json["active"], true);
        let back: Patient = serde_json::from_value(json).unwrap();
        assert_eq!(back, patient);
    }
}
