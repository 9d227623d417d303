use serde::{Deserialize, Serialize};

use super::{merge_identifiers, AuditInfo, CodeStub, DocumentMeta, EncryptionMetadata, Identifier};
use crate::actor::ActorId;
use crate::merge::{policy, Identified, Mergeable};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOfAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

impl Identified for PlanOfAction {
    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Mergeable for PlanOfAction {
    fn merge(&self, other: &Self) -> Self {
        PlanOfAction {
            id: self.id.clone(),
            name: policy::prefer_mine(&self.name, &other.name),
            descr: policy::prefer_mine(&self.descr, &other.descr),
            opening_date: policy::earliest(self.opening_date, other.opening_date),
            closing_date: policy::latest(self.closing_date, other.closing_date),
            status: policy::prefer_mine(&self.status, &other.status),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareTeamMember {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub care_team_member_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcare_party_id: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<CodeStub>,
}

impl Identified for CareTeamMember {
    fn identity(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Mergeable for CareTeamMember {
    fn merge(&self, other: &Self) -> Self {
        CareTeamMember {
            id: self.id.clone(),
            care_team_member_type: policy::prefer_mine(
                &self.care_team_member_type,
                &other.care_team_member_type,
            ),
            healthcare_party_id: policy::prefer_mine(
                &self.healthcare_party_id,
                &other.healthcare_party_id,
            ),
            quality: policy::prefer_mine(&self.quality, &other.quality),
        }
    }
}

/// A problem, diagnosis or allergy followed over time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthElement {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    #[serde(flatten)]
    pub audit: AuditInfo,
    #[serde(flatten)]
    pub encryption: EncryptionMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_date: Option<i64>,
    #[serde(default = "default_relevant")]
    pub relevant: bool,
    #[serde(default)]
    pub status: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plans_of_action: Vec<PlanOfAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub care_team: Vec<CareTeamMember>,
}

fn default_relevant() -> bool {
    true
}

impl HealthElement {
    pub fn new(id: impl Into<String>) -> Self {
        HealthElement {
            meta: DocumentMeta::new(id),
            relevant: true,
            ..Default::default()
        }
    }
}

impl Mergeable for HealthElement {
    fn merge(&self, other: &Self) -> Self {
        HealthElement {
            meta: self.meta.merge(&other.meta),
            audit: self.audit.merge(&other.audit),
            encryption: self.encryption.merge(&other.encryption),
            name: policy::prefer_mine(&self.name, &other.name),
            descr: policy::prefer_mine(&self.descr, &other.descr),
            note: policy::prefer_mine(&self.note, &other.note),
            opening_date: policy::earliest(self.opening_date, other.opening_date),
            closing_date: policy::latest(self.closing_date, other.closing_date),
            relevant: self.relevant,
            status: self.status,
            identifiers: merge_identifiers(&self.identifiers, &other.identifiers),
            plans_of_action: policy::merge_by_identity(&self.plans_of_action, &other.plans_of_action),
            care_team: policy::merge_by_identity(&self.care_team, &other.care_team),
        }
    }
}

encryptable_entity!(HealthElement, "HealthElement");

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(id: &str, name: Option<&str>, closing: Option<i64>) -> PlanOfAction {
        PlanOfAction {
            id: Some(id.into()),
            name: name.map(String::from),
            closing_date: closing,
            ..Default::default()
        }
    }

    #[test]
    fn test_nested_lists_merge_pairwise() {
        let mut mine = HealthElement::new("he");
        mine.opening_date = Some(20);
        mine.plans_of_action = vec![plan("p1", Some("physio"), Some(10))];
        mine.care_team = vec![CareTeamMember {
            id: Some("m1".into()),
            healthcare_party_id: Some("hcp-1".into()),
            ..Default::default()
        }];

        let mut theirs = HealthElement::new("he");
        theirs.opening_date = Some(10);
        theirs.closing_date = Some(90);
        theirs.plans_of_action = vec![
            plan("p1", Some("kine"), Some(30)),
            plan("p2", Some("surgery"), None),
        ];
        theirs.care_team = vec![CareTeamMember {
            id: Some("m1".into()),
            care_team_member_type: Some("doctor".into()),
            ..Default::default()
        }];

        let merged = mine.merge(&theirs);
        assert_eq!(merged.opening_date, Some(10));
        assert_eq!(merged.closing_date, Some(90));
        assert_eq!(
            merged.plans_of_action,
            vec![
                plan("p1", Some("physio"), Some(30)),
                plan("p2", Some("surgery"), None)
            ]
        );
        assert_eq!(merged.care_team.len(), 1);
        assert_eq!(merged.care_team[0].healthcare_party_id, Some("hcp-1".into()));
        assert_eq!(merged.care_team[0].care_team_member_type.as_deref(), Some("doctor"));
    }

    #[test]
    fn test_merge_with_itself_is_identity() {
        let mut he = HealthElement::new("he");
        he.name = Some("asthma".into());
        he.plans_of_action = vec![plan("p1", None, Some(3)), PlanOfAction::default()];
        assert_eq!(he.merge(&he), he);
    }
}
