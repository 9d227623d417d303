//! Integration tests for sharing and reading encrypted entities

mod common;

use ::common::access::SecretKind;
use ::common::actor::{DataOwner, DataOwnerKind, KeyMaterial, KeyRing};
use ::common::entity::{Patient, Treatment};
use ::common::error::AccessError;

#[tokio::test]
async fn test_owner_reads_own_entity() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let patient = common::create_patient(&controller, &a, "pat-1", "allergic to penicillin").await;

    assert!(controller.can_decrypt(&patient, Some(&a.id()), &a.ring()).await);
    let plaintext = controller
        .decrypt_entity(&patient, Some(&a.id()), &a.ring())
        .await
        .unwrap();
    assert_eq!(plaintext, b"allergic to penicillin");
    assert_eq!(patient.encryption.secret_foreign_keys.len(), 1);
    assert_eq!(patient.audit.author, Some(a.id()));
}

#[tokio::test]
async fn test_anonymous_delegate_reads_with_key_only() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let b = common::register(&controller, "pat-b", DataOwnerKind::Patient).await;
    let c = common::register(&controller, "hcp-c", DataOwnerKind::HealthcareParty).await;
    let patient = common::create_patient(&controller, &a, "pat-1", "note").await;

    let shared = controller
        .grant_access_and_save(&a.ctx(), &patient, &a.ring(), &b.id(), true)
        .await
        .unwrap();

    assert!(controller.can_decrypt(&shared, None, &b.ring()).await);
    assert_eq!(
        controller
            .decrypt_entity(&shared, None, &b.ring())
            .await
            .unwrap(),
        b"note"
    );
    assert!(!controller.can_decrypt(&shared, None, &c.ring()).await);
    assert!(!controller.can_decrypt(&shared, Some(&c.id()), &c.ring()).await);

    let denied = controller
        .decrypt_entity(&shared, Some(&c.id()), &c.ring())
        .await
        .unwrap_err();
    assert!(denied.is_forbidden());

    // Neither participant appears on the entity
    let json = serde_json::to_string(&shared).unwrap();
    let keys = common::anonymous_keys(&shared);
    assert_eq!(keys.len(), 1);
    assert!(!json.contains("pat-b"));
}

#[tokio::test]
async fn test_explicit_grant_and_transitive_share() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let b = common::register(&controller, "hcp-b", DataOwnerKind::HealthcareParty).await;
    let c = common::register(&controller, "hcp-c", DataOwnerKind::HealthcareParty).await;
    let patient = common::create_patient(&controller, &a, "pat-1", "note").await;

    assert!(!controller.can_decrypt(&patient, Some(&b.id()), &b.ring()).await);
    let shared = controller
        .grant_access_and_save(&a.ctx(), &patient, &a.ring(), &b.id(), false)
        .await
        .unwrap();
    assert!(controller.can_decrypt(&shared, Some(&b.id()), &b.ring()).await);
    assert!(shared.encryption.delegations.contains_key(b.id().as_str()));

    // b can pass the entity on
    let reshared = controller
        .grant_access_and_save(&b.ctx(), &shared, &b.ring(), &c.id(), false)
        .await
        .unwrap();
    assert_eq!(
        controller
            .decrypt_entity(&reshared, Some(&c.id()), &c.ring())
            .await
            .unwrap(),
        b"note"
    );

    // the exchange key was recorded on the granting actor
    let a_doc: DataOwner = controller.load(a.id().as_str()).await.unwrap();
    assert!(!KeyMaterial::aes_exchange_keys_for(&a_doc.crypto, &b.id()).is_empty());
}

#[tokio::test]
async fn test_stranger_cannot_grant() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let c = common::register(&controller, "hcp-c", DataOwnerKind::HealthcareParty).await;
    let patient = common::create_patient(&controller, &a, "pat-1", "note").await;

    let result = controller
        .grant_access(&c.ctx(), &patient, &c.ring(), &c.id(), false)
        .await;
    assert!(matches!(result, Err(AccessError::Forbidden)));
}

#[tokio::test]
async fn test_parent_link_is_shared_with_child() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let b = common::register(&controller, "hcp-b", DataOwnerKind::HealthcareParty).await;
    let treatment = common::create_treatment(&controller, &a, "tr-1", "pat-1").await;
    let shared: Treatment = controller
        .grant_access_and_save(&a.ctx(), &treatment, &a.ring(), &b.id(), false)
        .await
        .unwrap();

    let parent = controller
        .decrypt_secret(&shared, SecretKind::ForeignKey, Some(&b.id()), &b.ring())
        .await
        .unwrap();
    assert_eq!(parent, b"pat-1");
}

#[tokio::test]
async fn test_access_survives_key_rotation() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let patient = common::create_patient(&controller, &a, "pat-1", "note").await;

    let owner: DataOwner = controller.load(a.id().as_str()).await.unwrap();
    let (new_key, rotated) = KeyMaterial::rotate_key(&owner, &a.key).unwrap();
    controller.save(&a.ctx(), rotated).await.unwrap();

    let new_ring = KeyRing::from(new_key);
    assert_eq!(
        controller
            .decrypt_entity(&patient, Some(&a.id()), &new_ring)
            .await
            .unwrap(),
        b"note"
    );
}

#[tokio::test]
async fn test_revocation_is_refused() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let patient = common::create_patient(&controller, &a, "pat-1", "note").await;
    let result = controller.revoke_access(&patient, &a.id());
    assert!(matches!(result, Err(AccessError::RevocationNotSupported)));
}

#[tokio::test]
async fn test_soft_delete_and_purge() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    common::create_patient(&controller, &a, "pat-1", "note").await;

    let deleted: Patient = controller.soft_delete(&a.ctx(), "pat-1").await.unwrap();
    assert!(deleted.meta.is_deleted());

    controller.purge("pat-1").await.unwrap();
    let gone = controller.load::<Patient>("pat-1").await;
    assert!(matches!(gone, Err(AccessError::NotFound(_))));
}
