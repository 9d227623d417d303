//! Integration tests for anonymous delegations and identifying their
//! participants

mod common;

use ::common::access::AnonymousIdentityResolver;
use ::common::actor::DataOwnerKind;
use ::common::crypto::Secret;
use ::common::entity::{Entity, Patient, SecureDelegationKeyMap};
use ::common::error::AccessError;
use ::common::store::MemoryDocumentStore;

#[tokio::test]
async fn test_participants_identify_each_other() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let b = common::register(&controller, "pat-b", DataOwnerKind::Patient).await;
    let patient = common::create_patient(&controller, &a, "pat-1", "note").await;
    let shared = controller
        .grant_access_and_save(&a.ctx(), &patient, &a.ring(), &b.id(), true)
        .await
        .unwrap();
    let delegation_key = common::anonymous_keys(&shared).remove(0);

    let delegator = controller
        .identify_delegator(&delegation_key, &b.ring())
        .await
        .unwrap();
    assert_eq!(delegator, a.id());
    let delegate = controller
        .identify_delegate(&delegation_key, &a.ring())
        .await
        .unwrap();
    assert_eq!(delegate, b.id());
}

#[tokio::test]
async fn test_outsiders_get_the_same_error() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let b = common::register(&controller, "pat-b", DataOwnerKind::Patient).await;
    let c = common::register(&controller, "hcp-c", DataOwnerKind::HealthcareParty).await;
    let patient = common::create_patient(&controller, &a, "pat-1", "note").await;
    let shared = controller
        .grant_access_and_save(&a.ctx(), &patient, &a.ring(), &b.id(), true)
        .await
        .unwrap();
    let delegation_key = common::anonymous_keys(&shared).remove(0);

    // a key that opens nothing, and a delegation key that was never issued
    let wrong_keys = controller
        .identify_delegator(&delegation_key, &c.ring())
        .await
        .unwrap_err();
    let unknown_key = controller
        .identify_delegator(&"00".repeat(32), &b.ring())
        .await
        .unwrap_err();
    assert!(matches!(wrong_keys, AccessError::Forbidden));
    assert!(matches!(unknown_key, AccessError::Forbidden));
    assert_eq!(wrong_keys.to_string(), unknown_key.to_string());
}

#[tokio::test]
async fn test_delegation_key_derives_from_exchange_key() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let b = common::register(&controller, "pat-b", DataOwnerKind::Patient).await;
    let patient = common::create_patient(&controller, &a, "pat-1", "note").await;
    let shared = controller
        .grant_access_and_save(&a.ctx(), &patient, &a.ring(), &b.id(), true)
        .await
        .unwrap();
    let delegation_key = common::anonymous_keys(&shared).remove(0);

    let resolved = controller
        .anonymous()
        .exchange_key_for(&delegation_key, &b.ring())
        .await
        .unwrap();
    assert_eq!(
        AnonymousIdentityResolver::<MemoryDocumentStore>::delegation_key(
            &resolved.exchange_key,
            Patient::ENTITY_TYPE
        ),
        delegation_key
    );
    assert_ne!(
        AnonymousIdentityResolver::<MemoryDocumentStore>::delegation_key(
            &resolved.exchange_key,
            "Treatment"
        ),
        delegation_key
    );
}

#[tokio::test]
async fn test_each_anonymous_grant_gets_its_own_key() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let b = common::register(&controller, "pat-b", DataOwnerKind::Patient).await;
    let first = common::create_patient(&controller, &a, "pat-1", "one").await;
    let second = common::create_patient(&controller, &a, "pat-2", "two").await;

    let first = controller
        .grant_access_and_save(&a.ctx(), &first, &a.ring(), &b.id(), true)
        .await
        .unwrap();
    let second = controller
        .grant_access_and_save(&a.ctx(), &second, &a.ring(), &b.id(), true)
        .await
        .unwrap();
    assert_ne!(
        common::anonymous_keys(&first),
        common::anonymous_keys(&second)
    );
}

#[tokio::test]
async fn test_plaintext_key_map_is_rejected() {
    let controller = common::controller();
    let a = common::register(&controller, "hcp-a", DataOwnerKind::HealthcareParty).await;
    let b = common::register(&controller, "pat-b", DataOwnerKind::Patient).await;

    let plaintext = SecureDelegationKeyMap::new("dk", a.id(), b.id());
    let result = controller.save(&a.ctx(), plaintext.clone()).await;
    assert!(matches!(result, Err(AccessError::Validation(_))));

    let key = Secret::generate();
    let encrypted = plaintext.encrypt(&key).unwrap();
    let saved = controller.save(&a.ctx(), encrypted).await.unwrap();
    assert!(saved.delegator.is_none());
    assert!(saved.delegate.is_none());
    let payload = saved.decrypt(&key).unwrap();
    assert_eq!(payload.delegator, a.id());
    assert_eq!(payload.delegate, b.id());
}
