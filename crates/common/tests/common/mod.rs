//! Shared fixtures for access model integration tests
#![allow(dead_code)]

use common::access::AccessController;
use common::actor::{ActorId, DataOwner, DataOwnerKind, KeyRing};
use common::context::RequestContext;
use common::crypto::SecretKey;
use common::entity::{Entity, Patient, Treatment};
use common::merge::MergerConfig;
use common::store::{DocumentStore, MemoryDocumentStore};

/// A registered actor and the private key only its client holds
#[derive(Debug, Clone)]
pub struct TestActor {
    pub owner: DataOwner,
    pub key: SecretKey,
}

impl TestActor {
    pub fn id(&self) -> ActorId {
        self.owner.actor_id()
    }

    pub fn ring(&self) -> KeyRing {
        KeyRing::from(self.key.clone())
    }

    pub fn ctx(&self) -> RequestContext {
        RequestContext::new(self.id())
    }
}

pub fn controller() -> AccessController<MemoryDocumentStore> {
    AccessController::new(MemoryDocumentStore::new(), MergerConfig::default())
}

/// Create and store a data owner with a fresh key pair
pub async fn register<S: DocumentStore>(
    controller: &AccessController<S>,
    id: &str,
    kind: DataOwnerKind,
) -> TestActor {
    let key = SecretKey::generate();
    let owner = DataOwner::new(id.into(), kind, &key.public()).with_name(id);
    let ctx = RequestContext::new(owner.actor_id());
    let owner = controller.save(&ctx, owner).await.unwrap();
    TestActor { owner, key }
}

/// Store a patient owned by `actor`, with `note` in its encrypted part
pub async fn create_patient<S: DocumentStore>(
    controller: &AccessController<S>,
    actor: &TestActor,
    id: &str,
    note: &str,
) -> Patient {
    let mut patient = Patient::new(id);
    patient.first_name = Some("Ada".into());
    create_encrypted(controller, actor, patient, note.as_bytes(), None).await
}

pub async fn create_treatment<S: DocumentStore>(
    controller: &AccessController<S>,
    actor: &TestActor,
    id: &str,
    patient_id: &str,
) -> Treatment {
    let treatment = Treatment::new(id);
    create_encrypted(controller, actor, treatment, b"{}", Some(patient_id)).await
}

pub async fn create_encrypted<S: DocumentStore, T: Entity>(
    controller: &AccessController<S>,
    actor: &TestActor,
    entity: T,
    plaintext: &[u8],
    parent_id: Option<&str>,
) -> T {
    let ctx = actor.ctx();
    let entity = controller
        .initialize_encryption(&ctx, entity, &actor.ring(), Some(plaintext), parent_id)
        .await
        .unwrap();
    controller.save(&ctx, entity).await.unwrap()
}

/// Delegation keys of the anonymous edges on an entity
pub fn anonymous_keys<T: Entity>(entity: &T) -> Vec<String> {
    entity
        .encryption()
        .map(|meta| {
            meta.delegations
                .iter()
                .filter(|(_, edges)| edges.iter().all(|e| e.is_anonymous()))
                .map(|(key, _)| key.clone())
                .collect()
        })
        .unwrap_or_default()
}
