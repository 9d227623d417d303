use clap::ValueEnum;

use common::actor::DataOwnerKind;

pub mod actor;
pub mod create;
pub mod delete;
pub mod grant;
pub mod identify;
pub mod import;
pub mod init;
pub mod merge;
pub mod read;
pub mod version;

pub use actor::Actor;
pub use create::Create;
pub use delete::Delete;
pub use grant::Grant;
pub use identify::Identify;
pub use import::Import;
pub use init::Init;
pub use merge::Merge;
pub use read::Read;
pub use version::Version;

/// Shareable entity types
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Patient,
    HealthElement,
    Treatment,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    HealthcareParty,
    Patient,
    Device,
}

impl From<ActorKind> for DataOwnerKind {
    fn from(kind: ActorKind) -> Self {
        match kind {
            ActorKind::HealthcareParty => DataOwnerKind::HealthcareParty,
            ActorKind::Patient => DataOwnerKind::Patient,
            ActorKind::Device => DataOwnerKind::Device,
        }
    }
}

/// Run `$body` with `$ty` bound to the entity type named by `$kind`
#[macro_export]
macro_rules! with_entity_kind {
    ($kind:expr, $ty:ident => $body:expr) => {
        match $kind {
            $crate::ops::EntityKind::Patient => {
                type $ty = common::entity::Patient;
                $body
            }
            $crate::ops::EntityKind::HealthElement => {
                type $ty = common::entity::HealthElement;
                $body
            }
            $crate::ops::EntityKind::Treatment => {
                type $ty = common::entity::Treatment;
                $body
            }
        }
    };
}
