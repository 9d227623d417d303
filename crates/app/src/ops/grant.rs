use clap::Args;

use common::actor::{ActorId, KeyRing};
use common::error::AccessError;

use super::EntityKind;
use crate::state::StateError;

/// Share an entity with another data owner
#[derive(Args, Debug, Clone)]
pub struct Grant {
    #[arg(long, value_enum)]
    pub kind: EntityKind,

    #[arg(long)]
    pub id: String,

    /// Data owner to share with
    #[arg(long)]
    pub to: String,

    /// Hide both participants from the entity
    #[arg(long)]
    pub anonymous: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
}

#[async_trait::async_trait]
impl crate::op::Op for Grant {
    type Error = GrantError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let controller = state.controller()?;
        let keys: KeyRing = state.load_key()?.into();
        let rctx = state.context();
        let to = ActorId::new(self.to.clone());

        crate::with_entity_kind!(self.kind, T => {
            let entity: T = controller.load(&self.id).await?;
            controller
                .grant_access_and_save(&rctx, &entity, &keys, &to, self.anonymous)
                .await?;
        });
        state.persist_store(controller.store())?;

        let mode = if self.anonymous { "anonymously " } else { "" };
        Ok(format!("Shared {} {}with {}", self.id, mode, self.to))
    }
}
