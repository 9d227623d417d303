use clap::Args;

use common::error::AccessError;

use super::EntityKind;
use crate::state::StateError;

/// Mark an entity deleted, or drop every revision of it with `--purge`
#[derive(Args, Debug, Clone)]
pub struct Delete {
    #[arg(long, value_enum)]
    pub kind: EntityKind,

    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub purge: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
}

#[async_trait::async_trait]
impl crate::op::Op for Delete {
    type Error = DeleteError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let controller = state.controller()?;

        if self.purge {
            controller.purge(&self.id).await?;
        } else {
            let rctx = state.context();
            crate::with_entity_kind!(self.kind, T => {
                controller.soft_delete::<T>(&rctx, &self.id).await?;
            });
        }
        state.persist_store(controller.store())?;

        let action = if self.purge { "Purged" } else { "Deleted" };
        Ok(format!("{} {}", action, self.id))
    }
}
