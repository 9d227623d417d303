use clap::Args;

use common::entity::Entity;
use common::error::AccessError;

use super::EntityKind;
use crate::state::StateError;

/// Resolve conflicting revisions of an entity into one
#[derive(Args, Debug, Clone)]
pub struct Merge {
    #[arg(long, value_enum)]
    pub kind: EntityKind,

    #[arg(long)]
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
}

#[async_trait::async_trait]
impl crate::op::Op for Merge {
    type Error = MergeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let controller = state.controller()?;

        let (siblings, rev) = crate::with_entity_kind!(self.kind, T => {
            let current: T = controller.load(&self.id).await?;
            let siblings = current.meta().conflicts.len();
            let merged: T = controller.resolve_conflicts(&self.id).await?;
            (siblings, merged.meta().rev.clone())
        });
        state.persist_store(controller.store())?;

        Ok(format!(
            "Merged {} sibling revisions of {} into {}",
            siblings,
            self.id,
            rev.unwrap_or_default()
        ))
    }
}
