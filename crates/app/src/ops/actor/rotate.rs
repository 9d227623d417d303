use clap::Args;

use common::actor::{DataOwner, KeyMaterial, KeyMaterialError};
use common::error::AccessError;

use crate::state::StateError;

/// Replace the workspace actor's key pair
///
/// Data shared with the previous key stays readable through a transfer key.
#[derive(Args, Debug, Clone)]
pub struct Rotate;

#[derive(Debug, thiserror::Error)]
pub enum RotateError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
    #[error("key error: {0}")]
    Key(#[from] KeyMaterialError),
}

#[async_trait::async_trait]
impl crate::op::Op for Rotate {
    type Error = RotateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let controller = state.controller()?;
        let current = state.load_key()?;
        let owner: DataOwner = controller.load(&state.config.actor_id).await?;

        let (next, rotated) = KeyMaterial::rotate_key(&owner, &current)?;
        controller.save(&state.context(), rotated).await?;
        state.persist_store(controller.store())?;
        let backup = state.replace_key(&next)?;

        Ok(format!(
            "Rotated key of {} to {}, previous key kept at {}",
            state.config.actor_id,
            next.public().fingerprint(),
            backup.display()
        ))
    }
}
