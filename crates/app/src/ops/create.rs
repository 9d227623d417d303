use clap::Args;

use common::actor::KeyRing;
use common::error::AccessError;

use super::EntityKind;
use crate::state::StateError;

/// Create an entity whose content only its creator can read
#[derive(Args, Debug, Clone)]
pub struct Create {
    #[arg(long, value_enum)]
    pub kind: EntityKind,

    #[arg(long)]
    pub id: String,

    /// Content to encrypt into the entity
    #[arg(long)]
    pub content: String,

    /// Id of the parent entity, e.g. the patient of a treatment
    #[arg(long)]
    pub parent: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
}

#[async_trait::async_trait]
impl crate::op::Op for Create {
    type Error = CreateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let controller = state.controller()?;
        let keys: KeyRing = state.load_key()?.into();
        let rctx = state.context();

        let rev = crate::with_entity_kind!(self.kind, T => {
            let entity = controller
                .initialize_encryption(
                    &rctx,
                    T::new(self.id.clone()),
                    &keys,
                    Some(self.content.as_bytes()),
                    self.parent.as_deref(),
                )
                .await?;
            controller.save(&rctx, entity).await?.meta.rev
        });
        state.persist_store(controller.store())?;

        Ok(format!(
            "Created {} at revision {}",
            self.id,
            rev.unwrap_or_default()
        ))
    }
}
