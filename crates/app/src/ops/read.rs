use std::path::PathBuf;

use clap::Args;

use common::actor::{ActorId, KeyRing};
use common::error::AccessError;

use super::EntityKind;
use crate::state::{read_key, StateError};

/// Decrypt an entity's content
#[derive(Args, Debug, Clone)]
pub struct Read {
    #[arg(long, value_enum)]
    pub kind: EntityKind,

    #[arg(long)]
    pub id: String,

    /// Read with these private keys instead of the workspace key
    #[arg(long = "key")]
    pub keys: Vec<PathBuf>,

    /// Data owner to read as, defaults to the workspace actor
    #[arg(long = "as", conflicts_with = "anonymous")]
    pub as_actor: Option<String>,

    /// Read with keys alone, as an anonymous delegate
    #[arg(long)]
    pub anonymous: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
}

#[async_trait::async_trait]
impl crate::op::Op for Read {
    type Error = ReadError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let controller = state.controller()?;

        let keys: KeyRing = if self.keys.is_empty() {
            state.load_key()?.into()
        } else {
            self.keys
                .iter()
                .map(|path| read_key(path))
                .collect::<Result<_, _>>()?
        };
        let actor = match (&self.as_actor, self.anonymous) {
            (_, true) => None,
            (Some(id), false) => Some(ActorId::new(id.clone())),
            (None, false) => Some(state.actor_id()),
        };

        let plaintext = crate::with_entity_kind!(self.kind, T => {
            let entity: T = controller.load(&self.id).await?;
            controller
                .decrypt_entity(&entity, actor.as_ref(), &keys)
                .await?
        });
        Ok(String::from_utf8_lossy(&plaintext).into_owned())
    }
}
