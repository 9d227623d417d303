use std::path::PathBuf;

use clap::Args;

use common::actor::{ActorId, DataOwner, DataOwnerKind};
use common::context::RequestContext;
use common::error::AccessError;
use common::prelude::SecretKey;

use crate::ops::ActorKind;
use crate::state::StateError;

/// Register another data owner, handing its private key over as a PEM file
#[derive(Args, Debug, Clone)]
pub struct Add {
    #[arg(long)]
    pub id: String,

    #[arg(long, value_enum, default_value = "patient")]
    pub kind: ActorKind,

    #[arg(long)]
    pub name: Option<String>,

    /// Where to write the new actor's private key
    #[arg(long)]
    pub key_out: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum AddError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
    #[error("{0} already exists")]
    Exists(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Add {
    type Error = AddError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let controller = state.controller()?;
        match controller.load::<DataOwner>(&self.id).await {
            Ok(_) => return Err(AddError::Exists(self.id.clone())),
            Err(AccessError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        if self.key_out.exists() {
            return Err(AddError::Exists(self.key_out.display().to_string()));
        }

        let key = SecretKey::generate();
        let id = ActorId::new(self.id.clone());
        let mut owner = DataOwner::new(id.clone(), self.kind.into(), &key.public());
        if let Some(name) = &self.name {
            owner = owner.with_name(name.clone());
        }
        controller.save(&RequestContext::new(id), owner).await?;
        std::fs::write(&self.key_out, key.to_pem())?;
        state.persist_store(controller.store())?;

        Ok(format!(
            "Registered {} ({}), key written to {}",
            self.id,
            DataOwnerKind::from(self.kind),
            self.key_out.display()
        ))
    }
}

