use clap::Args;

use common::actor::{DataOwner, KeyMaterial};
use common::error::AccessError;

use crate::state::StateError;

/// Print a data owner's public key material
#[derive(Args, Debug, Clone)]
pub struct Show {
    /// Data owner to show, defaults to the workspace actor
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Show {
    type Error = ShowError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| state.config.actor_id.clone());
        let owner: DataOwner = state.controller()?.load(&id).await?;

        let fingerprints: Vec<String> = KeyMaterial::ordered_fingerprints(&owner.crypto)
            .iter()
            .map(|fp| fp.to_string())
            .collect();
        Ok(format!(
            "{}\nkeys: {}",
            serde_json::to_string_pretty(&owner)?,
            fingerprints.join(", ")
        ))
    }
}
