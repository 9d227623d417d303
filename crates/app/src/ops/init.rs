use std::path::PathBuf;

use clap::Args;

use common::actor::DataOwner;
use common::error::AccessError;

use super::ActorKind;
use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Id of the data owner this workspace acts as
    #[arg(long)]
    pub actor_id: String,

    #[arg(long, value_enum, default_value = "healthcare-party")]
    pub kind: ActorKind,

    /// Display name of the data owner
    #[arg(long)]
    pub name: Option<String>,

    /// Directory for rolling log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
    #[error("init failed: {0}")]
    Access(#[from] AccessError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            log_dir: self.log_dir.clone(),
            ..AppConfig::new(self.actor_id.clone())
        };
        let state = AppState::init(ctx.config_path.clone(), config)?;
        let key = state.load_key()?;

        let mut owner = DataOwner::new(state.actor_id(), self.kind.into(), &key.public());
        if let Some(name) = &self.name {
            owner = owner.with_name(name.clone());
        }
        let controller = state.controller()?;
        controller.save(&state.context(), owner).await?;
        state.persist_store(controller.store())?;

        Ok(format!(
            "Initialized carelock directory at: {}\n\
             - Actor: {}\n\
             - Key: {} (fingerprint {})\n\
             - Store: {}\n\
             - Config: {}",
            state.carelock_dir.display(),
            state.config.actor_id,
            state.key_path.display(),
            key.public().fingerprint(),
            state.store_path.display(),
            state.config_path.display(),
        ))
    }
}
