use std::path::PathBuf;

use clap::Args;

use common::actor::KeyRing;
use common::error::AccessError;

use crate::state::{read_key, StateError};

/// Reveal the participants of an anonymous delegation
///
/// Only the delegator and the delegate can; everyone else gets the same
/// refusal whether or not the delegation key exists.
#[derive(Args, Debug, Clone)]
pub struct Identify {
    #[arg(long)]
    pub delegation_key: String,

    /// Use this private key instead of the workspace key
    #[arg(long)]
    pub key: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentifyError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("access error: {0}")]
    Access(#[from] AccessError),
}

#[async_trait::async_trait]
impl crate::op::Op for Identify {
    type Error = IdentifyError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let controller = state.controller()?;
        let keys: KeyRing = match &self.key {
            Some(path) => read_key(path)?.into(),
            None => state.load_key()?.into(),
        };

        let delegator = controller
            .identify_delegator(&self.delegation_key, &keys)
            .await?;
        let delegate = controller
            .identify_delegate(&self.delegation_key, &keys)
            .await?;
        Ok(format!("delegator: {}\ndelegate: {}", delegator, delegate))
    }
}
