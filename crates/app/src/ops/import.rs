use std::path::PathBuf;

use clap::Args;

use common::store::MemorySnapshot;

use crate::state::StateError;

/// Pull in the revisions of another workspace's store
///
/// Revisions written concurrently on both sides end up as conflicts; run
/// `merge` on them afterwards.
#[derive(Args, Debug, Clone)]
pub struct Import {
    /// Path to another workspace's store.json
    #[arg(long)]
    pub snapshot: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("store error: {0}")]
    Store(String),
}

#[async_trait::async_trait]
impl crate::op::Op for Import {
    type Error = ImportError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let store = state.open_store()?;

        let json = std::fs::read_to_string(&self.snapshot)?;
        let snapshot: MemorySnapshot = serde_json::from_str(&json)?;
        let imported = store
            .import(&snapshot)
            .map_err(|e| ImportError::Store(e.to_string()))?;
        state.persist_store(&store)?;

        Ok(format!(
            "Imported {} revisions from {} documents",
            imported,
            snapshot.len()
        ))
    }
}
