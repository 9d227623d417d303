use clap::{Args, Subcommand};

pub mod add;
pub mod rotate;
pub mod show;

use crate::op::Op;

crate::command_enum! {
    (Add, add::Add),
    (Show, show::Show),
    (Rotate, rotate::Rotate),
}

pub type ActorCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Actor {
    #[command(subcommand)]
    pub command: ActorCommand,
}

#[async_trait::async_trait]
impl Op for Actor {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
