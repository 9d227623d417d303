pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "carelock")]
#[command(about = "Share and read end-to-end encrypted healthcare records")]
pub struct Args {
    /// Path to the carelock directory (defaults to ~/.carelock)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level, overriding the configured one
    #[arg(long, global = true)]
    pub log_level: Option<tracing::Level>,

    #[command(subcommand)]
    pub command: crate::Command,
}
