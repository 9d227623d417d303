mod args;
mod logging;
mod op;
mod ops;
mod state;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Actor, Create, Delete, Grant, Identify, Import, Init, Merge, Read, Version};

command_enum! {
    (Init, Init),
    (Actor, Actor),
    (Create, Create),
    (Grant, Grant),
    (Read, Read),
    (Identify, Identify),
    (Import, Import),
    (Merge, Merge),
    (Delete, Delete),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Configured logging applies once the workspace exists
    let config = state::AppState::load(args.config_path.clone())
        .ok()
        .map(|state| state.config);
    let log_level = args
        .log_level
        .or_else(|| config.as_ref().and_then(|c| c.log_level().ok()))
        .unwrap_or(tracing::Level::WARN);
    let log_dir = config.as_ref().and_then(|c| c.log_dir.clone());
    let guards = logging::init_logging(log_level, log_dir.as_deref());

    let ctx = op::OpContext::new(args.config_path);

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            tracing::debug!("command failed: {:?}", e);
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush buffered log lines before exiting
    drop(guards);
    std::process::exit(code);
}
