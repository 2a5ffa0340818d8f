//! Command dispatch: bridges CLI args -> engine operations -> output formatting.

pub mod config_cmd;
pub mod request;
pub mod run;
pub mod stats;
pub mod util;
pub mod view;

use overseer_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command to the appropriate handler.
pub async fn dispatch(cmd: Command, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(&args, cfg, global).await,
        Command::View(args) => view::handle(&args, cfg, global).await,
        Command::Request(args) => request::handle(&args, cfg, global).await,
        Command::Stats(args) => stats::handle(&args, cfg, global),
        Command::MigrateStats(args) => stats::migrate(&args, cfg, global),
        Command::Config(args) => config_cmd::handle(args, cfg, global),
        // Completions are handled before dispatch
        Command::Completions(_) => Ok(()),
    }
}
