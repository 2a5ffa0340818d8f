mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use overseer_config::{Config, ConfigError, Log};

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // A broken config file still gets reported through the normal error
    // path; logging falls back to stderr only.
    let loaded = overseer_config::load_config(cli.global.config.as_deref());
    let log = loaded
        .as_ref()
        .map(|cfg| cfg.log.clone())
        .unwrap_or_default();
    let _guard = init_tracing(cli.global.verbose, &log);

    if let Err(err) = run(cli, loaded).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, log: &Log) -> Option<WorkerGuard> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    let appender = log.file.as_deref().and_then(|path| match overseer_core::append_only(path) {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!("warning: cannot open log file {}: {e}", path.display());
            None
        }
    });

    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = if log.json {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(filter())
                    .boxed()
            } else {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(filter())
                    .boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(file_layer)
        .init();
    guard
}

async fn run(cli: Cli, loaded: Result<Config, ConfigError>) -> Result<(), CliError> {
    match cli.command {
        // Completions need neither config nor sources
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "overseer", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = loaded?;
            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &cfg, &cli.global).await
        }
    }
}
