//! Clap derive structures for the `overseer` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// overseer -- aggregation engine behind the platform admin console
#[derive(Debug, Parser)]
#[command(
    name = "overseer",
    version,
    about = "Aggregate platform state into admin console view models",
    long_about = "Polls the control plane, identity server, telemetry registry and\n\
        firehose, joins their records into one view per resource type, and\n\
        forwards admin operations to the backing APIs.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "OVERSEER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "OVERSEER_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one key per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll every configured source until interrupted
    Run(RunArgs),

    /// Poll once and print one view model
    #[command(alias = "v")]
    View(ViewArgs),

    /// Poll once and route a single console request
    Request(RequestArgs),

    /// Show recorded platform statistics
    Stats(StatsArgs),

    /// Import the legacy statistics file into the database
    MigrateStats(MigrateStatsArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  RUN
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Do not record statistics even if configured
    #[arg(long)]
    pub no_stats: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VIEW
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Resource type, e.g. "applications" or "service_instances"
    pub resource: String,

    /// Row key; prints that row's detail instead of the table
    pub key: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  REQUEST
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// HTTP verb: get, put, post or delete
    pub verb: String,

    /// Request path, e.g. "/organizations/<guid>"
    pub path: String,

    /// Raw JSON body
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Query flag as name=value (repeatable)
    #[arg(long = "query", short = 'Q', value_name = "NAME=VALUE")]
    pub query: Vec<String>,

    /// Actor recorded in the audit log
    #[arg(long, env = "OVERSEER_ACTOR", default_value = "cli")]
    pub actor: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  STATS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Only samples newer than this, e.g. "2h" or "7days"
    #[arg(long, short = 's')]
    pub since: Option<String>,

    /// Database path (overrides [stats].database)
    #[arg(long)]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MigrateStatsArgs {
    /// Legacy JSON file (overrides [stats].legacy_file)
    #[arg(long)]
    pub legacy_file: Option<PathBuf>,

    /// Database path (overrides [stats].database)
    #[arg(long)]
    pub database: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration with secrets masked
    Show,

    /// Print the config file path
    Path,

    /// Store the identity client secret in the system keyring (prompted, or one line of piped stdin)
    SetSecret {
        /// Client id (defaults to [credentials].client_id)
        #[arg(long)]
        client_id: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
