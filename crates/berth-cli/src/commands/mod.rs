//! CLI command definitions and dispatch.

pub mod action;
pub mod endpoints;
pub mod inspect;
pub mod ps;
pub mod snapshot;
pub mod sync;
pub mod watch;

use std::path::PathBuf;

use berth_common::constants;
use clap::{Parser, Subcommand};

/// berth — watch remote container fleets and report what changed.
#[derive(Parser, Debug)]
#[command(name = "berth", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, env = constants::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Endpoint id to use instead of the configured preference.
    #[arg(long, global = true)]
    pub endpoint: Option<u64>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file override.
    pub config: Option<PathBuf>,
    /// Endpoint override.
    pub endpoint: Option<u64>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the endpoints visible to the API token.
    Endpoints(endpoints::EndpointsArgs),
    /// List containers of the selected endpoint.
    Ps(ps::PsArgs),
    /// Show the detailed view of one container.
    Inspect(inspect::InspectArgs),
    /// Start, stop, restart, or otherwise act on a container.
    Action(action::ActionArgs),
    /// Run one sync: fetch, diff against the stored snapshot, notify, commit.
    Sync(sync::SyncArgs),
    /// Run syncs periodically until Ctrl+C.
    Watch(watch::WatchArgs),
    /// Print the stored snapshot of the selected endpoint.
    Snapshot(snapshot::SnapshotArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let global = GlobalArgs {
        config: cli.config,
        endpoint: cli.endpoint,
    };
    match cli.command {
        Command::Endpoints(args) => endpoints::execute(&global, args).await,
        Command::Ps(args) => ps::execute(&global, args).await,
        Command::Inspect(args) => inspect::execute(&global, args).await,
        Command::Action(args) => action::execute(&global, args).await,
        Command::Sync(args) => sync::execute(&global, args).await,
        Command::Watch(args) => watch::execute(&global, args).await,
        Command::Snapshot(args) => snapshot::execute(&global, args).await,
    }
}
