//! `berth ps` — List containers of the selected endpoint.

use berth_common::types::ContainerState;
use clap::Args;

use crate::commands::GlobalArgs;
use crate::output;
use crate::session::Session;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all containers (including stopped).
    #[arg(short, long)]
    pub all: bool,
}

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if no endpoint can be selected or the refresh fails.
pub async fn execute(global: &GlobalArgs, args: PsArgs) -> anyhow::Result<()> {
    let session = Session::connect(global)?;
    let endpoint = session.select_endpoint().await?;
    let _ = session.coordinator.refresh_containers().join().await?;

    let containers: Vec<_> = session
        .coordinator
        .containers()
        .into_iter()
        .filter(|c| args.all || c.state == ContainerState::Running)
        .collect();

    if containers.is_empty() {
        println!("No containers found on {}.", endpoint.name);
        return Ok(());
    }

    println!("{}", output::container_header());
    for container in &containers {
        println!("{}", output::container_row(container));
    }
    Ok(())
}
