//! `berth snapshot` — Print the stored snapshot of an endpoint.

use berth_common::types::EndpointId;
use berth_sync::event::EventBus;
use chrono::Utc;
use clap::Args;

use crate::commands::GlobalArgs;
use crate::output;
use crate::session::{self, Session};

/// Arguments for the `snapshot` command.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Print the stored snapshot as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `snapshot` command.
///
/// Reads local state only when the endpoint is known from `--endpoint` or
/// the configuration; otherwise the server is asked which one is selected.
///
/// # Errors
///
/// Returns an error if the endpoint cannot be determined or the stored
/// snapshot cannot be read.
pub async fn execute(global: &GlobalArgs, args: SnapshotArgs) -> anyhow::Result<()> {
    let config = Session::load_config(global)?;
    let scope = match global.endpoint.map(EndpointId::new).or(config.preferred_endpoint) {
        Some(scope) => scope,
        None => Session::connect(global)?.select_endpoint().await?.id,
    };

    let store = session::snapshot_store_at(config.snapshot_dir(), EventBus::new());
    let Some(stored) = store.load(scope).await? else {
        println!("No snapshot stored for endpoint {scope}. Run `berth sync` first.");
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&*stored)?);
        return Ok(());
    }

    println!(
        "Endpoint {scope}, taken {} ({} containers)",
        output::format_age(stored.snapshot.taken_at(), Utc::now()),
        stored.snapshot.len()
    );
    if let Some(id) = &stored.last_notification {
        println!("Last notification: {id}");
    }
    if !stored.snapshot.is_empty() {
        println!("{}", output::container_header());
        for container in stored.snapshot.containers() {
            println!("{}", output::container_row(container));
        }
    }
    Ok(())
}
