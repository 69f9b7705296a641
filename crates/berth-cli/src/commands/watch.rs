//! `berth watch` — Run syncs periodically until Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use berth_common::constants;
use berth_sync::coordinator::ResourceClass;
use berth_sync::event::SyncEvent;
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::commands::GlobalArgs;
use crate::output::StdoutDispatcher;
use crate::session::Session;

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Arguments for the `watch` command.
#[allow(clippy::cast_possible_wrap)]
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between runs; defaults to the configured interval.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=constants::MAX_SYNC_INTERVAL_SECS))]
    pub interval: Option<u64>,
}

/// Executes the `watch` command.
///
/// # Errors
///
/// Returns an error if no endpoint can be selected or the Ctrl+C handler
/// cannot be installed.
pub async fn execute(global: &GlobalArgs, args: WatchArgs) -> anyhow::Result<()> {
    let session = Session::connect(global)?;
    let endpoint = session.select_endpoint().await?;
    let interval = args
        .interval
        .map_or_else(|| session.config.sync_interval(), Duration::from_secs);

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    ctrlc::set_handler(move || on_signal.cancel())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    eprintln!(
        "  Watching {} every {}s. Press Ctrl+C to stop.",
        endpoint.name,
        interval.as_secs()
    );

    let mut events = session.coordinator.subscribe();
    let announcer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SyncEvent::SyncArmed { next_run } = event {
                eprintln!("  {DIM}next sync at {}{RESET}", next_run.format("%H:%M:%S"));
            }
        }
    });

    let scheduler = Arc::new(session.scheduler(Arc::new(StdoutDispatcher), interval));
    scheduler.run(shutdown).await;
    session.coordinator.cancel(ResourceClass::Containers);
    announcer.abort();

    eprintln!("  Stopped.");
    Ok(())
}
