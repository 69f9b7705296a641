//! `berth sync` — Run one sync against the selected endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use berth_common::error::Result;
use berth_sync::composer::NotificationContent;
use berth_sync::dispatch::NotificationDispatcher;
use clap::Args;
use tokio::sync::mpsc;

use crate::commands::GlobalArgs;
use crate::output;
use crate::session::Session;

/// Arguments for the `sync` command.
#[derive(Args, Debug)]
pub struct SyncArgs {}

/// Hands notifications back to the command so they are printed before exit.
struct Collect(mpsc::UnboundedSender<NotificationContent>);

#[async_trait]
impl NotificationDispatcher for Collect {
    async fn deliver(&self, content: NotificationContent) -> Result<()> {
        let _ = self.0.send(content);
        Ok(())
    }
}

/// Executes the `sync` command.
///
/// # Errors
///
/// Returns an error if no endpoint can be selected, the fetch fails, or the
/// snapshot cannot be persisted.
pub async fn execute(global: &GlobalArgs, _args: SyncArgs) -> anyhow::Result<()> {
    let session = Session::connect(global)?;
    let endpoint = session.select_endpoint().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = session.scheduler(Arc::new(Collect(tx)), session.config.sync_interval());

    let report = scheduler.run_sync().await?;
    if report.notification.is_some() {
        if let Some(content) = rx.recv().await {
            println!("{}", output::render_notification(&content));
        }
    } else if !report.committed {
        println!("Sync of {} was superseded; nothing recorded.", endpoint.name);
    } else if report.changes.is_empty() {
        println!("No changes on {}.", endpoint.name);
    } else {
        println!(
            "{} change(s) on {} were already reported.",
            report.changes.len(),
            endpoint.name
        );
    }
    Ok(())
}
