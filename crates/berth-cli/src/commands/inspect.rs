//! `berth inspect` — Show the detailed view of one container.

use berth_common::types::InstanceId;
use chrono::Utc;
use clap::Args;

use crate::commands::GlobalArgs;
use crate::output;
use crate::session::Session;

/// Arguments for the `inspect` command.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Container id (full or as accepted by the server).
    pub id: String,

    /// Print the raw details as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `inspect` command.
///
/// # Errors
///
/// Returns an error if no endpoint can be selected or the lookup fails.
pub async fn execute(global: &GlobalArgs, args: InspectArgs) -> anyhow::Result<()> {
    let session = Session::connect(global)?;
    let _ = session.select_endpoint().await?;
    let details = session
        .coordinator
        .container_details(&InstanceId::new(args.id))
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    let now = Utc::now();
    let age = |at: Option<chrono::DateTime<Utc>>| {
        at.map_or_else(|| "-".to_string(), |t| output::format_age(t, now))
    };
    let c = &details.container;
    println!("ID:        {}", c.instance_id);
    println!("Name:      {}", c.display_name());
    println!("Key:       {}", c.logical_key);
    println!("State:     {}", c.state);
    println!("Status:    {}", c.status_text().unwrap_or("-"));
    println!("Image:     {}", details.image.as_deref().unwrap_or("-"));
    println!("Created:   {}", age(details.created_at));
    println!("Started:   {}", age(details.started_at));
    println!("Finished:  {}", age(details.finished_at));
    println!(
        "Exit code: {}",
        details.exit_code.map_or_else(|| "-".to_string(), |code| code.to_string())
    );
    println!("Restarts:  {}", details.restart_count);
    Ok(())
}
