//! `berth endpoints` — List the endpoints visible to the API token.

use clap::Args;

use crate::commands::GlobalArgs;
use crate::output;
use crate::session::Session;

/// Arguments for the `endpoints` command.
#[derive(Args, Debug)]
pub struct EndpointsArgs {}

/// Executes the `endpoints` command.
///
/// The selected endpoint, if any, is marked with `*`.
///
/// # Errors
///
/// Returns an error if the endpoint refresh fails.
pub async fn execute(global: &GlobalArgs, _args: EndpointsArgs) -> anyhow::Result<()> {
    let session = Session::connect(global)?;
    let _ = session.coordinator.refresh_endpoints().join().await?;

    let endpoints = session.coordinator.endpoints();
    if endpoints.is_empty() {
        println!("No endpoints found.");
        return Ok(());
    }

    let selected = session.coordinator.selected_endpoint().map(|e| e.id);
    println!("{}", output::endpoint_header());
    for endpoint in &endpoints {
        println!("{}", output::endpoint_row(endpoint, selected == Some(endpoint.id)));
    }
    Ok(())
}
