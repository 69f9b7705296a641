//! `berth action` — Act on a container, then refresh the container list.

use berth_common::types::{ContainerAction, InstanceId};
use clap::{Args, ValueEnum};

use crate::commands::GlobalArgs;
use crate::output;
use crate::session::Session;

/// Actions accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Start a stopped container.
    Start,
    /// Stop a running container.
    Stop,
    /// Restart a container.
    Restart,
    /// Kill a container.
    Kill,
    /// Pause a running container.
    Pause,
    /// Resume a paused container.
    Unpause,
    /// Remove a container.
    Remove,
}

impl From<ActionKind> for ContainerAction {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Start => Self::Start,
            ActionKind::Stop => Self::Stop,
            ActionKind::Restart => Self::Restart,
            ActionKind::Kill => Self::Kill,
            ActionKind::Pause => Self::Pause,
            ActionKind::Unpause => Self::Unpause,
            ActionKind::Remove => Self::Remove,
        }
    }
}

/// Arguments for the `action` command.
#[derive(Args, Debug)]
pub struct ActionArgs {
    /// Action to execute.
    #[arg(value_enum)]
    pub action: ActionKind,

    /// Container id.
    pub id: String,
}

/// Executes the `action` command and prints the refreshed container.
///
/// # Errors
///
/// Returns an error if no endpoint can be selected or the action fails.
pub async fn execute(global: &GlobalArgs, args: ActionArgs) -> anyhow::Result<()> {
    let session = Session::connect(global)?;
    let _ = session.select_endpoint().await?;

    let action = ContainerAction::from(args.action);
    let id = InstanceId::new(args.id);
    let refresh = session.coordinator.execute_action(action, &id).await?;
    println!("{action} sent to {}", id.short());

    if let Some(snapshot) = refresh.join().await?.committed() {
        if let Some(container) = snapshot.containers().iter().find(|c| c.instance_id == id) {
            println!("{}", output::container_header());
            println!("{}", output::container_row(container));
        }
    }
    Ok(())
}
