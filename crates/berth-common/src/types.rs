//! Domain primitive types used across the berth workspace.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compose label naming the project a container belongs to.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
/// Compose label naming the service a container implements.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";
/// Compose label numbering replicas of one service.
pub const COMPOSE_NUMBER_LABEL: &str = "com.docker.compose.container-number";

/// Identifier of a remote container environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(u64);

impl EndpointId {
    /// Creates an endpoint ID from its numeric value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one concrete container instance.
///
/// Changes whenever the workload is recreated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Creates an instance ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the conventional 12 character short form.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a container that survives recreation.
///
/// Two containers in successive snapshots with the same key are the same
/// logical workload, whatever their instance IDs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalKey(String);

impl LogicalKey {
    /// Creates a logical key from an already derived value.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the logical key of a container from what the remote API
    /// reports about it.
    ///
    /// Compose association labels win, then the container name, then the
    /// instance ID. A key derived from the instance ID changes on every
    /// recreation, so such containers are only ever created or removed.
    #[must_use]
    pub fn derive(
        labels: &BTreeMap<String, String>,
        name: Option<&str>,
        instance_id: &InstanceId,
    ) -> Self {
        if let (Some(project), Some(service)) = (
            labels.get(COMPOSE_PROJECT_LABEL),
            labels.get(COMPOSE_SERVICE_LABEL),
        ) {
            let number = labels
                .get(COMPOSE_NUMBER_LABEL)
                .map_or("1", String::as_str);
            return Self(format!("compose:{project}/{service}/{number}"));
        }

        match name.map(|n| n.trim_start_matches('/')) {
            Some(name) if !name.is_empty() => Self(format!("name:{name}")),
            _ => Self(format!("instance:{instance_id}")),
        }
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a container as reported by the remote environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Created but never started.
    Created,
    /// Actively running.
    Running,
    /// Frozen by the runtime.
    Paused,
    /// Being restarted.
    Restarting,
    /// Being removed.
    Removing,
    /// Stopped.
    Exited,
    /// Defunct; could not be removed cleanly.
    Dead,
}

impl ContainerState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::Running,
        Self::Paused,
        Self::Restarting,
        Self::Removing,
        Self::Exited,
        Self::Dead,
    ];

    /// Returns the wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A single workload instance as reported by the remote environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Instance identifier; changes on recreation.
    pub instance_id: InstanceId,
    /// Identity that survives recreation.
    pub logical_key: LogicalKey,
    /// Human-readable name, without the leading slash.
    pub name: Option<String>,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Free-form status text, e.g. "Up 3 hours".
    pub status: Option<String>,
    /// Container labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Container {
    /// Creates a container with no name, status, or labels.
    #[must_use]
    pub fn new(instance_id: InstanceId, logical_key: LogicalKey, state: ContainerState) -> Self {
        Self {
            instance_id,
            logical_key,
            name: None,
            state,
            status: None,
            labels: BTreeMap::new(),
        }
    }

    /// Sets the container name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the status text.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Returns the name to show to people: the container name, else the
    /// logical key.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.logical_key.as_str())
    }

    /// Returns the status text if it carries anything.
    #[must_use]
    pub fn status_text(&self) -> Option<&str> {
        self.status.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Reachability of an endpoint as reported by the orchestration API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    /// The environment answered its last heartbeat.
    Up,
    /// The environment is unreachable.
    Down,
}

/// A remote container environment exposed by the orchestration API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint identifier.
    pub id: EndpointId,
    /// Display name.
    pub name: String,
    /// Address of the environment, if reported.
    pub url: Option<String>,
    /// Reachability.
    pub status: EndpointStatus,
}

/// Detailed view of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    /// Summary fields shared with the list view.
    pub container: Container,
    /// Image reference the container runs.
    pub image: Option<String>,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Last exit time.
    pub finished_at: Option<DateTime<Utc>>,
    /// Exit code of the last run.
    pub exit_code: Option<i64>,
    /// Number of restarts performed by the runtime.
    pub restart_count: u64,
}

/// Lifecycle action that can be executed on a remote container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
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

impl ContainerAction {
    /// Returns the action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Kill => "kill",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
