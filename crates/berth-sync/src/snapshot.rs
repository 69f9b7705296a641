//! Point-in-time container sets.
//!
//! A [`Snapshot`] holds at most one container per logical key. The
//! constructor enforces that, and deserialized snapshots go through the
//! same path.

use std::collections::BTreeMap;

use berth_common::types::{Container, EndpointId, LogicalKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The complete container set of one endpoint at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSnapshot")]
pub struct Snapshot {
    scope: EndpointId,
    taken_at: DateTime<Utc>,
    containers: Vec<Container>,
}

/// Unvalidated wire form of a snapshot.
#[derive(Deserialize)]
struct RawSnapshot {
    scope: EndpointId,
    taken_at: DateTime<Utc>,
    containers: Vec<Container>,
}

impl From<RawSnapshot> for Snapshot {
    fn from(raw: RawSnapshot) -> Self {
        Self::new(raw.scope, raw.taken_at, raw.containers)
    }
}

impl Snapshot {
    /// Builds a snapshot, keeping the first container seen for each
    /// logical key. Containers are held sorted by logical key.
    #[must_use]
    pub fn new(scope: EndpointId, taken_at: DateTime<Utc>, containers: Vec<Container>) -> Self {
        let mut by_key: BTreeMap<LogicalKey, Container> = BTreeMap::new();
        for container in containers {
            if let Some(kept) = by_key.get(&container.logical_key) {
                tracing::warn!(
                    %scope,
                    key = %container.logical_key,
                    kept = %kept.instance_id,
                    dropped = %container.instance_id,
                    "duplicate logical key in snapshot"
                );
                continue;
            }
            let _ = by_key.insert(container.logical_key.clone(), container);
        }
        Self {
            scope,
            taken_at,
            containers: by_key.into_values().collect(),
        }
    }

    /// Builds a snapshot stamped with the current time.
    #[must_use]
    pub fn capture(scope: EndpointId, containers: Vec<Container>) -> Self {
        Self::new(scope, Utc::now(), containers)
    }

    /// Endpoint the snapshot belongs to.
    #[must_use]
    pub const fn scope(&self) -> EndpointId {
        self.scope
    }

    /// When the snapshot was taken.
    #[must_use]
    pub const fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Containers, sorted by logical key.
    #[must_use]
    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    /// Number of containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Whether the snapshot holds no container.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Looks a container up by logical key.
    #[must_use]
    pub fn get(&self, key: &LogicalKey) -> Option<&Container> {
        self.containers
            .binary_search_by(|c| c.logical_key.cmp(key))
            .ok()
            .map(|i| &self.containers[i])
    }

    /// Indexes the containers by logical key.
    #[must_use]
    pub fn index(&self) -> BTreeMap<&LogicalKey, &Container> {
        self.containers.iter().map(|c| (&c.logical_key, c)).collect()
    }
}

/// The persisted unit for one scope: the snapshot plus the dedup id of the
/// last notification delivered for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Last committed snapshot.
    pub snapshot: Snapshot,
    /// Dedup identifier of the last delivered notification.
    #[serde(default)]
    pub last_notification: Option<String>,
}
