//! Snapshot diffing.
//!
//! [`diff`] classifies every logical key in the union of two snapshots:
//!
//! | old | new | instance id | state     | class       |
//! |-----|-----|-------------|-----------|-------------|
//! | -   | yes |             |           | `Created`   |
//! | yes | -   |             |           | `Removed`   |
//! | yes | yes | differs     |           | `Recreated` |
//! | yes | yes | same        | differs   | `Changed`   |
//! | yes | yes | same        | same      | unchanged   |
//!
//! Status text is not compared. Runtimes rewrite it constantly ("Up 5
//! minutes", "Up 6 minutes") and it would turn every sync into a change.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use berth_common::types::{Container, ContainerState, LogicalKey};
use serde::Serialize;

use crate::snapshot::Snapshot;

/// How a container differs between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Only present in the new snapshot.
    Created,
    /// Same instance, different state.
    Changed,
    /// Same logical key, new instance.
    Recreated,
    /// Only present in the old snapshot.
    Removed,
}

impl ChangeType {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Changed => "changed",
            Self::Recreated => "recreated",
            Self::Removed => "removed",
        }
    }

    /// Sort group: everything still present comes before removals.
    const fn group(self) -> u8 {
        match self {
            Self::Created | Self::Changed | Self::Recreated => 0,
            Self::Removed => 1,
        }
    }
}

/// One classified difference.
///
/// Which sides are present follows from the change type by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerChange(Sides);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sides {
    Created { new: Container },
    Changed { old: Container, new: Container },
    Recreated { old: Container, new: Container },
    Removed { old: Container },
}

impl ContainerChange {
    /// A container that appeared.
    #[must_use]
    pub const fn created(new: Container) -> Self {
        Self(Sides::Created { new })
    }

    /// A container whose state changed.
    #[must_use]
    pub const fn changed(old: Container, new: Container) -> Self {
        Self(Sides::Changed { old, new })
    }

    /// A container replaced by a new instance.
    #[must_use]
    pub const fn recreated(old: Container, new: Container) -> Self {
        Self(Sides::Recreated { old, new })
    }

    /// A container that disappeared.
    #[must_use]
    pub const fn removed(old: Container) -> Self {
        Self(Sides::Removed { old })
    }

    /// Classification of the change.
    #[must_use]
    pub const fn change_type(&self) -> ChangeType {
        match self.0 {
            Sides::Created { .. } => ChangeType::Created,
            Sides::Changed { .. } => ChangeType::Changed,
            Sides::Recreated { .. } => ChangeType::Recreated,
            Sides::Removed { .. } => ChangeType::Removed,
        }
    }

    /// Container as it was, absent for `Created`.
    #[must_use]
    pub const fn old_container(&self) -> Option<&Container> {
        match &self.0 {
            Sides::Created { .. } => None,
            Sides::Changed { old, .. } | Sides::Recreated { old, .. } | Sides::Removed { old } => {
                Some(old)
            }
        }
    }

    /// Container as it is, absent for `Removed`.
    #[must_use]
    pub const fn new_container(&self) -> Option<&Container> {
        match &self.0 {
            Sides::Removed { .. } => None,
            Sides::Created { new } | Sides::Changed { new, .. } | Sides::Recreated { new, .. } => {
                Some(new)
            }
        }
    }

    /// The container this change is about, newest view first.
    const fn subject(&self) -> &Container {
        match &self.0 {
            Sides::Created { new } | Sides::Changed { new, .. } | Sides::Recreated { new, .. } => {
                new
            }
            Sides::Removed { old } => old,
        }
    }

    /// Logical key of the container.
    #[must_use]
    pub fn logical_key(&self) -> &LogicalKey {
        &self.subject().logical_key
    }

    /// Name to show for the container.
    #[must_use]
    pub fn container_name(&self) -> &str {
        self.subject().display_name()
    }

    /// State before the change.
    #[must_use]
    pub fn old_state(&self) -> Option<ContainerState> {
        self.old_container().map(|c| c.state)
    }

    /// State after the change.
    #[must_use]
    pub fn new_state(&self) -> Option<ContainerState> {
        self.new_container().map(|c| c.state)
    }

    /// Status text before the change.
    #[must_use]
    pub fn old_status(&self) -> Option<&str> {
        self.old_container().and_then(Container::status_text)
    }

    /// Status text after the change.
    #[must_use]
    pub fn new_status(&self) -> Option<&str> {
        self.new_container().and_then(Container::status_text)
    }

    /// One stable line describing the change, used for dedup hashing.
    #[must_use]
    pub fn descriptor(&self) -> String {
        let id = |c: Option<&Container>| c.map_or("-", |c| c.instance_id.as_str()).to_string();
        let state = |s: Option<ContainerState>| s.map_or("-", ContainerState::as_str);
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.change_type().as_str(),
            self.logical_key(),
            id(self.old_container()),
            id(self.new_container()),
            state(self.old_state()),
            state(self.new_state()),
        )
    }
}

/// Ordered list of changes between two snapshots.
pub type ChangeSet = Vec<ContainerChange>;

/// Full classification of two snapshots: the changes plus the keys that
/// did not change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Classified changes, in display order.
    pub changes: ChangeSet,
    /// Keys present in both snapshots with identical instance and state.
    pub unchanged: Vec<LogicalKey>,
}

/// Classifies a container present in both snapshots.
fn classify_pair(old: &Container, new: &Container) -> Option<ContainerChange> {
    if old.instance_id != new.instance_id {
        Some(ContainerChange::recreated(old.clone(), new.clone()))
    } else if old.state != new.state {
        Some(ContainerChange::changed(old.clone(), new.clone()))
    } else {
        None
    }
}

/// Classifies every logical key in the union of both snapshots.
#[must_use]
pub fn partition(old: &Snapshot, new: &Snapshot) -> Partition {
    let old_index = old.index();
    let new_index = new.index();
    let keys: BTreeSet<&LogicalKey> = old_index.keys().chain(new_index.keys()).copied().collect();

    let mut result = Partition::default();
    for key in keys {
        match (old_index.get(key), new_index.get(key)) {
            (Some(o), Some(n)) => match classify_pair(o, n) {
                Some(change) => result.changes.push(change),
                None => result.unchanged.push(key.clone()),
            },
            (None, Some(n)) => result.changes.push(ContainerChange::created((*n).clone())),
            (Some(o), None) => result.changes.push(ContainerChange::removed((*o).clone())),
            (None, None) => {}
        }
    }
    result.changes.sort_by(display_order);
    result
}

/// Diffs two snapshots into an ordered change set.
///
/// Pure and deterministic: the same inputs always give the same output in
/// the same order, which the notification dedup id relies on.
#[must_use]
pub fn diff(old: &Snapshot, new: &Snapshot) -> ChangeSet {
    let changes = partition(old, new).changes;
    tracing::debug!(
        scope = %new.scope(),
        old = old.len(),
        new = new.len(),
        changes = changes.len(),
        "snapshots diffed"
    );
    changes
}

/// Present changes first, removals last; then case-insensitive name, with
/// the logical key breaking ties.
fn display_order(a: &ContainerChange, b: &ContainerChange) -> Ordering {
    a.change_type()
        .group()
        .cmp(&b.change_type().group())
        .then_with(|| {
            a.container_name()
                .to_lowercase()
                .cmp(&b.container_name().to_lowercase())
        })
        .then_with(|| a.logical_key().cmp(b.logical_key()))
}
