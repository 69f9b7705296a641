//! Notification content for a change set.
//!
//! The amount of detail shrinks as the change count grows:
//!
//! - up to `detailed_max` changes: one container, one sentence about it;
//! - up to `medium_max`: one `name: status` line per container;
//! - beyond: a count in the title and the names in the body.
//!
//! All user-facing text comes from a [`Phrasebook`], so the composer only
//! decides what to say, not how a language says it.

use std::borrow::Cow;

use berth_common::config::NotificationConfig;
use berth_common::constants::DEDUP_NAMESPACE;
use berth_common::types::ContainerState;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::detector::{ChangeType, ContainerChange};

/// Hex characters of the SHA-256 digest kept in the dedup identifier.
const DEDUP_HASH_LEN: usize = 16;

/// A notification ready to be handed to a dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationContent {
    /// Headline.
    pub title: String,
    /// Body text; may span several lines.
    pub body: String,
    /// Advisory ranking hint: a tenth of the change count, unbounded.
    pub relevance: f64,
    /// Stable identifier of this exact change set.
    pub dedup_id: String,
}

/// How much detail a notification carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// A sentence about a single change.
    Detailed,
    /// One line per change.
    Medium,
    /// Count and names only.
    Summary,
}

/// Change-count boundaries between the verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Largest count rendered [`Verbosity::Detailed`].
    pub detailed_max: usize,
    /// Largest count rendered [`Verbosity::Medium`].
    pub medium_max: usize,
}

impl Thresholds {
    /// Picks the verbosity for a change count; `None` for zero.
    #[must_use]
    pub const fn verbosity(self, count: usize) -> Option<Verbosity> {
        if count == 0 {
            None
        } else if count <= self.detailed_max {
            Some(Verbosity::Detailed)
        } else if count <= self.medium_max {
            Some(Verbosity::Medium)
        } else {
            Some(Verbosity::Summary)
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        NotificationConfig::default().into()
    }
}

impl From<NotificationConfig> for Thresholds {
    fn from(config: NotificationConfig) -> Self {
        Self {
            detailed_max: config.detailed_max,
            medium_max: config.medium_max,
        }
    }
}

/// Localized text used in notifications.
pub trait Phrasebook: Send + Sync {
    /// Name of a container state.
    fn state(&self, state: ContainerState) -> Cow<'static, str>;

    /// A container appeared with the given status.
    fn appeared(&self, status: &str) -> String;

    /// A container went from one state to another.
    fn went_from(&self, from: &str, to: &str) -> String;

    /// A container was recreated and is now in the given status.
    fn recreated(&self, status: &str) -> String;

    /// A container disappeared; it was in the given status.
    fn disappeared(&self, was: &str) -> String;

    /// Short form of [`Phrasebook::recreated`] for one-line summaries.
    fn recreated_line(&self, status: &str) -> String;

    /// Short form of [`Phrasebook::disappeared`] for one-line summaries.
    fn disappeared_line(&self) -> String;

    /// Joins items into a list, e.g. "A, B and C".
    fn join_list(&self, items: &[&str]) -> String;

    /// Title announcing that `count` containers changed.
    fn containers_changed(&self, count: usize) -> String;
}

/// English text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishPhrasebook;

impl Phrasebook for EnglishPhrasebook {
    fn state(&self, state: ContainerState) -> Cow<'static, str> {
        Cow::Borrowed(state.as_str())
    }

    fn appeared(&self, status: &str) -> String {
        format!("Appeared, status: {status}")
    }

    fn went_from(&self, from: &str, to: &str) -> String {
        format!("Went from {from} to {to}")
    }

    fn recreated(&self, status: &str) -> String {
        format!("Recreated, now {status}")
    }

    fn disappeared(&self, was: &str) -> String {
        format!("Disappeared, was {was}")
    }

    fn recreated_line(&self, status: &str) -> String {
        format!("recreated, {status}")
    }

    fn disappeared_line(&self) -> String {
        "disappeared".to_string()
    }

    fn join_list(&self, items: &[&str]) -> String {
        match items {
            [] => String::new(),
            [only] => (*only).to_string(),
            [init @ .., last] => format!("{} and {last}", init.join(", ")),
        }
    }

    fn containers_changed(&self, count: usize) -> String {
        if count == 1 {
            "1 container changed".to_string()
        } else {
            format!("{count} containers changed")
        }
    }
}

/// Turns change sets into notification content.
pub struct NotificationComposer {
    thresholds: Thresholds,
    phrases: Box<dyn Phrasebook>,
}

impl std::fmt::Debug for NotificationComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationComposer")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl Default for NotificationComposer {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl NotificationComposer {
    /// Creates an English composer.
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self::with_phrasebook(thresholds, Box::new(EnglishPhrasebook))
    }

    /// Creates a composer using the given phrasebook.
    #[must_use]
    pub fn with_phrasebook(thresholds: Thresholds, phrases: Box<dyn Phrasebook>) -> Self {
        Self {
            thresholds,
            phrases,
        }
    }

    /// Composes the notification for a change set.
    ///
    /// Returns `None` for an empty change set. The changes are expected in
    /// detector order; the dedup id depends on it.
    #[must_use]
    pub fn compose(&self, changes: &[ContainerChange]) -> Option<NotificationContent> {
        let verbosity = self.thresholds.verbosity(changes.len())?;
        let (title, body) = match verbosity {
            Verbosity::Detailed => self.detailed(changes),
            Verbosity::Medium => self.medium(changes),
            Verbosity::Summary => self.summary(changes),
        };
        Some(NotificationContent {
            title,
            body,
            relevance: relevance(changes.len()),
            dedup_id: dedup_id(changes),
        })
    }

    fn detailed(&self, changes: &[ContainerChange]) -> (String, String) {
        let names: Vec<&str> = changes.iter().map(ContainerChange::container_name).collect();
        let lines: Vec<String> = changes.iter().map(|c| self.sentence(c)).collect();
        (self.phrases.join_list(&names), lines.join("\n"))
    }

    fn medium(&self, changes: &[ContainerChange]) -> (String, String) {
        let names: Vec<&str> = changes.iter().map(ContainerChange::container_name).collect();
        let lines: Vec<String> = changes
            .iter()
            .map(|c| format!("{}: {}", c.container_name(), self.line(c)))
            .collect();
        (self.phrases.join_list(&names), lines.join("\n"))
    }

    fn summary(&self, changes: &[ContainerChange]) -> (String, String) {
        let names: Vec<&str> = changes.iter().map(ContainerChange::container_name).collect();
        (
            self.phrases.containers_changed(changes.len()),
            self.phrases.join_list(&names),
        )
    }

    fn sentence(&self, change: &ContainerChange) -> String {
        match change.change_type() {
            ChangeType::Created => self.phrases.appeared(&self.new_status(change)),
            ChangeType::Changed => {
                let from = self.state_name(change.old_state());
                let to = self.state_name(change.new_state());
                self.phrases.went_from(&from, &to)
            }
            ChangeType::Recreated => self.phrases.recreated(&self.new_status(change)),
            ChangeType::Removed => {
                let was = change
                    .old_status()
                    .map_or_else(|| self.state_name(change.old_state()), Cow::Borrowed);
                self.phrases.disappeared(&was)
            }
        }
    }

    fn line(&self, change: &ContainerChange) -> String {
        match change.change_type() {
            ChangeType::Created | ChangeType::Changed => self.new_status(change).into_owned(),
            ChangeType::Recreated => self.phrases.recreated_line(&self.new_status(change)),
            ChangeType::Removed => self.phrases.disappeared_line(),
        }
    }

    /// Status text after the change, else the state name.
    fn new_status<'a>(&self, change: &'a ContainerChange) -> Cow<'a, str> {
        change
            .new_status()
            .map_or_else(|| self.state_name(change.new_state()), Cow::Borrowed)
    }

    fn state_name(&self, state: Option<ContainerState>) -> Cow<'static, str> {
        state.map_or(Cow::Borrowed("-"), |s| self.phrases.state(s))
    }
}

/// `count / 10`.
#[allow(clippy::cast_precision_loss)]
fn relevance(count: usize) -> f64 {
    count as f64 / 10.0
}

/// Namespace plus a truncated SHA-256 over the change descriptors.
#[must_use]
pub fn dedup_id(changes: &[ContainerChange]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DEDUP_NAMESPACE.as_bytes());
    for change in changes {
        hasher.update(b"\n");
        hasher.update(change.descriptor().as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("{DEDUP_NAMESPACE}.{}", &digest[..DEDUP_HASH_LEN])
}
