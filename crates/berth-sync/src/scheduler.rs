//! Periodic end-to-end sync.
//!
//! One run fetches the current container list of the selected endpoint,
//! diffs it against the stored snapshot, hands a notification to the
//! dispatcher when something changed, and commits the new snapshot. The
//! loop re-arms after every run whatever its outcome; the next run is the
//! only retry.

use std::sync::Arc;
use std::time::Duration;

use berth_common::error::{BerthError, Result};
use berth_common::types::EndpointId;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::composer::{NotificationComposer, NotificationContent};
use crate::coordinator::RefreshCoordinator;
use crate::detector::{self, ChangeSet};
use crate::dispatch::{self, NotificationDispatcher};
use crate::event::SyncEvent;
use crate::handle::Outcome;
use crate::store::SnapshotStore;

/// Stand-in deadline for intervals too long to represent; far enough that
/// the loop only wakes up for shutdown.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// What one sync run did.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Identifier of the run, for log correlation.
    pub run_id: Uuid,
    /// Endpoint the run covered.
    pub scope: EndpointId,
    /// Changes against the stored snapshot; empty on a baseline run.
    pub changes: ChangeSet,
    /// Notification handed to the dispatcher, if any. A notification
    /// identical to the last delivered one is not handed over again.
    pub notification: Option<NotificationContent>,
    /// Whether the fresh snapshot replaced the stored one.
    pub committed: bool,
}

impl SyncReport {
    fn superseded(run_id: Uuid, scope: EndpointId) -> Self {
        Self {
            run_id,
            scope,
            changes: ChangeSet::new(),
            notification: None,
            committed: false,
        }
    }
}

/// Drives [`run_sync`](SyncScheduler::run_sync) on a fixed interval.
pub struct SyncScheduler {
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<SnapshotStore>,
    composer: NotificationComposer,
    dispatcher: Arc<dyn NotificationDispatcher>,
    interval: Duration,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl SyncScheduler {
    /// Creates a scheduler running every `interval`.
    #[must_use]
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        store: Arc<SnapshotStore>,
        composer: NotificationComposer,
        dispatcher: Arc<dyn NotificationDispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            store,
            composer,
            dispatcher,
            interval,
        }
    }

    /// Interval between runs.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one sync.
    ///
    /// The first run for an endpoint records a baseline without notifying.
    /// A notification identical to the last one delivered for the endpoint
    /// is not delivered again. If the container fetch is superseded by a
    /// newer request, the run ends without committing.
    ///
    /// # Errors
    ///
    /// Returns `NotSetup`, `NoSelectedEndpoint`, transport and decoding
    /// errors from the fetch, and persistence errors. The stored snapshot is
    /// left untouched on every error.
    pub async fn run_sync(&self) -> Result<SyncReport> {
        let run_id = Uuid::new_v4();
        let _ = self
            .coordinator
            .wait_until_ready(&CancellationToken::new())
            .await?;

        if self.coordinator.selected_endpoint().is_none() {
            let _ = self.coordinator.refresh_endpoints().join().await?;
        }
        let scope = self
            .coordinator
            .selected_endpoint()
            .map(|e| e.id)
            .ok_or(BerthError::NoSelectedEndpoint)?;
        tracing::info!(%run_id, %scope, "sync run started");

        let previous = self.store.load(scope).await?;

        let fresh = match self.coordinator.refresh_containers().join().await? {
            Outcome::Committed(snapshot) if snapshot.scope() == scope => snapshot,
            Outcome::Committed(_) | Outcome::Superseded => {
                tracing::info!(%run_id, %scope, "container fetch superseded, nothing committed");
                return Ok(SyncReport::superseded(run_id, scope));
            }
        };

        let Some(previous) = previous else {
            let committed = self.store.commit(fresh, None).await?;
            tracing::info!(%run_id, %scope, "baseline recorded");
            return Ok(SyncReport {
                run_id,
                scope,
                changes: ChangeSet::new(),
                notification: None,
                committed,
            });
        };

        let changes = detector::diff(&previous.snapshot, &fresh);
        let notification = self
            .composer
            .compose(&changes)
            .filter(|content| {
                let repeated =
                    previous.last_notification.as_deref() == Some(content.dedup_id.as_str());
                if repeated {
                    tracing::info!(%run_id, dedup_id = %content.dedup_id, "notification already delivered");
                }
                !repeated
            });
        if let Some(content) = &notification {
            self.coordinator
                .events()
                .emit(SyncEvent::NotificationComposed {
                    scope,
                    dedup_id: content.dedup_id.clone(),
                });
            let _ = dispatch::deliver_detached(Arc::clone(&self.dispatcher), content.clone());
        }

        let delivered = notification.as_ref().map(|c| c.dedup_id.clone());
        let committed = self.store.commit(fresh, delivered).await?;
        tracing::info!(
            %run_id,
            %scope,
            changes = changes.len(),
            committed,
            "sync run finished"
        );
        Ok(SyncReport {
            run_id,
            scope,
            changes,
            notification,
            committed,
        })
    }

    /// Runs syncs until `shutdown` is cancelled, starting immediately.
    ///
    /// Each run executes on its own task, so a failing or panicking run is
    /// logged and the loop keeps going.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "scheduler started");
        let mut deadline = Instant::now();
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep_until(deadline) => {}
            }

            let this = Arc::clone(&self);
            let mut task = tokio::spawn(async move { this.run_sync().await });
            let joined = tokio::select! {
                joined = &mut task => joined,
                () = shutdown.cancelled() => {
                    task.abort();
                    break;
                }
            };
            match joined {
                Ok(Ok(report)) => tracing::debug!(
                    run_id = %report.run_id,
                    changes = report.changes.len(),
                    "sync run completed"
                ),
                Ok(Err(e)) if e.is_cancelled() => tracing::debug!("sync run cancelled"),
                Ok(Err(e)) => tracing::warn!(error = %e, "sync run failed"),
                Err(e) => tracing::error!(error = %e, "sync run aborted"),
            }

            deadline = self.arm();
        }
        tracing::info!("scheduler stopped");
    }

    /// Schedules the next run and announces it.
    fn arm(&self) -> Instant {
        let next_run = chrono::Duration::from_std(self.interval)
            .ok()
            .and_then(|interval| Utc::now().checked_add_signed(interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        tracing::debug!(%next_run, "next sync armed");
        self.coordinator
            .events()
            .emit(SyncEvent::SyncArmed { next_run });
        let now = Instant::now();
        now.checked_add(self.interval)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now)
    }
}
