//! Hand-off of composed notifications.

use std::sync::Arc;

use async_trait::async_trait;
use berth_common::error::Result;
use tokio::task::JoinHandle;

use crate::composer::NotificationContent;

/// Delivers notifications to the user.
///
/// Delivery is fire-and-forget from the sync core's point of view: failures
/// are logged by the caller and never retried.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    async fn deliver(&self, content: NotificationContent) -> Result<()>;
}

/// Delivers `content` on a detached task, logging any failure.
pub fn deliver_detached(
    dispatcher: Arc<dyn NotificationDispatcher>,
    content: NotificationContent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let dedup_id = content.dedup_id.clone();
        match dispatcher.deliver(content).await {
            Ok(()) => tracing::debug!(%dedup_id, "notification delivered"),
            Err(e) => tracing::warn!(%dedup_id, error = %e, "notification delivery failed"),
        }
    })
}
