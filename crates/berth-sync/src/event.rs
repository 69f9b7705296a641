//! Typed sync events.
//!
//! Every state transition of the coordinator, the snapshot store, and the
//! scheduler is announced as a [`SyncEvent`] on an [`EventBus`]. Follow-on
//! work subscribes to the bus instead of hooking into state mutation.

use berth_common::constants::EVENT_CHANNEL_CAPACITY;
use berth_common::types::{Endpoint, EndpointId};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::coordinator::{ResourceClass, SetupState};

/// A sync lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The connection setup moved to a new state.
    SetupChanged(SetupState),
    /// A fresh endpoint list was committed.
    EndpointsUpdated {
        /// The committed endpoints.
        endpoints: Vec<Endpoint>,
    },
    /// The selected endpoint changed.
    EndpointSelected {
        /// The new selection, if any.
        endpoint: Option<EndpointId>,
    },
    /// The displayed container list changed.
    ContainersUpdated {
        /// Endpoint the list belongs to; `None` when the list was cleared.
        endpoint: Option<EndpointId>,
        /// Number of containers in the list.
        count: usize,
    },
    /// A refresh failed with a user-visible error.
    RefreshFailed {
        /// Resource class of the failed refresh.
        class: ResourceClass,
        /// Rendered error.
        message: String,
    },
    /// A snapshot replaced the stored one for its scope.
    SnapshotCommitted {
        /// Scope of the snapshot.
        scope: EndpointId,
        /// Number of containers in the snapshot.
        containers: usize,
    },
    /// A notification was composed and handed to the dispatcher.
    NotificationComposed {
        /// Scope the changes belong to.
        scope: EndpointId,
        /// Dedup identifier of the notification.
        dedup_id: String,
    },
    /// The scheduler armed its next run.
    SyncArmed {
        /// Wall-clock time of the next run.
        next_run: DateTime<Utc>,
    },
}

/// Broadcast bus carrying [`SyncEvent`]s.
///
/// Cloning the bus yields another sender on the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` events per slow subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Emits an event. Having no subscriber is not an error.
    pub fn emit(&self, event: SyncEvent) {
        tracing::trace!(?event, "sync event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.emit(SyncEvent::EndpointSelected { endpoint: None });
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::EndpointSelected {
            endpoint: Some(EndpointId::new(1)),
        });
        bus.emit(SyncEvent::ContainersUpdated {
            endpoint: None,
            count: 0,
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::EndpointSelected {
                endpoint: Some(EndpointId::new(1))
            }
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            SyncEvent::ContainersUpdated { count: 0, .. }
        ));
    }
}
