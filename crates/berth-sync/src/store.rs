//! Last-known snapshot per scope.
//!
//! [`SnapshotStore`] replaces the stored snapshot of a scope as a whole
//! value on commit. Persistence goes through the [`SnapshotPersistence`]
//! seam so background runs keep continuity across process restarts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use berth_common::error::{BerthError, Result};
use berth_common::types::EndpointId;
use tokio::sync::Mutex;

use crate::event::{EventBus, SyncEvent};
use crate::snapshot::{Snapshot, StoredSnapshot};

/// Durable storage for stored snapshots.
#[async_trait]
pub trait SnapshotPersistence: Send + Sync {
    /// Loads the stored snapshot of a scope, if one was ever saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read or parsed.
    async fn load(&self, scope: EndpointId) -> Result<Option<StoredSnapshot>>;

    /// Saves the stored snapshot of a scope, replacing the previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    async fn save(&self, scope: EndpointId, stored: &StoredSnapshot) -> Result<()>;
}

/// One JSON file per scope inside a directory.
///
/// Files are written next to their destination and renamed into place, so
/// a reader never sees a half-written snapshot.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    /// Uses `dir` for snapshot files. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, scope: EndpointId) -> PathBuf {
        self.dir.join(format!("endpoint-{scope}.json"))
    }
}

#[async_trait]
impl SnapshotPersistence for JsonFilePersistence {
    async fn load(&self, scope: EndpointId) -> Result<Option<StoredSnapshot>> {
        let path = self.path_for(scope);
        tracing::debug!(path = %path.display(), "loading snapshot");
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BerthError::io(path, e)),
        };
        let stored: StoredSnapshot = serde_json::from_str(&content)?;
        Ok(Some(stored))
    }

    async fn save(&self, scope: EndpointId, stored: &StoredSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| BerthError::io(&self.dir, e))?;
        let path = self.path_for(scope);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(stored)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| BerthError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| BerthError::io(&path, e))?;
        tracing::debug!(path = %path.display(), "saved snapshot");
        Ok(())
    }
}

/// Keeps stored snapshots in memory only.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: std::sync::Mutex<HashMap<EndpointId, StoredSnapshot>>,
}

impl MemoryPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotPersistence for MemoryPersistence {
    async fn load(&self, scope: EndpointId) -> Result<Option<StoredSnapshot>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&scope).cloned())
    }

    async fn save(&self, scope: EndpointId, stored: &StoredSnapshot) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = entries.insert(scope, stored.clone());
        Ok(())
    }
}

/// Last-known snapshot per scope with whole-value replacement.
///
/// Persistence is the source of truth: every read and every commit check
/// goes back to it, so several processes sharing one snapshot directory
/// see each other's commits. Commits within one process are serialized.
pub struct SnapshotStore {
    persistence: Arc<dyn SnapshotPersistence>,
    commit_lock: Mutex<()>,
    events: EventBus,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish_non_exhaustive()
    }
}

impl SnapshotStore {
    /// Creates a store backed by `persistence`, announcing commits on `events`.
    #[must_use]
    pub fn new(persistence: Arc<dyn SnapshotPersistence>, events: EventBus) -> Self {
        Self {
            persistence,
            commit_lock: Mutex::new(()),
            events,
        }
    }

    /// Returns the stored snapshot of a scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence layer cannot be read.
    pub async fn load(&self, scope: EndpointId) -> Result<Option<Arc<StoredSnapshot>>> {
        Ok(self.persistence.load(scope).await?.map(Arc::new))
    }

    /// Replaces the stored snapshot of the snapshot's scope.
    ///
    /// A snapshot older than the one already stored is rejected and
    /// `Ok(false)` is returned. The new value is persisted before it becomes
    /// visible to readers; if persisting fails, the previous value stays.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence layer cannot be read or written.
    pub async fn commit(
        &self,
        snapshot: Snapshot,
        last_notification: Option<String>,
    ) -> Result<bool> {
        let scope = snapshot.scope();
        let guard = self.commit_lock.lock().await;

        let current = self.persistence.load(scope).await?;
        if let Some(current) = &current {
            if current.snapshot.taken_at() > snapshot.taken_at() {
                tracing::info!(
                    %scope,
                    stored = %current.snapshot.taken_at(),
                    incoming = %snapshot.taken_at(),
                    "rejecting snapshot older than the stored one"
                );
                return Ok(false);
            }
        }

        let count = snapshot.len();
        let stored = StoredSnapshot {
            snapshot,
            last_notification: last_notification
                .or_else(|| current.and_then(|c| c.last_notification)),
        };
        self.persistence.save(scope, &stored).await?;
        drop(guard);

        tracing::info!(%scope, containers = count, "snapshot committed");
        self.events.emit(SyncEvent::SnapshotCommitted {
            scope,
            containers: count,
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use berth_common::types::{Container, ContainerState, InstanceId, LogicalKey};
    use chrono::{Duration, Utc};

    use super::*;

    fn snapshot(scope: u64, offset_secs: i64, ids: &[&str]) -> Snapshot {
        let containers = ids
            .iter()
            .map(|id| {
                Container::new(
                    InstanceId::new(*id),
                    LogicalKey::new(format!("name:{id}")),
                    ContainerState::Running,
                )
            })
            .collect();
        Snapshot::new(
            EndpointId::new(scope),
            Utc::now() + Duration::seconds(offset_secs),
            containers,
        )
    }

    fn memory_store() -> SnapshotStore {
        SnapshotStore::new(Arc::new(MemoryPersistence::new()), EventBus::new())
    }

    #[tokio::test]
    async fn load_unknown_scope_is_none() {
        let store = memory_store();
        assert!(store.load(EndpointId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_replaces_whole_snapshot() {
        let store = memory_store();
        assert!(store.commit(snapshot(1, 0, &["a", "b"]), None).await.unwrap());
        assert!(store.commit(snapshot(1, 1, &["c"]), None).await.unwrap());
        let stored = store.load(EndpointId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored.snapshot.len(), 1);
        assert_eq!(stored.snapshot.containers()[0].instance_id.as_str(), "c");
    }

    #[tokio::test]
    async fn older_snapshot_is_rejected() {
        let store = memory_store();
        assert!(store.commit(snapshot(1, 10, &["new"]), None).await.unwrap());
        assert!(!store.commit(snapshot(1, 0, &["old"]), None).await.unwrap());
        let stored = store.load(EndpointId::new(1)).await.unwrap().unwrap();
        assert_eq!(stored.snapshot.containers()[0].instance_id.as_str(), "new");
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let store = memory_store();
        assert!(store.commit(snapshot(1, 0, &["a"]), None).await.unwrap());
        assert!(store.commit(snapshot(2, 0, &["b", "c"]), None).await.unwrap());
        assert_eq!(
            store.load(EndpointId::new(1)).await.unwrap().unwrap().snapshot.len(),
            1
        );
        assert_eq!(
            store.load(EndpointId::new(2)).await.unwrap().unwrap().snapshot.len(),
            2
        );
    }

    #[tokio::test]
    async fn notification_history_carries_over() {
        let store = memory_store();
        assert!(
            store
                .commit(snapshot(1, 0, &["a"]), Some("berth.container-changes.1".into()))
                .await
                .unwrap()
        );
        assert!(store.commit(snapshot(1, 1, &["a"]), None).await.unwrap());
        let stored = store.load(EndpointId::new(1)).await.unwrap().unwrap();
        assert_eq!(
            stored.last_notification.as_deref(),
            Some("berth.container-changes.1")
        );
    }

    #[tokio::test]
    async fn commit_emits_event() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let store = SnapshotStore::new(Arc::new(MemoryPersistence::new()), events);
        assert!(store.commit(snapshot(4, 0, &["a", "b"]), None).await.unwrap());
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::SnapshotCommitted {
                scope: EndpointId::new(4),
                containers: 2
            }
        );
    }

    #[tokio::test]
    async fn json_files_survive_a_new_store() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let persistence = Arc::new(JsonFilePersistence::new(dir.path().join("snapshots")));
        let store = SnapshotStore::new(persistence.clone(), EventBus::new());
        assert!(store.commit(snapshot(7, 0, &["a", "b"]), None).await.unwrap());

        let reopened = SnapshotStore::new(persistence, EventBus::new());
        let stored = reopened.load(EndpointId::new(7)).await.unwrap().unwrap();
        assert_eq!(stored.snapshot.len(), 2);
        assert!(dir.path().join("snapshots/endpoint-7.json").exists());
        assert!(!dir.path().join("snapshots/endpoint-7.json.tmp").exists());
    }

    #[tokio::test]
    async fn commits_from_another_store_are_seen() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let persistence = Arc::new(JsonFilePersistence::new(dir.path()));
        let watcher = SnapshotStore::new(persistence.clone(), EventBus::new());
        let one_shot = SnapshotStore::new(persistence, EventBus::new());

        assert!(watcher.commit(snapshot(3, 0, &["a"]), None).await.unwrap());
        assert!(watcher.load(EndpointId::new(3)).await.unwrap().is_some());
        assert!(
            one_shot
                .commit(snapshot(3, 10, &["a", "b"]), Some("berth.container-changes.9".into()))
                .await
                .unwrap()
        );

        let seen = watcher.load(EndpointId::new(3)).await.unwrap().unwrap();
        assert_eq!(seen.snapshot.len(), 2);
        assert_eq!(
            seen.last_notification.as_deref(),
            Some("berth.container-changes.9")
        );
        assert!(!watcher.commit(snapshot(3, 5, &["a"]), None).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(dir.path().join("endpoint-1.json"), "{not json").unwrap();
        let persistence = JsonFilePersistence::new(dir.path());
        let err = persistence.load(EndpointId::new(1)).await.unwrap_err();
        assert!(matches!(err, BerthError::Serialization { .. }));
    }
}
