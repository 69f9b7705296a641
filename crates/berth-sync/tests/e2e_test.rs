//! End-to-end tests for the sync pipeline.
//!
//! A gated fake client lets each test decide when every container fetch
//! completes, so request ordering and completion ordering can differ:
//! 1. Superseded requests (out-of-order completion, explicit cancel)
//! 2. Endpoint selection
//! 3. Background runs racing foreground refreshes
//! 4. Persistence across restarts and notification dedup

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use berth_client::RemoteContainerClient;
use berth_common::error::{BerthError, Result};
use berth_common::types::{
    Container, ContainerAction, ContainerDetails, ContainerState, Endpoint, EndpointId,
    EndpointStatus, InstanceId, LogicalKey,
};
use berth_sync::composer::{self, NotificationComposer, NotificationContent, Thresholds};
use berth_sync::coordinator::{RefreshCoordinator, ResourceClass};
use berth_sync::detector;
use berth_sync::dispatch::NotificationDispatcher;
use berth_sync::event::EventBus;
use berth_sync::handle::Outcome;
use berth_sync::scheduler::SyncScheduler;
use berth_sync::snapshot::Snapshot;
use berth_sync::store::{JsonFilePersistence, MemoryPersistence, SnapshotPersistence, SnapshotStore};
use tokio::sync::{mpsc, oneshot};

// ── Fakes ────────────────────────────────────────────────────────────

/// Container fetches wait for a gate opened by the test.
struct GatedClient {
    endpoints: Vec<Endpoint>,
    started: mpsc::UnboundedSender<EndpointId>,
    gates: Mutex<VecDeque<oneshot::Receiver<Vec<Container>>>>,
}

impl GatedClient {
    fn new(endpoints: Vec<Endpoint>) -> (Arc<Self>, mpsc::UnboundedReceiver<EndpointId>) {
        let (started, rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            endpoints,
            started,
            gates: Mutex::new(VecDeque::new()),
        });
        (client, rx)
    }

    /// Queues the gate for the next container fetch.
    fn gate(&self) -> oneshot::Sender<Vec<Container>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    /// Queues a gate that is already open.
    fn respond(&self, containers: Vec<Container>) {
        let _ = self.gate().send(containers);
    }
}

#[async_trait]
impl RemoteContainerClient for GatedClient {
    async fn fetch_endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(self.endpoints.clone())
    }

    async fn fetch_containers(&self, endpoint: EndpointId) -> Result<Vec<Container>> {
        let gate = self.gates.lock().unwrap().pop_front();
        let _ = self.started.send(endpoint);
        let Some(gate) = gate else {
            return Err(BerthError::Transport {
                message: "no response scripted".into(),
            });
        };
        gate.await.map_err(|_| BerthError::Transport {
            message: "connection dropped".into(),
        })
    }

    async fn fetch_container_details(
        &self,
        _id: &InstanceId,
        _endpoint: EndpointId,
    ) -> Result<ContainerDetails> {
        Err(BerthError::Unknown {
            message: "not scripted".into(),
        })
    }

    async fn execute_action(
        &self,
        _action: ContainerAction,
        _id: &InstanceId,
        _endpoint: EndpointId,
    ) -> Result<()> {
        Ok(())
    }
}

struct Recorder(mpsc::UnboundedSender<NotificationContent>);

#[async_trait]
impl NotificationDispatcher for Recorder {
    async fn deliver(&self, content: NotificationContent) -> Result<()> {
        let _ = self.0.send(content);
        Ok(())
    }
}

fn endpoint(id: u64) -> Endpoint {
    Endpoint {
        id: EndpointId::new(id),
        name: format!("env-{id}"),
        url: None,
        status: EndpointStatus::Up,
    }
}

fn container(id: &str, name: &str, state: ContainerState) -> Container {
    Container::new(InstanceId::new(id), LogicalKey::new(format!("name:{name}")), state)
        .with_name(name)
}

async fn ready_coordinator(
    endpoints: Vec<Endpoint>,
) -> (
    Arc<RefreshCoordinator>,
    Arc<GatedClient>,
    mpsc::UnboundedReceiver<EndpointId>,
) {
    let (client, started) = GatedClient::new(endpoints);
    let coordinator = Arc::new(RefreshCoordinator::with_client(
        Arc::clone(&client) as Arc<dyn RemoteContainerClient>,
        EventBus::new(),
    ));
    let _ = coordinator.refresh_endpoints().join().await.unwrap();
    (coordinator, client, started)
}

// ── Superseded requests ──────────────────────────────────────────────

#[tokio::test]
async fn later_request_wins_when_earlier_completes_last() {
    let (coordinator, client, mut started) = ready_coordinator(vec![endpoint(1)]).await;
    let first_gate = client.gate();
    let second_gate = client.gate();

    let first = coordinator.refresh_containers();
    let _ = started.recv().await.unwrap();
    let second = coordinator.refresh_containers();
    let _ = started.recv().await.unwrap();

    second_gate
        .send(vec![container("b1", "new", ContainerState::Running)])
        .unwrap();
    let committed = second.join().await.unwrap().committed().unwrap();
    assert_eq!(committed.len(), 1);

    let _ = first_gate.send(vec![container("a1", "old", ContainerState::Running)]);
    assert_eq!(first.join().await.unwrap(), Outcome::Superseded);

    let names: Vec<_> = coordinator
        .containers()
        .iter()
        .map(|c| c.display_name().to_owned())
        .collect();
    assert_eq!(names, vec!["new"]);
}

#[tokio::test]
async fn cancelled_refresh_keeps_last_good_containers() {
    let (coordinator, client, mut started) = ready_coordinator(vec![endpoint(1)]).await;
    client.respond(vec![container("a1", "web", ContainerState::Running)]);
    let _ = coordinator.refresh_containers().join().await.unwrap();
    let _ = started.recv().await.unwrap();

    let _gate = client.gate();
    let handle = coordinator.refresh_containers();
    let _ = started.recv().await.unwrap();
    handle.cancel();
    assert!(handle.is_cancelled());
    assert_eq!(handle.join().await.unwrap(), Outcome::Superseded);
    assert_eq!(coordinator.containers().len(), 1);
}

#[tokio::test]
async fn cancelling_a_class_drops_its_inflight_fetch() {
    let (coordinator, client, mut started) = ready_coordinator(vec![endpoint(1)]).await;
    client.respond(vec![container("a1", "web", ContainerState::Running)]);
    let _ = coordinator.refresh_containers().join().await.unwrap();
    let _ = started.recv().await.unwrap();

    let gate = client.gate();
    let handle = coordinator.refresh_containers();
    let _ = started.recv().await.unwrap();
    coordinator.cancel(ResourceClass::Containers);
    let _ = gate.send(Vec::new());

    assert_eq!(handle.join().await.unwrap(), Outcome::Superseded);
    assert_eq!(coordinator.containers().len(), 1);
}

#[tokio::test]
async fn newer_composite_refresh_supersedes_older() {
    let (coordinator, client, mut started) = ready_coordinator(vec![endpoint(1)]).await;
    let _stale_gate = client.gate();
    let fresh_gate = client.gate();

    let older = coordinator.refresh();
    let _ = started.recv().await.unwrap();
    let newer = coordinator.refresh();
    let _ = started.recv().await.unwrap();

    fresh_gate
        .send(vec![container("c1", "cache", ContainerState::Paused)])
        .unwrap();
    assert!(newer.join().await.unwrap().is_committed());
    assert_eq!(older.join().await.unwrap(), Outcome::Superseded);
    assert_eq!(coordinator.containers()[0].state, ContainerState::Paused);
}

// ── Endpoint selection ───────────────────────────────────────────────

#[tokio::test]
async fn switching_endpoint_drops_inflight_fetch_for_old_one() {
    let (coordinator, client, mut started) =
        ready_coordinator(vec![endpoint(1), endpoint(2)]).await;
    assert!(coordinator.selected_endpoint().is_none());

    let old_gate = client.gate();
    let first = coordinator.select_endpoint(Some(endpoint(1))).unwrap();
    assert_eq!(started.recv().await, Some(EndpointId::new(1)));

    client.respond(vec![container("z1", "zeta", ContainerState::Running)]);
    let second = coordinator.select_endpoint(Some(endpoint(2))).unwrap();
    assert_eq!(started.recv().await, Some(EndpointId::new(2)));

    let _ = old_gate.send(vec![container("a1", "alpha", ContainerState::Running)]);
    assert_eq!(first.join().await.unwrap(), Outcome::Superseded);
    let snapshot = second.join().await.unwrap().committed().unwrap();
    assert_eq!(snapshot.scope(), EndpointId::new(2));
    assert_eq!(coordinator.containers()[0].display_name(), "zeta");
}

#[tokio::test]
async fn preferred_endpoint_is_restored_after_refresh() {
    let (client, _started) = GatedClient::new(vec![endpoint(1), endpoint(2)]);
    let coordinator = Arc::new(
        RefreshCoordinator::new(EventBus::new()).with_preferred_endpoint(Some(EndpointId::new(2))),
    );
    coordinator.attach_client(client);
    let _ = coordinator.refresh_endpoints().join().await.unwrap();
    assert_eq!(
        coordinator.selected_endpoint().map(|e| e.id),
        Some(EndpointId::new(2))
    );
}

// ── Background runs ──────────────────────────────────────────────────

fn build_scheduler(
    coordinator: &Arc<RefreshCoordinator>,
    persistence: Arc<dyn SnapshotPersistence>,
) -> (
    SyncScheduler,
    Arc<SnapshotStore>,
    mpsc::UnboundedReceiver<NotificationContent>,
) {
    let store = Arc::new(SnapshotStore::new(
        persistence,
        coordinator.events().clone(),
    ));
    let (tx, rx) = mpsc::unbounded_channel();
    let scheduler = SyncScheduler::new(
        Arc::clone(coordinator),
        Arc::clone(&store),
        NotificationComposer::new(Thresholds::default()),
        Arc::new(Recorder(tx)),
        Duration::from_secs(60),
    );
    (scheduler, store, rx)
}

#[tokio::test]
async fn foreground_refresh_supersedes_background_run() {
    let (coordinator, client, mut started) = ready_coordinator(vec![endpoint(1)]).await;
    let (scheduler, store, _notifications) =
        build_scheduler(&coordinator, Arc::new(MemoryPersistence::new()));

    client.respond(vec![container("a1", "web", ContainerState::Running)]);
    let _ = scheduler.run_sync().await.unwrap();
    let _ = started.recv().await.unwrap();
    let baseline = store.load(EndpointId::new(1)).await.unwrap().unwrap();

    let _background_gate = client.gate();
    let foreground_gate = client.gate();
    let scheduler = Arc::new(scheduler);
    let background = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run_sync().await }
    });
    let _ = started.recv().await.unwrap();

    let foreground = coordinator.refresh_containers();
    let _ = started.recv().await.unwrap();
    foreground_gate
        .send(vec![container("a1", "web", ContainerState::Exited)])
        .unwrap();

    let report = background.await.unwrap().unwrap();
    assert!(!report.committed);
    assert!(report.notification.is_none());
    assert!(foreground.join().await.unwrap().is_committed());

    let stored = store.load(EndpointId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored, baseline);
}

#[tokio::test]
async fn snapshots_survive_restart_and_changes_are_notified() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let persistence: Arc<dyn SnapshotPersistence> =
        Arc::new(JsonFilePersistence::new(dir.path().join("snapshots")));

    {
        let (coordinator, client, _started) = ready_coordinator(vec![endpoint(1)]).await;
        let (scheduler, _store, _rx) = build_scheduler(&coordinator, Arc::clone(&persistence));
        client.respond(vec![
            container("a1", "api", ContainerState::Running),
            container("d1", "db", ContainerState::Running),
        ]);
        let report = scheduler.run_sync().await.unwrap();
        assert!(report.committed);
        assert!(report.notification.is_none());
    }

    let (coordinator, client, _started) = ready_coordinator(vec![endpoint(1)]).await;
    let (scheduler, _store, mut notifications) = build_scheduler(&coordinator, persistence);
    client.respond(vec![
        container("a2", "api", ContainerState::Running),
        container("w1", "web", ContainerState::Created),
    ]);
    let report = scheduler.run_sync().await.unwrap();
    let types: Vec<_> = report.changes.iter().map(|c| c.change_type().as_str()).collect();
    assert_eq!(types, vec!["recreated", "created", "removed"]);

    let content = notifications.recv().await.unwrap();
    assert_eq!(content.title, "api, web and db");
    assert_eq!(content.dedup_id, composer::dedup_id(&report.changes));
}

#[tokio::test]
async fn already_delivered_notification_is_not_repeated() {
    let (coordinator, client, _started) = ready_coordinator(vec![endpoint(1)]).await;
    let (scheduler, store, mut notifications) =
        build_scheduler(&coordinator, Arc::new(MemoryPersistence::new()));

    let before = Snapshot::capture(
        EndpointId::new(1),
        vec![container("a1", "web", ContainerState::Running)],
    );
    let after = vec![container("a1", "web", ContainerState::Exited)];
    let expected = composer::dedup_id(&detector::diff(
        &before,
        &Snapshot::capture(EndpointId::new(1), after.clone()),
    ));
    assert!(store.commit(before, Some(expected.clone())).await.unwrap());

    client.respond(after);
    let report = scheduler.run_sync().await.unwrap();
    assert_eq!(report.changes.len(), 1);
    assert!(report.notification.is_none());
    assert!(report.committed);
    assert!(notifications.try_recv().is_err());

    let stored = store.load(EndpointId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored.last_notification, Some(expected));
}

#[tokio::test]
async fn run_without_setup_fails_with_not_setup() {
    let coordinator = Arc::new(RefreshCoordinator::new(EventBus::new()));
    let (scheduler, _store, _rx) = build_scheduler(&coordinator, Arc::new(MemoryPersistence::new()));
    let err = scheduler.run_sync().await.unwrap_err();
    assert!(matches!(err, BerthError::NotSetup));
}
