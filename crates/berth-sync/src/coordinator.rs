//! Refresh coordination against the remote API.
//!
//! The coordinator owns the session's current endpoints, selected endpoint,
//! and container list. Every refresh belongs to a [`ResourceClass`] and
//! takes a ticket: the class generation at request time plus a fresh
//! cancellation token. Requesting a class again cancels the previous token
//! and bumps the generation.
//!
//! Results are committed under the state lock and only if the ticket is
//! still the current one for its class. A slow request that completes
//! after a newer one is dropped, so the last *requested* result wins, not
//! the last completed.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use berth_client::RemoteContainerClient;
use berth_common::error::{BerthError, Result};
use berth_common::types::{
    Container, ContainerAction, ContainerDetails, Endpoint, EndpointId, InstanceId,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::event::{EventBus, SyncEvent};
use crate::handle::{Outcome, RefreshHandle};
use crate::snapshot::Snapshot;

/// Kinds of refresh that supersede each other independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// The endpoint list.
    Endpoints,
    /// The container list of the selected endpoint.
    Containers,
    /// The composite endpoints-then-containers refresh.
    Refresh,
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Endpoints => "endpoints",
            Self::Containers => "containers",
            Self::Refresh => "refresh",
        })
    }
}

/// Connection setup progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    /// No connection configured; operations fail with `NotSetup`.
    Unconfigured,
    /// A connection is being set up; operations wait for it.
    Pending,
    /// A client is attached.
    Ready,
}

/// Receives every user-visible refresh failure.
pub type ErrorHandler = Arc<dyn Fn(ResourceClass, &BerthError) + Send + Sync>;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug)]
struct Ticket {
    class: ResourceClass,
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct State {
    endpoints: Vec<Endpoint>,
    selected: Option<Endpoint>,
    containers: Option<Snapshot>,
    slots: HashMap<ResourceClass, Slot>,
}

impl State {
    /// Cancels the in-flight request of `class` and moves to a new
    /// generation, returning the new slot.
    fn invalidate(&mut self, class: ResourceClass) -> &mut Slot {
        let slot = self.slots.entry(class).or_default();
        slot.token.cancel();
        slot.generation += 1;
        slot.token = CancellationToken::new();
        slot
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        !ticket.token.is_cancelled()
            && self
                .slots
                .get(&ticket.class)
                .is_some_and(|slot| slot.generation == ticket.generation)
    }
}

/// Single-flight, supersede-on-request refresh orchestration.
pub struct RefreshCoordinator {
    client: RwLock<Option<Arc<dyn RemoteContainerClient>>>,
    setup: watch::Sender<SetupState>,
    state: Mutex<State>,
    events: EventBus,
    error_handler: Option<ErrorHandler>,
    preferred_endpoint: Option<EndpointId>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("setup", &*self.setup.borrow())
            .field("preferred_endpoint", &self.preferred_endpoint)
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Creates an unconfigured coordinator announcing changes on `events`.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        let (setup, _) = watch::channel(SetupState::Unconfigured);
        Self {
            client: RwLock::new(None),
            setup,
            state: Mutex::new(State::default()),
            events,
            error_handler: None,
            preferred_endpoint: None,
        }
    }

    /// Creates a coordinator that is ready to use `client`.
    #[must_use]
    pub fn with_client(client: Arc<dyn RemoteContainerClient>, events: EventBus) -> Self {
        let coordinator = Self::new(events);
        coordinator.attach_client(client);
        coordinator
    }

    /// Installs the handler receiving user-visible refresh failures.
    #[must_use]
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Sets the endpoint to select when the previous selection disappears.
    #[must_use]
    pub const fn with_preferred_endpoint(mut self, endpoint: Option<EndpointId>) -> Self {
        self.preferred_endpoint = endpoint;
        self
    }

    // ── Setup ────────────────────────────────────────────────────────

    /// Marks a connection setup as in progress. Operations issued from now
    /// on wait for [`attach_client`](Self::attach_client) or
    /// [`fail_setup`](Self::fail_setup).
    pub fn begin_setup(&self) {
        self.set_setup(SetupState::Pending);
    }

    /// Attaches the client for this session and completes setup.
    pub fn attach_client(&self, client: Arc<dyn RemoteContainerClient>) {
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
        self.set_setup(SetupState::Ready);
    }

    /// Abandons a pending setup; waiting operations fail with `NotSetup`.
    pub fn fail_setup(&self) {
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.set_setup(SetupState::Unconfigured);
    }

    /// Drops the client, cancels everything in flight, and forgets all state.
    pub fn detach_client(&self) {
        {
            let mut state = self.lock_state();
            for class in [
                ResourceClass::Refresh,
                ResourceClass::Endpoints,
                ResourceClass::Containers,
            ] {
                let _ = state.invalidate(class);
            }
            state.endpoints.clear();
            state.selected = None;
            state.containers = None;
        }
        self.fail_setup();
        self.events.emit(SyncEvent::EndpointsUpdated {
            endpoints: Vec::new(),
        });
        self.events.emit(SyncEvent::EndpointSelected { endpoint: None });
        self.events.emit(SyncEvent::ContainersUpdated {
            endpoint: None,
            count: 0,
        });
    }

    /// Current setup state.
    #[must_use]
    pub fn setup_state(&self) -> SetupState {
        *self.setup.borrow()
    }

    fn set_setup(&self, next: SetupState) {
        let previous = self.setup.send_replace(next);
        if previous != next {
            tracing::info!(?previous, ?next, "setup state changed");
            self.events.emit(SyncEvent::SetupChanged(next));
        }
    }

    /// Waits for a pending setup to finish.
    ///
    /// Returns `Ok(None)` if `token` is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::NotSetup` if no client is configured.
    pub async fn wait_until_ready(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn RemoteContainerClient>>> {
        let mut rx = self.setup.subscribe();
        let state = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(None),
            state = rx.wait_for(|s| *s != SetupState::Pending) => {
                state.map_or(SetupState::Unconfigured, |s| *s)
            }
        };
        match state {
            SetupState::Ready => self.current_client().map(Some).ok_or(BerthError::NotSetup),
            SetupState::Unconfigured | SetupState::Pending => Err(BerthError::NotSetup),
        }
    }

    fn current_client(&self) -> Option<Arc<dyn RemoteContainerClient>> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── Observable state ─────────────────────────────────────────────

    /// Endpoints from the last committed endpoint refresh.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.lock_state().endpoints.clone()
    }

    /// The selected endpoint.
    #[must_use]
    pub fn selected_endpoint(&self) -> Option<Endpoint> {
        self.lock_state().selected.clone()
    }

    /// Containers of the selected endpoint from the last committed refresh.
    #[must_use]
    pub fn containers(&self) -> Vec<Container> {
        self.lock_state()
            .containers
            .as_ref()
            .map(|s| s.containers().to_vec())
            .unwrap_or_default()
    }

    /// The last committed container list as a snapshot.
    #[must_use]
    pub fn container_snapshot(&self) -> Option<Snapshot> {
        self.lock_state().containers.clone()
    }

    /// The event bus this coordinator announces changes on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribes to sync events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    // ── Refresh operations ───────────────────────────────────────────

    /// Refreshes the endpoint list, superseding any endpoint refresh in
    /// flight. The selection is reconciled against the fresh list.
    pub fn refresh_endpoints(self: &Arc<Self>) -> RefreshHandle<Vec<Endpoint>> {
        let ticket = self.begin(ResourceClass::Endpoints, None);
        let token = ticket.token.clone();
        let this = Arc::clone(self);
        RefreshHandle::spawn(token, async move { this.load_endpoints(ticket).await })
    }

    /// Refreshes the containers of the selected endpoint, superseding any
    /// container refresh in flight.
    pub fn refresh_containers(self: &Arc<Self>) -> RefreshHandle<Snapshot> {
        let ticket = self.begin(ResourceClass::Containers, None);
        let token = ticket.token.clone();
        let this = Arc::clone(self);
        RefreshHandle::spawn(token, async move { this.load_containers(ticket).await })
    }

    /// Waits for setup, refreshes endpoints, then refreshes containers if an
    /// endpoint is selected. Stages run in order; cancellation or failure
    /// of a stage skips the rest.
    pub fn refresh(self: &Arc<Self>) -> RefreshHandle<()> {
        let ticket = self.begin(ResourceClass::Refresh, None);
        let token = ticket.token.clone();
        let this = Arc::clone(self);
        RefreshHandle::spawn(token, async move { this.run_refresh(ticket).await })
    }

    /// Selects an endpoint.
    ///
    /// Any container refresh in flight is cancelled and the container list
    /// is cleared immediately. When an endpoint is selected, a container
    /// refresh for it is started and its handle returned.
    pub fn select_endpoint(
        self: &Arc<Self>,
        endpoint: Option<Endpoint>,
    ) -> Option<RefreshHandle<Snapshot>> {
        let id = endpoint.as_ref().map(|e| e.id);
        {
            let mut state = self.lock_state();
            let _ = state.invalidate(ResourceClass::Containers);
            state.selected = endpoint;
            state.containers = None;
        }
        tracing::info!(endpoint = ?id, "endpoint selected");
        self.events.emit(SyncEvent::EndpointSelected { endpoint: id });
        self.events.emit(SyncEvent::ContainersUpdated {
            endpoint: None,
            count: 0,
        });
        id.map(|_| self.refresh_containers())
    }

    /// Cancels the refresh of `class` in flight, if any.
    pub fn cancel(&self, class: ResourceClass) {
        let _ = self.lock_state().invalidate(class);
        tracing::debug!(%class, "refresh cancelled");
    }

    /// Fetches the detailed view of a container of the selected endpoint.
    ///
    /// # Errors
    ///
    /// Returns `NotSetup`, `NoSelectedEndpoint`, or the client error.
    pub async fn container_details(&self, id: &InstanceId) -> Result<ContainerDetails> {
        let client = self.ready_client().await?;
        let endpoint = self.selected_endpoint().ok_or(BerthError::NoSelectedEndpoint)?;
        client.fetch_container_details(id, endpoint.id).await
    }

    /// Executes an action on a container of the selected endpoint, then
    /// starts a container refresh and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns `NotSetup`, `NoSelectedEndpoint`, or the client error.
    pub async fn execute_action(
        self: &Arc<Self>,
        action: ContainerAction,
        id: &InstanceId,
    ) -> Result<RefreshHandle<Snapshot>> {
        let client = self.ready_client().await?;
        let endpoint = self.selected_endpoint().ok_or(BerthError::NoSelectedEndpoint)?;
        client.execute_action(action, id, endpoint.id).await?;
        tracing::info!(endpoint = %endpoint.id, container = %id, %action, "action executed");
        Ok(self.refresh_containers())
    }

    async fn ready_client(&self) -> Result<Arc<dyn RemoteContainerClient>> {
        self.wait_until_ready(&CancellationToken::new())
            .await?
            .ok_or(BerthError::Cancelled)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, class: ResourceClass, parent: Option<&CancellationToken>) -> Ticket {
        let mut state = self.lock_state();
        let slot = state.invalidate(class);
        if let Some(parent) = parent {
            slot.token = parent.child_token();
        }
        tracing::debug!(%class, generation = slot.generation, "refresh requested");
        Ticket {
            class,
            generation: slot.generation,
            token: slot.token.clone(),
        }
    }

    async fn run_refresh(&self, ticket: Ticket) -> Result<Outcome<()>> {
        match self.wait_until_ready(&ticket.token).await {
            Ok(Some(_)) => {}
            Ok(None) => return Ok(Outcome::Superseded),
            Err(e) => {
                self.report(ticket.class, &e);
                return Err(e);
            }
        }

        let endpoints = self.begin(ResourceClass::Endpoints, Some(&ticket.token));
        if !self.load_endpoints(endpoints).await?.is_committed() {
            return Ok(Outcome::Superseded);
        }

        if ticket.token.is_cancelled() {
            return Ok(Outcome::Superseded);
        }
        if self.selected_endpoint().is_none() {
            tracing::debug!("no endpoint selected, skipping container refresh");
            return Ok(Outcome::Committed(()));
        }

        let containers = self.begin(ResourceClass::Containers, Some(&ticket.token));
        Ok(self.load_containers(containers).await?.map(|_| ()))
    }

    async fn load_endpoints(&self, ticket: Ticket) -> Result<Outcome<Vec<Endpoint>>> {
        let fetched = match self.wait_until_ready(&ticket.token).await {
            Ok(Some(client)) => {
                tokio::select! {
                    biased;
                    () = ticket.token.cancelled() => return Ok(Outcome::Superseded),
                    result = client.fetch_endpoints() => result,
                }
            }
            Ok(None) => return Ok(Outcome::Superseded),
            Err(e) => Err(e),
        };
        self.settle(&ticket, fetched, |state, endpoints| {
            self.apply_endpoints(state, endpoints)
        })
    }

    async fn load_containers(&self, ticket: Ticket) -> Result<Outcome<Snapshot>> {
        let fetched = match self.wait_until_ready(&ticket.token).await {
            Ok(Some(client)) => match self.selected_endpoint() {
                Some(endpoint) => {
                    tokio::select! {
                        biased;
                        () = ticket.token.cancelled() => return Ok(Outcome::Superseded),
                        result = client.fetch_containers(endpoint.id) => {
                            result.map(|list| Snapshot::capture(endpoint.id, list))
                        }
                    }
                }
                None => Err(BerthError::NoSelectedEndpoint),
            },
            Ok(None) => return Ok(Outcome::Superseded),
            Err(e) => Err(e),
        };
        self.settle(&ticket, fetched, Self::apply_containers)
    }

    /// Commits `fetched` if `ticket` is still current for its class.
    fn settle<T>(
        &self,
        ticket: &Ticket,
        fetched: Result<T>,
        apply: impl FnOnce(&mut State, &T) -> Vec<SyncEvent>,
    ) -> Result<Outcome<T>> {
        let mut state = self.lock_state();
        if !state.is_current(ticket) {
            tracing::debug!(
                class = %ticket.class,
                generation = ticket.generation,
                "discarding superseded result"
            );
            return Ok(Outcome::Superseded);
        }
        match fetched {
            Ok(value) => {
                let events = apply(&mut state, &value);
                drop(state);
                for event in events {
                    self.events.emit(event);
                }
                Ok(Outcome::Committed(value))
            }
            Err(e) if e.is_cancelled() => Ok(Outcome::Superseded),
            Err(e) => {
                drop(state);
                self.report(ticket.class, &e);
                Err(e)
            }
        }
    }

    fn apply_endpoints(&self, state: &mut State, endpoints: &[Endpoint]) -> Vec<SyncEvent> {
        state.endpoints = endpoints.to_vec();
        let mut events = vec![SyncEvent::EndpointsUpdated {
            endpoints: endpoints.to_vec(),
        }];

        let previous = state.selected.as_ref().map(|e| e.id);
        let next = reconcile_selection(previous, self.preferred_endpoint, endpoints);
        let next_id = next.as_ref().map(|e| e.id);
        state.selected = next;
        tracing::info!(count = endpoints.len(), selected = ?next_id, "endpoints committed");

        if next_id != previous {
            let _ = state.invalidate(ResourceClass::Containers);
            state.containers = None;
            events.push(SyncEvent::EndpointSelected { endpoint: next_id });
            events.push(SyncEvent::ContainersUpdated {
                endpoint: None,
                count: 0,
            });
        }
        events
    }

    fn apply_containers(state: &mut State, snapshot: &Snapshot) -> Vec<SyncEvent> {
        state.containers = Some(snapshot.clone());
        tracing::info!(
            endpoint = %snapshot.scope(),
            count = snapshot.len(),
            "containers committed"
        );
        vec![SyncEvent::ContainersUpdated {
            endpoint: Some(snapshot.scope()),
            count: snapshot.len(),
        }]
    }

    fn report(&self, class: ResourceClass, error: &BerthError) {
        tracing::warn!(%class, error = %error, "refresh failed");
        self.events.emit(SyncEvent::RefreshFailed {
            class,
            message: error.to_string(),
        });
        if let Some(handler) = &self.error_handler {
            handler(class, error);
        }
    }
}

/// Picks the selection after an endpoint refresh: the previous selection if
/// it still exists, else the preferred endpoint, else the only endpoint.
fn reconcile_selection(
    previous: Option<EndpointId>,
    preferred: Option<EndpointId>,
    endpoints: &[Endpoint],
) -> Option<Endpoint> {
    let find = |id: EndpointId| endpoints.iter().find(|e| e.id == id).cloned();
    previous
        .and_then(find)
        .or_else(|| preferred.and_then(find))
        .or_else(|| match endpoints {
            [only] => Some(only.clone()),
            _ => None,
        })
}
