//! Wiring of config, credentials, client, and sync services for a command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use berth_client::credentials::{CredentialStore, EnvCredentialStore};
use berth_client::http::PortainerClient;
use berth_common::config::BerthConfig;
use berth_common::error::BerthError;
use berth_common::constants;
use berth_common::types::{Endpoint, EndpointId};
use berth_sync::composer::NotificationComposer;
use berth_sync::coordinator::{RefreshCoordinator, ResourceClass};
use berth_sync::dispatch::NotificationDispatcher;
use berth_sync::event::EventBus;
use berth_sync::scheduler::SyncScheduler;
use berth_sync::store::{JsonFilePersistence, SnapshotStore};

use crate::commands::GlobalArgs;

/// Services shared by the commands of one invocation.
pub struct Session {
    pub config: BerthConfig,
    pub coordinator: Arc<RefreshCoordinator>,
}

impl Session {
    /// Loads the configuration and nothing else.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or is invalid.
    pub fn load_config(global: &GlobalArgs) -> anyhow::Result<BerthConfig> {
        let path = global
            .config
            .clone()
            .unwrap_or_else(constants::default_config_file);
        let config = BerthConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Connects to the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, no server URL or
    /// API token is available, or the HTTP client cannot be built.
    pub fn connect(global: &GlobalArgs) -> anyhow::Result<Self> {
        let config = Self::load_config(global)?;
        let preferred = global
            .endpoint
            .map(EndpointId::new)
            .or(config.preferred_endpoint);
        let coordinator = new_coordinator(preferred);

        coordinator.begin_setup();
        match build_client(&config) {
            Ok(client) => {
                coordinator.attach_client(Arc::new(client));
                Ok(Self {
                    config,
                    coordinator,
                })
            }
            Err(e) => {
                coordinator.fail_setup();
                Err(e)
            }
        }
    }

    /// Refreshes endpoints and returns the selected one.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails or no endpoint can be selected.
    pub async fn select_endpoint(&self) -> anyhow::Result<Endpoint> {
        let _ = self.coordinator.refresh_endpoints().join().await?;
        if let Some(endpoint) = self.coordinator.selected_endpoint() {
            return Ok(endpoint);
        }
        let available: Vec<String> = self
            .coordinator
            .endpoints()
            .iter()
            .map(|e| format!("{} ({})", e.id, e.name))
            .collect();
        if available.is_empty() {
            anyhow::bail!("the server has no endpoints");
        }
        anyhow::bail!(
            "several endpoints available, pick one with --endpoint: {}",
            available.join(", ")
        )
    }

    /// Opens the on-disk snapshot store.
    pub fn snapshot_store(&self) -> Arc<SnapshotStore> {
        Arc::new(snapshot_store_at(
            self.config.snapshot_dir(),
            self.coordinator.events().clone(),
        ))
    }

    /// Builds a scheduler delivering notifications to `dispatcher`.
    pub fn scheduler(
        &self,
        dispatcher: Arc<dyn NotificationDispatcher>,
        interval: Duration,
    ) -> SyncScheduler {
        SyncScheduler::new(
            Arc::clone(&self.coordinator),
            self.snapshot_store(),
            NotificationComposer::new(self.config.notifications.into()),
            dispatcher,
            interval,
        )
    }
}

/// Builds the coordinator of one invocation.
///
/// Refresh failures are only logged here; commands report them through the
/// errors they return.
fn new_coordinator(preferred: Option<EndpointId>) -> Arc<RefreshCoordinator> {
    Arc::new(
        RefreshCoordinator::new(EventBus::new())
            .with_preferred_endpoint(preferred)
            .with_error_handler(Arc::new(|class: ResourceClass, error: &BerthError| {
                if error.is_user_visible() {
                    tracing::warn!(%class, error = %error, "refresh failed");
                } else {
                    tracing::debug!(%class, error = %error, "refresh failed");
                }
            })),
    )
}

/// Opens a snapshot store over the JSON files in `dir`.
pub fn snapshot_store_at(dir: PathBuf, events: EventBus) -> SnapshotStore {
    SnapshotStore::new(Arc::new(JsonFilePersistence::new(dir)), events)
}

fn build_client(config: &BerthConfig) -> anyhow::Result<PortainerClient> {
    let server_url = config
        .server_url
        .as_deref()
        .context("no server_url configured")?;
    let token = EnvCredentialStore::new(constants::API_TOKEN_ENV)
        .token(server_url)?
        .with_context(|| format!("no API token; set {}", constants::API_TOKEN_ENV))?;
    let client = PortainerClient::new(server_url, token, config.request_timeout())?;
    tracing::debug!(server = %client.base_url(), "client ready");
    Ok(client)
}
