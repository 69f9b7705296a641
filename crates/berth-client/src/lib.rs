//! # berth-client
//!
//! Access to the remote orchestration API.
//!
//! - [`RemoteContainerClient`]: the narrow async interface the sync core
//!   consumes. Everything about REST paths and JSON shapes stays behind it.
//! - [`CredentialStore`](credentials::CredentialStore): where API tokens
//!   come from.
//! - [`PortainerClient`](http::PortainerClient): the HTTP implementation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod credentials;
pub mod http;
mod wire;

use async_trait::async_trait;
use berth_common::error::Result;
use berth_common::types::{
    Container, ContainerAction, ContainerDetails, Endpoint, EndpointId, InstanceId,
};

/// Remote orchestration API as seen by the sync core.
///
/// Implementors own transport, authentication, and decoding. All methods
/// may suspend and all may fail with `Transport` or `Decoding` errors.
#[async_trait]
pub trait RemoteContainerClient: Send + Sync {
    /// Lists the endpoints visible to the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the answer cannot be decoded.
    async fn fetch_endpoints(&self) -> Result<Vec<Endpoint>>;

    /// Lists every container of an endpoint, stopped ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the answer cannot be decoded.
    async fn fetch_containers(&self, endpoint: EndpointId) -> Result<Vec<Container>>;

    /// Fetches the detailed view of one container.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the answer cannot be decoded.
    async fn fetch_container_details(
        &self,
        id: &InstanceId,
        endpoint: EndpointId,
    ) -> Result<ContainerDetails>;

    /// Executes a lifecycle action on one container.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn execute_action(
        &self,
        action: ContainerAction,
        id: &InstanceId,
        endpoint: EndpointId,
    ) -> Result<()>;
}
