//! HTTP implementation of [`RemoteContainerClient`] against the Portainer API.
//!
//! Container calls go through Portainer's Docker proxy
//! (`/api/endpoints/{id}/docker/...`), so the JSON is Docker Engine's.

use std::time::Duration;

use async_trait::async_trait;
use berth_common::error::{BerthError, Result};
use berth_common::types::{
    Container, ContainerAction, ContainerDetails, Endpoint, EndpointId, InstanceId,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::RemoteContainerClient;
use crate::wire::{ContainerInspectDto, ContainerSummaryDto, EndpointDto};

/// Header carrying Portainer access tokens.
const API_KEY_HEADER: &str = "X-API-Key";

/// Portainer REST client.
#[derive(Debug, Clone)]
pub struct PortainerClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl PortainerClient {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` if the URL is empty or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BerthError::Config {
                message: "server URL is empty".into(),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("berth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BerthError::Config {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    /// Returns the server base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header(API_KEY_HEADER, &self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(map_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%url, %status, body = %body, "request rejected");
        Err(BerthError::Transport {
            message: format!("{status} from {url}"),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!(path, "GET");
        let response = self.send(self.request(Method::GET, path)).await?;
        response.json::<T>().await.map_err(map_reqwest)
    }
}

#[async_trait]
impl RemoteContainerClient for PortainerClient {
    async fn fetch_endpoints(&self) -> Result<Vec<Endpoint>> {
        let dtos: Vec<EndpointDto> = self.get_json("endpoints").await?;
        Ok(dtos.into_iter().map(Endpoint::from).collect())
    }

    async fn fetch_containers(&self, endpoint: EndpointId) -> Result<Vec<Container>> {
        let dtos: Vec<ContainerSummaryDto> = self
            .get_json(&format!("endpoints/{endpoint}/docker/containers/json?all=1"))
            .await?;
        Ok(dtos.into_iter().map(Container::from).collect())
    }

    async fn fetch_container_details(
        &self,
        id: &InstanceId,
        endpoint: EndpointId,
    ) -> Result<ContainerDetails> {
        let dto: ContainerInspectDto = self
            .get_json(&format!("endpoints/{endpoint}/docker/containers/{id}/json"))
            .await?;
        Ok(ContainerDetails::from(dto))
    }

    async fn execute_action(
        &self,
        action: ContainerAction,
        id: &InstanceId,
        endpoint: EndpointId,
    ) -> Result<()> {
        let (method, path) = action_route(action, id, endpoint);
        tracing::info!(%endpoint, container = %id, %action, "executing container action");
        let _ = self.send(self.request(method, &path)).await?;
        Ok(())
    }
}

fn action_route(action: ContainerAction, id: &InstanceId, endpoint: EndpointId) -> (Method, String) {
    let base = format!("endpoints/{endpoint}/docker/containers/{id}");
    match action {
        ContainerAction::Remove => (Method::DELETE, base),
        other => (Method::POST, format!("{base}/{}", other.as_str())),
    }
}

fn map_reqwest(err: reqwest::Error) -> BerthError {
    if err.is_decode() {
        BerthError::Decoding {
            message: err.to_string(),
        }
    } else {
        BerthError::Transport {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PortainerClient {
        PortainerClient::new("https://portainer.local:9443/", "token", Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        assert_eq!(client().base_url(), "https://portainer.local:9443");
        assert_eq!(
            client().url("/endpoints"),
            "https://portainer.local:9443/api/endpoints"
        );
    }

    #[test]
    fn empty_url_is_rejected() {
        let err = PortainerClient::new("  ", "token", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BerthError::Config { .. }));
    }

    #[test]
    fn remove_uses_delete_without_suffix() {
        let (method, path) = action_route(
            ContainerAction::Remove,
            &InstanceId::new("abc"),
            EndpointId::new(2),
        );
        assert_eq!(method, Method::DELETE);
        assert_eq!(path, "endpoints/2/docker/containers/abc");
    }

    #[test]
    fn lifecycle_actions_post_to_named_route() {
        let (method, path) = action_route(
            ContainerAction::Restart,
            &InstanceId::new("abc"),
            EndpointId::new(2),
        );
        assert_eq!(method, Method::POST);
        assert_eq!(path, "endpoints/2/docker/containers/abc/restart");
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let client =
            PortainerClient::new("http://127.0.0.1:1", "token", Duration::from_secs(2)).unwrap();
        let err = client.fetch_endpoints().await.unwrap_err();
        assert!(matches!(err, BerthError::Transport { .. }));
    }
}
