//! Portainer and Docker Engine JSON shapes.
//!
//! Only the fields berth reads are modelled. Conversion into domain types
//! is where the logical key of each container is derived.

use std::collections::BTreeMap;

use berth_common::types::{
    Container, ContainerDetails, ContainerState, Endpoint, EndpointId, EndpointStatus,
    InstanceId, LogicalKey,
};
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;

/// Portainer reports endpoint status as 1 (up) or 2 (down).
const ENDPOINT_STATUS_UP: u8 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct EndpointDto {
    id: u64,
    name: String,
    #[serde(rename = "URL", default)]
    url: Option<String>,
    #[serde(default)]
    status: u8,
}

impl From<EndpointDto> for Endpoint {
    fn from(dto: EndpointDto) -> Self {
        Self {
            id: EndpointId::new(dto.id),
            name: dto.name,
            url: dto.url.filter(|u| !u.is_empty()),
            status: if dto.status == ENDPOINT_STATUS_UP {
                EndpointStatus::Up
            } else {
                EndpointStatus::Down
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ContainerSummaryDto {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    state: ContainerState,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

impl From<ContainerSummaryDto> for Container {
    fn from(dto: ContainerSummaryDto) -> Self {
        let labels = dto.labels.unwrap_or_default();
        let name = dto.names.first().map(|n| n.trim_start_matches('/').to_string());
        build_container(dto.id, name, dto.state, dto.status, labels)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ContainerInspectDto {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    restart_count: u64,
    state: InspectStateDto,
    #[serde(default)]
    config: Option<InspectConfigDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectStateDto {
    status: ContainerState,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    exit_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfigDto {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

impl From<ContainerInspectDto> for ContainerDetails {
    fn from(dto: ContainerInspectDto) -> Self {
        let (image, labels) = dto
            .config
            .map(|c| (c.image, c.labels.unwrap_or_default()))
            .unwrap_or_default();
        let name = dto.name.map(|n| n.trim_start_matches('/').to_string());
        let container = build_container(dto.id, name, dto.state.status, None, labels);
        Self {
            container,
            image,
            created_at: dto.created.and_then(set_time),
            started_at: dto.state.started_at.and_then(set_time),
            finished_at: dto.state.finished_at.and_then(set_time),
            exit_code: dto.state.exit_code,
            restart_count: dto.restart_count,
        }
    }
}

fn build_container(
    id: String,
    name: Option<String>,
    state: ContainerState,
    status: Option<String>,
    labels: BTreeMap<String, String>,
) -> Container {
    let instance_id = InstanceId::new(id);
    let name = name.filter(|n| !n.is_empty());
    let logical_key = LogicalKey::derive(&labels, name.as_deref(), &instance_id);
    Container {
        instance_id,
        logical_key,
        name,
        state,
        status,
        labels,
    }
}

/// Docker reports "never" as year 1.
fn set_time(time: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (time.year() > 1).then_some(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_status_maps_up_and_down() {
        let json = r#"[
            {"Id": 1, "Name": "local", "URL": "unix:///var/run/docker.sock", "Status": 1},
            {"Id": 7, "Name": "edge", "URL": "", "Status": 2}
        ]"#;
        let dtos: Vec<EndpointDto> = serde_json::from_str(json).unwrap();
        let endpoints: Vec<Endpoint> = dtos.into_iter().map(Endpoint::from).collect();
        assert_eq!(endpoints[0].status, EndpointStatus::Up);
        assert_eq!(endpoints[1].id, EndpointId::new(7));
        assert_eq!(endpoints[1].status, EndpointStatus::Down);
        assert!(endpoints[1].url.is_none());
    }

    #[test]
    fn container_summary_uses_compose_identity() {
        let json = r#"{
            "Id": "4f9c0e",
            "Names": ["/shop-web-1"],
            "Image": "nginx:1.27",
            "State": "running",
            "Status": "Up 2 hours",
            "Labels": {
                "com.docker.compose.project": "shop",
                "com.docker.compose.service": "web"
            }
        }"#;
        let dto: ContainerSummaryDto = serde_json::from_str(json).unwrap();
        let container = Container::from(dto);
        assert_eq!(container.name.as_deref(), Some("shop-web-1"));
        assert_eq!(container.logical_key.as_str(), "compose:shop/web/1");
        assert_eq!(container.state, ContainerState::Running);
        assert_eq!(container.status.as_deref(), Some("Up 2 hours"));
    }

    #[test]
    fn container_summary_tolerates_null_labels() {
        let json = r#"{"Id": "aa", "Names": ["/db"], "State": "exited", "Labels": null}"#;
        let container = Container::from(serde_json::from_str::<ContainerSummaryDto>(json).unwrap());
        assert!(container.labels.is_empty());
        assert_eq!(container.logical_key.as_str(), "name:db");
    }

    #[test]
    fn unknown_state_fails_to_decode() {
        let json = r#"{"Id": "aa", "Names": ["/db"], "State": "hibernating"}"#;
        assert!(serde_json::from_str::<ContainerSummaryDto>(json).is_err());
    }

    #[test]
    fn inspect_drops_zero_timestamps() {
        let json = r#"{
            "Id": "4f9c0e",
            "Name": "/web",
            "Created": "2026-03-01T10:00:00.123456789Z",
            "RestartCount": 3,
            "State": {
                "Status": "running",
                "StartedAt": "2026-03-01T10:00:01Z",
                "FinishedAt": "0001-01-01T00:00:00Z",
                "ExitCode": 0
            },
            "Config": {"Image": "nginx:1.27", "Labels": {}}
        }"#;
        let details =
            ContainerDetails::from(serde_json::from_str::<ContainerInspectDto>(json).unwrap());
        assert_eq!(details.container.display_name(), "web");
        assert_eq!(details.image.as_deref(), Some("nginx:1.27"));
        assert!(details.started_at.is_some());
        assert!(details.finished_at.is_none());
        assert_eq!(details.restart_count, 3);
    }
}
