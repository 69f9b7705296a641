//! Formatted output helpers for CLI commands.
//!
//! Provides table rows for endpoints and containers, human-readable ages,
//! and the stdout notification dispatcher.

use async_trait::async_trait;
use berth_common::error::Result;
use berth_common::types::{Container, Endpoint, EndpointStatus};
use berth_sync::composer::NotificationContent;
use berth_sync::dispatch::NotificationDispatcher;
use chrono::{DateTime, Utc};

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Header line of the endpoint table.
#[must_use]
pub fn endpoint_header() -> String {
    format!("{:<6} {:<24} {:<6} {}", "ID", "NAME", "STATUS", "URL")
}

/// One row of the endpoint table.
#[must_use]
pub fn endpoint_row(endpoint: &Endpoint, selected: bool) -> String {
    let status = match endpoint.status {
        EndpointStatus::Up => "up",
        EndpointStatus::Down => "down",
    };
    let marker = if selected { "*" } else { "" };
    format!(
        "{:<6} {:<24} {:<6} {}",
        format!("{}{marker}", endpoint.id),
        endpoint.name,
        status,
        endpoint.url.as_deref().unwrap_or("-")
    )
}

/// Header line of the container table.
#[must_use]
pub fn container_header() -> String {
    format!(
        "{:<14} {:<24} {:<11} {}",
        "CONTAINER ID", "NAME", "STATE", "STATUS"
    )
}

/// One row of the container table.
#[must_use]
pub fn container_row(container: &Container) -> String {
    format!(
        "{:<14} {:<24} {:<11} {}",
        container.instance_id.short(),
        container.display_name(),
        container.state,
        container.status_text().unwrap_or("-")
    )
}

/// Formats the time elapsed between `then` and `now` (e.g., "3h 12m ago").
#[must_use]
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 0 {
        return "in the future".to_string();
    }
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    if days > 0 {
        format!("{days}d {hours}h ago")
    } else if hours > 0 {
        format!("{hours}h {minutes}m ago")
    } else if minutes > 0 {
        format!("{minutes}m ago")
    } else {
        format!("{secs}s ago")
    }
}

/// Renders a notification as it is printed on the terminal.
#[must_use]
pub fn render_notification(content: &NotificationContent) -> String {
    let body: String = content
        .body
        .lines()
        .map(|line| format!("\n    {line}"))
        .collect();
    format!(
        "  {BOLD}{}{RESET}{body}\n  {DIM}{}{RESET}",
        content.title, content.dedup_id
    )
}

/// Prints notifications on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutDispatcher;

#[async_trait]
impl NotificationDispatcher for StdoutDispatcher {
    async fn deliver(&self, content: NotificationContent) -> Result<()> {
        println!("{}", render_notification(&content));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use berth_common::types::{ContainerState, EndpointId, InstanceId, LogicalKey};
    use chrono::Duration;

    use super::*;

    #[test]
    fn format_age_displays_seconds() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(42), now), "42s ago");
    }

    #[test]
    fn format_age_displays_hours_and_minutes() {
        let now = Utc::now();
        let then = now - Duration::minutes(3 * 60 + 12);
        assert_eq!(format_age(then, now), "3h 12m ago");
    }

    #[test]
    fn format_age_displays_days() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::hours(50), now), "2d 2h ago");
    }

    #[test]
    fn container_row_uses_short_id_and_fallbacks() {
        let container = Container::new(
            InstanceId::new("0123456789abcdef0123"),
            LogicalKey::new("name:web"),
            ContainerState::Exited,
        );
        let row = container_row(&container);
        assert!(row.starts_with("0123456789ab "));
        assert!(row.contains("name:web"));
        assert!(row.contains("exited"));
        assert!(row.trim_end().ends_with('-'));
    }

    #[test]
    fn endpoint_row_marks_selection() {
        let endpoint = Endpoint {
            id: EndpointId::new(2),
            name: "prod".into(),
            url: Some("tcp://10.0.0.2:2375".into()),
            status: EndpointStatus::Down,
        };
        let row = endpoint_row(&endpoint, true);
        assert!(row.starts_with("2*"));
        assert!(row.contains("down"));
        assert!(row.ends_with("tcp://10.0.0.2:2375"));
    }

    #[test]
    fn notification_body_lines_are_indented() {
        let content = NotificationContent {
            title: "api and db".into(),
            body: "api: exited\ndb: running".into(),
            relevance: 0.2,
            dedup_id: "berth.container-changes.00ff".into(),
        };
        let rendered = render_notification(&content);
        assert!(rendered.contains("\n    api: exited\n    db: running"));
        assert!(rendered.contains("berth.container-changes.00ff"));
    }
}
