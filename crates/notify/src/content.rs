//! Shared notification content templates
//!
//! Canonical subject/body generators, used by both the SES and mock
//! gateways. Bodies stay short on purpose: the email is a hint, the full
//! conversation lives in-app.

use crate::NotificationEvent;

/// Subject line for an event
pub fn subject(event: &NotificationEvent) -> String {
    match event {
        NotificationEvent::ProjectSubmitted { title, .. } => {
            format!("NeoFab: New project '{}'", title)
        }
        NotificationEvent::StatusChanged { title, new, .. } => {
            format!("NeoFab: Project '{}' status changed to {}", title, new)
        }
    }
}

/// Plain-text body for an event
pub fn body_text(event: &NotificationEvent, app_base_url: &str) -> String {
    match event {
        NotificationEvent::ProjectSubmitted {
            project_id,
            title,
            owner_id,
        } => {
            let lines = [
                "A new project has been submitted.".to_string(),
                format!("ID: {}", project_id),
                format!("Title: {}", title),
                format!("Submitted by: {}", owner_id),
                format!("Link: {}/projects/{}", app_base_url, project_id),
            ];
            lines.join("\n")
        }
        NotificationEvent::StatusChanged {
            subject,
            project_id,
            title,
            previous,
            new,
            actor_id,
        } => {
            let lines = [
                "The status has changed.".to_string(),
                format!("Entity: {}", subject),
                format!("Title: {}", title),
                format!("Status: {} -> {}", previous, new),
                format!("Changed by: {}", actor_id),
                format!("Link: {}/projects/{}", app_base_url, project_id),
            ];
            lines.join("\n")
        }
    }
}
