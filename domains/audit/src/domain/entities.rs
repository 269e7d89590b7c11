//! Domain entities for the Audit domain
//!
//! Status events form the sole source of truth for "current status": the
//! denormalized `status` field on projects and print jobs is a cache that
//! is only written together with a new event. Events are append-only and
//! never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use neofab_common::EntityRef;
use neofab_conversations::Message;
use neofab_jobs::PrintJobStatus;
use neofab_projects::ProjectStatus;

/// A recorded status change, typed per entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum StatusChange {
    Project {
        from: ProjectStatus,
        to: ProjectStatus,
    },
    PrintJob {
        from: PrintJobStatus,
        to: PrintJobStatus,
    },
}

impl StatusChange {
    /// Display label of the previous status
    pub fn from_label(&self) -> String {
        match self {
            StatusChange::Project { from, .. } => from.to_string(),
            StatusChange::PrintJob { from, .. } => from.to_string(),
        }
    }

    /// Display label of the new status
    pub fn to_label(&self) -> String {
        match self {
            StatusChange::Project { to, .. } => to.to_string(),
            StatusChange::PrintJob { to, .. } => to.to_string(),
        }
    }
}

/// One immutable record of an accepted state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: Uuid,
    /// Owning project; for print-job events this is the job's project
    pub project_id: Uuid,
    pub subject: EntityRef,
    pub change: StatusChange,
    pub actor_id: Uuid,
    pub reason: Option<String>,
    /// Project-scoped ledger sequence, assigned by the store at commit
    pub sequence: i64,
    pub recorded_at: DateTime<Utc>,
}

impl StatusEvent {
    /// Create a new status event for a transition accepted now
    pub fn new(
        project_id: Uuid,
        subject: EntityRef,
        change: StatusChange,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Self {
        StatusEvent {
            id: Uuid::new_v4(),
            project_id,
            subject,
            change,
            actor_id,
            reason,
            sequence: 0,
            recorded_at: Utc::now(),
        }
    }
}

/// One entry of a project's merged timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEntry {
    Status(StatusEvent),
    Message(Message),
}

impl TimelineEntry {
    /// When this entry happened
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TimelineEntry::Status(event) => event.recorded_at,
            TimelineEntry::Message(message) => message.created_at,
        }
    }

    /// Project-scoped ledger sequence
    pub fn sequence(&self) -> i64 {
        match self {
            TimelineEntry::Status(event) => event.sequence,
            TimelineEntry::Message(message) => message.sequence,
        }
    }

    /// Total ordering key: timestamp, ties broken by insertion order
    pub fn sort_key(&self) -> (DateTime<Utc>, i64) {
        (self.timestamp(), self.sequence())
    }
}
