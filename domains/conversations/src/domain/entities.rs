//! Domain entities for the Conversations domain
//!
//! A project owns one append-only message thread. Messages are immutable;
//! the `sequence` field is assigned by the store from the project-scoped
//! ledger counter (shared with status events), so ordering by
//! `(created_at, sequence)` is total and stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use neofab_common::{Error, Result};

/// Author of a message: a user, or the engine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum MessageAuthor {
    User(Uuid),
    System,
}

impl MessageAuthor {
    /// Whether the message was generated by the engine
    pub fn is_system(&self) -> bool {
        matches!(self, MessageAuthor::System)
    }

    /// The author's user id, if any
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            MessageAuthor::User(id) => Some(*id),
            MessageAuthor::System => None,
        }
    }
}

impl std::fmt::Display for MessageAuthor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageAuthor::User(id) => write!(f, "user:{}", id),
            MessageAuthor::System => write!(f, "system"),
        }
    }
}

/// Message entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub project_id: Uuid,
    pub author: MessageAuthor,
    pub body: String,
    /// Set only on system messages generated by a status transition
    pub status_event_id: Option<Uuid>,
    /// Project-scoped ledger sequence, assigned by the store at commit
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new user-authored message
    pub fn new_user(project_id: Uuid, author_id: Uuid, body: String) -> Result<Self> {
        Self::validate_body(&body)?;

        Ok(Message {
            id: Uuid::new_v4(),
            project_id,
            author: MessageAuthor::User(author_id),
            body,
            status_event_id: None,
            sequence: 0,
            created_at: Utc::now(),
        })
    }

    /// Create a system message announcing a status transition
    pub fn new_system(project_id: Uuid, body: String, status_event_id: Uuid) -> Result<Self> {
        Self::validate_body(&body)?;

        Ok(Message {
            id: Uuid::new_v4(),
            project_id,
            author: MessageAuthor::System,
            body,
            status_event_id: Some(status_event_id),
            sequence: 0,
            created_at: Utc::now(),
        })
    }

    /// Message body must not be blank after trimming
    fn validate_body(body: &str) -> Result<()> {
        if body.trim().is_empty() {
            return Err(Error::Empty("message body cannot be blank".to_string()));
        }
        Ok(())
    }
}

/// Tracks when a user last read a project thread
///
/// Unique per (project, user); upserted on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReadReceipt {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

impl ReadReceipt {
    /// Record that the user has read the thread as of now
    pub fn now(project_id: Uuid, user_id: Uuid) -> Self {
        ReadReceipt {
            project_id,
            user_id,
            last_read_at: Utc::now(),
        }
    }
}
