//! Entity and blob storage for NeoFab
//!
//! The engine talks to storage through two seams:
//!
//! - [`EntityStore`]: reads plus one atomic, version-guarded
//!   [`commit`](EntityStore::commit) of a [`WriteBatch`]. A batch is applied
//!   all-or-nothing; any version mismatch fails the whole batch with
//!   `Conflict` so concurrent writers never both win.
//! - [`BlobStore`]: content-addressed file bytes with atomic reference
//!   counting, so identical uploads share one stored blob.
//!
//! `memory` provides the embedded backend used by tests; `postgres`
//! provides the durable backend.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use neofab_attachments::{Attachment, ContentHash};
use neofab_audit::StatusEvent;
use neofab_common::{EntityRef, Result};
use neofab_conversations::{Message, ReadReceipt};
use neofab_jobs::PrintJob;
use neofab_projects::{Project, ProjectStatus};

pub use memory::{MemoryBlobStore, MemoryStore};
pub use postgres::{PostgresBlobStore, PostgresStore};

/// Filter for project queries
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub owner_id: Option<Uuid>,
    pub status: Option<ProjectStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl ProjectFilter {
    /// Filter by owner
    pub fn owned_by(owner_id: Uuid) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Default::default()
        }
    }

    /// Filter by status
    pub fn with_status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Check a project against this filter
    pub fn matches(&self, project: &Project) -> bool {
        if let Some(owner_id) = self.owner_id {
            if project.owner_id != owner_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if project.status != status {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if project.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if project.created_at > before {
                return false;
            }
        }
        true
    }
}

/// One write within a batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert (`expected_version: None`) or version-guarded update of a
    /// project. On update the store bumps the stored version.
    PutProject {
        project: Project,
        expected_version: Option<i64>,
    },
    /// Insert or version-guarded update of a print job
    PutPrintJob {
        job: PrintJob,
        expected_version: Option<i64>,
    },
    /// Append a status event; the store assigns its ledger sequence
    AppendEvent(StatusEvent),
    /// Append a message; the store assigns its ledger sequence
    AppendMessage(Message),
    /// Append an attachment metadata record
    AppendAttachment(Attachment),
    /// Upsert a read receipt
    PutReadReceipt(ReadReceipt),
}

/// An atomic set of writes
///
/// The store applies every op or none of them. Events and messages draw
/// their `sequence` from the owning project's ledger counter at commit
/// time, so insertion order is recoverable even under timestamp ties.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_project(mut self, project: Project, expected_version: Option<i64>) -> Self {
        self.ops.push(WriteOp::PutProject {
            project,
            expected_version,
        });
        self
    }

    pub fn put_print_job(mut self, job: PrintJob, expected_version: Option<i64>) -> Self {
        self.ops.push(WriteOp::PutPrintJob {
            job,
            expected_version,
        });
        self
    }

    pub fn append_event(mut self, event: StatusEvent) -> Self {
        self.ops.push(WriteOp::AppendEvent(event));
        self
    }

    pub fn append_message(mut self, message: Message) -> Self {
        self.ops.push(WriteOp::AppendMessage(message));
        self
    }

    pub fn append_attachment(mut self, attachment: Attachment) -> Self {
        self.ops.push(WriteOp::AppendAttachment(attachment));
        self
    }

    pub fn put_read_receipt(mut self, receipt: ReadReceipt) -> Self {
        self.ops.push(WriteOp::PutReadReceipt(receipt));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Durable storage of projects, print jobs, attachments, messages, and
/// status events
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch a project by id
    async fn project(&self, id: Uuid) -> Result<Option<Project>>;

    /// Fetch a print job by id
    async fn print_job(&self, id: Uuid) -> Result<Option<PrintJob>>;

    /// Query projects by owner/status/date-range filter, newest first
    async fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>>;

    /// List print jobs belonging to a project, oldest first
    async fn print_jobs_for_project(&self, project_id: Uuid) -> Result<Vec<PrintJob>>;

    /// List all status events recorded under a project (including its
    /// print jobs'), in ledger order
    async fn events_for_project(&self, project_id: Uuid) -> Result<Vec<StatusEvent>>;

    /// List status events for one specific entity, in ledger order
    async fn events_for_subject(&self, subject: EntityRef) -> Result<Vec<StatusEvent>>;

    /// List a project's messages in ledger order
    async fn messages_for_project(&self, project_id: Uuid) -> Result<Vec<Message>>;

    /// List attachments owned by an entity, oldest first
    async fn attachments_for(&self, owner: EntityRef) -> Result<Vec<Attachment>>;

    /// Fetch a user's read receipt for a project thread
    async fn read_receipt(&self, project_id: Uuid, user_id: Uuid) -> Result<Option<ReadReceipt>>;

    /// Apply a batch of writes atomically
    ///
    /// Fails with `Conflict` if any version guard does not hold, with no
    /// partial effects.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;
}

/// Content-addressed blob storage with reference counting
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the bytes under their hash, or bump the reference count if
    /// the hash already exists; returns the resulting count. Atomic under
    /// concurrent identical uploads.
    async fn put_if_absent(&self, hash: &ContentHash, bytes: &[u8]) -> Result<u64>;

    /// Fetch the bytes for a hash
    async fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>>;

    /// Current reference count for a hash (0 when absent)
    async fn ref_count(&self, hash: &ContentHash) -> Result<u64>;
}
