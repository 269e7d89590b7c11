//! NeoFab core engine
//!
//! The in-process domain engine behind NeoFab's 3D-print workflow: users
//! submit projects with model files, staff review and schedule print
//! jobs, both sides exchange messages, and every status change lands on
//! an append-only ledger.
//!
//! [`Engine`] composes the four core components over pluggable storage
//! and notification seams:
//!
//! - [`StatusEngine`]: validated, atomic state transitions
//! - [`AttachmentManager`]: content-addressed, deduplicated uploads
//! - [`MessagingThread`]: the per-project conversation and timeline
//! - [`AuditReader`]: read-only project snapshots
//!
//! All mutating operations are synchronous request-scoped commits; the
//! engine runs no background tasks.

pub mod attachments;
pub mod audit;
pub mod messaging;
pub mod status;

use std::sync::Arc;

use futures_core::Stream;
use uuid::Uuid;

use neofab_attachments::{Attachment, NewAttachment};
use neofab_audit::TimelineEntry;
use neofab_common::{
    Actor, CapabilityProvider, EngineConfig, EntityRef, Error, Result, RoleCapabilities,
};
use neofab_conversations::Message;
use neofab_jobs::{JobAssignment, NewPrintJob, PrintJob, PrintJobStatus};
use neofab_notify::NotificationGateway;
use neofab_projects::{NewProject, Project, ProjectStatus};
use neofab_store::{BlobStore, EntityStore, ProjectFilter};

pub use attachments::AttachmentManager;
pub use audit::{AuditReader, AuditSnapshot};
pub use messaging::MessagingThread;
pub use status::StatusEngine;

/// The assembled NeoFab core
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn EntityStore>,
    status: StatusEngine,
    attachments: AttachmentManager,
    messaging: MessagingThread,
    audit: AuditReader,
}

impl Engine {
    /// Assemble the engine from its collaborator seams
    pub fn new(
        store: Arc<dyn EntityStore>,
        blobs: Arc<dyn BlobStore>,
        gateway: Arc<dyn NotificationGateway>,
        capabilities: Arc<dyn CapabilityProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            status: StatusEngine::new(store.clone(), gateway, capabilities.clone()),
            attachments: AttachmentManager::new(
                store.clone(),
                blobs,
                capabilities.clone(),
                config,
            ),
            messaging: MessagingThread::new(store.clone(), capabilities),
            audit: AuditReader::new(store.clone()),
            store,
        }
    }

    /// Assemble with role-derived capabilities and default configuration
    pub fn with_defaults(
        store: Arc<dyn EntityStore>,
        blobs: Arc<dyn BlobStore>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self::new(
            store,
            blobs,
            gateway,
            Arc::new(RoleCapabilities),
            EngineConfig::default(),
        )
    }

    // --- Status engine ----------------------------------------------------

    /// Create a project in the initial `Submitted` status
    pub async fn submit_project(&self, actor: &Actor, new: NewProject) -> Result<Project> {
        self.status.submit_project(actor, new).await
    }

    /// Request a project transition; returns the updated project and the
    /// id of the recorded status event
    pub async fn request_project_transition(
        &self,
        project_id: Uuid,
        target: ProjectStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<(Project, Uuid)> {
        self.status
            .request_project_transition(project_id, target, actor, reason)
            .await
    }

    /// Create a print job under an approved project
    pub async fn create_print_job(
        &self,
        project_id: Uuid,
        new: NewPrintJob,
        actor: &Actor,
    ) -> Result<PrintJob> {
        self.status.create_print_job(project_id, new, actor).await
    }

    /// Set printer/material/color on a non-terminal print job
    pub async fn assign_print_job(
        &self,
        job_id: Uuid,
        assignment: JobAssignment,
        actor: &Actor,
    ) -> Result<PrintJob> {
        self.status.assign_print_job(job_id, assignment, actor).await
    }

    /// Request a print job transition; returns the updated job and the
    /// id of the recorded status event
    pub async fn request_job_transition(
        &self,
        job_id: Uuid,
        target: PrintJobStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<(PrintJob, Uuid)> {
        self.status
            .request_job_transition(job_id, target, actor, reason)
            .await
    }

    // --- Attachments ------------------------------------------------------

    /// Store an upload and its metadata record
    pub async fn attach(
        &self,
        owner: EntityRef,
        new: NewAttachment,
        bytes: &[u8],
        uploader: &Actor,
    ) -> Result<Attachment> {
        self.attachments.attach(owner, new, bytes, uploader).await
    }

    /// Fetch the bytes behind an attachment
    pub async fn attachment_content(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        self.attachments.content(attachment).await
    }

    // --- Messaging --------------------------------------------------------

    /// Append a user message to a project thread
    pub async fn post_message(
        &self,
        project_id: Uuid,
        actor: &Actor,
        body: String,
    ) -> Result<Message> {
        self.messaging.post_message(project_id, actor, body).await
    }

    /// Record that the user has read the thread as of now
    pub async fn mark_read(&self, project_id: Uuid, actor: &Actor) -> Result<()> {
        self.messaging.mark_read(project_id, actor).await
    }

    /// Count thread messages the user has not seen yet
    pub async fn unread_count(&self, project_id: Uuid, actor: &Actor) -> Result<usize> {
        self.messaging.unread_count(project_id, actor).await
    }

    /// The merged project timeline as a finite, restartable stream
    pub async fn timeline(
        &self,
        project_id: Uuid,
    ) -> Result<impl Stream<Item = TimelineEntry> + Send + 'static> {
        self.messaging.timeline(project_id).await
    }

    // --- Audit & read accessors -------------------------------------------

    /// The timeline plus current status snapshots for the project and
    /// all its print jobs
    pub async fn audit_snapshot(&self, project_id: Uuid) -> Result<AuditSnapshot> {
        self.audit.snapshot(project_id).await
    }

    /// Fetch a project by id
    pub async fn project(&self, id: Uuid) -> Result<Project> {
        self.store
            .project(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", id)))
    }

    /// Fetch a print job by id
    pub async fn print_job(&self, id: Uuid) -> Result<PrintJob> {
        self.store
            .print_job(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("print job {}", id)))
    }

    /// Query projects by owner/status/date-range filter
    pub async fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        self.store.projects(filter).await
    }

    /// List print jobs belonging to a project
    pub async fn print_jobs_for_project(&self, project_id: Uuid) -> Result<Vec<PrintJob>> {
        self.store.print_jobs_for_project(project_id).await
    }

    /// List attachments owned by an entity
    pub async fn attachments_for(&self, owner: EntityRef) -> Result<Vec<Attachment>> {
        self.store.attachments_for(owner).await
    }
}
