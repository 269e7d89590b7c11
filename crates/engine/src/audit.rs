//! Audit Reader
//!
//! Pure read projection over the status-event ledger and the message
//! thread. No mutation capability; consumed by reporting and UI layers.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use neofab_attachments::Attachment;
use neofab_audit::TimelineEntry;
use neofab_common::{EntityRef, Error, Result};
use neofab_jobs::PrintJob;
use neofab_projects::Project;
use neofab_store::EntityStore;

use crate::messaging::collect_entries;

/// Everything a reviewer needs to see about a project in one read
#[derive(Debug, Clone, Serialize)]
pub struct AuditSnapshot {
    pub project: Project,
    pub print_jobs: Vec<PrintJob>,
    pub timeline: Vec<TimelineEntry>,
    pub attachments: Vec<Attachment>,
}

/// Read-only audit projection
#[derive(Clone)]
pub struct AuditReader {
    store: Arc<dyn EntityStore>,
}

impl AuditReader {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// The merged timeline plus current status snapshots of the project
    /// and all its print jobs
    pub async fn snapshot(&self, project_id: Uuid) -> Result<AuditSnapshot> {
        let project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;

        let print_jobs = self.store.print_jobs_for_project(project_id).await?;
        let timeline = collect_entries(&self.store, project_id).await?;

        let mut attachments = self
            .store
            .attachments_for(EntityRef::Project(project_id))
            .await?;
        for job in &print_jobs {
            attachments.extend(
                self.store
                    .attachments_for(EntityRef::PrintJob(job.id))
                    .await?,
            );
        }

        Ok(AuditSnapshot {
            project,
            print_jobs,
            timeline,
            attachments,
        })
    }
}
