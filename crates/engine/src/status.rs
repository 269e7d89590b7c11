//! Status Engine
//!
//! Validates and applies state transitions for projects and print jobs.
//! Every accepted transition writes the updated entity, a status event,
//! and (for project transitions) a system message in one atomic store
//! commit; the notification gateway is called only after the commit and
//! only best-effort.

use std::sync::Arc;

use uuid::Uuid;

use neofab_audit::{StatusChange, StatusEvent};
use neofab_common::{Actor, Capability, CapabilityProvider, EntityRef, Error, Result};
use neofab_conversations::Message;
use neofab_jobs::{JobAssignment, NewPrintJob, PrintJob, PrintJobStatus, ScheduleGuardContext};
use neofab_notify::{NotificationEvent, NotificationGateway};
use neofab_projects::{NewProject, Project, ProjectStatus};
use neofab_store::{EntityStore, WriteBatch};

/// System-message template for a project transition target
///
/// Every project transition announces itself on the thread; the wording
/// follows the status labels users see in the shop.
fn system_message_body(target: ProjectStatus) -> &'static str {
    match target {
        ProjectStatus::Submitted => "Project submitted",
        ProjectStatus::UnderReview => "Project is under review",
        ProjectStatus::Approved => "Project approved",
        ProjectStatus::InProduction => "Print production started",
        ProjectStatus::Completed => "Project completed",
        ProjectStatus::Rejected => "Project rejected",
        ProjectStatus::Cancelled => "Project cancelled",
    }
}

/// The transition engine for projects and print jobs
#[derive(Clone)]
pub struct StatusEngine {
    store: Arc<dyn EntityStore>,
    gateway: Arc<dyn NotificationGateway>,
    capabilities: Arc<dyn CapabilityProvider>,
}

impl StatusEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        gateway: Arc<dyn NotificationGateway>,
        capabilities: Arc<dyn CapabilityProvider>,
    ) -> Self {
        Self {
            store,
            gateway,
            capabilities,
        }
    }

    /// Create a project in the initial `Submitted` status and hint staff
    pub async fn submit_project(&self, actor: &Actor, new: NewProject) -> Result<Project> {
        if !self
            .capabilities
            .has_capability(actor, Capability::SubmitProjects)
        {
            return Err(Error::Forbidden(format!(
                "actor {} may not submit projects",
                actor.id
            )));
        }

        let project = Project::new(actor.id, new)?;
        self.store
            .commit(WriteBatch::new().put_project(project.clone(), None))
            .await?;

        tracing::info!(project_id = %project.id, owner_id = %project.owner_id, "project submitted");

        self.notify_best_effort(NotificationEvent::ProjectSubmitted {
            project_id: project.id,
            title: project.title.clone(),
            owner_id: project.owner_id,
        })
        .await;

        Ok(project)
    }

    /// Request a project transition to the target status
    ///
    /// Returns the updated project and the id of the recorded status
    /// event.
    pub async fn request_project_transition(
        &self,
        project_id: Uuid,
        target: ProjectStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<(Project, Uuid)> {
        let mut project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;

        self.authorize_project_transition(actor, &project, target)?;

        let expected_version = project.version;
        let previous = project.apply_transition(target)?;

        let event = StatusEvent::new(
            project.id,
            EntityRef::Project(project.id),
            StatusChange::Project {
                from: previous,
                to: target,
            },
            actor.id,
            reason,
        );
        let message =
            Message::new_system(project.id, system_message_body(target).to_string(), event.id)?;

        self.store
            .commit(
                WriteBatch::new()
                    .put_project(project.clone(), Some(expected_version))
                    .append_event(event.clone())
                    .append_message(message),
            )
            .await?;
        project.version = expected_version + 1;

        tracing::info!(
            project_id = %project.id,
            from = %previous,
            to = %target,
            actor_id = %actor.id,
            "project transition accepted"
        );

        self.notify_best_effort(NotificationEvent::StatusChanged {
            subject: EntityRef::Project(project.id),
            project_id: project.id,
            title: project.title.clone(),
            previous: previous.to_string(),
            new: target.to_string(),
            actor_id: actor.id,
        })
        .await;

        Ok((project, event.id))
    }

    /// Create a print job under an approved project
    pub async fn create_print_job(
        &self,
        project_id: Uuid,
        new: NewPrintJob,
        actor: &Actor,
    ) -> Result<PrintJob> {
        let project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;

        if !self
            .capabilities
            .has_capability(actor, Capability::OperateJobs)
        {
            return Err(Error::Forbidden(format!(
                "actor {} may not operate print jobs",
                actor.id
            )));
        }

        if !project.status.accepts_print_jobs() {
            return Err(Error::IllegalTransition(format!(
                "cannot create a print job under a project in status {}",
                project.status
            )));
        }

        let job = PrintJob::new(project_id, new);
        self.store
            .commit(WriteBatch::new().put_print_job(job.clone(), None))
            .await?;

        tracing::info!(job_id = %job.id, project_id = %project_id, "print job created");
        Ok(job)
    }

    /// Set printer/material/color on a non-terminal print job
    pub async fn assign_print_job(
        &self,
        job_id: Uuid,
        assignment: JobAssignment,
        actor: &Actor,
    ) -> Result<PrintJob> {
        if !self
            .capabilities
            .has_capability(actor, Capability::OperateJobs)
        {
            return Err(Error::Forbidden(format!(
                "actor {} may not operate print jobs",
                actor.id
            )));
        }

        let mut job = self
            .store
            .print_job(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("print job {}", job_id)))?;

        if job.is_terminal() {
            return Err(Error::IllegalTransition(format!(
                "print job {} is {} and can no longer be assigned",
                job.id, job.status
            )));
        }

        let expected_version = job.version;
        job.assign(assignment);
        self.store
            .commit(WriteBatch::new().put_print_job(job.clone(), Some(expected_version)))
            .await?;
        job.version = expected_version + 1;

        Ok(job)
    }

    /// Request a print job transition to the target status
    ///
    /// Returns the updated job and the id of the recorded status event.
    pub async fn request_job_transition(
        &self,
        job_id: Uuid,
        target: PrintJobStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<(PrintJob, Uuid)> {
        let mut job = self
            .store
            .print_job(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("print job {}", job_id)))?;
        let project = self
            .store
            .project(job.project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", job.project_id)))?;

        if !self
            .capabilities
            .has_capability(actor, Capability::OperateJobs)
        {
            return Err(Error::Forbidden(format!(
                "actor {} may not operate print jobs",
                actor.id
            )));
        }

        let context = ScheduleGuardContext {
            project_status: project.status,
            printer_assigned: job.has_printer(),
        };
        let expected_version = job.version;
        let previous = job.apply_transition(target, Some(&context))?;

        let event = StatusEvent::new(
            job.project_id,
            EntityRef::PrintJob(job.id),
            StatusChange::PrintJob {
                from: previous,
                to: target,
            },
            actor.id,
            reason,
        );

        self.store
            .commit(
                WriteBatch::new()
                    .put_print_job(job.clone(), Some(expected_version))
                    .append_event(event.clone()),
            )
            .await?;
        job.version = expected_version + 1;

        tracing::info!(
            job_id = %job.id,
            project_id = %job.project_id,
            from = %previous,
            to = %target,
            actor_id = %actor.id,
            "print job transition accepted"
        );

        self.notify_best_effort(NotificationEvent::StatusChanged {
            subject: EntityRef::PrintJob(job.id),
            project_id: job.project_id,
            title: project.title.clone(),
            previous: previous.to_string(),
            new: target.to_string(),
            actor_id: actor.id,
        })
        .await;

        Ok((job, event.id))
    }

    /// One authorization gate for every project transition
    fn authorize_project_transition(
        &self,
        actor: &Actor,
        project: &Project,
        target: ProjectStatus,
    ) -> Result<()> {
        let caps = self.capabilities.capabilities_of(actor);
        let allowed = match target {
            ProjectStatus::Cancelled => {
                caps.contains(&Capability::CancelAnyProject)
                    || (caps.contains(&Capability::CancelOwnProjects)
                        && project.is_owned_by(actor.id))
            }
            _ => caps.contains(&Capability::ReviewProjects),
        };

        if allowed {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "actor {} may not move project {} to {}",
                actor.id, project.id, target
            )))
        }
    }

    /// Delivery failures are logged and swallowed; the transition already
    /// committed.
    async fn notify_best_effort(&self, event: NotificationEvent) {
        if let Err(err) = self.gateway.notify(&event).await {
            tracing::warn!(
                project_id = %event.project_id(),
                error = %err,
                "notification delivery failed"
            );
        }
    }
}
