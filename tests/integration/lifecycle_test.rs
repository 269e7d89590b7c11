//! End-to-end lifecycle scenarios over the in-memory backends

use std::sync::Arc;

use tokio_stream::StreamExt;
use uuid::Uuid;

use neofab_attachments::{AttachmentKind, NewAttachment};
use neofab_audit::TimelineEntry;
use neofab_common::{Actor, EntityRef, Error};
use neofab_engine::Engine;
use neofab_jobs::{JobAssignment, NewPrintJob, PrintJobStatus};
use neofab_notify::{mock::MockGateway, NotificationEvent};
use neofab_projects::{NewProject, ProjectStatus};
use neofab_store::{BlobStore, EntityStore, MemoryBlobStore, MemoryStore, ProjectFilter};

struct Harness {
    engine: Engine,
    store: Arc<MemoryStore>,
    blobs: Arc<MemoryBlobStore>,
    gateway: MockGateway,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let gateway = MockGateway::new();
    let engine = Engine::with_defaults(store.clone(), blobs.clone(), Arc::new(gateway.clone()));
    Harness {
        engine,
        store,
        blobs,
        gateway,
    }
}

fn new_project(title: &str) -> NewProject {
    NewProject {
        title: title.to_string(),
        description: Some("integration scenario".to_string()),
    }
}

fn model_upload(name: &str) -> NewAttachment {
    NewAttachment {
        kind: AttachmentKind::Model,
        original_name: name.to_string(),
        note: None,
        quantity: 1,
    }
}

/// Confirm the denormalized status equals the latest ledger event for the
/// given entity
async fn assert_status_matches_ledger(store: &MemoryStore, subject: EntityRef, expected: &str) {
    let events = store.events_for_subject(subject).await.unwrap();
    let latest = events.last().expect("entity should have events");
    assert_eq!(latest.change.to_label(), expected);
}

#[test_log::test(tokio::test)]
async fn test_full_project_lifecycle() {
    let h = harness();
    let owner = Actor::user(Uuid::new_v4());
    let staff = Actor::staff(Uuid::new_v4());

    // Submit: initial status is fixed, staff get a hint
    let project = h
        .engine
        .submit_project(&owner, new_project("Lamp housing"))
        .await
        .unwrap();
    assert_eq!(project.status, ProjectStatus::Submitted);
    assert!(matches!(
        h.gateway.events_for_project(project.id)[0],
        NotificationEvent::ProjectSubmitted { .. }
    ));

    // Review pipeline
    let (project, _) = h
        .engine
        .request_project_transition(project.id, ProjectStatus::UnderReview, &staff, None)
        .await
        .unwrap();
    assert_eq!(project.status, ProjectStatus::UnderReview);

    let (project, approve_event) = h
        .engine
        .request_project_transition(project.id, ProjectStatus::Approved, &staff, None)
        .await
        .unwrap();
    assert_eq!(project.status, ProjectStatus::Approved);

    // The approval posted a system message referencing its event
    let snapshot = h.engine.audit_snapshot(project.id).await.unwrap();
    let approval_message = snapshot
        .timeline
        .iter()
        .find_map(|entry| match entry {
            TimelineEntry::Message(m) if m.status_event_id == Some(approve_event) => Some(m),
            _ => None,
        })
        .expect("approval should post a system message");
    assert_eq!(approval_message.body, "Project approved");
    assert!(approval_message.author.is_system());

    // Attach the model; status must not move
    let attachment = h
        .engine
        .attach(
            EntityRef::Project(project.id),
            model_upload("model.stl"),
            b"solid lamp_housing",
            &owner,
        )
        .await
        .unwrap();
    assert_eq!(attachment.kind, AttachmentKind::Model);
    assert_eq!(
        h.engine.project(project.id).await.unwrap().status,
        ProjectStatus::Approved
    );

    // Schedule a print job
    let job = h
        .engine
        .create_print_job(project.id, NewPrintJob::default(), &staff)
        .await
        .unwrap();
    assert_eq!(job.status, PrintJobStatus::Queued);

    h.engine
        .assign_print_job(
            job.id,
            JobAssignment {
                printer_id: Some(Uuid::new_v4()),
                material_id: Some(Uuid::new_v4()),
                color_id: Some(Uuid::new_v4()),
            },
            &staff,
        )
        .await
        .unwrap();

    let (job, _) = h
        .engine
        .request_job_transition(job.id, PrintJobStatus::Scheduled, &staff, None)
        .await
        .unwrap();
    let (job, _) = h
        .engine
        .request_job_transition(job.id, PrintJobStatus::Printing, &staff, None)
        .await
        .unwrap();
    let (job, _) = h
        .engine
        .request_job_transition(job.id, PrintJobStatus::Done, &staff, None)
        .await
        .unwrap();
    assert_eq!(job.status, PrintJobStatus::Done);

    // Wrap up the project
    let (project, _) = h
        .engine
        .request_project_transition(project.id, ProjectStatus::InProduction, &staff, None)
        .await
        .unwrap();
    let (project, _) = h
        .engine
        .request_project_transition(project.id, ProjectStatus::Completed, &staff, None)
        .await
        .unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);

    // Current status always equals the latest ledger event
    assert_status_matches_ledger(&h.store, EntityRef::Project(project.id), "completed").await;
    assert_status_matches_ledger(&h.store, EntityRef::PrintJob(job.id), "done").await;

    // The audit snapshot ties the whole tree together
    let snapshot = h.engine.audit_snapshot(project.id).await.unwrap();
    assert_eq!(snapshot.project.status, ProjectStatus::Completed);
    assert_eq!(snapshot.print_jobs.len(), 1);
    assert_eq!(snapshot.attachments.len(), 1);
    // 4 project transitions + 3 job transitions as events, 4 system messages
    let (events, messages): (Vec<_>, Vec<_>) = snapshot
        .timeline
        .iter()
        .partition(|e| matches!(e, TimelineEntry::Status(_)));
    assert_eq!(events.len(), 7);
    assert_eq!(messages.len(), 4);

    // Owner/status filters see the finished project
    let completed = h
        .engine
        .projects(&ProjectFilter::with_status(ProjectStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    let owned = h
        .engine
        .projects(&ProjectFilter::owned_by(owner.id))
        .await
        .unwrap();
    assert_eq!(owned.len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_scheduling_gated_on_project_status() {
    let h = harness();
    let staff = Actor::staff(Uuid::new_v4());

    // No job can even be created before approval
    let project = h
        .engine
        .submit_project(&staff, new_project("Too early"))
        .await
        .unwrap();
    let result = h
        .engine
        .create_print_job(project.id, NewPrintJob::default(), &staff)
        .await;
    assert!(matches!(result, Err(Error::IllegalTransition(_))));

    // Approve, create, assign — then knock the project out of production
    h.engine
        .request_project_transition(project.id, ProjectStatus::UnderReview, &staff, None)
        .await
        .unwrap();
    h.engine
        .request_project_transition(project.id, ProjectStatus::Approved, &staff, None)
        .await
        .unwrap();
    let job = h
        .engine
        .create_print_job(project.id, NewPrintJob::default(), &staff)
        .await
        .unwrap();
    h.engine
        .assign_print_job(
            job.id,
            JobAssignment {
                printer_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
            &staff,
        )
        .await
        .unwrap();
    h.engine
        .request_project_transition(project.id, ProjectStatus::Cancelled, &staff, None)
        .await
        .unwrap();

    // Queued -> Scheduled now violates the owning-project guard
    let result = h
        .engine
        .request_job_transition(job.id, PrintJobStatus::Scheduled, &staff, None)
        .await;
    assert!(matches!(result, Err(Error::IllegalTransition(_))));
    assert_eq!(
        h.engine.print_job(job.id).await.unwrap().status,
        PrintJobStatus::Queued
    );
}

#[test_log::test(tokio::test)]
async fn test_duplicate_upload_is_deduplicated() {
    let h = harness();
    let owner = Actor::user(Uuid::new_v4());
    let project = h
        .engine
        .submit_project(&owner, new_project("Dedup"))
        .await
        .unwrap();
    let entity = EntityRef::Project(project.id);

    let first = h
        .engine
        .attach(entity, model_upload("left.stl"), b"identical geometry", &owner)
        .await
        .unwrap();
    let second = h
        .engine
        .attach(entity, model_upload("right.stl"), b"identical geometry", &owner)
        .await
        .unwrap();

    // Two metadata records, one blob with reference count 2
    assert_ne!(first.id, second.id);
    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(h.blobs.ref_count(&first.content_hash).await.unwrap(), 2);
    assert_eq!(h.engine.attachments_for(entity).await.unwrap().len(), 2);

    let bytes = h.engine.attachment_content(&second).await.unwrap();
    assert_eq!(bytes, b"identical geometry");
}

#[test_log::test(tokio::test)]
async fn test_rejected_project_is_terminal() {
    let h = harness();
    let owner = Actor::user(Uuid::new_v4());
    let staff = Actor::staff(Uuid::new_v4());

    let project = h
        .engine
        .submit_project(&owner, new_project("Unprintable"))
        .await
        .unwrap();
    h.engine
        .request_project_transition(
            project.id,
            ProjectStatus::Rejected,
            &staff,
            Some("unsupported overhangs".to_string()),
        )
        .await
        .unwrap();

    // Nothing moves a rejected project
    for target in [
        ProjectStatus::UnderReview,
        ProjectStatus::Approved,
        ProjectStatus::Cancelled,
    ] {
        let result = h
            .engine
            .request_project_transition(project.id, target, &staff, None)
            .await;
        assert!(matches!(result, Err(Error::IllegalTransition(_))));
    }

    // The recorded reason survives on the ledger
    let events = h
        .store
        .events_for_subject(EntityRef::Project(project.id))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason.as_deref(), Some("unsupported overhangs"));
}

#[test_log::test(tokio::test)]
async fn test_thread_and_read_receipts() {
    let h = harness();
    let owner = Actor::user(Uuid::new_v4());
    let staff = Actor::staff(Uuid::new_v4());

    let project = h
        .engine
        .submit_project(&owner, new_project("Chatty"))
        .await
        .unwrap();

    h.engine
        .post_message(project.id, &owner, "Please use black PLA".to_string())
        .await
        .unwrap();
    h.engine
        .request_project_transition(project.id, ProjectStatus::UnderReview, &staff, None)
        .await
        .unwrap();
    h.engine
        .post_message(project.id, &staff, "Will do".to_string())
        .await
        .unwrap();

    // The owner has one unread human reply plus one system message
    assert_eq!(h.engine.unread_count(project.id, &owner).await.unwrap(), 2);
    h.engine.mark_read(project.id, &owner).await.unwrap();
    assert_eq!(h.engine.unread_count(project.id, &owner).await.unwrap(), 0);

    // Timeline interleaves the transition between the two user messages
    let entries: Vec<TimelineEntry> = h
        .engine
        .timeline(project.id)
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(entries.len(), 4);
    let sequences: Vec<i64> = entries.iter().map(|e| e.sequence()).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
}
