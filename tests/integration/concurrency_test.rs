//! Concurrency scenarios: racing transitions and concurrent uploads

use std::sync::Arc;

use uuid::Uuid;

use neofab_attachments::{AttachmentKind, NewAttachment};
use neofab_audit::{StatusChange, StatusEvent};
use neofab_common::{Actor, EntityRef, Error};
use neofab_engine::Engine;
use neofab_notify::mock::MockGateway;
use neofab_projects::{NewProject, ProjectStatus};
use neofab_store::{BlobStore, EntityStore, MemoryBlobStore, MemoryStore, WriteBatch};

fn harness() -> (Engine, Arc<MemoryStore>, Arc<MemoryBlobStore>) {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let engine = Engine::with_defaults(store.clone(), blobs.clone(), Arc::new(MockGateway::new()));
    (engine, store, blobs)
}

async fn project_under_review(engine: &Engine, staff: &Actor) -> Uuid {
    let project = engine
        .submit_project(
            staff,
            NewProject {
                title: "Contested".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    engine
        .request_project_transition(project.id, ProjectStatus::UnderReview, staff, None)
        .await
        .unwrap();
    project.id
}

/// Two writers read the same version and race Approve against Reject:
/// the store's version guard lets exactly one commit through.
#[test_log::test(tokio::test)]
async fn test_approve_reject_race_one_conflict() {
    let (engine, store, _) = harness();
    let staff = Actor::staff(Uuid::new_v4());
    let project_id = project_under_review(&engine, &staff).await;

    // Both sides read the entity at the same version, exactly like two
    // request_transition calls pausing between read and write
    let mut approving = store.project(project_id).await.unwrap().unwrap();
    let mut rejecting = store.project(project_id).await.unwrap().unwrap();
    assert_eq!(approving.version, rejecting.version);
    let expected = approving.version;

    let previous = approving.apply_transition(ProjectStatus::Approved).unwrap();
    let approve_event = StatusEvent::new(
        project_id,
        EntityRef::Project(project_id),
        StatusChange::Project {
            from: previous,
            to: ProjectStatus::Approved,
        },
        staff.id,
        None,
    );
    store
        .commit(
            WriteBatch::new()
                .put_project(approving, Some(expected))
                .append_event(approve_event),
        )
        .await
        .unwrap();

    let previous = rejecting.apply_transition(ProjectStatus::Rejected).unwrap();
    let reject_event = StatusEvent::new(
        project_id,
        EntityRef::Project(project_id),
        StatusChange::Project {
            from: previous,
            to: ProjectStatus::Rejected,
        },
        staff.id,
        None,
    );
    let result = store
        .commit(
            WriteBatch::new()
                .put_project(rejecting, Some(expected))
                .append_event(reject_event),
        )
        .await;
    assert!(matches!(result, Err(Error::Conflict(_))));

    // Only the winner's write and event exist
    let stored = store.project(project_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ProjectStatus::Approved);
    let events = store
        .events_for_subject(EntityRef::Project(project_id))
        .await
        .unwrap();
    assert_eq!(events.last().unwrap().change.to_label(), "approved");
    assert_eq!(events.len(), 2); // under_review + approved, no rejection
}

/// The same race through the engine's public API: exactly one caller
/// succeeds, the final status is the winner's target, and only one
/// decision lands on the ledger.
#[test_log::test(tokio::test)]
async fn test_concurrent_engine_transitions() {
    let (engine, store, _) = harness();
    let staff = Actor::staff(Uuid::new_v4());
    let project_id = project_under_review(&engine, &staff).await;

    let approve = engine.request_project_transition(
        project_id,
        ProjectStatus::Approved,
        &staff,
        None,
    );
    let reject = engine.request_project_transition(
        project_id,
        ProjectStatus::Rejected,
        &staff,
        None,
    );
    let (approve_result, reject_result) = tokio::join!(approve, reject);

    let successes = [approve_result.is_ok(), reject_result.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1, "exactly one racing transition may win");

    // The loser saw either the version conflict or the winner's new state
    for result in [&approve_result, &reject_result] {
        if let Err(err) = result {
            assert!(matches!(
                err,
                Error::Conflict(_) | Error::IllegalTransition(_)
            ));
        }
    }

    // Ledger and cache agree, with exactly one decision event
    let stored = store.project(project_id).await.unwrap().unwrap();
    assert!(stored.status == ProjectStatus::Approved || stored.status == ProjectStatus::Rejected);
    let events = store
        .events_for_subject(EntityRef::Project(project_id))
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events.last().unwrap().change.to_label(), stored.status.to_string());
}

/// Concurrent identical uploads must end up with one blob and an exact
/// reference count.
#[test_log::test(tokio::test)]
async fn test_concurrent_identical_uploads() {
    let (engine, _, blobs) = harness();
    let owner = Actor::user(Uuid::new_v4());
    let project = engine
        .submit_project(
            &owner,
            NewProject {
                title: "Parallel uploads".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    let entity = EntityRef::Project(project.id);

    let upload = |name: &str| {
        engine.attach(
            entity,
            NewAttachment {
                kind: AttachmentKind::Model,
                original_name: name.to_string(),
                note: None,
                quantity: 1,
            },
            b"concurrent bytes",
            &owner,
        )
    };

    let (a, b) = tokio::join!(upload("a.stl"), upload("b.stl"));
    let a = a.unwrap();
    let b = b.unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(blobs.ref_count(&a.content_hash).await.unwrap(), 2);
    assert_eq!(engine.attachments_for(entity).await.unwrap().len(), 2);
}
