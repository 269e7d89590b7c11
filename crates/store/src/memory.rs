//! In-memory storage backend
//!
//! Backs tests and embedded use. One mutex guards all records, which makes
//! `commit` trivially atomic: guards are checked for every op before any
//! mutation is applied.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use neofab_attachments::{Attachment, ContentHash};
use neofab_audit::StatusEvent;
use neofab_common::{EntityRef, Error, Result};
use neofab_conversations::{Message, ReadReceipt};
use neofab_jobs::PrintJob;
use neofab_projects::Project;

use crate::{BlobStore, EntityStore, ProjectFilter, WriteBatch, WriteOp};

#[derive(Debug, Default)]
struct MemoryInner {
    projects: HashMap<Uuid, Project>,
    print_jobs: HashMap<Uuid, PrintJob>,
    events: Vec<StatusEvent>,
    messages: Vec<Message>,
    attachments: Vec<Attachment>,
    read_receipts: HashMap<(Uuid, Uuid), ReadReceipt>,
    ledger_seq: HashMap<Uuid, i64>,
}

/// In-memory entity store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(inner: &MemoryInner, ops: &[WriteOp]) -> Result<()> {
        for op in ops {
            match op {
                WriteOp::PutProject {
                    project,
                    expected_version,
                } => match expected_version {
                    None => {
                        if inner.projects.contains_key(&project.id) {
                            return Err(Error::Conflict(format!(
                                "project {} already exists",
                                project.id
                            )));
                        }
                    }
                    Some(expected) => match inner.projects.get(&project.id) {
                        None => {
                            return Err(Error::NotFound(format!("project {}", project.id)));
                        }
                        Some(stored) if stored.version != *expected => {
                            return Err(Error::Conflict(format!(
                                "project {} version is {}, expected {}",
                                project.id, stored.version, expected
                            )));
                        }
                        Some(_) => {}
                    },
                },
                WriteOp::PutPrintJob {
                    job,
                    expected_version,
                } => match expected_version {
                    None => {
                        if inner.print_jobs.contains_key(&job.id) {
                            return Err(Error::Conflict(format!(
                                "print job {} already exists",
                                job.id
                            )));
                        }
                    }
                    Some(expected) => match inner.print_jobs.get(&job.id) {
                        None => {
                            return Err(Error::NotFound(format!("print job {}", job.id)));
                        }
                        Some(stored) if stored.version != *expected => {
                            return Err(Error::Conflict(format!(
                                "print job {} version is {}, expected {}",
                                job.id, stored.version, expected
                            )));
                        }
                        Some(_) => {}
                    },
                },
                // Appends and receipt upserts carry no guards
                WriteOp::AppendEvent(_)
                | WriteOp::AppendMessage(_)
                | WriteOp::AppendAttachment(_)
                | WriteOp::PutReadReceipt(_) => {}
            }
        }
        Ok(())
    }

    fn next_sequence(inner: &mut MemoryInner, project_id: Uuid) -> i64 {
        let seq = inner.ledger_seq.entry(project_id).or_insert(0);
        *seq += 1;
        *seq
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn project(&self, id: Uuid) -> Result<Option<Project>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.projects.get(&id).cloned())
    }

    async fn print_job(&self, id: Uuid) -> Result<Option<PrintJob>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.print_jobs.get(&id).cloned())
    }

    async fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let inner = self.inner.lock().unwrap();
        let mut projects: Vec<Project> = inner
            .projects
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn print_jobs_for_project(&self, project_id: Uuid) -> Result<Vec<PrintJob>> {
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<PrintJob> = inner
            .print_jobs
            .values()
            .filter(|j| j.project_id == project_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn events_for_project(&self, project_id: Uuid) -> Result<Vec<StatusEvent>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<StatusEvent> = inner
            .events
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    async fn events_for_subject(&self, subject: EntityRef) -> Result<Vec<StatusEvent>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<StatusEvent> = inner
            .events
            .iter()
            .filter(|e| e.subject == subject)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    async fn messages_for_project(&self, project_id: Uuid) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sequence);
        Ok(messages)
    }

    async fn attachments_for(&self, owner: EntityRef) -> Result<Vec<Attachment>> {
        let inner = self.inner.lock().unwrap();
        let mut attachments: Vec<Attachment> = inner
            .attachments
            .iter()
            .filter(|a| a.owner == owner)
            .cloned()
            .collect();
        attachments.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        Ok(attachments)
    }

    async fn read_receipt(&self, project_id: Uuid, user_id: Uuid) -> Result<Option<ReadReceipt>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.read_receipts.get(&(project_id, user_id)).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        // Check every guard before touching anything, so a failed batch
        // leaves the store exactly as it was.
        Self::validate(&inner, batch.ops())?;

        for op in batch.into_ops() {
            match op {
                WriteOp::PutProject {
                    mut project,
                    expected_version,
                } => {
                    if let Some(expected) = expected_version {
                        project.version = expected + 1;
                    }
                    inner.projects.insert(project.id, project);
                }
                WriteOp::PutPrintJob {
                    mut job,
                    expected_version,
                } => {
                    if let Some(expected) = expected_version {
                        job.version = expected + 1;
                    }
                    inner.print_jobs.insert(job.id, job);
                }
                WriteOp::AppendEvent(mut event) => {
                    event.sequence = Self::next_sequence(&mut inner, event.project_id);
                    inner.events.push(event);
                }
                WriteOp::AppendMessage(mut message) => {
                    message.sequence = Self::next_sequence(&mut inner, message.project_id);
                    inner.messages.push(message);
                }
                WriteOp::AppendAttachment(attachment) => {
                    inner.attachments.push(attachment);
                }
                WriteOp::PutReadReceipt(receipt) => {
                    inner
                        .read_receipts
                        .insert((receipt.project_id, receipt.user_id), receipt);
                }
            }
        }

        Ok(())
    }
}

/// In-memory content-addressed blob store
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, (Vec<u8>, u64)>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_if_absent(&self, hash: &ContentHash, bytes: &[u8]) -> Result<u64> {
        let mut blobs = self.blobs.lock().unwrap();
        let entry = blobs
            .entry(hash.as_str().to_string())
            .or_insert_with(|| (bytes.to_vec(), 0));
        entry.1 += 1;
        Ok(entry.1)
    }

    async fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.lock().unwrap();
        Ok(blobs.get(hash.as_str()).map(|(bytes, _)| bytes.clone()))
    }

    async fn ref_count(&self, hash: &ContentHash) -> Result<u64> {
        let blobs = self.blobs.lock().unwrap();
        Ok(blobs.get(hash.as_str()).map(|(_, count)| *count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neofab_projects::{NewProject, ProjectStatus};

    fn sample_project(owner_id: Uuid) -> Project {
        Project::new(
            owner_id,
            NewProject {
                title: "Test print".to_string(),
                description: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_fetch_project() {
        let store = MemoryStore::new();
        let project = sample_project(Uuid::new_v4());
        let id = project.id;

        store
            .commit(WriteBatch::new().put_project(project.clone(), None))
            .await
            .unwrap();

        let fetched = store.project(id).await.unwrap().unwrap();
        assert_eq!(fetched, project);
        assert!(store.project(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        let project = sample_project(Uuid::new_v4());

        store
            .commit(WriteBatch::new().put_project(project.clone(), None))
            .await
            .unwrap();
        let result = store
            .commit(WriteBatch::new().put_project(project, None))
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_version_guard_detects_stale_writer() {
        let store = MemoryStore::new();
        let project = sample_project(Uuid::new_v4());
        let id = project.id;
        store
            .commit(WriteBatch::new().put_project(project, None))
            .await
            .unwrap();

        // Two writers read version 1
        let mut first = store.project(id).await.unwrap().unwrap();
        let mut second = store.project(id).await.unwrap().unwrap();

        first.apply_transition(ProjectStatus::UnderReview).unwrap();
        store
            .commit(WriteBatch::new().put_project(first, Some(1)))
            .await
            .unwrap();

        // The slower writer's guard no longer holds
        second.apply_transition(ProjectStatus::Cancelled).unwrap();
        let result = store
            .commit(WriteBatch::new().put_project(second, Some(1)))
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));

        // The winning write bumped the version
        let stored = store.project(id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.status, ProjectStatus::UnderReview);
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let store = MemoryStore::new();
        let project = sample_project(Uuid::new_v4());
        let id = project.id;
        store
            .commit(WriteBatch::new().put_project(project.clone(), None))
            .await
            .unwrap();

        // Batch: a valid message append plus a stale project put
        let message = Message::new_user(id, Uuid::new_v4(), "hi".to_string()).unwrap();
        let mut stale = project.clone();
        stale.apply_transition(ProjectStatus::UnderReview).unwrap();
        let result = store
            .commit(
                WriteBatch::new()
                    .append_message(message)
                    .put_project(stale, Some(99)),
            )
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));

        // The message must not have leaked through
        assert!(store.messages_for_project(id).await.unwrap().is_empty());
        let stored = store.project(id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::Submitted);
    }

    #[tokio::test]
    async fn test_ledger_sequence_spans_events_and_messages() {
        let store = MemoryStore::new();
        let project = sample_project(Uuid::new_v4());
        let id = project.id;
        store
            .commit(WriteBatch::new().put_project(project, None))
            .await
            .unwrap();

        let event = StatusEvent::new(
            id,
            EntityRef::Project(id),
            neofab_audit::StatusChange::Project {
                from: ProjectStatus::Submitted,
                to: ProjectStatus::UnderReview,
            },
            Uuid::new_v4(),
            None,
        );
        let message = Message::new_user(id, Uuid::new_v4(), "first".to_string()).unwrap();

        store
            .commit(
                WriteBatch::new()
                    .append_event(event)
                    .append_message(message),
            )
            .await
            .unwrap();

        let events = store.events_for_project(id).await.unwrap();
        let messages = store.messages_for_project(id).await.unwrap();
        assert_eq!(events[0].sequence, 1);
        assert_eq!(messages[0].sequence, 2);
    }

    #[tokio::test]
    async fn test_project_filters() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mine = sample_project(owner);
        let theirs = sample_project(other);
        store
            .commit(
                WriteBatch::new()
                    .put_project(mine.clone(), None)
                    .put_project(theirs, None),
            )
            .await
            .unwrap();

        let owned = store.projects(&ProjectFilter::owned_by(owner)).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, mine.id);

        let submitted = store
            .projects(&ProjectFilter::with_status(ProjectStatus::Submitted))
            .await
            .unwrap();
        assert_eq!(submitted.len(), 2);

        let none = store
            .projects(&ProjectFilter::with_status(ProjectStatus::Approved))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_read_receipt_upsert() {
        let store = MemoryStore::new();
        let project_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let first = ReadReceipt::now(project_id, user_id);
        store
            .commit(WriteBatch::new().put_read_receipt(first.clone()))
            .await
            .unwrap();

        let second = ReadReceipt::now(project_id, user_id);
        store
            .commit(WriteBatch::new().put_read_receipt(second.clone()))
            .await
            .unwrap();

        let stored = store.read_receipt(project_id, user_id).await.unwrap().unwrap();
        assert_eq!(stored.last_read_at, second.last_read_at);
    }

    #[tokio::test]
    async fn test_blob_refcount() {
        let blobs = MemoryBlobStore::new();
        let hash = ContentHash::of(b"duplicate bytes");

        assert_eq!(blobs.ref_count(&hash).await.unwrap(), 0);
        assert_eq!(blobs.put_if_absent(&hash, b"duplicate bytes").await.unwrap(), 1);
        assert_eq!(blobs.put_if_absent(&hash, b"duplicate bytes").await.unwrap(), 2);
        assert_eq!(blobs.ref_count(&hash).await.unwrap(), 2);

        let stored = blobs.get(&hash).await.unwrap().unwrap();
        assert_eq!(stored, b"duplicate bytes");
        assert!(blobs.get(&ContentHash::of(b"absent")).await.unwrap().is_none());
    }
}
