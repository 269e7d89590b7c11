//! Messaging Thread
//!
//! One append-only conversation per project: free-form user messages plus
//! the system messages the status engine posts on transitions. Also owns
//! the merged timeline and per-user read receipts.

use std::sync::Arc;

use futures_core::Stream;
use uuid::Uuid;

use neofab_audit::TimelineEntry;
use neofab_common::{Actor, Capability, CapabilityProvider, Error, Result};
use neofab_conversations::{Message, ReadReceipt};
use neofab_store::{EntityStore, WriteBatch};

/// Collect the merged, ordered timeline entries for a project
///
/// Shared by `MessagingThread::timeline` and the audit reader.
pub(crate) async fn collect_entries(
    store: &Arc<dyn EntityStore>,
    project_id: Uuid,
) -> Result<Vec<TimelineEntry>> {
    let events = store.events_for_project(project_id).await?;
    let messages = store.messages_for_project(project_id).await?;

    let mut entries: Vec<TimelineEntry> = events
        .into_iter()
        .map(TimelineEntry::Status)
        .chain(messages.into_iter().map(TimelineEntry::Message))
        .collect();
    entries.sort_by_key(|entry| entry.sort_key());
    Ok(entries)
}

/// The per-project conversation thread
#[derive(Clone)]
pub struct MessagingThread {
    store: Arc<dyn EntityStore>,
    capabilities: Arc<dyn CapabilityProvider>,
}

impl MessagingThread {
    pub fn new(store: Arc<dyn EntityStore>, capabilities: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            store,
            capabilities,
        }
    }

    /// Append a user message to a project thread
    pub async fn post_message(
        &self,
        project_id: Uuid,
        actor: &Actor,
        body: String,
    ) -> Result<Message> {
        let project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;

        if !self
            .capabilities
            .has_capability(actor, Capability::PostMessages)
        {
            return Err(Error::Forbidden(format!(
                "actor {} may not post messages",
                actor.id
            )));
        }
        if !actor.is_staff() && !project.is_owned_by(actor.id) {
            return Err(Error::Forbidden(format!(
                "actor {} has no access to project {}",
                actor.id, project.id
            )));
        }

        let message = Message::new_user(project_id, actor.id, body)?;
        self.store
            .commit(WriteBatch::new().append_message(message.clone()))
            .await?;

        // Re-read to pick up the store-assigned ledger sequence
        let stored = self
            .store
            .messages_for_project(project_id)
            .await?
            .into_iter()
            .find(|m| m.id == message.id)
            .ok_or_else(|| {
                Error::StorageFailure(format!("message {} vanished after commit", message.id))
            })?;

        tracing::debug!(project_id = %project_id, message_id = %stored.id, "message posted");
        Ok(stored)
    }

    /// Record that the user has read the thread as of now
    pub async fn mark_read(&self, project_id: Uuid, actor: &Actor) -> Result<()> {
        if self.store.project(project_id).await?.is_none() {
            return Err(Error::NotFound(format!("project {}", project_id)));
        }

        self.store
            .commit(WriteBatch::new().put_read_receipt(ReadReceipt::now(project_id, actor.id)))
            .await
    }

    /// Count thread messages the user has not seen yet
    ///
    /// A user's own messages never count as unread.
    pub async fn unread_count(&self, project_id: Uuid, actor: &Actor) -> Result<usize> {
        if self.store.project(project_id).await?.is_none() {
            return Err(Error::NotFound(format!("project {}", project_id)));
        }

        let receipt = self.store.read_receipt(project_id, actor.id).await?;
        let messages = self.store.messages_for_project(project_id).await?;

        let count = messages
            .iter()
            .filter(|m| m.author.user_id() != Some(actor.id))
            .filter(|m| match &receipt {
                Some(receipt) => m.created_at > receipt.last_read_at,
                None => true,
            })
            .count();
        Ok(count)
    }

    /// The merged project timeline as a finite, restartable stream
    ///
    /// Entries are strictly ordered by timestamp, with ledger sequence
    /// breaking ties. Each call takes a fresh snapshot; no side effects.
    pub async fn timeline(
        &self,
        project_id: Uuid,
    ) -> Result<impl Stream<Item = TimelineEntry> + Send + 'static> {
        if self.store.project(project_id).await?.is_none() {
            return Err(Error::NotFound(format!("project {}", project_id)));
        }

        let entries = collect_entries(&self.store, project_id).await?;
        Ok(async_stream::stream! {
            for entry in entries {
                yield entry;
            }
        })
    }
}
