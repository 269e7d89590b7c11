//! Attachment Manager
//!
//! Validates uploads, content-addresses them into the blob store, and
//! records attachment metadata. Attaching never changes entity status;
//! callers request a transition separately if they want one.

use std::sync::Arc;

use neofab_attachments::{Attachment, ContentHash, NewAttachment};
use neofab_common::{Actor, Capability, CapabilityProvider, EngineConfig, EntityRef, Error, Result};
use neofab_projects::Project;
use neofab_store::{BlobStore, EntityStore, WriteBatch};

/// Upload handling for projects and print jobs
#[derive(Clone)]
pub struct AttachmentManager {
    store: Arc<dyn EntityStore>,
    blobs: Arc<dyn BlobStore>,
    capabilities: Arc<dyn CapabilityProvider>,
    config: EngineConfig,
}

impl AttachmentManager {
    pub fn new(
        store: Arc<dyn EntityStore>,
        blobs: Arc<dyn BlobStore>,
        capabilities: Arc<dyn CapabilityProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            capabilities,
            config,
        }
    }

    /// Store an upload and its metadata record
    ///
    /// Identical bytes are deduplicated: the blob is stored once and
    /// reference-counted, while each upload keeps its own metadata record.
    pub async fn attach(
        &self,
        owner: EntityRef,
        new: NewAttachment,
        bytes: &[u8],
        uploader: &Actor,
    ) -> Result<Attachment> {
        if !self
            .capabilities
            .has_capability(uploader, Capability::AttachFiles)
        {
            return Err(Error::Forbidden(format!(
                "actor {} may not upload attachments",
                uploader.id
            )));
        }

        let project = self.resolve_project(owner).await?;
        if !uploader.is_staff() && !project.is_owned_by(uploader.id) {
            return Err(Error::Forbidden(format!(
                "actor {} has no access to project {}",
                uploader.id, project.id
            )));
        }
        if project.is_terminal() {
            return Err(Error::Conflict(format!(
                "project {} is {} and no longer accepts uploads",
                project.id, project.status
            )));
        }

        let size = bytes.len() as u64;
        if size > self.config.max_upload_bytes {
            return Err(Error::TooLarge {
                size,
                max: self.config.max_upload_bytes,
            });
        }

        let hash = ContentHash::of(bytes);
        let attachment = Attachment::new(owner, new, hash.clone(), size as i64, uploader.id)?;

        let ref_count = self.blobs.put_if_absent(&hash, bytes).await?;
        if ref_count > 1 {
            tracing::debug!(
                hash = %hash,
                ref_count,
                "duplicate upload deduplicated against existing blob"
            );
        }

        self.store
            .commit(WriteBatch::new().append_attachment(attachment.clone()))
            .await?;

        tracing::info!(
            attachment_id = %attachment.id,
            owner = %owner,
            kind = %attachment.kind,
            size_bytes = attachment.size_bytes,
            "attachment recorded"
        );

        Ok(attachment)
    }

    /// Fetch the bytes behind an attachment
    pub async fn content(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        self.blobs
            .get(&attachment.content_hash)
            .await?
            .ok_or_else(|| {
                Error::StorageFailure(format!(
                    "blob {} missing for attachment {}",
                    attachment.content_hash, attachment.id
                ))
            })
    }

    /// Resolve the project an entity reference ultimately belongs to
    async fn resolve_project(&self, owner: EntityRef) -> Result<Project> {
        let project_id = match owner {
            EntityRef::Project(id) => id,
            EntityRef::PrintJob(id) => {
                let job = self
                    .store
                    .print_job(id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("print job {}", id)))?;
                job.project_id
            }
        };
        self.store
            .project(project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
    }
}
