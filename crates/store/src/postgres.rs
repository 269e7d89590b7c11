//! Postgres storage backend
//!
//! Optimistic concurrency: mutable rows carry a `version` column and every
//! guarded update runs `… WHERE id = $1 AND version = $2`. Zero affected
//! rows rolls the whole transaction back with `Conflict`. Ledger sequences
//! come from the owning project row (`ledger_seq`), bumped inside the same
//! transaction, which also serializes appends per project.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use neofab_attachments::{Attachment, AttachmentKind, ContentHash};
use neofab_audit::{StatusChange, StatusEvent};
use neofab_common::{EntityRef, Error, Result};
use neofab_conversations::{Message, MessageAuthor, ReadReceipt};
use neofab_jobs::PrintJob;
use neofab_projects::Project;

use crate::{BlobStore, EntityStore, ProjectFilter, WriteBatch, WriteOp};

/// Schema DDL applied by [`PostgresStore::ensure_schema`]
const SCHEMA: &str = include_str!("schema.sql");

const PROJECT_COLUMNS: &str =
    "id, owner_id, title, description, status, version, created_at, updated_at";

const PRINT_JOB_COLUMNS: &str = "id, project_id, status, priority, deadline, printer_id, \
     material_id, color_id, version, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, project_id, subject_kind, subject_id, previous_status, \
     new_status, actor_id, reason, sequence, recorded_at";

const MESSAGE_COLUMNS: &str =
    "id, project_id, author_id, body, status_event_id, sequence, created_at";

const ATTACHMENT_COLUMNS: &str = "id, owner_kind, owner_id, kind, original_name, content_hash, \
     size_bytes, note, quantity, uploaded_by, uploaded_at";

/// Parse a lowercase status label persisted as TEXT back into its enum
fn parse_status<T: DeserializeOwned>(label: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(label.to_string()))
        .map_err(|e| Error::StorageFailure(format!("corrupt status label '{}': {}", label, e)))
}

fn subject_columns(subject: EntityRef) -> (&'static str, Uuid) {
    match subject {
        EntityRef::Project(id) => ("project", id),
        EntityRef::PrintJob(id) => ("print_job", id),
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<StatusEvent> {
    let subject_kind: String = row.try_get("subject_kind")?;
    let subject_id: Uuid = row.try_get("subject_id")?;
    let previous: String = row.try_get("previous_status")?;
    let new: String = row.try_get("new_status")?;

    let (subject, change) = match subject_kind.as_str() {
        "project" => (
            EntityRef::Project(subject_id),
            StatusChange::Project {
                from: parse_status(&previous)?,
                to: parse_status(&new)?,
            },
        ),
        "print_job" => (
            EntityRef::PrintJob(subject_id),
            StatusChange::PrintJob {
                from: parse_status(&previous)?,
                to: parse_status(&new)?,
            },
        ),
        other => {
            return Err(Error::StorageFailure(format!(
                "corrupt subject kind '{}'",
                other
            )))
        }
    };

    Ok(StatusEvent {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        subject,
        change,
        actor_id: row.try_get("actor_id")?,
        reason: row.try_get("reason")?,
        sequence: row.try_get("sequence")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> Result<Message> {
    let author_id: Option<Uuid> = row.try_get("author_id")?;
    Ok(Message {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        author: match author_id {
            Some(id) => MessageAuthor::User(id),
            None => MessageAuthor::System,
        },
        body: row.try_get("body")?,
        status_event_id: row.try_get("status_event_id")?,
        sequence: row.try_get("sequence")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_attachment(row: &sqlx::postgres::PgRow) -> Result<Attachment> {
    let owner_kind: String = row.try_get("owner_kind")?;
    let owner_id: Uuid = row.try_get("owner_id")?;
    let owner = match owner_kind.as_str() {
        "project" => EntityRef::Project(owner_id),
        "print_job" => EntityRef::PrintJob(owner_id),
        other => {
            return Err(Error::StorageFailure(format!(
                "corrupt owner kind '{}'",
                other
            )))
        }
    };
    let kind: AttachmentKind = row.try_get("kind")?;
    let content_hash: String = row.try_get("content_hash")?;

    Ok(Attachment {
        id: row.try_get("id")?,
        owner,
        kind,
        original_name: row.try_get("original_name")?,
        content_hash: ContentHash::from_hex(content_hash),
        size_bytes: row.try_get("size_bytes")?,
        note: row.try_get("note")?,
        quantity: row.try_get("quantity")?,
        uploaded_by: row.try_get("uploaded_by")?,
        uploaded_at: row.try_get("uploaded_at")?,
    })
}

/// Map a unique-constraint violation to `Conflict`, everything else
/// through the shared conversion
fn map_insert_error(err: sqlx::Error, what: &str) -> Error {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return Error::Conflict(format!("{} already exists", what));
        }
    }
    err.into()
}

/// Postgres-backed entity store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a bounded acquire timeout
    pub async fn connect(database_url: &str, timeout_secs: u64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(timeout_secs))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the schema DDL; safe to call repeatedly
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn next_sequence_tx(
        tx: &mut Transaction<'_, Postgres>,
        project_id: Uuid,
    ) -> Result<i64> {
        let seq = sqlx::query_scalar::<_, i64>(
            "UPDATE projects SET ledger_seq = ledger_seq + 1 WHERE id = $1 RETURNING ledger_seq",
        )
        .bind(project_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;
        Ok(seq)
    }

    async fn apply_op(tx: &mut Transaction<'_, Postgres>, op: WriteOp) -> Result<()> {
        match op {
            WriteOp::PutProject {
                project,
                expected_version,
            } => match expected_version {
                None => {
                    let query = format!(
                        "INSERT INTO projects ({PROJECT_COLUMNS}, ledger_seq) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0)"
                    );
                    sqlx::query(&query)
                        .bind(project.id)
                        .bind(project.owner_id)
                        .bind(&project.title)
                        .bind(&project.description)
                        .bind(project.status)
                        .bind(project.version)
                        .bind(project.created_at)
                        .bind(project.updated_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(|e| map_insert_error(e, "project"))?;
                }
                Some(expected) => {
                    let result = sqlx::query(
                        "UPDATE projects SET title = $3, description = $4, status = $5, \
                         updated_at = $6, version = version + 1 \
                         WHERE id = $1 AND version = $2",
                    )
                    .bind(project.id)
                    .bind(expected)
                    .bind(&project.title)
                    .bind(&project.description)
                    .bind(project.status)
                    .bind(project.updated_at)
                    .execute(&mut **tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(Error::Conflict(format!(
                            "project {} changed concurrently",
                            project.id
                        )));
                    }
                }
            },
            WriteOp::PutPrintJob {
                job,
                expected_version,
            } => match expected_version {
                None => {
                    let query = format!(
                        "INSERT INTO print_jobs ({PRINT_JOB_COLUMNS}) \
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
                    );
                    sqlx::query(&query)
                        .bind(job.id)
                        .bind(job.project_id)
                        .bind(job.status)
                        .bind(job.priority)
                        .bind(job.deadline)
                        .bind(job.printer_id)
                        .bind(job.material_id)
                        .bind(job.color_id)
                        .bind(job.version)
                        .bind(job.created_at)
                        .bind(job.updated_at)
                        .execute(&mut **tx)
                        .await
                        .map_err(|e| map_insert_error(e, "print job"))?;
                }
                Some(expected) => {
                    let result = sqlx::query(
                        "UPDATE print_jobs SET status = $3, priority = $4, deadline = $5, \
                         printer_id = $6, material_id = $7, color_id = $8, updated_at = $9, \
                         version = version + 1 \
                         WHERE id = $1 AND version = $2",
                    )
                    .bind(job.id)
                    .bind(expected)
                    .bind(job.status)
                    .bind(job.priority)
                    .bind(job.deadline)
                    .bind(job.printer_id)
                    .bind(job.material_id)
                    .bind(job.color_id)
                    .bind(job.updated_at)
                    .execute(&mut **tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(Error::Conflict(format!(
                            "print job {} changed concurrently",
                            job.id
                        )));
                    }
                }
            },
            WriteOp::AppendEvent(event) => {
                let sequence = Self::next_sequence_tx(tx, event.project_id).await?;
                let (subject_kind, subject_id) = subject_columns(event.subject);
                let query = format!(
                    "INSERT INTO status_events ({EVENT_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
                );
                sqlx::query(&query)
                    .bind(event.id)
                    .bind(event.project_id)
                    .bind(subject_kind)
                    .bind(subject_id)
                    .bind(event.change.from_label())
                    .bind(event.change.to_label())
                    .bind(event.actor_id)
                    .bind(&event.reason)
                    .bind(sequence)
                    .bind(event.recorded_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_insert_error(e, "status event"))?;
            }
            WriteOp::AppendMessage(message) => {
                let sequence = Self::next_sequence_tx(tx, message.project_id).await?;
                let query = format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)"
                );
                sqlx::query(&query)
                    .bind(message.id)
                    .bind(message.project_id)
                    .bind(message.author.user_id())
                    .bind(&message.body)
                    .bind(message.status_event_id)
                    .bind(sequence)
                    .bind(message.created_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_insert_error(e, "message"))?;
            }
            WriteOp::AppendAttachment(attachment) => {
                let (owner_kind, owner_id) = subject_columns(attachment.owner);
                let query = format!(
                    "INSERT INTO attachments ({ATTACHMENT_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
                );
                sqlx::query(&query)
                    .bind(attachment.id)
                    .bind(owner_kind)
                    .bind(owner_id)
                    .bind(attachment.kind)
                    .bind(&attachment.original_name)
                    .bind(attachment.content_hash.as_str())
                    .bind(attachment.size_bytes)
                    .bind(&attachment.note)
                    .bind(attachment.quantity)
                    .bind(attachment.uploaded_by)
                    .bind(attachment.uploaded_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_insert_error(e, "attachment"))?;
            }
            WriteOp::PutReadReceipt(receipt) => {
                sqlx::query(
                    "INSERT INTO read_receipts (project_id, user_id, last_read_at) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (project_id, user_id) \
                     DO UPDATE SET last_read_at = EXCLUDED.last_read_at",
                )
                .bind(receipt.project_id)
                .bind(receipt.user_id)
                .bind(receipt.last_read_at)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for PostgresStore {
    async fn project(&self, id: Uuid) -> Result<Option<Project>> {
        let query = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1");
        let row = sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn print_job(&self, id: Uuid) -> Result<Option<PrintJob>> {
        let query = format!("SELECT {PRINT_JOB_COLUMNS} FROM print_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, PrintJob>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut builder = sqlx::QueryBuilder::<Postgres>::new(format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE TRUE"
        ));
        if let Some(owner_id) = filter.owner_id {
            builder.push(" AND owner_id = ");
            builder.push_bind(owner_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if let Some(after) = filter.created_after {
            builder.push(" AND created_at >= ");
            builder.push_bind(after);
        }
        if let Some(before) = filter.created_before {
            builder.push(" AND created_at <= ");
            builder.push_bind(before);
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build_query_as::<Project>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn print_jobs_for_project(&self, project_id: Uuid) -> Result<Vec<PrintJob>> {
        let query = format!(
            "SELECT {PRINT_JOB_COLUMNS} FROM print_jobs \
             WHERE project_id = $1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query_as::<_, PrintJob>(&query)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn events_for_project(&self, project_id: Uuid) -> Result<Vec<StatusEvent>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM status_events \
             WHERE project_id = $1 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&query)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_event).collect()
    }

    async fn events_for_subject(&self, subject: EntityRef) -> Result<Vec<StatusEvent>> {
        let (subject_kind, subject_id) = subject_columns(subject);
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM status_events \
             WHERE subject_kind = $1 AND subject_id = $2 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&query)
            .bind(subject_kind)
            .bind(subject_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_event).collect()
    }

    async fn messages_for_project(&self, project_id: Uuid) -> Result<Vec<Message>> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE project_id = $1 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&query)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_message).collect()
    }

    async fn attachments_for(&self, owner: EntityRef) -> Result<Vec<Attachment>> {
        let (owner_kind, owner_id) = subject_columns(owner);
        let query = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments \
             WHERE owner_kind = $1 AND owner_id = $2 ORDER BY uploaded_at ASC"
        );
        let rows = sqlx::query(&query)
            .bind(owner_kind)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_attachment).collect()
    }

    async fn read_receipt(&self, project_id: Uuid, user_id: Uuid) -> Result<Option<ReadReceipt>> {
        let row = sqlx::query_as::<_, ReadReceipt>(
            "SELECT project_id, user_id, last_read_at FROM read_receipts \
             WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for op in batch.into_ops() {
            // An error drops the transaction, rolling everything back
            Self::apply_op(&mut tx, op).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Postgres-backed content-addressed blob store
#[derive(Clone)]
pub struct PostgresBlobStore {
    pool: PgPool,
}

impl PostgresBlobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlobStore for PostgresBlobStore {
    async fn put_if_absent(&self, hash: &ContentHash, bytes: &[u8]) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "INSERT INTO blobs (content_hash, bytes, size_bytes, ref_count, created_at) \
             VALUES ($1, $2, $3, 1, NOW()) \
             ON CONFLICT (content_hash) \
             DO UPDATE SET ref_count = blobs.ref_count + 1 \
             RETURNING ref_count",
        )
        .bind(hash.as_str())
        .bind(bytes)
        .bind(bytes.len() as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>> {
        let bytes = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT bytes FROM blobs WHERE content_hash = $1",
        )
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(bytes)
    }

    async fn ref_count(&self, hash: &ContentHash) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT ref_count FROM blobs WHERE content_hash = $1",
        )
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0) as u64)
    }
}
