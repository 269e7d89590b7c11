//! Domain entities for the Attachments domain
//!
//! Attachments are immutable metadata records pointing at content-addressed
//! blobs. Two uploads with identical bytes share one blob but keep separate
//! metadata records, so per-upload context (uploader, note, quantity) is
//! preserved for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use uuid::Uuid;

use neofab_common::{EntityRef, Error, Result};

/// Characters allowed to survive filename sanitization
static FILENAME_SAFE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[^A-Za-z0-9._-]+").expect("filename regex is valid"));

/// Attachment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attachment_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Model,
    Gcode,
    Other,
}

impl AttachmentKind {
    /// Allowed filename extensions for this kind
    ///
    /// `Other` accepts anything; model and G-code files are restricted to
    /// the formats the print shop can actually use.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            AttachmentKind::Model => &["stl", "3mf"],
            AttachmentKind::Gcode => &["gcode", "gco", "gc"],
            AttachmentKind::Other => &[],
        }
    }

    /// Check a filename extension against this kind's policy
    pub fn accepts_extension(&self, extension: &str) -> bool {
        let allowed = self.allowed_extensions();
        allowed.is_empty() || allowed.contains(&extension.to_ascii_lowercase().as_str())
    }
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentKind::Model => write!(f, "model"),
            AttachmentKind::Gcode => write!(f, "gcode"),
            AttachmentKind::Other => write!(f, "other"),
        }
    }
}

/// SHA-256 content hash, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash the given bytes
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        ContentHash(hex::encode(digest))
    }

    /// Wrap an already-computed hex digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        ContentHash(hex.into())
    }

    /// Get the hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce an uploaded filename to a safe form, mirroring what the upload
/// handlers of the original service did before writing to disk.
pub fn sanitize_filename(name: &str) -> String {
    let trimmed = name.trim().trim_start_matches('.');
    let flat = trimmed.rsplit(['/', '\\']).next().unwrap_or("");
    let safe = FILENAME_SAFE.replace_all(flat, "_");
    safe.trim_matches('_').to_string()
}

/// Parameters for creating an attachment
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub kind: AttachmentKind,
    pub original_name: String,
    pub note: Option<String>,
    pub quantity: i32,
}

impl Default for NewAttachment {
    fn default() -> Self {
        Self {
            kind: AttachmentKind::Other,
            original_name: String::new(),
            note: None,
            quantity: 1,
        }
    }
}

/// Attachment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub owner: EntityRef,
    pub kind: AttachmentKind,
    pub original_name: String,
    pub content_hash: ContentHash,
    pub size_bytes: i64,
    pub note: Option<String>,
    pub quantity: i32,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

impl Attachment {
    /// Create a new attachment record for already-hashed content
    pub fn new(
        owner: EntityRef,
        new: NewAttachment,
        content_hash: ContentHash,
        size_bytes: i64,
        uploaded_by: Uuid,
    ) -> Result<Self> {
        let original_name = sanitize_filename(&new.original_name);
        if original_name.is_empty() {
            return Err(Error::Empty("attachment filename is required".to_string()));
        }

        let extension = original_name.rsplit('.').next().unwrap_or("");
        if !new.kind.accepts_extension(extension) {
            return Err(Error::UnsupportedKind(format!(
                "'{}' files are not accepted as {} attachments",
                extension, new.kind
            )));
        }

        if new.quantity < 1 {
            return Err(Error::Empty(
                "attachment quantity must be at least 1".to_string(),
            ));
        }

        Ok(Attachment {
            id: Uuid::new_v4(),
            owner,
            kind: new.kind,
            original_name,
            content_hash,
            size_bytes,
            note: new.note,
            quantity: new.quantity,
            uploaded_by,
            uploaded_at: Utc::now(),
        })
    }
}
