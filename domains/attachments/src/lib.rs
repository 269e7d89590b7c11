//! Attachments domain: uploaded file metadata, kind policy, content hashing

pub mod domain;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{
    sanitize_filename, Attachment, AttachmentKind, ContentHash, NewAttachment,
};
