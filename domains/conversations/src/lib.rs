//! Conversations domain: project message threads and read receipts

pub mod domain;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{Message, MessageAuthor, ReadReceipt};
