//! Audit domain: append-only status event ledger and timeline entries

pub mod domain;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{StatusChange, StatusEvent, TimelineEntry};
