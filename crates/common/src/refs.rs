//! Entity references
//!
//! NeoFab records (attachments, status events) can belong to either a
//! project or a print job. `EntityRef` names the owning entity without
//! pulling the full record.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reference to a project or print job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Project(Uuid),
    PrintJob(Uuid),
}

impl EntityRef {
    /// The referenced identifier, regardless of kind
    pub fn id(&self) -> Uuid {
        match self {
            EntityRef::Project(id) | EntityRef::PrintJob(id) => *id,
        }
    }

    /// Whether this reference names a project
    pub fn is_project(&self) -> bool {
        matches!(self, EntityRef::Project(_))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Project(id) => write!(f, "project:{}", id),
            EntityRef::PrintJob(id) => write!(f, "print_job:{}", id),
        }
    }
}
