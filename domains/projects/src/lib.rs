//! Projects domain: project entity and review state machine

pub mod domain;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{NewProject, Project, ProjectStatus};
pub use domain::state::{ProjectState, ProjectStateMachine, StateError};
