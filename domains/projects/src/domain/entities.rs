//! Domain entities for the Projects domain
//!
//! Each entity includes validation, serialization, and business rules.
//! The `status` field is a denormalized cache of the status-event ledger:
//! it is only ever written together with a new event, inside one store
//! commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use neofab_common::{Error, Result};

use crate::domain::state::{ProjectState, ProjectStateMachine};

/// Maximum title length (varchar(200))
const MAX_TITLE_LENGTH: usize = 200;

/// Project status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Submitted,
    UnderReview,
    Approved,
    InProduction,
    Completed,
    Rejected,
    Cancelled,
}

impl ProjectStatus {
    /// Check if status is terminal (project can no longer move)
    pub fn is_terminal(&self) -> bool {
        self.to_state().is_terminal()
    }

    /// Convert to state machine state
    pub fn to_state(&self) -> ProjectState {
        match self {
            ProjectStatus::Submitted => ProjectState::Submitted,
            ProjectStatus::UnderReview => ProjectState::UnderReview,
            ProjectStatus::Approved => ProjectState::Approved,
            ProjectStatus::InProduction => ProjectState::InProduction,
            ProjectStatus::Completed => ProjectState::Completed,
            ProjectStatus::Rejected => ProjectState::Rejected,
            ProjectStatus::Cancelled => ProjectState::Cancelled,
        }
    }

    /// Create from state machine state
    pub fn from_state(state: ProjectState) -> Self {
        match state {
            ProjectState::Submitted => ProjectStatus::Submitted,
            ProjectState::UnderReview => ProjectStatus::UnderReview,
            ProjectState::Approved => ProjectStatus::Approved,
            ProjectState::InProduction => ProjectStatus::InProduction,
            ProjectState::Completed => ProjectStatus::Completed,
            ProjectState::Rejected => ProjectStatus::Rejected,
            ProjectState::Cancelled => ProjectStatus::Cancelled,
        }
    }

    /// Get valid next statuses from the current status
    pub fn valid_transitions(&self) -> Vec<ProjectStatus> {
        self.to_state()
            .valid_transitions()
            .iter()
            .map(|s| ProjectStatus::from_state(*s))
            .collect()
    }

    /// Whether print jobs may be created or scheduled under this status
    pub fn accepts_print_jobs(&self) -> bool {
        matches!(self, ProjectStatus::Approved | ProjectStatus::InProduction)
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_state())
    }
}

/// Parameters for creating a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    pub description: Option<String>,
}

/// Project entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project in the initial `Submitted` status
    pub fn new(owner_id: Uuid, new: NewProject) -> Result<Self> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Empty("project title is required".to_string()));
        }
        if title.len() > MAX_TITLE_LENGTH {
            return Err(Error::TooLarge {
                size: title.len() as u64,
                max: MAX_TITLE_LENGTH as u64,
            });
        }

        let now = Utc::now();
        Ok(Project {
            id: Uuid::new_v4(),
            owner_id,
            title,
            description: new.description,
            status: ProjectStatus::default(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Check if the project is in a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check whether the given user owns this project
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// Apply a validated transition to the target status
    ///
    /// The caller persists the updated record together with the matching
    /// status event in one atomic commit.
    pub fn apply_transition(&mut self, target: ProjectStatus) -> Result<ProjectStatus> {
        let previous = self.status;
        let new_state = ProjectStateMachine::transition(self.status.to_state(), target.to_state())?;
        self.status = ProjectStatus::from_state(new_state);
        self.updated_at = Utc::now();
        Ok(previous)
    }

    /// Check if a transition is valid without applying it
    pub fn can_transition(&self, target: ProjectStatus) -> bool {
        ProjectStateMachine::can_transition(self.status.to_state(), target.to_state())
    }
}
