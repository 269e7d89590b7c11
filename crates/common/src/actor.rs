//! Actor identity and capability checking for NeoFab
//!
//! Authorization is reified as an explicit capability set per actor,
//! checked centrally by the status engine rather than scattered across
//! call sites. The `CapabilityProvider` seam lets embedders plug in
//! richer policies; `RoleCapabilities` is the default role-derived set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Staff,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Staff => write!(f, "staff"),
        }
    }
}

/// Capabilities that gate engine operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Create new projects
    SubmitProjects,
    /// Drive the review pipeline (under review, approve, reject,
    /// production, complete)
    ReviewProjects,
    /// Create, assign, and transition print jobs
    OperateJobs,
    /// Cancel projects the actor owns
    CancelOwnProjects,
    /// Cancel any project
    CancelAnyProject,
    /// Post messages on accessible project threads
    PostMessages,
    /// Upload attachments to accessible projects and jobs
    AttachFiles,
}

/// An authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    /// Create a regular user actor
    pub fn user(id: Uuid) -> Self {
        Self {
            id,
            role: Role::User,
        }
    }

    /// Create a staff actor
    pub fn staff(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Staff,
        }
    }

    /// Check if the actor has the staff role
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }
}

/// Resolves the capability set of an actor
pub trait CapabilityProvider: Send + Sync {
    fn capabilities_of(&self, actor: &Actor) -> HashSet<Capability>;

    /// Convenience check for a single capability
    fn has_capability(&self, actor: &Actor, capability: Capability) -> bool {
        self.capabilities_of(actor).contains(&capability)
    }
}

/// Default capability provider deriving capabilities from the actor role
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleCapabilities;

impl CapabilityProvider for RoleCapabilities {
    fn capabilities_of(&self, actor: &Actor) -> HashSet<Capability> {
        let caps: &[Capability] = match actor.role {
            Role::User => &[
                Capability::SubmitProjects,
                Capability::CancelOwnProjects,
                Capability::PostMessages,
                Capability::AttachFiles,
            ],
            Role::Staff => &[
                Capability::SubmitProjects,
                Capability::ReviewProjects,
                Capability::OperateJobs,
                Capability::CancelOwnProjects,
                Capability::CancelAnyProject,
                Capability::PostMessages,
                Capability::AttachFiles,
            ],
        };
        caps.iter().copied().collect()
    }
}
