//! State machine for the project review pipeline
//!
//! The transition table is fixed and total: a requested move from state S
//! to state T is legal only if T appears in S's row; everything else is
//! rejected. Terminal states have no outgoing transitions.

pub use neofab_common::StateError;

/// Project lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectState {
    Submitted,
    UnderReview,
    Approved,
    InProduction,
    Completed,
    Rejected,
    Cancelled,
}

impl ProjectState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }

    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [ProjectState] {
        match self {
            Self::Submitted => &[Self::UnderReview, Self::Rejected, Self::Cancelled],
            Self::UnderReview => &[Self::Approved, Self::Rejected, Self::Cancelled],
            Self::Approved => &[Self::InProduction, Self::Cancelled],
            Self::InProduction => &[Self::Completed, Self::Cancelled],
            Self::Completed => &[],
            Self::Rejected => &[],
            Self::Cancelled => &[],
        }
    }
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::UnderReview => write!(f, "under_review"),
            Self::Approved => write!(f, "approved"),
            Self::InProduction => write!(f, "in_production"),
            Self::Completed => write!(f, "completed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Project state machine
pub struct ProjectStateMachine;

impl ProjectStateMachine {
    /// Attempt a state transition to the requested target
    ///
    /// Returns the new state if the transition is legal, or an error
    /// otherwise.
    pub fn transition(
        current: ProjectState,
        target: ProjectState,
    ) -> Result<ProjectState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        if current.valid_transitions().contains(&target) {
            Ok(target)
        } else {
            Err(StateError::InvalidTransition {
                from: current.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition(current: ProjectState, target: ProjectState) -> bool {
        Self::transition(current, target).is_ok()
    }
}
