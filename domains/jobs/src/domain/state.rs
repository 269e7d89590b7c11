//! State machine for print jobs
//!
//! Print jobs move `Queued → Scheduled → Printing → Done`. A failed job
//! may be retried back to `Queued`; cancellation is terminal. Entering
//! `Scheduled` is guarded: the owning project must accept print jobs and
//! a printer must be assigned.

pub use neofab_common::StateError;

use neofab_projects::ProjectStatus;

/// Print job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrintJobState {
    Queued,
    Scheduled,
    Printing,
    Done,
    Failed,
    Cancelled,
}

impl PrintJobState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [PrintJobState] {
        match self {
            Self::Queued => &[Self::Scheduled, Self::Cancelled],
            Self::Scheduled => &[Self::Printing, Self::Failed, Self::Cancelled],
            Self::Printing => &[Self::Done, Self::Failed, Self::Cancelled],
            Self::Failed => &[Self::Queued, Self::Cancelled],
            Self::Done => &[],
            Self::Cancelled => &[],
        }
    }
}

impl std::fmt::Display for PrintJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Printing => write!(f, "printing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Guard context for entering `Scheduled`
#[derive(Debug, Clone)]
pub struct ScheduleGuardContext {
    /// Status of the owning project
    pub project_status: ProjectStatus,
    /// Whether a printer has been assigned to the job
    pub printer_assigned: bool,
}

/// Print job state machine
pub struct PrintJobStateMachine;

impl PrintJobStateMachine {
    /// Attempt a state transition to the requested target, with guard
    /// conditions
    pub fn transition(
        current: PrintJobState,
        target: PrintJobState,
        context: Option<&ScheduleGuardContext>,
    ) -> Result<PrintJobState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        if !current.valid_transitions().contains(&target) {
            return Err(StateError::InvalidTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        // Guard: a job may only be scheduled under an approved project
        // with a printer assigned
        if target == PrintJobState::Scheduled {
            if let Some(ctx) = context {
                if !ctx.project_status.accepts_print_jobs() {
                    return Err(StateError::GuardFailed(format!(
                        "owning project is {} and does not accept print jobs",
                        ctx.project_status
                    )));
                }
                if !ctx.printer_assigned {
                    return Err(StateError::GuardFailed(
                        "no printer assigned to the job".to_string(),
                    ));
                }
            }
        }

        Ok(target)
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition(
        current: PrintJobState,
        target: PrintJobState,
        context: Option<&ScheduleGuardContext>,
    ) -> bool {
        Self::transition(current, target, context).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedulable() -> ScheduleGuardContext {
        ScheduleGuardContext {
            project_status: ProjectStatus::Approved,
            printer_assigned: true,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        assert_eq!(
            PrintJobStateMachine::transition(
                PrintJobState::Queued,
                PrintJobState::Scheduled,
                Some(&schedulable())
            ),
            Ok(PrintJobState::Scheduled)
        );
        assert_eq!(
            PrintJobStateMachine::transition(PrintJobState::Scheduled, PrintJobState::Printing, None),
            Ok(PrintJobState::Printing)
        );
        assert_eq!(
            PrintJobStateMachine::transition(PrintJobState::Printing, PrintJobState::Done, None),
            Ok(PrintJobState::Done)
        );
    }

    #[test]
    fn test_failure_and_retry() {
        assert_eq!(
            PrintJobStateMachine::transition(PrintJobState::Scheduled, PrintJobState::Failed, None),
            Ok(PrintJobState::Failed)
        );
        assert_eq!(
            PrintJobStateMachine::transition(PrintJobState::Printing, PrintJobState::Failed, None),
            Ok(PrintJobState::Failed)
        );
        // Failed jobs may be retried back into the queue
        assert_eq!(
            PrintJobStateMachine::transition(PrintJobState::Failed, PrintJobState::Queued, None),
            Ok(PrintJobState::Queued)
        );
    }

    #[test]
    fn test_schedule_guard_project_status() {
        let ctx = ScheduleGuardContext {
            project_status: ProjectStatus::Submitted,
            printer_assigned: true,
        };
        let result =
            PrintJobStateMachine::transition(PrintJobState::Queued, PrintJobState::Scheduled, Some(&ctx));
        assert!(matches!(result, Err(StateError::GuardFailed(_))));

        let ctx = ScheduleGuardContext {
            project_status: ProjectStatus::InProduction,
            printer_assigned: true,
        };
        assert_eq!(
            PrintJobStateMachine::transition(PrintJobState::Queued, PrintJobState::Scheduled, Some(&ctx)),
            Ok(PrintJobState::Scheduled)
        );
    }

    #[test]
    fn test_schedule_guard_printer_assignment() {
        let ctx = ScheduleGuardContext {
            project_status: ProjectStatus::Approved,
            printer_assigned: false,
        };
        let result =
            PrintJobStateMachine::transition(PrintJobState::Queued, PrintJobState::Scheduled, Some(&ctx));
        assert!(matches!(result, Err(StateError::GuardFailed(_))));
    }

    #[test]
    fn test_invalid_transitions() {
        let result =
            PrintJobStateMachine::transition(PrintJobState::Queued, PrintJobState::Printing, None);
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));

        let result =
            PrintJobStateMachine::transition(PrintJobState::Queued, PrintJobState::Done, None);
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));

        // Queued jobs have not run, so they cannot fail
        let result =
            PrintJobStateMachine::transition(PrintJobState::Queued, PrintJobState::Failed, None);
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_terminal_states() {
        assert!(PrintJobState::Done.is_terminal());
        assert!(PrintJobState::Cancelled.is_terminal());
        assert!(!PrintJobState::Failed.is_terminal());

        let result =
            PrintJobStateMachine::transition(PrintJobState::Done, PrintJobState::Queued, None);
        assert!(matches!(result, Err(StateError::TerminalState(_))));
        let result =
            PrintJobStateMachine::transition(PrintJobState::Cancelled, PrintJobState::Queued, None);
        assert!(matches!(result, Err(StateError::TerminalState(_))));
    }

    #[test]
    fn test_cancel_reachable_from_active_states() {
        for state in [
            PrintJobState::Queued,
            PrintJobState::Scheduled,
            PrintJobState::Printing,
            PrintJobState::Failed,
        ] {
            assert_eq!(
                PrintJobStateMachine::transition(state, PrintJobState::Cancelled, None),
                Ok(PrintJobState::Cancelled),
                "cancel should be legal from {}",
                state
            );
        }
    }
}
