//! Print jobs domain: print job entity and scheduling state machine

pub mod domain;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{JobAssignment, JobPriority, NewPrintJob, PrintJob, PrintJobStatus};
pub use domain::state::{
    PrintJobState, PrintJobStateMachine, ScheduleGuardContext, StateError,
};
