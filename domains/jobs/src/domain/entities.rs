//! Domain entities for the Print jobs domain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use neofab_common::Result;

use crate::domain::state::{PrintJobState, PrintJobStateMachine, ScheduleGuardContext};

/// Print job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "print_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PrintJobStatus {
    #[default]
    Queued,
    Scheduled,
    Printing,
    Done,
    Failed,
    Cancelled,
}

impl PrintJobStatus {
    /// Check if status is terminal (job has finished)
    pub fn is_terminal(&self) -> bool {
        self.to_state().is_terminal()
    }

    /// Convert to state machine state
    pub fn to_state(&self) -> PrintJobState {
        match self {
            PrintJobStatus::Queued => PrintJobState::Queued,
            PrintJobStatus::Scheduled => PrintJobState::Scheduled,
            PrintJobStatus::Printing => PrintJobState::Printing,
            PrintJobStatus::Done => PrintJobState::Done,
            PrintJobStatus::Failed => PrintJobState::Failed,
            PrintJobStatus::Cancelled => PrintJobState::Cancelled,
        }
    }

    /// Create from state machine state
    pub fn from_state(state: PrintJobState) -> Self {
        match state {
            PrintJobState::Queued => PrintJobStatus::Queued,
            PrintJobState::Scheduled => PrintJobStatus::Scheduled,
            PrintJobState::Printing => PrintJobStatus::Printing,
            PrintJobState::Done => PrintJobStatus::Done,
            PrintJobState::Failed => PrintJobStatus::Failed,
            PrintJobState::Cancelled => PrintJobStatus::Cancelled,
        }
    }

    /// Get valid next statuses from the current status
    pub fn valid_transitions(&self) -> Vec<PrintJobStatus> {
        self.to_state()
            .valid_transitions()
            .iter()
            .map(|s| PrintJobStatus::from_state(*s))
            .collect()
    }
}

impl std::fmt::Display for PrintJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_state())
    }
}

/// Print job priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPriority::Low => write!(f, "low"),
            JobPriority::Normal => write!(f, "normal"),
            JobPriority::High => write!(f, "high"),
        }
    }
}

/// Parameters for creating a print job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPrintJob {
    pub priority: JobPriority,
    pub deadline: Option<DateTime<Utc>>,
}

/// Printer/material/color assignment for a print job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobAssignment {
    pub printer_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub color_id: Option<Uuid>,
}

/// Print job entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PrintJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status: PrintJobStatus,
    pub priority: JobPriority,
    pub deadline: Option<DateTime<Utc>>,
    pub printer_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub color_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrintJob {
    /// Create a new print job in the initial `Queued` status
    pub fn new(project_id: Uuid, new: NewPrintJob) -> Self {
        let now = Utc::now();
        PrintJob {
            id: Uuid::new_v4(),
            project_id,
            status: PrintJobStatus::default(),
            priority: new.priority,
            deadline: new.deadline,
            printer_id: None,
            material_id: None,
            color_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether a printer has been assigned
    pub fn has_printer(&self) -> bool {
        self.printer_id.is_some()
    }

    /// Set the printer/material/color assignment; absent fields are kept
    pub fn assign(&mut self, assignment: JobAssignment) {
        if assignment.printer_id.is_some() {
            self.printer_id = assignment.printer_id;
        }
        if assignment.material_id.is_some() {
            self.material_id = assignment.material_id;
        }
        if assignment.color_id.is_some() {
            self.color_id = assignment.color_id;
        }
        self.updated_at = Utc::now();
    }

    /// Apply a validated transition to the target status
    ///
    /// The caller persists the updated record together with the matching
    /// status event in one atomic commit.
    pub fn apply_transition(
        &mut self,
        target: PrintJobStatus,
        context: Option<&ScheduleGuardContext>,
    ) -> Result<PrintJobStatus> {
        let previous = self.status;
        let new_state =
            PrintJobStateMachine::transition(self.status.to_state(), target.to_state(), context)?;
        self.status = PrintJobStatus::from_state(new_state);
        self.updated_at = Utc::now();
        Ok(previous)
    }
}
