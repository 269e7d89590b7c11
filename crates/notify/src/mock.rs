//! Mock notification gateway
//!
//! Captures events in memory for test assertions. Can be switched into a
//! failing mode to verify that callers treat delivery as best-effort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::{NotificationEvent, NotificationGateway, NotifyError};

/// Mock notification gateway for testing
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
    failing: Arc<AtomicBool>,
}

impl MockGateway {
    /// Create a new capturing mock gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gateway whose `notify` always fails
    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.failing.store(true, Ordering::SeqCst);
        gateway
    }

    /// Switch failure mode on or off
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All captured events, in send order
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captured events for one project
    pub fn events_for_project(&self, project_id: Uuid) -> Vec<NotificationEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.project_id() == project_id)
            .collect()
    }

    /// Number of captured events
    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Drop all captured events
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl NotificationGateway for MockGateway {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::DeliveryFailed(
                "mock gateway is in failing mode".to_string(),
            ));
        }

        tracing::info!(project_id = %event.project_id(), "mock gateway capturing notification");
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
