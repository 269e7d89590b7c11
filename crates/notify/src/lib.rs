//! NeoFab Notification Gateway
//!
//! Transitions and submissions raise terse event descriptors; this crate
//! turns them into outbound email hints. Delivery is strictly best-effort:
//! the engine logs a failed `notify` call and moves on, so nothing here
//! may ever affect transition atomicity.
//!
//! Backends:
//! - AWS SES for production delivery
//! - In-memory mock for testing and development

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use neofab_common::EntityRef;

pub mod content;
pub mod mock;
pub mod ses;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification configuration error: {0}")]
    Configuration(String),

    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Terse descriptor of something worth telling people about
///
/// Carries just enough to compose an email hint; the full context lives
/// in-app on the project timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A new project entered the queue
    ProjectSubmitted {
        project_id: Uuid,
        title: String,
        owner_id: Uuid,
    },
    /// An accepted status transition
    StatusChanged {
        subject: EntityRef,
        project_id: Uuid,
        title: String,
        previous: String,
        new: String,
        actor_id: Uuid,
    },
}

impl NotificationEvent {
    /// The project this event belongs to
    pub fn project_id(&self) -> Uuid {
        match self {
            NotificationEvent::ProjectSubmitted { project_id, .. }
            | NotificationEvent::StatusChanged { project_id, .. } => *project_id,
        }
    }
}

/// Outbound notification seam
///
/// Implementations must not retry indefinitely or block on slow
/// transports beyond their own timeouts; the caller treats any error as
/// advisory.
#[async_trait::async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Send a notification hint for the event
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Gateway provider (ses, mock)
    pub provider: String,
    /// AWS region for SES
    pub aws_region: Option<String>,
    /// AWS endpoint URL (for LocalStack)
    pub aws_endpoint_url: Option<String>,
    /// Address notifications are sent from
    pub from_address: String,
    /// Workshop staff distribution address notifications are sent to
    pub staff_address: String,
    /// Enable sending (can disable for testing)
    pub enabled: bool,
    /// Base URL for the application (used in links)
    pub app_base_url: String,
}

impl NotifyConfig {
    /// Create gateway config from environment variables
    pub fn from_env() -> Result<Self, NotifyError> {
        dotenvy::dotenv().ok();

        let provider = std::env::var("NOTIFY_PROVIDER").unwrap_or_else(|_| "mock".to_string());
        let aws_region = std::env::var("AWS_REGION").ok();
        let aws_endpoint_url = std::env::var("AWS_ENDPOINT_URL").ok();

        let from_address = std::env::var("NOTIFY_FROM_ADDRESS")
            .unwrap_or_else(|_| "noreply@neofab.app".to_string());
        let staff_address = std::env::var("NOTIFY_STAFF_ADDRESS")
            .unwrap_or_else(|_| "workshop@neofab.app".to_string());

        let enabled = std::env::var("NOTIFY_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let app_base_url =
            std::env::var("APP_BASE_URL").unwrap_or_else(|_| "https://neofab.app".to_string());

        Ok(Self {
            provider,
            aws_region,
            aws_endpoint_url,
            from_address,
            staff_address,
            enabled,
            app_base_url,
        })
    }
}

/// Gateway factory
pub struct NotificationGatewayFactory;

impl NotificationGatewayFactory {
    /// Create a gateway based on configuration
    pub async fn create(config: NotifyConfig) -> Result<Box<dyn NotificationGateway>, NotifyError> {
        if !config.enabled {
            tracing::info!("notification gateway disabled, using mock implementation");
            return Ok(Box::new(mock::MockGateway::new()));
        }

        match config.provider.as_str() {
            "ses" | "aws-ses" => {
                tracing::info!("creating AWS SES notification gateway");
                let gateway = ses::SesGateway::new(config).await?;
                Ok(Box::new(gateway))
            }
            "mock" => {
                tracing::info!("creating mock notification gateway");
                Ok(Box::new(mock::MockGateway::new()))
            }
            provider => Err(NotifyError::Configuration(format!(
                "Unknown notification provider: {}. Supported providers: ses, mock",
                provider
            ))),
        }
    }
}
