//! AWS SES notification gateway
//!
//! Sends notification hints to the workshop staff address through AWS
//! Simple Email Service, with LocalStack support for local testing.

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_ses::config::SharedCredentialsProvider;
use aws_sdk_ses::types::{Body, Content, Destination, Message};
use aws_sdk_ses::Client as SesClient;

use crate::{content, NotificationEvent, NotificationGateway, NotifyConfig, NotifyError};

/// AWS SES gateway implementation
pub struct SesGateway {
    client: SesClient,
    config: NotifyConfig,
}

impl SesGateway {
    /// Create a new SES gateway
    pub async fn new(config: NotifyConfig) -> Result<Self, NotifyError> {
        let region = config
            .aws_region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let aws_config = match config.aws_endpoint_url.as_ref() {
            Some(endpoint_url) => {
                tracing::info!("using custom AWS endpoint: {}", endpoint_url);

                // For LocalStack, use dummy credentials
                let credentials = Credentials::new(
                    "test-access-key",
                    "test-secret-key",
                    None,
                    None,
                    "localstack-notify-provider",
                );

                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region.clone()))
                    .endpoint_url(endpoint_url)
                    .credentials_provider(SharedCredentialsProvider::new(credentials))
                    .load()
                    .await
            }
            None => {
                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region.clone()))
                    .load()
                    .await
            }
        };

        let client = SesClient::new(&aws_config);

        if let Err(e) = client.get_send_quota().send().await {
            tracing::warn!(
                "failed to connect to SES (may be expected in LocalStack): {}",
                e
            );
        } else {
            tracing::info!("successfully connected to AWS SES");
        }

        Ok(Self { client, config })
    }

    fn build_message(&self, event: &NotificationEvent) -> Result<Message, NotifyError> {
        let subject = Content::builder()
            .data(content::subject(event))
            .charset("UTF-8")
            .build()
            .map_err(|e| NotifyError::DeliveryFailed(format!("failed to build subject: {}", e)))?;

        let text = Content::builder()
            .data(content::body_text(event, &self.config.app_base_url))
            .charset("UTF-8")
            .build()
            .map_err(|e| NotifyError::DeliveryFailed(format!("failed to build body: {}", e)))?;

        let body = Body::builder().text(text).build();

        Ok(Message::builder().subject(subject).body(body).build())
    }
}

#[async_trait::async_trait]
impl NotificationGateway for SesGateway {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let message = self.build_message(event)?;
        let destination = Destination::builder()
            .to_addresses(&self.config.staff_address)
            .build();

        let result = self
            .client
            .send_email()
            .source(&self.config.from_address)
            .destination(destination)
            .message(message)
            .send()
            .await
            .map_err(|e| NotifyError::DeliveryFailed(format!("SES send failed: {}", e)))?;

        tracing::info!(
            project_id = %event.project_id(),
            message_id = ?result.message_id(),
            "sent notification via SES"
        );
        Ok(())
    }
}
