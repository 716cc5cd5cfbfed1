//! SNS alert channel.
//!
//! Publishes alerts to a topic; email or other subscriptions hang off the
//! topic and are managed outside this crate.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::Client as SnsClient;
use tracing::info;

use super::{AlertChannel, AlertError};
use crate::config::SnsAlertConfig;

/// SNS subjects are limited to 100 characters.
const MAX_SUBJECT_LEN: usize = 100;

/// Alert channel publishing to an SNS topic.
pub struct SnsAlertChannel {
    client: SnsClient,
    topic_arn: String,
}

impl SnsAlertChannel {
    pub async fn new(config: &SnsAlertConfig) -> Result<Self, AlertError> {
        if config.topic_arn.is_empty() {
            return Err(AlertError::Config("alert.sns.topic_arn not set".to_string()));
        }

        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            aws_config_builder =
                aws_config_builder.region(aws_config::Region::new(region.clone()));
        }

        if let Some(ref endpoint) = config.endpoint {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;

        info!(
            region = ?config.region,
            topic_arn = %config.topic_arn,
            "Alert channel: sns"
        );

        Ok(Self {
            client: SnsClient::new(&aws_config),
            topic_arn: config.topic_arn.clone(),
        })
    }
}

#[async_trait]
impl AlertChannel for SnsAlertChannel {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), AlertError> {
        let subject: String = subject.chars().take(MAX_SUBJECT_LEN).collect();
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| AlertError::DeliveryFailed(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sns"
    }
}
