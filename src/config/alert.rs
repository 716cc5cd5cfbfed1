//! Failure alerting configuration types.

use serde::Deserialize;

/// Alert channel discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannelType {
    /// Emit alerts as error-level log events.
    #[default]
    Log,
    /// Publish alerts to an SNS topic (requires `sns` feature).
    #[cfg(feature = "sns")]
    Sns,
}

/// Failure window and alert channel configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Number of most recent ticks considered (W).
    pub window: usize,
    /// Failures within the window that raise an alert (T).
    pub threshold: usize,
    /// Alert channel type.
    pub channel: AlertChannelType,
    /// SNS channel configuration (requires `sns` feature).
    #[cfg(feature = "sns")]
    pub sns: SnsAlertConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            window: 60,
            threshold: 10,
            channel: AlertChannelType::default(),
            #[cfg(feature = "sns")]
            sns: SnsAlertConfig::default(),
        }
    }
}

/// SNS alert channel configuration.
#[cfg(feature = "sns")]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnsAlertConfig {
    /// Topic receiving alert notifications.
    pub topic_arn: String,
    /// AWS region.
    pub region: Option<String>,
    /// Custom endpoint URL (LocalStack).
    pub endpoint: Option<String>,
}
