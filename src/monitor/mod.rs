//! Failure monitoring and alerting.
//!
//! The ingestion job only emits a per-tick signal; counting and alerting
//! live here. `FailureMonitor` feeds each `TickReport` into a
//! `FailureWindow` and sends one notification through an `AlertChannel`
//! when the window enters alarm.
//!
//! Alert delivery is fire-and-forget: a failed notification is logged and
//! never turns into a tick failure.

mod window;
#[cfg(feature = "sns")]
mod sns;

#[cfg(feature = "sns")]
pub use sns::SnsAlertChannel;
pub use window::{FailureWindow, WindowTransition};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::config::{AlertChannelType, AlertConfig};
use crate::ingest::{IngestionOutcome, TickReport};

/// Errors delivering an alert.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Failed to deliver alert: {0}")]
    DeliveryFailed(String),

    #[error("Alert channel misconfigured: {0}")]
    Config(String),
}

/// Destination for human-readable alert messages.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Send one alert.
    async fn notify(&self, subject: &str, message: &str) -> Result<(), AlertError>;

    /// Channel name for logging.
    fn name(&self) -> &'static str;
}

/// Alert channel that writes alerts to the log.
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), AlertError> {
        error!(subject = %subject, alert = %message, "ALERT");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// A delivered alert, as seen by `ChannelAlertChannel` receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub message: String,
}

/// In-memory alert channel.
///
/// Used for the in-process scheduler's tests and for embedding.
pub struct ChannelAlertChannel {
    sender: mpsc::UnboundedSender<AlertMessage>,
}

impl ChannelAlertChannel {
    /// Returns the channel and a receiver for consuming alerts.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlertMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl AlertChannel for ChannelAlertChannel {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), AlertError> {
        self.sender
            .send(AlertMessage {
                subject: subject.to_string(),
                message: message.to_string(),
            })
            .map_err(|e| AlertError::DeliveryFailed(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Create an alert channel based on configuration.
pub async fn create_alert_channel(
    config: &AlertConfig,
) -> Result<Arc<dyn AlertChannel>, AlertError> {
    match config.channel {
        AlertChannelType::Log => Ok(Arc::new(LogAlertChannel)),
        #[cfg(feature = "sns")]
        AlertChannelType::Sns => {
            let channel = SnsAlertChannel::new(&config.sns).await?;
            Ok(Arc::new(channel))
        }
    }
}

/// Counts tick failures and raises alerts.
pub struct FailureMonitor {
    window: Mutex<FailureWindow>,
    channel: Arc<dyn AlertChannel>,
}

impl FailureMonitor {
    pub fn new(window: FailureWindow, channel: Arc<dyn AlertChannel>) -> Self {
        Self {
            window: Mutex::new(window),
            channel,
        }
    }

    pub fn from_config(config: &AlertConfig, channel: Arc<dyn AlertChannel>) -> Self {
        Self::new(FailureWindow::new(config.window, config.threshold), channel)
    }

    /// Record one tick and alert if the window just entered alarm.
    pub async fn observe(&self, report: &TickReport) -> WindowTransition {
        let (transition, failures, window, threshold) = {
            let mut w = self.window.lock().await;
            let transition = w.record(!report.is_success());
            (transition, w.failures(), w.window(), w.threshold())
        };

        match transition {
            WindowTransition::EnteredAlarm => {
                let subject = "parkwatch: ingestion failing".to_string();
                let mut message = format!(
                    "{} of the last {} ticks failed (threshold {}). Latest tick scheduled at {}.",
                    failures, window, threshold, report.scheduled_at
                );
                if let IngestionOutcome::Failure { stage, cause } = &report.outcome {
                    message.push_str(&format!(" Failed while {}: {}", stage.as_str(), cause));
                }

                warn!(failures, window, threshold, "Failure threshold crossed");
                if let Err(e) = self.channel.notify(&subject, &message).await {
                    warn!(
                        channel = self.channel.name(),
                        error = %e,
                        "Failed to deliver alert"
                    );
                }
            }
            WindowTransition::Recovered => {
                info!(failures, window, threshold, "Ingestion recovered below threshold");
            }
            WindowTransition::Steady => {}
        }
        transition
    }

    pub async fn failures(&self) -> usize {
        self.window.lock().await.failures()
    }
}
