//! Fans notifications out to every configured channel.
//!
//! Individual channel failures don't block other channels.

use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};

pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn add_channel(&mut self, channel: Box<dyn Notifier>) {
        self.channels.push(channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    /// Deliver `notification` to all channels and report per-channel results.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        let resource_id = notification
            .metadata
            .get("resource_id")
            .cloned()
            .unwrap_or_default();

        if self.channels.is_empty() {
            tracing::debug!(resource_id = %resource_id, "No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        resource_id = %resource_id,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        resource_id = %resource_id,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                resource_id: resource_id.clone(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

/// A dispatcher is itself a channel: delivery succeeds when at least one
/// underlying channel accepted the notification.
#[async_trait::async_trait]
impl Notifier for Dispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let results = self.dispatch(notification).await;
        if results.is_empty() {
            return Err(NotifyError::Config("no notification channels configured".into()));
        }
        if results.iter().any(|r| r.success) {
            Ok(())
        } else {
            Err(NotifyError::AllChannelsFailed(results.len()))
        }
    }

    fn channel_name(&self) -> &str {
        "dispatcher"
    }
}
