//! Log-only notifier.

use crate::traits::{Notification, Notifier, NotifyError};

/// Writes escalations to the `webacl::escalation` tracing target.
///
/// Always configured so an escalation is visible even when no webhook is.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let field = |k: &str| notification.metadata.get(k).map(String::as_str).unwrap_or("");
        tracing::error!(
            target: "webacl::escalation",
            resource_id = field("resource_id"),
            reason = field("reason"),
            delivery_attempt = field("delivery_attempt"),
            subject = %notification.subject,
            "{}",
            notification.body
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
