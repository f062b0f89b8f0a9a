//! HTTP webhook notifier for escalations.
//!
//! POSTs each notification to `ESCALATION_WEBHOOK_URL`, as JSON or through
//! `ESCALATION_WEBHOOK_BODY_TEMPLATE`. Every request is bounded by
//! `ESCALATION_WEBHOOK_TIMEOUT_SECS`.

use std::sync::Arc;
use std::time::Duration;

use crate::templating::TemplateRenderer;
use crate::traits::{Notification, Notifier, NotifyError};

#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    /// Rendered with `subject`, `body` and `metadata` in scope.
    body_template: Option<String>,
    renderer: Arc<TemplateRenderer>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// The body template is checked here so a typo fails at startup,
    /// not on the first escalation.
    pub fn new(
        url: String,
        body_template: Option<String>,
        renderer: Arc<TemplateRenderer>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        if let Some(ref tmpl) = body_template {
            renderer
                .validate(tmpl)
                .map_err(|e| NotifyError::Config(format!("invalid body template: {e}")))?;
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url,
            body_template,
            renderer,
            client,
        })
    }

    fn payload(&self, notification: &Notification) -> Result<String, NotifyError> {
        match self.body_template {
            Some(ref tmpl) => self.renderer.render(tmpl, notification),
            None => serde_json::to_string(notification).map_err(|e| {
                NotifyError::Config(format!("failed to serialize notification: {e}"))
            }),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = self.payload(notification)?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(url = %self.url, %status, body = %body_text, "webhook rejected escalation");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: body_text,
            });
        }

        tracing::debug!(url = %self.url, %status, "webhook escalation delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn notifier(url: &str, body_template: Option<&str>, timeout: Duration) -> WebhookNotifier {
        WebhookNotifier::new(
            url.to_string(),
            body_template.map(str::to_string),
            Arc::new(TemplateRenderer::new()),
            timeout,
        )
        .unwrap()
    }

    fn sample_notification() -> Notification {
        Notification {
            subject: "association failed".into(),
            body: "details".into(),
            metadata: HashMap::from([("resource_id".to_string(), "arn:aws:x".to_string())]),
        }
    }

    #[test]
    fn payload_defaults_to_notification_json() {
        let notifier = notifier("https://example.com", None, Duration::from_secs(1));
        let payload: serde_json::Value =
            serde_json::from_str(&notifier.payload(&sample_notification()).unwrap()).unwrap();
        assert_eq!(payload["subject"], "association failed");
        assert_eq!(payload["metadata"]["resource_id"], "arn:aws:x");
    }

    #[test]
    fn payload_uses_body_template() {
        let notifier = notifier(
            "https://example.com",
            Some(r#"{"text": "{{ subject }}: {{ metadata.resource_id }}"}"#),
            Duration::from_secs(1),
        );
        assert_eq!(
            notifier.payload(&sample_notification()).unwrap(),
            r#"{"text": "association failed: arn:aws:x"}"#
        );
    }

    #[test]
    fn invalid_body_template_is_config_error() {
        let result = WebhookNotifier::new(
            "https://example.com".into(),
            Some("{{ unclosed".into()),
            Arc::new(TemplateRenderer::new()),
            Duration::from_secs(1),
        );
        match result {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("invalid body template")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn channel_name_is_webhook() {
        let notifier = notifier("https://example.com", None, Duration::from_secs(1));
        assert_eq!(notifier.channel_name(), "webhook");
    }

    #[tokio::test]
    async fn unresponsive_endpoint_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let notifier = notifier(&format!("http://{addr}/hook"), None, Duration::from_millis(200));
        let result = tokio::time::timeout(Duration::from_secs(5), notifier.send(&sample_notification()))
            .await
            .expect("send was not bounded by the client timeout");
        match result {
            Err(NotifyError::Http(e)) => assert!(e.is_timeout(), "unexpected error: {e}"),
            other => panic!("expected Http timeout, got: {other:?}"),
        }
        server.abort();
    }
}
