//! Bounded retries and operator escalation around the association controller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use webacl_core::config::RemediationConfig;
use webacl_core::ViolationEvent;
use webacl_notify::{EscalationContext, Notification, Notifier, TemplateRenderer};

use crate::controller::{AssociationController, BindingResult};

/// How many deliveries a transient failure gets before escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total deliveries, counting the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RemediationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }

    /// Longest time one violation can hold its queue message: every
    /// attempt timing out, every retry delay, then a stalled escalation.
    pub fn in_flight_budget(&self, control_timeout: Duration, escalation_timeout: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        control_timeout * attempts + self.delay * (attempts - 1) + escalation_timeout
    }
}

/// Final outcome of remediating one violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    pub result: BindingResult,
    /// Delivery attempt that produced `result`.
    pub attempts: u32,
    pub escalated: bool,
}

pub struct RemediationScheduler {
    controller: AssociationController,
    policy: RetryPolicy,
    notifier: Arc<dyn Notifier>,
    renderer: TemplateRenderer,
    environment: String,
}

impl RemediationScheduler {
    pub fn new(
        controller: AssociationController,
        policy: RetryPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            controller,
            policy,
            notifier,
            renderer: TemplateRenderer::new(),
            environment: "dev".to_string(),
        }
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Drive `event` to a terminal outcome.
    ///
    /// Transient failures are redelivered after the policy delay until the
    /// delivery counter reaches `max_attempts`. Permanent failures and
    /// exhausted retries are escalated exactly once.
    pub async fn run(&self, event: ViolationEvent) -> Remediation {
        let mut event = event;
        loop {
            let result = self.controller.handle(&event).await;
            match result {
                BindingResult::TransientFailure(ref reason)
                    if event.delivery_attempt < self.policy.max_attempts =>
                {
                    info!(
                        resource_id = %event.resource_id,
                        delivery_attempt = event.delivery_attempt,
                        reason = %reason,
                        delay_secs = self.policy.delay.as_secs(),
                        "Scheduling redelivery"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    event = event.redelivered();
                }
                BindingResult::TransientFailure(ref reason) => {
                    let reason = format!("{reason} (retries exhausted after {} attempts)", event.delivery_attempt);
                    self.escalate(&event, &reason).await;
                    return Remediation {
                        attempts: event.delivery_attempt,
                        result,
                        escalated: true,
                    };
                }
                BindingResult::PermanentFailure(ref reason) => {
                    self.escalate(&event, reason).await;
                    return Remediation {
                        attempts: event.delivery_attempt,
                        result,
                        escalated: true,
                    };
                }
                BindingResult::Success | BindingResult::AlreadyBound => {
                    return Remediation {
                        attempts: event.delivery_attempt,
                        result,
                        escalated: false,
                    };
                }
            }
        }
    }

    /// Notify the operator. Delivery failures are logged, never retried.
    async fn escalate(&self, event: &ViolationEvent, reason: &str) {
        let ctx = EscalationContext::new(event, reason)
            .with_web_acl(Some(self.controller.web_acl_arn().to_string()))
            .with_environment(self.environment.clone());

        let notification = match self.renderer.escalation(&ctx) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Escalation template failed, sending plain notification");
                plain_notification(&ctx)
            }
        };

        info!(
            resource_id = %event.resource_id,
            delivery_attempt = event.delivery_attempt,
            reason = %reason,
            channel = self.notifier.channel_name(),
            "Escalating to operator"
        );

        if let Err(e) = self.notifier.send(&notification).await {
            error!(
                resource_id = %event.resource_id,
                error = %e,
                "Escalation delivery failed"
            );
        }
    }
}

fn plain_notification(ctx: &EscalationContext) -> Notification {
    Notification {
        subject: format!("web ACL association failed for {}", ctx.resource_id),
        body: format!("Reason: {}\nDelivery attempt: {}", ctx.reason, ctx.delivery_attempt),
        metadata: HashMap::from([
            ("event".to_string(), "escalation".to_string()),
            ("resource_id".to_string(), ctx.resource_id.clone()),
            ("reason".to_string(), ctx.reason.clone()),
        ]),
    }
}
