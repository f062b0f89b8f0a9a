//! Minijinja template rendering for escalation messages.
//!
//! Templates are arbitrary strings (configured per deployment, not
//! pre-registered), so a fresh [`minijinja::Environment`] is created per
//! render call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use webacl_core::ViolationEvent;

use crate::traits::{Notification, NotifyError};

pub const DEFAULT_SUBJECT_TEMPLATE: &str =
    "[{{ environment | upper }}] web ACL association failed for {{ resource_id }}";

pub const DEFAULT_BODY_TEMPLATE: &str = "\
Automatic remediation gave up on {{ resource_id }}.

Reason: {{ reason }}
Delivery attempt: {{ delivery_attempt }}
Violation raised at: {{ raised_at }}
{% if web_acl %}Web ACL: {{ web_acl }}
{% endif %}
Associate the web ACL manually or investigate the failure before the next compliance scan.";

/// Data available to escalation templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EscalationContext {
    pub resource_id: String,
    /// RFC 3339.
    pub raised_at: String,
    pub delivery_attempt: u32,
    /// Failure reason from the last association attempt.
    pub reason: String,
    pub web_acl: Option<String>,
    pub environment: String,
    /// RFC 3339.
    pub now: String,
}

impl EscalationContext {
    pub fn new(event: &ViolationEvent, reason: impl Into<String>) -> Self {
        Self::at(event, reason, Utc::now())
    }

    /// Same as [`EscalationContext::new`] with an explicit render time.
    pub fn at(event: &ViolationEvent, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            resource_id: event.resource_id.clone(),
            raised_at: event.raised_at.to_rfc3339(),
            delivery_attempt: event.delivery_attempt,
            reason: reason.into(),
            web_acl: None,
            environment: "dev".to_string(),
            now: now.to_rfc3339(),
        }
    }

    pub fn with_web_acl(mut self, web_acl: Option<String>) -> Self {
        self.web_acl = web_acl;
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }
}

/// Renders notification templates using minijinja.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    subject_template: Option<String>,
    body_template: Option<String>,
}

impl TemplateRenderer {
    /// Renderer using the built-in escalation templates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer with deployment-specific templates; `None` keeps the
    /// built-in template for that part. Syntax is checked up front.
    pub fn with_templates(
        subject_template: Option<String>,
        body_template: Option<String>,
    ) -> Result<Self, NotifyError> {
        let renderer = Self {
            subject_template,
            body_template,
        };
        if let Some(ref tmpl) = renderer.subject_template {
            renderer.validate(tmpl)?;
        }
        if let Some(ref tmpl) = renderer.body_template {
            renderer.validate(tmpl)?;
        }
        Ok(renderer)
    }

    /// Build a configured minijinja environment with custom filters and globals.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("lower", lower_filter);
        env.add_filter("upper", upper_filter);
        env.add_function("env", env_function);
        env
    }

    /// Render a template string with any serializable context.
    pub fn render<S: serde::Serialize>(
        &self,
        template_str: &str,
        ctx: &S,
    ) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that a template string parses, without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    /// Render the escalation notification for `ctx`.
    pub fn escalation(&self, ctx: &EscalationContext) -> Result<Notification, NotifyError> {
        let subject = self.render(
            self.subject_template
                .as_deref()
                .unwrap_or(DEFAULT_SUBJECT_TEMPLATE),
            ctx,
        )?;
        let body = self.render(
            self.body_template.as_deref().unwrap_or(DEFAULT_BODY_TEMPLATE),
            ctx,
        )?;

        let mut metadata = HashMap::from([
            ("event".to_string(), "escalation".to_string()),
            ("resource_id".to_string(), ctx.resource_id.clone()),
            ("reason".to_string(), ctx.reason.clone()),
            ("delivery_attempt".to_string(), ctx.delivery_attempt.to_string()),
        ]);
        if let Some(ref web_acl) = ctx.web_acl {
            metadata.insert("web_acl".to_string(), web_acl.clone());
        }

        Ok(Notification {
            subject,
            body,
            metadata,
        })
    }
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}

fn upper_filter(value: String) -> String {
    value.to_uppercase()
}

/// Global function: read an environment variable by name.
///
/// Returns an empty string (and logs a warning) when it is not set.
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "Environment variable not found, returning empty string");
            String::new()
        }
    }
}
