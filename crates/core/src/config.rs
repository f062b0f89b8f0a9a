use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub service: ServiceConfig,
    pub aws: AwsConfig,
    pub queue: QueueConfig,
    pub remediation: RemediationConfig,
    pub escalation: EscalationConfig,
    pub rules: RulesConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `WEBACL_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("WEBACL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            service: ServiceConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            remediation: RemediationConfig::from_env_profiled(p),
            escalation: EscalationConfig::from_env_profiled(p),
            rules: RulesConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  service:     name={}, environment={}", self.service.name, self.service.environment);
        tracing::info!("  aws:         region={}, static_credentials={}", self.aws.region, self.aws.has_static_credentials());
        tracing::info!("  queue:       url={}", self.queue.queue_url.as_deref().unwrap_or("(none)"));
        tracing::info!(
            "  remediation: web_acl={}, max_attempts={}, retry_delay={}s, timeout={}s",
            self.remediation.web_acl_arn.as_deref().unwrap_or("(none)"),
            self.remediation.max_attempts,
            self.remediation.retry_delay_secs,
            self.remediation.control_timeout_secs
        );
        tracing::info!("  escalation:  webhook_configured={}", self.escalation.webhook_url.is_some());
        tracing::info!("  rules:       path={}", self.rules.path.display());
    }

    /// Return a redacted view safe for diagnostics output (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "service": { "name": self.service.name, "environment": self.service.environment },
            "aws": {
                "region": self.aws.region,
                "static_credentials": self.aws.has_static_credentials(),
                "endpoint_url": self.aws.endpoint_url,
            },
            "queue": { "url": self.queue.queue_url, "visibility_timeout_secs": self.queue.visibility_timeout_secs },
            "remediation": {
                "web_acl_arn": self.remediation.web_acl_arn,
                "max_attempts": self.remediation.max_attempts,
                "retry_delay_secs": self.remediation.retry_delay_secs,
                "control_timeout_secs": self.remediation.control_timeout_secs,
                "concurrency": self.remediation.concurrency,
            },
            "escalation": { "webhook_configured": self.escalation.webhook_url.is_some() },
            "rules": { "path": self.rules.path },
        })
    }
}

// ── Service naming ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub environment: String,
}

impl ServiceConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            name: profiled_env_or(p, "SERVICE_NAME", "awswafwebacl"),
            environment: profiled_env_or(p, "ENVIRONMENT", "dev"),
        }
    }

    /// `{service}-{environment}`, used as web ACL name and top-level metric name.
    pub fn web_acl_name(&self) -> String {
        format!("{}-{}", self.name, self.environment)
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    /// Endpoint override normalized to carry a scheme.
    pub fn endpoint(&self) -> Option<String> {
        self.endpoint_url.as_ref().map(|endpoint| {
            if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("https://{endpoint}")
            }
        })
    }
}

// ── Violation queue ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_url: Option<String>,
    pub visibility_timeout_secs: u32,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            queue_url: profiled_env_opt(p, "VIOLATION_QUEUE_URL"),
            visibility_timeout_secs: profiled_env_u32(p, "QUEUE_VISIBILITY_TIMEOUT_SECS", 300),
        }
    }

    /// How long a received message stays hidden from other consumers.
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs.into())
    }

    pub fn require_queue_url(&self) -> Result<&str, CoreError> {
        self.queue_url
            .as_deref()
            .ok_or_else(|| CoreError::MissingConfig("VIOLATION_QUEUE_URL".to_string()))
    }
}

// ── Remediation ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// The fixed protection policy bound to every offending resource.
    pub web_acl_arn: Option<String>,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub control_timeout_secs: u64,
    pub concurrency: usize,
}

impl RemediationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            web_acl_arn: profiled_env_opt(p, "WEB_ACL_ARN"),
            max_attempts: profiled_env_u32(p, "REMEDIATION_MAX_ATTEMPTS", 2),
            retry_delay_secs: profiled_env_u64(p, "REMEDIATION_RETRY_DELAY_SECS", 60),
            control_timeout_secs: profiled_env_u64(p, "CONTROL_API_TIMEOUT_SECS", 5),
            concurrency: profiled_env_u32(p, "REMEDIATION_CONCURRENCY", 10) as usize,
        }
    }

    pub fn require_web_acl_arn(&self) -> Result<&str, CoreError> {
        self.web_acl_arn
            .as_deref()
            .ok_or_else(|| CoreError::MissingConfig("WEB_ACL_ARN".to_string()))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_secs)
    }
}

// ── Operator escalation ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    pub webhook_url: Option<String>,
    /// minijinja template for the webhook request body; JSON when unset.
    pub webhook_body_template: Option<String>,
    pub webhook_timeout_secs: u64,
    pub subject_template: Option<String>,
    pub body_template: Option<String>,
}

impl EscalationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            webhook_url: profiled_env_opt(p, "ESCALATION_WEBHOOK_URL"),
            webhook_body_template: profiled_env_opt(p, "ESCALATION_WEBHOOK_BODY_TEMPLATE"),
            webhook_timeout_secs: profiled_env_u64(p, "ESCALATION_WEBHOOK_TIMEOUT_SECS", 10),
            subject_template: profiled_env_opt(p, "ESCALATION_SUBJECT_TEMPLATE"),
            body_template: profiled_env_opt(p, "ESCALATION_BODY_TEMPLATE"),
        }
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

// ── Rule files ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    pub path: PathBuf,
}

impl RulesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            path: PathBuf::from(profiled_env_or(p, "RULES_PATH", "config/rules")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_remediation_settings() {
        let config = Config::for_profile("CFGTEST_DEFAULTS");
        assert_eq!(config.remediation.max_attempts, 2);
        assert_eq!(config.remediation.retry_delay(), Duration::from_secs(60));
        assert_eq!(config.remediation.control_timeout(), Duration::from_secs(5));
        assert_eq!(config.escalation.webhook_timeout(), Duration::from_secs(10));
        assert_eq!(config.queue.visibility_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn profiled_key_wins_over_plain_key() {
        env::set_var("CFGTEST_PROFILED_WEB_ACL_ARN", "arn:aws:wafv2:us-east-1:1:regional/webacl/p/1");
        let config = Config::for_profile("cfgtest_profiled");
        assert_eq!(
            config.remediation.web_acl_arn.as_deref(),
            Some("arn:aws:wafv2:us-east-1:1:regional/webacl/p/1")
        );
        assert_eq!(config.profile_label(), "CFGTEST_PROFILED");
        env::remove_var("CFGTEST_PROFILED_WEB_ACL_ARN");
    }

    #[test]
    fn missing_required_keys_are_reported_by_name() {
        let remediation = RemediationConfig {
            web_acl_arn: None,
            max_attempts: 2,
            retry_delay_secs: 60,
            control_timeout_secs: 5,
            concurrency: 1,
        };
        match remediation.require_web_acl_arn() {
            Err(CoreError::MissingConfig(key)) => assert_eq!(key, "WEB_ACL_ARN"),
            other => panic!("expected MissingConfig, got {other:?}"),
        }
    }

    #[test]
    fn web_acl_name_joins_service_and_environment() {
        let service = ServiceConfig {
            name: "awswafwebacl".to_string(),
            environment: "prod".to_string(),
        };
        assert_eq!(service.web_acl_name(), "awswafwebacl-prod");
    }

    #[test]
    fn endpoint_gets_https_scheme_when_missing() {
        let aws = AwsConfig {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: Some("localhost:4566".to_string()),
        };
        assert_eq!(aws.endpoint().as_deref(), Some("https://localhost:4566"));
    }

    #[test]
    fn redacted_summary_omits_secrets() {
        let mut config = Config::for_profile("CFGTEST_REDACT");
        config.aws.secret_access_key = Some("super-secret".to_string());
        let summary = config.redacted_summary().to_string();
        assert!(!summary.contains("super-secret"));
    }
}
