//! Association controller: one violation event in, one binding result out.
//!
//! The controller never panics and never returns an error. Every failure
//! is folded into a [`BindingResult`] so the scheduler can decide whether
//! to try again.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{info, warn};

use webacl_core::ViolationEvent;

use crate::control::{Association, ControlApi};
use crate::resource::ResourceId;

/// Bound on a single control API call.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of handling one violation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingResult {
    Success,
    AlreadyBound,
    /// Retrying may help (throttling, timeouts, unexpected errors).
    TransientFailure(String),
    /// Retrying cannot help (malformed identifier, missing resource, denied).
    PermanentFailure(String),
}

impl BindingResult {
    /// The resource carries the web ACL after this attempt.
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Success | Self::AlreadyBound)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFailure(_))
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::AlreadyBound => "already-bound",
            Self::TransientFailure(_) => "transient-failure",
            Self::PermanentFailure(_) => "permanent-failure",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::TransientFailure(r) | Self::PermanentFailure(r) => Some(r),
            Self::Success | Self::AlreadyBound => None,
        }
    }
}

impl fmt::Display for BindingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({reason})", self.outcome()),
            None => f.write_str(self.outcome()),
        }
    }
}

/// Binds the configured web ACL to the resource named by each event.
pub struct AssociationController {
    api: Arc<dyn ControlApi>,
    web_acl_arn: String,
    timeout: Duration,
}

impl AssociationController {
    pub fn new(api: Arc<dyn ControlApi>, web_acl_arn: impl Into<String>) -> Self {
        Self {
            api,
            web_acl_arn: web_acl_arn.into(),
            timeout: DEFAULT_CONTROL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn web_acl_arn(&self) -> &str {
        &self.web_acl_arn
    }

    /// Handle one delivery of `event`.
    ///
    /// Malformed identifiers are rejected without calling the control API.
    /// Calls that exceed the timeout or panic are reported as transient.
    pub async fn handle(&self, event: &ViolationEvent) -> BindingResult {
        let start = Instant::now();
        let result = self.bind(event).await;
        record(event, &result, start.elapsed());
        result
    }

    async fn bind(&self, event: &ViolationEvent) -> BindingResult {
        let resource = match ResourceId::parse(&event.resource_id) {
            Ok(resource) => resource,
            Err(e) => {
                warn!(resource_id = %event.resource_id, error = %e, "Rejecting violation event");
                return BindingResult::PermanentFailure("malformed-identifier".to_string());
            }
        };

        let call = tokio::time::timeout(self.timeout, self.api.associate(&self.web_acl_arn, &resource));

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(Ok(Association::Associated))) => BindingResult::Success,
            Ok(Ok(Ok(Association::AlreadyAssociated))) => BindingResult::AlreadyBound,
            Ok(Ok(Err(e))) => {
                warn!(resource_id = %resource, error = %e, "Control API call failed");
                if e.is_transient() {
                    BindingResult::TransientFailure(e.reason_code().to_string())
                } else {
                    BindingResult::PermanentFailure(e.reason_code().to_string())
                }
            }
            Ok(Err(_elapsed)) => BindingResult::TransientFailure("timeout".to_string()),
            Err(panic) => {
                warn!(
                    resource_id = %resource,
                    panic = %panic_message(panic.as_ref()),
                    "Control API call panicked"
                );
                BindingResult::TransientFailure("internal-error".to_string())
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn record(event: &ViolationEvent, result: &BindingResult, elapsed: Duration) {
    let duration_ms = elapsed.as_millis() as u64;
    let reason = result.reason().unwrap_or("");
    if result.is_bound() {
        info!(
            target: "webacl::remediation",
            resource_id = %event.resource_id,
            delivery_attempt = event.delivery_attempt,
            outcome = result.outcome(),
            duration_ms,
            "Association handled"
        );
    } else {
        warn!(
            target: "webacl::remediation",
            resource_id = %event.resource_id,
            delivery_attempt = event.delivery_attempt,
            outcome = result.outcome(),
            reason,
            duration_ms,
            "Association handled"
        );
    }
}
