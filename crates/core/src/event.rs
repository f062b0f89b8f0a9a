//! Compliance violation events shared by the queue and remediation crates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification that a governed resource is missing its web ACL binding.
///
/// Produced by the compliance scanner and delivered through the violation
/// topic. `delivery_attempt` starts at 1 and is bumped on every redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// Identifier of the offending resource (a load balancer ARN in practice).
    pub resource_id: String,
    /// When the scanner raised the violation.
    pub raised_at: DateTime<Utc>,
    /// 1-based delivery counter.
    pub delivery_attempt: u32,
}

impl ViolationEvent {
    /// First delivery of a freshly raised violation.
    pub fn new(resource_id: impl Into<String>, raised_at: DateTime<Utc>) -> Self {
        Self {
            resource_id: resource_id.into(),
            raised_at,
            delivery_attempt: 1,
        }
    }

    /// Same event with an explicit delivery counter (e.g. from a queue receive count).
    pub fn with_attempt(mut self, delivery_attempt: u32) -> Self {
        self.delivery_attempt = delivery_attempt.max(1);
        self
    }

    /// The event as it looks on its next redelivery.
    pub fn redelivered(&self) -> Self {
        Self {
            resource_id: self.resource_id.clone(),
            raised_at: self.raised_at,
            delivery_attempt: self.delivery_attempt.saturating_add(1),
        }
    }
}

impl fmt::Display for ViolationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ViolationEvent {{ resource: {}, attempt: {}, raised_at: {} }}",
            self.resource_id,
            self.delivery_attempt,
            self.raised_at.to_rfc3339()
        )
    }
}
