//! Automatic web ACL remediation.
//!
//! Violation events from the compliance scanner flow through
//! [`RemediationWorker`] into [`RemediationScheduler`], which drives an
//! [`AssociationController`] against the control API and escalates to an
//! operator when automation gives up.

pub mod control;
pub mod controller;
pub mod resource;
pub mod scheduler;
pub mod wafv2;
pub mod worker;

pub use control::{classify_code, Association, ControlApi, ControlError};
pub use controller::{AssociationController, BindingResult};
pub use resource::{MalformedIdentifier, ResourceId};
pub use scheduler::{Remediation, RemediationScheduler, RetryPolicy};
pub use wafv2::Wafv2ControlApi;
pub use worker::RemediationWorker;
