//! Operator notification channel for remediation escalations.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook and log notifier implementations
//! - Minijinja template rendering for escalation messages
//! - Dispatcher that fans a notification out to every configured channel

pub mod dispatcher;
pub mod log;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use log::LogNotifier;
pub use templating::{EscalationContext, TemplateRenderer};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
