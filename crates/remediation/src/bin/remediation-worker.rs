//! remediation-worker: binds the web ACL to resources flagged by the compliance scanner.
//!
//! Consumes violation events from the violation queue, associates the
//! configured web ACL with each offending resource and escalates to an
//! operator when that fails.

use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use webacl_core::config::{load_dotenv, Config};
use webacl_notify::{Dispatcher, LogNotifier, Notifier, TemplateRenderer, WebhookNotifier};
use webacl_queue::{QueueConsumer, SqsConsumer};
use webacl_remediation::{
    AssociationController, RemediationScheduler, RemediationWorker, RetryPolicy, Wafv2ControlApi,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Remediation worker: associates the web ACL with non-compliant resources.
#[derive(Parser, Debug)]
#[command(name = "remediation-worker", version, about)]
struct Cli {
    /// Config profile (overrides WEBACL_PROFILE).
    #[arg(long, env = "WEBACL_PROFILE")]
    profile: Option<String>,

    /// Messages received per poll (1-10).
    #[arg(long, env = "REMEDIATION_BATCH_SIZE", default_value_t = 10)]
    batch_size: u32,

    /// Process a single batch and exit.
    #[arg(long)]
    once: bool,
}

fn build_notifier(config: &Config, renderer: Arc<TemplateRenderer>) -> anyhow::Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new(vec![Box::new(LogNotifier)]);
    if let Some(ref url) = config.escalation.webhook_url {
        let webhook = WebhookNotifier::new(
            url.clone(),
            config.escalation.webhook_body_template.clone(),
            renderer,
            config.escalation.webhook_timeout(),
        )?;
        dispatcher.add_channel(Box::new(webhook));
    }
    Ok(dispatcher)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = match cli.profile {
        Some(ref profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let web_acl_arn = config.remediation.require_web_acl_arn()?.to_string();

    let renderer = TemplateRenderer::with_templates(
        config.escalation.subject_template.clone(),
        config.escalation.body_template.clone(),
    )?;
    let notifier = build_notifier(&config, Arc::new(renderer.clone()))?;
    info!(channels = ?notifier.channel_names(), "Escalation channels configured");

    let control = Arc::new(Wafv2ControlApi::new(&config.aws));
    let controller = AssociationController::new(control, web_acl_arn)
        .with_timeout(config.remediation.control_timeout());
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);

    // A message must not become visible again while its violation is still
    // being worked on, or another consumer would pick it up.
    let policy = RetryPolicy::from_config(&config.remediation);
    let budget = policy.in_flight_budget(
        config.remediation.control_timeout(),
        config.escalation.webhook_timeout(),
    );
    if budget > config.queue.visibility_timeout() {
        bail!(
            "QUEUE_VISIBILITY_TIMEOUT_SECS ({}s) is shorter than the worst-case time a violation stays in flight ({}s); raise it or lower the retry settings",
            config.queue.visibility_timeout_secs,
            budget.as_secs()
        );
    }

    let scheduler = RemediationScheduler::new(controller, policy, notifier)
        .with_renderer(renderer)
        .with_environment(config.service.environment.clone());

    let queue = SqsConsumer::new(&config.aws, &config.queue)?;
    match queue.health_check().await {
        Ok(health) => info!(
            provider = %health.provider,
            approximate_messages = ?health.approximate_message_count,
            "Violation queue reachable"
        ),
        Err(e) => warn!(error = %e, "Violation queue health check failed, polling anyway"),
    }

    let worker = RemediationWorker::new(
        Arc::new(queue),
        Arc::new(scheduler),
        config.remediation.concurrency,
    )
    .with_batch_size(cli.batch_size);

    if cli.once {
        let processed = worker.run_once().await?;
        worker.drain().await;
        info!(processed, "remediation-worker processed one batch");
        return Ok(());
    }

    let shutdown = Arc::new(Notify::new());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.notify_one();
            }
        }
    });

    info!("remediation-worker starting");
    worker.run(shutdown).await;
    info!("remediation-worker exited cleanly");

    Ok(())
}
