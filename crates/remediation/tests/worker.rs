use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use webacl_notify::{Notification, Notifier, NotifyError};
use webacl_queue::{MemoryQueue, QueueConsumer};
use webacl_remediation::{
    Association, AssociationController, ControlApi, ControlError, RemediationScheduler,
    RemediationWorker, ResourceId, RetryPolicy,
};

const WEB_ACL: &str = "arn:aws:wafv2:us-east-1:123456789012:regional/webacl/dev-webacl/abc";

fn alb(n: usize) -> String {
    format!("arn:aws:elasticloadbalancing:us-east-1:123456789012:loadbalancer/app/web-{n}/50dc6c495c0c")
}

/// Binds anything except `lb-missing`, which does not exist.
///
/// With a gate, each call waits for one `notify_one` before answering.
#[derive(Default)]
struct FakeWaf {
    bound: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl ControlApi for FakeWaf {
    async fn associate(&self, _: &str, resource: &ResourceId) -> Result<Association, ControlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        if resource.as_str() == "lb-missing" {
            return Err(ControlError::NotFound(resource.to_string()));
        }
        if self.bound.lock().unwrap().insert(resource.to_string()) {
            Ok(Association::Associated)
        } else {
            Ok(Association::AlreadyAssociated)
        }
    }
}

#[derive(Default)]
struct CountingNotifier {
    sent: AtomicUsize,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn send(&self, _: &Notification) -> Result<(), NotifyError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn channel_name(&self) -> &str {
        "counting"
    }
}

fn worker(
    queue: &Arc<MemoryQueue>,
    waf: &Arc<FakeWaf>,
    notifier: &Arc<CountingNotifier>,
) -> RemediationWorker {
    let controller = AssociationController::new(waf.clone(), WEB_ACL);
    let policy = RetryPolicy {
        max_attempts: 2,
        delay: Duration::ZERO,
    };
    let scheduler = RemediationScheduler::new(controller, policy, notifier.clone());
    RemediationWorker::new(queue.clone(), Arc::new(scheduler), 4)
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn batch_is_bound_and_acked() {
    let queue = Arc::new(MemoryQueue::new());
    for n in 0..6 {
        queue.push(alb(n));
    }
    let waf = Arc::new(FakeWaf::default());
    let notifier = Arc::new(CountingNotifier::default());
    let worker = worker(&queue, &waf, &notifier);

    let mut received = 0;
    while received < 6 {
        received += worker.run_once().await.unwrap();
    }
    worker.drain().await;
    assert_eq!(queue.acked().len(), 6);
    assert_eq!(queue.in_flight(), 0);
    assert_eq!(waf.bound.lock().unwrap().len(), 6);
    assert_eq!(notifier.sent.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn receive_is_limited_to_free_slots() {
    let queue = Arc::new(MemoryQueue::new());
    for n in 0..3 {
        queue.push(alb(n));
    }
    let waf = Arc::new(FakeWaf::default());
    let notifier = Arc::new(CountingNotifier::default());
    let controller = AssociationController::new(waf.clone(), WEB_ACL);
    let scheduler = RemediationScheduler::new(controller, RetryPolicy::default(), notifier.clone());
    let worker = RemediationWorker::new(queue.clone(), Arc::new(scheduler), 1);

    // One slot means one message leaves the queue; the rest stay visible.
    assert_eq!(worker.run_once().await.unwrap(), 1);
    assert_eq!(queue.pending(), 2);
    worker.drain().await;
    assert_eq!(queue.acked().len(), 1);

    assert_eq!(worker.run_once().await.unwrap(), 1);
    worker.drain().await;
    assert_eq!(queue.pending(), 1);
    assert_eq!(queue.acked().len(), 2);
}

#[tokio::test]
async fn duplicate_violation_is_idempotent() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(alb(1));
    queue.push(format!(r#"{{"resourceId":"{}"}}"#, alb(1)));
    let waf = Arc::new(FakeWaf::default());
    let notifier = Arc::new(CountingNotifier::default());
    let worker = worker(&queue, &waf, &notifier).with_batch_size(1);

    worker.run_once().await.unwrap();
    worker.drain().await;
    worker.run_once().await.unwrap();
    worker.drain().await;
    assert_eq!(waf.calls.load(Ordering::SeqCst), 2);
    assert_eq!(waf.bound.lock().unwrap().len(), 1);
    assert_eq!(queue.acked().len(), 2);
}

#[tokio::test]
async fn failures_are_escalated_and_acked() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push("lb-missing");
    queue.push("lb with spaces");
    queue.push("");
    let waf = Arc::new(FakeWaf::default());
    let notifier = Arc::new(CountingNotifier::default());
    let worker = worker(&queue, &waf, &notifier);

    assert_eq!(worker.run_once().await.unwrap(), 3);
    worker.drain().await;
    // Not-found, malformed and empty identifiers all escalate.
    assert_eq!(notifier.sent.load(Ordering::SeqCst), 3);
    assert_eq!(waf.calls.load(Ordering::SeqCst), 1);
    assert_eq!(queue.acked().len(), 3);
    assert_eq!(queue.pending(), 0);
}

#[tokio::test]
async fn empty_queue_polls_nothing() {
    let queue = Arc::new(MemoryQueue::new());
    let worker = worker(
        &queue,
        &Arc::new(FakeWaf::default()),
        &Arc::new(CountingNotifier::default()),
    );
    assert_eq!(worker.run_once().await.unwrap(), 0);
    assert!(queue.health_check().await.unwrap().connected);
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(alb(7));
    let waf = Arc::new(FakeWaf::default());
    let worker = Arc::new(worker(&queue, &waf, &Arc::new(CountingNotifier::default())));
    let shutdown = Arc::new(Notify::new());

    let handle = tokio::spawn({
        let worker = worker.clone();
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    wait_until(|| !queue.acked().is_empty()).await;
    shutdown.notify_one();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert_eq!(queue.acked().len(), 1);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_violation() {
    let queue = Arc::new(MemoryQueue::new());
    queue.push(alb(8));
    let gate = Arc::new(Notify::new());
    let waf = Arc::new(FakeWaf {
        gate: Some(gate.clone()),
        ..FakeWaf::default()
    });
    let worker = Arc::new(worker(&queue, &waf, &Arc::new(CountingNotifier::default())));
    let shutdown = Arc::new(Notify::new());

    let handle = tokio::spawn({
        let worker = worker.clone();
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    wait_until(|| waf.calls.load(Ordering::SeqCst) == 1).await;
    shutdown.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished(), "worker returned with a violation in flight");
    assert!(queue.acked().is_empty());

    gate.notify_one();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert_eq!(queue.acked().len(), 1);
    assert_eq!(waf.bound.lock().unwrap().len(), 1);
}
