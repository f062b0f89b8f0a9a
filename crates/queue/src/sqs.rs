//! AWS SQS consumer for the violation queue.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use webacl_core::config::{AwsConfig, QueueConfig};

use crate::consumer::{QueueConsumer, QueueHealth, QueueMessage};
use crate::error::QueueError;

/// Long-poll wait per receive call, the SQS maximum.
const WAIT_TIME_SECS: i32 = 20;

/// SQS-backed violation queue consumer.
pub struct SqsConsumer {
    client: Client,
    queue_url: String,
    visibility_timeout_secs: i32,
}

impl SqsConsumer {
    /// Create a consumer for `VIOLATION_QUEUE_URL`.
    pub fn new(aws: &AwsConfig, queue: &QueueConfig) -> Result<Self, QueueError> {
        let queue_url = queue.require_queue_url()?.to_string();
        let region = aws_sdk_sqs::config::Region::new(aws.region.clone());

        // Built directly rather than through aws_config::defaults() so the
        // profiled endpoint override is the only one honoured.
        let mut sqs_config = aws_sdk_sqs::Config::builder()
            .region(region.clone())
            .behavior_version(BehaviorVersion::latest());

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "webacl-queue-static",
            );
            sqs_config = sqs_config.credentials_provider(creds);
        }

        if let Some(url) = aws.endpoint() {
            sqs_config = sqs_config.endpoint_url(&url);
        }

        let client = Client::from_conf(sqs_config.build());

        info!(
            queue_url = %queue_url,
            region = %aws.region,
            "SQS consumer initialized"
        );

        Ok(Self {
            client,
            queue_url,
            visibility_timeout_secs: i32::try_from(queue.visibility_timeout_secs).unwrap_or(i32::MAX),
        })
    }
}

#[async_trait]
impl QueueConsumer for SqsConsumer {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        // SQS caps at 10 messages per request.
        let capped = max_messages.min(10) as i32;

        debug!(max_messages = capped, "Polling SQS");

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(WAIT_TIME_SECS)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

        let sqs_messages = resp.messages.unwrap_or_default();
        debug!(count = sqs_messages.len(), "Received SQS messages");

        Ok(sqs_messages.into_iter().filter_map(to_queue_message).collect())
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        debug!(receipt_handle, "Acking SQS message");

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Ack(format!("SQS delete failed: {e:?}")))?;

        Ok(())
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS health check failed: {e:?}")))?;

        let count = resp
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok());

        Ok(QueueHealth {
            connected: true,
            approximate_message_count: count,
            provider: "sqs".to_string(),
        })
    }
}

/// Convert an SQS message, skipping it when SQS omits the receipt handle.
///
/// Such a message cannot be acked; it reappears after the visibility
/// timeout and is handled on that delivery.
fn to_queue_message(msg: Message) -> Option<QueueMessage> {
    let id = msg.message_id().unwrap_or("unknown").to_string();

    let Some(receipt_handle) = msg.receipt_handle().map(str::to_string) else {
        warn!(message_id = %id, "SQS message has no receipt handle, skipping");
        return None;
    };

    // SentTimestamp is epoch millis.
    let timestamp = msg
        .attributes()
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::SentTimestamp))
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    let attempt_count = msg
        .attributes()
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|c| c.parse::<u32>().ok())
        .unwrap_or(1);

    Some(QueueMessage {
        id,
        body: msg.body().unwrap_or("").to_string(),
        receipt_handle,
        timestamp,
        attempt_count,
    })
}
