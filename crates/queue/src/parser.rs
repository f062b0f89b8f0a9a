//! Parse violation notification bodies into [`ViolationEvent`]s.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use webacl_core::ViolationEvent;

use crate::consumer::QueueMessage;
use crate::error::QueueError;

/// Field names carrying the resource identifier, tried in order.
const RESOURCE_ID_KEYS: &[&str] = &["resourceId", "resource_id", "ResourceId"];

/// Parse a single queue message into a [`ViolationEvent`].
///
/// Accepted bodies:
/// - a bare resource identifier (optionally a JSON string)
/// - a JSON object with one of the [`RESOURCE_ID_KEYS`]
/// - an SNS envelope (`{"Type":"Notification","Message":...}`) wrapping
///   either of the above
///
/// `raised_at` comes from the envelope `Timestamp` when present, otherwise
/// the queue's sent timestamp. `delivery_attempt` is the receive count.
/// The identifier itself is not validated here; the association
/// controller owns that decision. A blank body yields an empty identifier
/// so it is rejected and escalated there rather than dropped.
pub fn parse_message(msg: &QueueMessage) -> Result<ViolationEvent, QueueError> {
    let (resource_id, raised_at) = extract(&msg.id, &msg.body, true)?;
    Ok(ViolationEvent::new(resource_id, raised_at.unwrap_or(msg.timestamp))
        .with_attempt(msg.attempt_count))
}

fn extract(
    msg_id: &str,
    body: &str,
    allow_envelope: bool,
) -> Result<(String, Option<DateTime<Utc>>), QueueError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok((String::new(), None));
    }

    if !trimmed.starts_with(['{', '[', '"']) {
        return Ok((trimmed.to_string(), None));
    }

    let json: Value = serde_json::from_str(trimmed)
        .map_err(|e| QueueError::Parse(format!("Invalid JSON in message {msg_id}: {e}")))?;

    match json {
        Value::String(s) => Ok((s.trim().to_string(), None)),
        Value::Object(obj) if allow_envelope && is_envelope(&obj) => {
            let inner = obj
                .get("Message")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    QueueError::Parse(format!("Message {msg_id} envelope has no Message"))
                })?;
            let (resource_id, _) = extract(msg_id, inner, false)?;
            let raised_at = obj
                .get("Timestamp")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<DateTime<Utc>>().ok());
            Ok((resource_id, raised_at))
        }
        Value::Object(obj) => RESOURCE_ID_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(|s| (s.trim().to_string(), None))
            .ok_or_else(|| {
                QueueError::Parse(format!("Message {msg_id} has no resource identifier"))
            }),
        _ => Err(QueueError::Parse(format!(
            "Message {msg_id} body is not a string or JSON object"
        ))),
    }
}

fn is_envelope(obj: &Map<String, Value>) -> bool {
    obj.get("Type").and_then(Value::as_str) == Some("Notification") && obj.contains_key("Message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ARN: &str =
        "arn:aws:elasticloadbalancing:us-east-1:123456789012:loadbalancer/app/web/50dc6c495c0c9188";

    fn make_msg(body: &str, attempt_count: u32) -> QueueMessage {
        QueueMessage {
            id: "msg-1".to_string(),
            body: body.to_string(),
            receipt_handle: "handle-test".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            attempt_count,
        }
    }

    #[test]
    fn test_parse_bare_identifier() {
        let msg = make_msg(&format!("  {ARN}\n"), 1);
        let event = parse_message(&msg).unwrap();
        assert_eq!(event.resource_id, ARN);
        assert_eq!(event.raised_at, msg.timestamp);
        assert_eq!(event.delivery_attempt, 1);
    }

    #[test]
    fn test_parse_json_string_body() {
        let event = parse_message(&make_msg(&format!("\"{ARN}\""), 1)).unwrap();
        assert_eq!(event.resource_id, ARN);
    }

    #[test]
    fn test_parse_json_object_key_variants() {
        for key in RESOURCE_ID_KEYS {
            let body = format!(r#"{{"{key}":"{ARN}","detail":"x"}}"#);
            let event = parse_message(&make_msg(&body, 1)).unwrap();
            assert_eq!(event.resource_id, ARN, "key {key}");
        }
    }

    #[test]
    fn test_parse_sns_envelope_uses_envelope_timestamp() {
        let body = serde_json::json!({
            "Type": "Notification",
            "MessageId": "abc",
            "TopicArn": "arn:aws:sns:us-east-1:123456789012:awswafwebacl-dev",
            "Message": ARN,
            "Timestamp": "2025-02-28T23:59:00.000Z",
        })
        .to_string();
        let event = parse_message(&make_msg(&body, 1)).unwrap();
        assert_eq!(event.resource_id, ARN);
        assert_eq!(
            event.raised_at,
            Utc.with_ymd_and_hms(2025, 2, 28, 23, 59, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_sns_envelope_with_json_message() {
        let inner = serde_json::json!({ "resourceId": ARN }).to_string();
        let body = serde_json::json!({ "Type": "Notification", "Message": inner }).to_string();
        let event = parse_message(&make_msg(&body, 1)).unwrap();
        assert_eq!(event.resource_id, ARN);
    }

    #[test]
    fn test_attempt_comes_from_receive_count() {
        let event = parse_message(&make_msg(ARN, 3)).unwrap();
        assert_eq!(event.delivery_attempt, 3);
        let event = parse_message(&make_msg(ARN, 0)).unwrap();
        assert_eq!(event.delivery_attempt, 1);
    }

    #[test]
    fn test_parse_rejects_unusable_bodies() {
        for body in ["{not json", r#"{"other":"x"}"#, "[1,2]"] {
            let err = parse_message(&make_msg(body, 1)).unwrap_err();
            assert!(matches!(err, QueueError::Parse(_)), "body {body:?}");
        }
    }

    #[test]
    fn test_blank_body_yields_empty_identifier() {
        for body in ["", "   \n"] {
            let event = parse_message(&make_msg(body, 2)).unwrap();
            assert_eq!(event.resource_id, "", "body {body:?}");
            assert_eq!(event.delivery_attempt, 2);
        }
    }

    #[test]
    fn test_malformed_identifier_passes_through() {
        let event = parse_message(&make_msg("not-an-arn", 1)).unwrap();
        assert_eq!(event.resource_id, "not-an-arn");
    }
}
