//! Resource identifier validation.
//!
//! Identifiers are either full ARNs or plain resource tokens. Anything
//! else is rejected before the control API is called.

use std::fmt;

/// Longest identifier the control API accepts.
pub const MAX_IDENTIFIER_LEN: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed resource identifier: {reason}")]
pub struct MalformedIdentifier {
    pub reason: &'static str,
}

impl MalformedIdentifier {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// A resource identifier that passed syntactic validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn parse(raw: &str) -> Result<Self, MalformedIdentifier> {
        if raw.is_empty() {
            return Err(MalformedIdentifier::new("empty"));
        }
        if raw.len() > MAX_IDENTIFIER_LEN {
            return Err(MalformedIdentifier::new("too long"));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(MalformedIdentifier::new("contains whitespace or control characters"));
        }

        if let Some(rest) = raw.strip_prefix("arn:") {
            // partition:service:region:account:resource
            let parts: Vec<&str> = rest.splitn(5, ':').collect();
            if parts.len() < 5 {
                return Err(MalformedIdentifier::new("ARN has too few segments"));
            }
            if parts[0].is_empty() || parts[1].is_empty() || parts[4].is_empty() {
                return Err(MalformedIdentifier::new("ARN has an empty partition, service or resource"));
            }
        } else if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':'))
        {
            return Err(MalformedIdentifier::new("unexpected character"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_arn(&self) -> bool {
        self.0.starts_with("arn:")
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
