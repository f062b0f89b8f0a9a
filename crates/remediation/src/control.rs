//! The control API seam: binding a web ACL to a resource.

use async_trait::async_trait;

use crate::resource::ResourceId;

/// Successful outcome of an association call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// The web ACL was bound by this call.
    Associated,
    /// The resource was already bound to the requested web ACL.
    AlreadyAssociated,
}

/// Failures reported by the control API, split by whether a retry can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("control API call timed out")]
    Timeout,

    #[error("resource temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("control API internal error: {0}")]
    Internal(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ControlError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Throttled(_) | Self::Network(_) | Self::Timeout | Self::Unavailable(_) | Self::Internal(_)
        )
    }

    /// Short machine-readable reason carried in binding results and escalations.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Throttled(_) => "throttled",
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal-error",
            Self::AccessDenied(_) => "access-denied",
            Self::NotFound(_) => "not-found",
            Self::InvalidParameter(_) => "invalid-parameter",
        }
    }
}

/// Map a service error code to a [`ControlError`].
///
/// Unknown codes are treated as internal errors, which are retried.
pub fn classify_code(code: Option<&str>, message: impl Into<String>) -> ControlError {
    let message = message.into();
    match code.unwrap_or_default() {
        "WAFNonexistentItemException" | "ResourceNotFoundException" => ControlError::NotFound(message),
        "AccessDeniedException" | "WAFInvalidPermissionPolicyException" => {
            ControlError::AccessDenied(message)
        }
        "WAFInvalidParameterException" | "WAFInvalidOperationException" | "ValidationException" => {
            ControlError::InvalidParameter(message)
        }
        "ThrottlingException" | "TooManyRequestsException" => {
            ControlError::Throttled(message)
        }
        "WAFUnavailableEntityException" => ControlError::Unavailable(message),
        "" => ControlError::Internal(message),
        other => ControlError::Internal(format!("{other}: {message}")),
    }
}

/// Binds the fixed web ACL to resources.
///
/// Implementations must be idempotent: binding a resource that already
/// carries the requested web ACL reports [`Association::AlreadyAssociated`].
#[async_trait]
pub trait ControlApi: Send + Sync {
    async fn associate(
        &self,
        web_acl_arn: &str,
        resource: &ResourceId,
    ) -> Result<Association, ControlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_permanent_codes() {
        let cases = [
            ("WAFNonexistentItemException", "not-found"),
            ("AccessDeniedException", "access-denied"),
            ("WAFInvalidPermissionPolicyException", "access-denied"),
            ("WAFInvalidParameterException", "invalid-parameter"),
            ("WAFInvalidOperationException", "invalid-parameter"),
        ];
        for (code, reason) in cases {
            let err = classify_code(Some(code), "boom");
            assert!(!err.is_transient(), "{code}");
            assert_eq!(err.reason_code(), reason);
        }
    }

    #[test]
    fn classifies_transient_codes() {
        for code in ["ThrottlingException", "WAFUnavailableEntityException", "WAFInternalErrorException"] {
            assert!(classify_code(Some(code), "boom").is_transient(), "{code}");
        }
    }

    #[test]
    fn unknown_and_missing_codes_are_retried() {
        let err = classify_code(Some("SomethingNew"), "boom");
        assert_eq!(err, ControlError::Internal("SomethingNew: boom".into()));
        assert!(classify_code(None, "boom").is_transient());
    }
}
