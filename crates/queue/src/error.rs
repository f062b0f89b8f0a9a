//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("message parse error: {0}")]
    Parse(String),

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl From<webacl_core::CoreError> for QueueError {
    fn from(e: webacl_core::CoreError) -> Self {
        QueueError::Config(e.to_string())
    }
}
