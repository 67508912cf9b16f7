//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur at the environment boundaries.
///
/// None of these are fatal to the pipeline; the core counts publish
/// failures and the host decides when to escalate.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The byte source is exhausted or the device went away.
    #[error("byte source closed: {0}")]
    SourceClosed(String),

    /// The publisher rejected or dropped a delivery.
    #[error("publish failed: {0}")]
    PublishFailed(String),
}

impl EnvError {
    /// Creates a publish error.
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }
}
