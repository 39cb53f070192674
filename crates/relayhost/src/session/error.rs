//! Session error types.

use thiserror::Error;

use crate::process::ProcessError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request is missing or has an invalid field.
    #[error("{0}")]
    Validation(String),

    /// No backend may serve the request.
    #[error("{0}")]
    Unavailable(String),

    /// The local runtime could not start the game server.
    #[error("container failed to start: {0}")]
    ContainerStart(#[source] ProcessError),

    /// The control plane could not tear the session down.
    #[error("control plane teardown failed: {0}")]
    Remote(String),

    /// The local runtime could not remove the container.
    #[error("failed to remove container: {0}")]
    Teardown(#[source] ProcessError),
}
