//! Container runtime error types.

use thiserror::Error;

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors raised while building or validating a container invocation.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
