use thiserror::Error;

use crate::container::ContainerError;
use crate::process::ProcessError;

pub type LocalResult<T> = Result<T, LocalError>;

/// Local provisioning failures that are not recovered to a stub.
#[derive(Debug, Error)]
pub enum LocalError {
    #[error("invalid container spec: {0}")]
    InvalidSpec(#[from] ContainerError),

    /// The runtime refused to start the container.
    #[error("container failed to start: {0}")]
    Start(#[source] ProcessError),
}
