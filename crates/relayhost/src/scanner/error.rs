//! Log scan error types.

use thiserror::Error;

use crate::process::ProcessError;

/// Result type for log scans.
pub type ScanResult<T> = Result<T, ScanError>;

/// Reasons a log scan ends without a join code.
#[derive(Debug, Error)]
pub enum ScanError {
    /// No matching line before the deadline.
    #[error("no join code in container logs within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The scan was aborted by its cancellation token.
    #[error("log scan cancelled")]
    Cancelled,

    /// The log follower could not be started.
    #[error("failed to follow container logs: {0}")]
    Follow(#[from] ProcessError),
}
