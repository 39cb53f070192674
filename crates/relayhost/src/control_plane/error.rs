//! Control plane client error types.

use thiserror::Error;

/// Result type for control plane calls.
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// Errors from calling the remote control plane.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Network failure or timeout.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response.
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// 2xx response whose body is not a host result.
    #[error("failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },

    /// The HTTP client could not be built.
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
