//! Delegation to a remote control plane.

mod client;
mod error;

pub use client::{API_KEY_HEADER, ControlPlaneClient, ROUTING_SEGMENT};
pub use error::{ControlPlaneError, ControlPlaneResult};

use async_trait::async_trait;

use crate::session::{HostRequest, HostResult};

/// Remote provisioning backend.
#[async_trait]
pub trait ControlPlaneApi: Send + Sync {
    /// Ask the control plane to host a session. 2xx bodies are returned as-is.
    async fn host(&self, request: &HostRequest) -> ControlPlaneResult<HostResult>;

    /// Ask the control plane to tear a session down.
    async fn teardown(&self, host_id: &str) -> ControlPlaneResult<HostResult>;
}
