//! Container runtime management module.
//!
//! Drives Docker or Podman through their CLI. The runtime is auto-detected
//! or can be configured explicitly.

mod error;
mod spec;

pub use error::{ContainerError, ContainerResult};
pub use spec::{
    ContainerSpec, HOST_GATEWAY_ALIAS, PortMapping, ResourceLimits, validate_container_name,
    validate_env_var_key, validate_image_name,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::process::{self, ProcessError, ProcessResult};
use crate::scanner::LogStream;

/// Container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    /// Docker runtime (default for macOS dev)
    #[default]
    Docker,
    /// Podman runtime
    Podman,
}

impl RuntimeType {
    /// Get the default binary name for this runtime.
    pub fn default_binary(&self) -> &'static str {
        match self {
            RuntimeType::Docker => "docker",
            RuntimeType::Podman => "podman",
        }
    }
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_binary())
    }
}

/// Container runtime abstraction for testability.
#[async_trait]
pub trait ContainerRuntimeApi: Send + Sync {
    /// Start a container detached with auto-removal on exit.
    async fn run_detached(&self, spec: &ContainerSpec) -> ProcessResult<()>;

    /// Remove a container by name.
    async fn remove_container(&self, name: &str, force: bool) -> ProcessResult<()>;

    /// Start following a container's combined log output.
    async fn follow_logs(&self, name: &str) -> ProcessResult<LogStream>;
}

/// Container runtime client.
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    /// The runtime type (docker or podman)
    runtime_type: RuntimeType,
    /// Path to the container binary
    binary: String,
}

impl Default for ContainerRuntime {
    fn default() -> Self {
        Self::detect()
    }
}

impl ContainerRuntime {
    /// Detect an available runtime.
    ///
    /// Prefers Docker on macOS and Podman elsewhere, falling back to whichever
    /// binary is on `PATH`.
    pub fn detect() -> Self {
        #[cfg(target_os = "macos")]
        {
            if Self::is_binary_available("docker") {
                return Self::with_type(RuntimeType::Docker);
            }
        }

        if Self::is_binary_available("podman") {
            Self::with_type(RuntimeType::Podman)
        } else {
            // Docker is the default; failures surface when commands run.
            Self::with_type(RuntimeType::Docker)
        }
    }

    /// Create a container runtime with a specific type.
    pub fn with_type(runtime_type: RuntimeType) -> Self {
        Self {
            binary: runtime_type.default_binary().to_string(),
            runtime_type,
        }
    }

    /// Create a container runtime with a custom binary path.
    pub fn with_binary(runtime_type: RuntimeType, binary: impl Into<String>) -> Self {
        Self {
            runtime_type,
            binary: binary.into(),
        }
    }

    /// Get the runtime type.
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    /// Get the runtime binary.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Check if a binary is available in PATH.
    fn is_binary_available(name: &str) -> bool {
        std::process::Command::new("which")
            .arg(name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Check that the runtime responds, returning its version output.
    pub async fn health_check(&self) -> ProcessResult<String> {
        let output = Command::new(&self.binary)
            .args(["version", "--format", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProcessError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProcessError::Failed {
                program: self.binary.clone(),
                code: output.status.code(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Arguments for following a container's logs.
    pub fn follow_args(name: &str) -> Vec<String> {
        vec!["logs".to_string(), "-f".to_string(), name.to_string()]
    }

    /// Arguments for removing a container.
    pub fn remove_args(name: &str, force: bool) -> Vec<String> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("-f".to_string());
        }
        args.push(name.to_string());
        args
    }
}

#[async_trait]
impl ContainerRuntimeApi for ContainerRuntime {
    async fn run_detached(&self, spec: &ContainerSpec) -> ProcessResult<()> {
        info!(
            runtime = %self.runtime_type,
            container = %spec.name,
            image = %spec.image,
            "starting container"
        );
        process::run(&self.binary, &spec.run_args(), &[]).await
    }

    async fn remove_container(&self, name: &str, force: bool) -> ProcessResult<()> {
        info!(runtime = %self.runtime_type, container = %name, force, "removing container");
        process::run(&self.binary, &Self::remove_args(name, force), &[]).await
    }

    async fn follow_logs(&self, name: &str) -> ProcessResult<LogStream> {
        debug!(container = %name, "following container logs");
        let child = process::spawn_streaming(&self.binary, &Self::follow_args(name))?;
        LogStream::from_child(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_container_runtime_health_check() {
        let runtime = ContainerRuntime::detect();
        // Only meaningful where docker or podman is installed.
        if let Ok(version) = runtime.health_check().await {
            assert!(!version.is_empty());
        }
    }

    #[test]
    fn test_runtime_type_binaries() {
        assert_eq!(RuntimeType::Docker.default_binary(), "docker");
        assert_eq!(RuntimeType::Podman.to_string(), "podman");
        let runtime = ContainerRuntime::with_binary(RuntimeType::Podman, "/usr/local/bin/podman");
        assert_eq!(runtime.binary(), "/usr/local/bin/podman");
        assert_eq!(runtime.runtime_type(), RuntimeType::Podman);
    }

    #[test]
    fn test_remove_args() {
        assert_eq!(
            ContainerRuntime::remove_args("relay-host-1", true),
            vec!["rm", "-f", "relay-host-1"]
        );
        assert_eq!(
            ContainerRuntime::remove_args("relay-host-1", false),
            vec!["rm", "relay-host-1"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_start() {
        let runtime =
            ContainerRuntime::with_binary(RuntimeType::Docker, "relayhost-missing-runtime");
        let spec = ContainerSpec::new("img", "name");
        let err = runtime.run_detached(&spec).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(runtime.follow_logs("name").await.is_err());
    }

    #[tokio::test]
    async fn test_failing_runtime_reports_exit_code() {
        let runtime = ContainerRuntime::with_binary(RuntimeType::Docker, "false");
        let err = runtime
            .remove_container("relay-host-x", true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "false failed (code 1)");
    }
}
