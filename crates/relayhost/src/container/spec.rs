//! Container run specification and input validation.

use serde::{Deserialize, Serialize};

use super::error::{ContainerError, ContainerResult};

/// Alias that resolves to the execution host from inside the container.
pub const HOST_GATEWAY_ALIAS: &str = "host.docker.internal";

/// Port mapping configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port on the host.
    pub host_port: u16,
    /// Port in the container.
    pub container_port: u16,
}

/// Resource limits passed to the runtime. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Number of CPUs (`--cpus`), e.g. "1.5".
    pub cpus: Option<String>,
    /// CPU set (`--cpuset-cpus`), e.g. "0-1".
    pub cpuset: Option<String>,
    /// Memory limit (`--memory`), e.g. "512m".
    pub memory: Option<String>,
    /// Relative CPU weight (`--cpu-shares`).
    pub cpu_shares: Option<u32>,
}

impl ResourceLimits {
    /// Whether no limit is set.
    pub fn is_empty(&self) -> bool {
        self.cpus.is_none()
            && self.cpuset.is_none()
            && self.memory.is_none()
            && self.cpu_shares.is_none()
    }
}

/// Everything needed to start one game-server container.
///
/// Built once per provisioning request and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Docker/OCI image to use.
    pub image: String,
    /// Container name, also used as the host id for teardown.
    pub name: String,
    /// Environment variables, in insertion order.
    pub env: Vec<(String, String)>,
    /// Optional published port.
    pub ports: Option<PortMapping>,
    /// Optional resource limits.
    pub limits: Option<ResourceLimits>,
    /// Extra runtime CLI tokens, inserted before the image.
    pub extra_args: Vec<String>,
    /// Map [`HOST_GATEWAY_ALIAS`] to the host gateway.
    pub host_gateway_alias: bool,
}

impl ContainerSpec {
    /// Create a new spec with the given image and container name.
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Publish a container port on the host.
    pub fn port(mut self, host_port: u16, container_port: u16) -> Self {
        self.ports = Some(PortMapping {
            host_port,
            container_port,
        });
        self
    }

    /// Apply resource limits. Empty limits are dropped.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = (!limits.is_empty()).then_some(limits);
        self
    }

    /// Append extra runtime CLI tokens.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args.extend(args);
        self
    }

    /// Enable or disable the host gateway alias.
    pub fn host_gateway_alias(mut self, enabled: bool) -> Self {
        self.host_gateway_alias = enabled;
        self
    }

    /// Look up an environment variable value.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Validate all fields before they reach the runtime command line.
    pub fn validate(&self) -> ContainerResult<()> {
        validate_image_name(&self.image)?;
        validate_container_name(&self.name)?;

        for (key, _) in &self.env {
            validate_env_var_key(key)?;
        }

        if let Some(ref limits) = self.limits {
            for (flag, value) in [
                ("cpus", &limits.cpus),
                ("cpuset", &limits.cpuset),
                ("memory", &limits.memory),
            ] {
                if let Some(value) = value {
                    validate_limit_value(flag, value)?;
                }
            }
        }

        Ok(())
    }

    /// Arguments for `<runtime> run`, starting detached and auto-removing.
    pub fn run_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];

        if let Some(port) = self.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", port.host_port, port.container_port));
        }

        if let Some(ref limits) = self.limits {
            if let Some(ref cpus) = limits.cpus {
                args.push("--cpus".to_string());
                args.push(cpus.clone());
            }
            if let Some(ref cpuset) = limits.cpuset {
                args.push("--cpuset-cpus".to_string());
                args.push(cpuset.clone());
            }
            if let Some(ref memory) = limits.memory {
                args.push("--memory".to_string());
                args.push(memory.clone());
            }
            if let Some(shares) = limits.cpu_shares {
                args.push("--cpu-shares".to_string());
                args.push(shares.to_string());
            }
        }

        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        if self.host_gateway_alias {
            args.push("--add-host".to_string());
            args.push(format!("{HOST_GATEWAY_ALIAS}:host-gateway"));
        }

        args.extend(self.extra_args.iter().cloned());
        args.push(self.image.clone());
        args
    }
}

// ============================================================================
// Input Validation Functions
// ============================================================================

/// Validate a Docker/OCI image name.
///
/// Image names follow the pattern: `[registry/][namespace/]name[:tag][@digest]`
pub fn validate_image_name(image: &str) -> ContainerResult<()> {
    if image.is_empty() {
        return Err(ContainerError::InvalidInput(
            "image name cannot be empty".to_string(),
        ));
    }

    if image.len() > 256 {
        return Err(ContainerError::InvalidInput(
            "image name exceeds maximum length of 256 characters".to_string(),
        ));
    }

    let valid_chars = |c: char| {
        c.is_ascii_alphanumeric()
            || c == '.'
            || c == '-'
            || c == '_'
            || c == '/'
            || c == ':'
            || c == '@'
    };

    if !image.chars().all(valid_chars) {
        return Err(ContainerError::InvalidInput(format!(
            "image name '{}' contains invalid characters; only alphanumeric, '.', '-', '_', '/', ':', '@' are allowed",
            image
        )));
    }

    if image.starts_with('-') || image.contains("..") {
        return Err(ContainerError::InvalidInput(format!(
            "image name '{}' is not allowed",
            image
        )));
    }

    Ok(())
}

/// Validate a container name.
///
/// Names are alphanumeric with hyphens and underscores and must start with an
/// alphanumeric character or underscore, so they can never be read as a flag.
pub fn validate_container_name(name: &str) -> ContainerResult<()> {
    let Some(first_char) = name.chars().next() else {
        return Err(ContainerError::InvalidInput(
            "container name cannot be empty".to_string(),
        ));
    };

    if name.len() > 128 {
        return Err(ContainerError::InvalidInput(
            "container name exceeds maximum length of 128 characters".to_string(),
        ));
    }

    if !first_char.is_ascii_alphanumeric() && first_char != '_' {
        return Err(ContainerError::InvalidInput(
            "container name must start with an alphanumeric character or underscore".to_string(),
        ));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if !name.chars().all(valid_chars) {
        return Err(ContainerError::InvalidInput(format!(
            "container name '{}' contains invalid characters; only alphanumeric, '-', '_' are allowed",
            name
        )));
    }

    Ok(())
}

/// Validate an environment variable key.
///
/// Alphanumeric and underscores, starting with a letter or underscore.
pub fn validate_env_var_key(key: &str) -> ContainerResult<()> {
    let Some(first_char) = key.chars().next() else {
        return Err(ContainerError::InvalidInput(
            "environment variable key cannot be empty".to_string(),
        ));
    };

    if key.len() > 256 {
        return Err(ContainerError::InvalidInput(
            "environment variable key exceeds maximum length of 256 characters".to_string(),
        ));
    }

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(ContainerError::InvalidInput(format!(
            "environment variable key '{}' must start with a letter or underscore",
            key
        )));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '_';
    if !key.chars().all(valid_chars) {
        return Err(ContainerError::InvalidInput(format!(
            "environment variable key '{}' contains invalid characters; only alphanumeric and '_' are allowed",
            key
        )));
    }

    Ok(())
}

fn validate_limit_value(flag: &str, value: &str) -> ContainerResult<()> {
    if value.is_empty() || value.starts_with('-') || value.chars().any(char::is_whitespace) {
        return Err(ContainerError::InvalidInput(format!(
            "invalid value '{}' for --{}",
            value, flag
        )));
    }
    Ok(())
}
