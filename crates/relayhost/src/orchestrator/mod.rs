//! Local container orchestration.
//!
//! Starts one game-server container per request, then watches its logs for
//! the relay join code. A container that cannot be started is an error; a
//! container that starts but never reports a code yields a stub session.

mod error;

pub use error::{LocalError, LocalResult};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::container::{ContainerError, ContainerRuntimeApi, ContainerSpec};
use crate::joincode;
use crate::process::ProcessResult;
use crate::scanner::{self, ScanError};
use crate::session::{HostRequest, HostResult, STUB_HOST_PREFIX};
use crate::settings::AppConfig;

/// Message on a session whose join code came from the container logs.
pub const STARTED_MESSAGE: &str = "started via local runtime";

/// Runs game servers on the local container runtime.
#[derive(Clone)]
pub struct LocalOrchestrator {
    runtime: Arc<dyn ContainerRuntimeApi>,
    config: Arc<AppConfig>,
    cancel: CancellationToken,
}

impl LocalOrchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntimeApi>,
        config: Arc<AppConfig>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            config,
            cancel,
        }
    }

    /// Compose the container spec for one request. Each call picks a new
    /// container name.
    pub fn build_spec(&self, request: &HostRequest) -> LocalResult<ContainerSpec> {
        let local = &self.config.local;
        let relay = &self.config.relay;
        let name = format!("{}-{}", local.name_prefix, short_token());

        let mut spec = ContainerSpec::new(&local.image, name)
            .env("GAME_SCENE", &relay.scene)
            .env("RELAY_REGION", &relay.region)
            .env("MAX_CONNECTIONS", relay.max_connections.to_string());
        if let Some(ref url) = local.user_service_url {
            spec = spec.env("USER_SERVICE_URL", url);
        }
        spec = spec.env(
            "ALLOW_INSECURE_TLS",
            if local.allow_insecure_tls { "1" } else { "0" },
        );
        if let Some(ref key) = local.game_api_key {
            spec = spec.env("GAME_API_KEY", key);
        }
        if let Some(requester) = request.requester_id.as_deref().filter(|r| !r.is_empty()) {
            spec = spec.env("REQUESTER_ID", requester);
        }

        let extra_env = local
            .parsed_extra_env()
            .map_err(|e| ContainerError::InvalidInput(format!("{e:#}")))?;
        for (key, value) in extra_env {
            spec = spec.env(key, value);
        }

        if let Some((host_port, container_port)) = local.port_mapping() {
            spec = spec.port(host_port, container_port);
        }

        let spec = spec
            .limits(local.resource_limits())
            .extra_args(local.extra_args.iter().cloned())
            .host_gateway_alias(cfg!(target_os = "linux"));

        spec.validate()?;
        Ok(spec)
    }

    /// Start a container and wait for its join code.
    ///
    /// Start failures are returned as errors. Scan failures (timeout,
    /// follower failure, shutdown) produce a successful stub result.
    pub async fn provision(&self, request: &HostRequest) -> LocalResult<HostResult> {
        let spec = self.build_spec(request)?;
        self.runtime
            .run_detached(&spec)
            .await
            .map_err(LocalError::Start)?;

        let timeout_ms = self.config.local.log_timeout_ms;
        let timeout = Duration::from_millis(timeout_ms);
        let scanned = match self.runtime.follow_logs(&spec.name).await {
            Ok(logs) => scanner::scan_for_event(logs, timeout, &self.cancel).await,
            Err(e) => Err(ScanError::Follow(e)),
        };

        match scanned {
            Ok(event) => {
                info!(container = %spec.name, join_code = %event.join_code, "session hosted locally");
                Ok(HostResult::hosted(event.join_code, spec.name, STARTED_MESSAGE)
                    .with_ws_url(self.config.relay.ws_url.clone()))
            }
            Err(err) => {
                warn!(
                    container = %spec.name,
                    timeout_ms,
                    error = %err,
                    "could not confirm join code, substituting stub"
                );
                Ok(self.stub_result(&format!(
                    "container {} started but no join code was confirmed ({err})",
                    spec.name
                )))
            }
        }
    }

    /// A successful result with a generated code and a non-removable host id.
    pub fn stub_result(&self, reason: &str) -> HostResult {
        HostResult::hosted(
            joincode::generate(),
            format!("{STUB_HOST_PREFIX}{}", short_token()),
            format!("stub join code substituted: {reason}"),
        )
        .with_ws_url(self.config.relay.ws_url.clone())
    }

    /// Force-remove a container by name.
    pub async fn remove(&self, name: &str) -> ProcessResult<()> {
        self.runtime.remove_container(name, true).await
    }
}

impl std::fmt::Debug for LocalOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalOrchestrator")
            .field("image", &self.config.local.image)
            .finish_non_exhaustive()
    }
}

fn short_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
