//! Session service: routes host and teardown requests to a backend.
//!
//! Hosting walks an ordered list of tiers. The control plane is asked first
//! when configured; the local orchestrator runs only when local execution is
//! enabled.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::error::{SessionError, SessionResult};
use super::models::{HostRequest, HostResult, STUB_HOST_PREFIX};
use crate::container::{self, ContainerRuntimeApi};
use crate::control_plane::{ControlPlaneApi, ControlPlaneClient, ControlPlaneResult};
use crate::orchestrator::{LocalError, LocalOrchestrator};
use crate::settings::AppConfig;

/// Outcome of one hosting tier.
#[derive(Debug)]
enum TierOutcome {
    /// Final result, returned to the caller.
    Resolved(HostResult),
    /// Recoverable failure; the next tier runs.
    Fallthrough(String),
    /// Unrecoverable failure; no further tiers run.
    Fatal(SessionError),
}

#[derive(Debug, Clone, Copy)]
enum Tier {
    ControlPlane,
    Local,
}

const TIERS: [Tier; 2] = [Tier::ControlPlane, Tier::Local];

/// Service for hosting and tearing down game sessions.
#[derive(Clone)]
pub struct SessionService {
    control_plane: Option<Arc<dyn ControlPlaneApi>>,
    local: Option<LocalOrchestrator>,
}

impl SessionService {
    pub fn new(
        control_plane: Option<Arc<dyn ControlPlaneApi>>,
        local: Option<LocalOrchestrator>,
    ) -> Self {
        Self {
            control_plane,
            local,
        }
    }

    /// Wire up backends from configuration. The runtime is only used when
    /// local execution is enabled.
    pub fn from_config(
        config: Arc<AppConfig>,
        runtime: Arc<dyn ContainerRuntimeApi>,
        cancel: CancellationToken,
    ) -> ControlPlaneResult<Self> {
        let control_plane = ControlPlaneClient::from_config(&config.control_plane)?
            .map(|client| Arc::new(client) as Arc<dyn ControlPlaneApi>);
        let local = config
            .local
            .enabled
            .then(|| LocalOrchestrator::new(runtime, config.clone(), cancel));
        Ok(Self::new(control_plane, local))
    }

    /// Whether the local tier is available.
    pub fn local_enabled(&self) -> bool {
        self.local.is_some()
    }

    /// Whether the control-plane tier is available.
    pub fn control_plane_configured(&self) -> bool {
        self.control_plane.is_some()
    }

    /// Host a session.
    #[instrument(skip(self, request), fields(requester = ?request.requester_id))]
    pub async fn host(&self, request: &HostRequest) -> SessionResult<HostResult> {
        let mut failure = String::new();
        for tier in TIERS {
            let outcome = match tier {
                Tier::ControlPlane => self.host_via_control_plane(request).await,
                Tier::Local => self.host_locally(request, &failure).await,
            };
            match outcome {
                TierOutcome::Resolved(result) => return Ok(result),
                TierOutcome::Fatal(err) => return Err(err),
                TierOutcome::Fallthrough(message) => failure = message,
            }
        }
        Err(SessionError::Unavailable(failure))
    }

    async fn host_via_control_plane(&self, request: &HostRequest) -> TierOutcome {
        let Some(ref control_plane) = self.control_plane else {
            return TierOutcome::Fallthrough("control plane not configured".to_string());
        };

        match control_plane.host(request).await {
            Ok(result) => TierOutcome::Resolved(result),
            Err(err) => {
                warn!(error = %err, "control plane host failed");
                TierOutcome::Fallthrough(format!("control plane failed: {err}"))
            }
        }
    }

    async fn host_locally(&self, request: &HostRequest, failure: &str) -> TierOutcome {
        let Some(ref local) = self.local else {
            warn!(reason = %failure, "local execution disabled, no backend available");
            return TierOutcome::Fatal(SessionError::Unavailable(failure.to_string()));
        };

        match local.provision(request).await {
            Ok(result) => TierOutcome::Resolved(result),
            Err(LocalError::Start(err)) => TierOutcome::Fatal(SessionError::ContainerStart(err)),
            Err(err) => {
                warn!(error = %err, "local provisioning failed, substituting stub");
                TierOutcome::Resolved(local.stub_result(&err.to_string()))
            }
        }
    }

    /// Tear down a session by host id.
    #[instrument(skip(self))]
    pub async fn teardown(&self, host_id: Option<&str>) -> SessionResult<HostResult> {
        let host_id = host_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SessionError::Validation("hostId is required".to_string()))?;

        if let Some(ref control_plane) = self.control_plane {
            return control_plane.teardown(host_id).await.map_err(|err| {
                warn!(host_id, error = %err, "control plane teardown failed");
                SessionError::Remote(err.to_string())
            });
        }

        let local = match self.local {
            Some(ref local) if !host_id.starts_with(STUB_HOST_PREFIX) => local,
            _ => return Ok(HostResult::done(host_id, "nothing to remove")),
        };

        container::validate_container_name(host_id)
            .map_err(|e| SessionError::Validation(e.to_string()))?;

        local
            .remove(host_id)
            .await
            .map_err(SessionError::Teardown)?;
        info!(container = host_id, "container removed");
        Ok(HostResult::done(host_id, "container removed"))
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("control_plane", &self.control_plane.is_some())
            .field("local", &self.local)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{ControlPlaneError, ControlPlaneResult};
    use crate::joincode;
    use crate::orchestrator::tests::{FakeLogs, FakeRuntime};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeControlPlane {
        result: Mutex<Option<HostResult>>,
        calls: AtomicUsize,
    }

    impl FakeControlPlane {
        fn answering(result: Option<HostResult>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(result),
                calls: AtomicUsize::new(0),
            })
        }

        fn reply(&self) -> ControlPlaneResult<HostResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ControlPlaneError::Status {
                    url: "http://cp/host".to_string(),
                    status: 503,
                    body: "down".to_string(),
                })
        }
    }

    #[async_trait]
    impl ControlPlaneApi for FakeControlPlane {
        async fn host(&self, _request: &HostRequest) -> ControlPlaneResult<HostResult> {
            self.reply()
        }

        async fn teardown(&self, _host_id: &str) -> ControlPlaneResult<HostResult> {
            self.reply()
        }
    }

    fn local(runtime: Arc<FakeRuntime>, timeout_ms: u64) -> LocalOrchestrator {
        let mut config = AppConfig::default();
        config.local.enabled = true;
        config.local.log_timeout_ms = timeout_ms;
        LocalOrchestrator::new(runtime, Arc::new(config), CancellationToken::new())
    }

    #[test]
    fn test_from_config_enables_configured_tiers() {
        let runtime = Arc::new(FakeRuntime::with_logs(FakeLogs::Silent));
        let service = SessionService::from_config(
            Arc::new(AppConfig::default()),
            runtime.clone(),
            CancellationToken::new(),
        )
        .unwrap();
        assert!(!service.control_plane_configured());
        assert!(!service.local_enabled());

        let mut config = AppConfig::default();
        config.local.enabled = true;
        config.control_plane.base_url = Some("https://cp.example.com/api".to_string());
        let service =
            SessionService::from_config(Arc::new(config), runtime, CancellationToken::new())
                .unwrap();
        assert!(service.control_plane_configured());
        assert!(service.local_enabled());
    }

    #[tokio::test]
    async fn test_control_plane_result_passes_through() {
        let remote = HostResult::hosted("REMOTE1", "cp-1", "remote");
        let control_plane = FakeControlPlane::answering(Some(remote.clone()));
        let runtime = Arc::new(FakeRuntime::with_logs(FakeLogs::Silent));
        let service = SessionService::new(Some(control_plane), Some(local(runtime.clone(), 50)));

        let result = service.host(&HostRequest::default()).await.unwrap();
        assert_eq!(result, remote);
        assert!(runtime.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_control_plane_failure_with_local_disabled_is_unavailable() {
        let control_plane = FakeControlPlane::answering(None);
        let service = SessionService::new(Some(control_plane.clone()), None);

        let err = service.host(&HostRequest::default()).await.unwrap_err();
        match err {
            SessionError::Unavailable(message) => {
                assert!(message.starts_with("control plane failed: "));
                assert!(message.contains("503"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(control_plane.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nothing_configured_is_unavailable() {
        let service = SessionService::new(None, None);
        let err = service.host(&HostRequest::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "control plane not configured");
    }

    #[tokio::test]
    async fn test_control_plane_failure_falls_through_to_local() {
        let control_plane = FakeControlPlane::answering(None);
        let runtime = Arc::new(FakeRuntime::with_logs(FakeLogs::Lines(vec![
            r#"{"event":"relay_join_code","code":"LOCAL7"}"#.to_string(),
        ])));
        let service = SessionService::new(Some(control_plane), Some(local(runtime.clone(), 5000)));

        let result = service.host(&HostRequest::default()).await.unwrap();
        assert_eq!(result.join_code.as_deref(), Some("LOCAL7"));
        assert_eq!(runtime.started.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_local_timeout_yields_stub() {
        let runtime = Arc::new(FakeRuntime::with_logs(FakeLogs::Silent));
        let service = SessionService::new(None, Some(local(runtime, 50)));

        let result = service.host(&HostRequest::default()).await.unwrap();
        assert!(result.ok);
        assert!(result.is_stub());
        assert!(joincode::is_generated(result.join_code.as_deref().unwrap()));
        assert!(result.is_well_formed());
    }

    #[tokio::test]
    async fn test_local_start_failure_is_surfaced() {
        let mut runtime = FakeRuntime::with_logs(FakeLogs::Silent);
        runtime.start_error = Some("pull access denied".to_string());
        let service = SessionService::new(None, Some(local(Arc::new(runtime), 50)));

        let err = service.host(&HostRequest::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::ContainerStart(_)));
        assert!(err.to_string().contains("pull access denied"));
    }

    #[tokio::test]
    async fn test_invalid_local_spec_yields_stub() {
        let runtime = Arc::new(FakeRuntime::with_logs(FakeLogs::Silent));
        let mut config = AppConfig::default();
        config.local.enabled = true;
        config.local.image = "--privileged".to_string();
        let local = LocalOrchestrator::new(
            runtime.clone(),
            Arc::new(config),
            CancellationToken::new(),
        );
        let service = SessionService::new(None, Some(local));

        let result = service.host(&HostRequest::default()).await.unwrap();
        assert!(result.is_stub());
        assert!(runtime.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_requires_host_id() {
        let control_plane = FakeControlPlane::answering(None);
        let service = SessionService::new(Some(control_plane.clone()), None);

        for host_id in [None, Some(""), Some("  ")] {
            let err = service.teardown(host_id).await.unwrap_err();
            assert!(matches!(err, SessionError::Validation(_)));
        }
        assert_eq!(control_plane.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_teardown_delegates_to_control_plane() {
        let control_plane =
            FakeControlPlane::answering(Some(HostResult::done("cp-1", "stopped")));
        let service = SessionService::new(Some(control_plane), None);
        let result = service.teardown(Some("cp-1")).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("stopped"));

        let service = SessionService::new(Some(FakeControlPlane::answering(None)), None);
        let err = service.teardown(Some("cp-1")).await.unwrap_err();
        assert!(matches!(err, SessionError::Remote(_)));
    }

    #[tokio::test]
    async fn test_teardown_stub_is_noop() {
        let runtime = Arc::new(FakeRuntime::with_logs(FakeLogs::Silent));
        let service = SessionService::new(None, Some(local(runtime.clone(), 50)));

        let result = service.teardown(Some("stub-1a2b3c4d")).await.unwrap();
        assert!(result.ok);
        assert!(runtime.removed.lock().unwrap().is_empty());

        let service = SessionService::new(None, None);
        assert!(service.teardown(Some("relay-host-1")).await.unwrap().ok);
    }

    #[tokio::test]
    async fn test_teardown_removes_local_container() {
        let runtime = Arc::new(FakeRuntime::with_logs(FakeLogs::Silent));
        let service = SessionService::new(None, Some(local(runtime.clone(), 50)));

        let result = service.teardown(Some("relay-host-1a2b3c4d")).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("container removed"));
        assert_eq!(result.host_id.as_deref(), Some("relay-host-1a2b3c4d"));
        assert_eq!(
            *runtime.removed.lock().unwrap(),
            vec!["relay-host-1a2b3c4d"]
        );
    }

    #[tokio::test]
    async fn test_teardown_rejects_unsafe_names() {
        let runtime = Arc::new(FakeRuntime::with_logs(FakeLogs::Silent));
        let service = SessionService::new(None, Some(local(runtime.clone(), 50)));

        for name in ["-rf", "a;b", "../etc"] {
            let err = service.teardown(Some(name)).await.unwrap_err();
            assert!(matches!(err, SessionError::Validation(_)), "{name}");
        }
        assert!(runtime.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_removal_failure_carries_stderr() {
        let mut runtime = FakeRuntime::with_logs(FakeLogs::Silent);
        runtime.remove_error = Some("No such container: relay-host-x".to_string());
        let service = SessionService::new(None, Some(local(Arc::new(runtime), 50)));

        let err = service.teardown(Some("relay-host-x")).await.unwrap_err();
        assert!(matches!(err, SessionError::Teardown(_)));
        assert!(err.to_string().contains("No such container"));
    }
}
