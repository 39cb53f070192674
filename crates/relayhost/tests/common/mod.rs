//! Test utilities and common setup.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, header};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use relayhost::api;
use relayhost::container::{ContainerRuntimeApi, ContainerSpec};
use relayhost::process::{ProcessError, ProcessResult};
use relayhost::scanner::LogStream;
use relayhost::session::SessionService;
use relayhost::settings::AppConfig;

/// Container runtime that records calls instead of running anything.
#[derive(Default)]
pub struct FakeRuntime {
    /// Lines the log follower emits. `None` means it never emits.
    pub log_lines: Option<Vec<String>>,
    pub start_error: Option<String>,
    pub remove_error: Option<String>,
    pub started: Mutex<Vec<ContainerSpec>>,
    pub removed: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn emitting(lines: &[&str]) -> Self {
        Self {
            log_lines: Some(lines.iter().map(|l| l.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    fn failure(message: &str) -> ProcessError {
        ProcessError::Failed {
            program: "docker".to_string(),
            code: Some(1),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ContainerRuntimeApi for FakeRuntime {
    async fn run_detached(&self, spec: &ContainerSpec) -> ProcessResult<()> {
        self.started.lock().unwrap().push(spec.clone());
        match self.start_error {
            Some(ref message) => Err(Self::failure(message)),
            None => Ok(()),
        }
    }

    async fn remove_container(&self, name: &str, _force: bool) -> ProcessResult<()> {
        self.removed.lock().unwrap().push(name.to_string());
        match self.remove_error {
            Some(ref message) => Err(Self::failure(message)),
            None => Ok(()),
        }
    }

    async fn follow_logs(&self, _name: &str) -> ProcessResult<LogStream> {
        Ok(match self.log_lines {
            Some(ref lines) => LogStream::from_lines(lines.clone()),
            None => LogStream::pending(),
        })
    }
}

/// Config with local execution enabled and a short scan timeout.
pub fn local_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.local.enabled = true;
    config.local.image = "relay-game-server:test".to_string();
    config.local.log_timeout_ms = 100;
    config
}

/// Create a test application from `config` backed by `runtime`.
pub fn test_app_with(config: AppConfig, runtime: Arc<FakeRuntime>) -> Router {
    let config = Arc::new(config);
    let sessions = SessionService::from_config(config.clone(), runtime, CancellationToken::new())
        .unwrap();
    api::create_router(api::AppState::new(sessions, config))
}

/// Create a test application with default configuration.
pub fn test_app() -> Router {
    test_app_with(AppConfig::default(), Arc::new(FakeRuntime::silent()))
}

/// Send a request with an optional JSON body.
pub async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
