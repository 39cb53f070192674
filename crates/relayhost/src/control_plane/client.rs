//! Control plane HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use super::ControlPlaneApi;
use super::error::{ControlPlaneError, ControlPlaneResult};
use crate::session::{HostRequest, HostResult};
use crate::settings::ControlPlaneConfig;

/// Trailing base segment some reverse proxies do not forward.
pub const ROUTING_SEGMENT: &str = "/api";

/// Header carrying the control plane API key.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TeardownBody<'a> {
    host_id: &'a str,
}

/// Client for a remote control plane.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    client: Client,
    /// Base URL without a trailing slash.
    base_url: String,
    /// Path with a leading slash.
    path: String,
    api_key: Option<String>,
}

impl ControlPlaneClient {
    /// Create a client for `base_url`.
    pub fn new(base_url: &str, config: &ControlPlaneConfig) -> ControlPlaneResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ControlPlaneError::Client)?;

        let path = config.path.trim().trim_start_matches('/');
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            path: format!("/{path}"),
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
        })
    }

    /// Build a client from config, if a base URL is configured.
    pub fn from_config(config: &ControlPlaneConfig) -> ControlPlaneResult<Option<Self>> {
        config
            .base_url()
            .map(|base| Self::new(base, config))
            .transpose()
    }

    /// The primary endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    /// The endpoint with the routing segment stripped, when the base has one.
    pub fn fallback_endpoint(&self) -> Option<String> {
        self.base_url
            .strip_suffix(ROUTING_SEGMENT)
            .map(|base| format!("{}{}", base, self.path))
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> ControlPlaneResult<Response> {
        let mut request = self.client.request(method, url).json(body);
        if let Some(ref key) = self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        request
            .send()
            .await
            .map_err(|source| ControlPlaneError::Request {
                url: url.to_string(),
                source,
            })
    }

    /// Send to the endpoint, retrying once without the routing segment on 404.
    /// A 2xx body that fails `accept` is reported as a parse error.
    async fn call<B: Serialize + Sync>(
        &self,
        method: Method,
        body: &B,
        accept: fn(&HostResult) -> bool,
    ) -> ControlPlaneResult<HostResult> {
        let url = self.endpoint();
        debug!(%url, %method, "calling control plane");
        let response = self.send(method.clone(), &url, body).await?;

        if response.status() == StatusCode::NOT_FOUND
            && let Some(fallback) = self.fallback_endpoint()
        {
            warn!(%url, %fallback, "control plane returned 404, retrying without routing segment");
            let response = self.send(method, &fallback, body).await?;
            return Self::handle_response(&fallback, response, accept).await;
        }

        Self::handle_response(&url, response, accept).await
    }

    async fn handle_response(
        url: &str,
        response: Response,
        accept: fn(&HostResult) -> bool,
    ) -> ControlPlaneResult<HostResult> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| ControlPlaneError::Request {
                url: url.to_string(),
                source,
            })?;
        let result: HostResult =
            serde_json::from_str(&body).map_err(|e| ControlPlaneError::Parse {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        if !accept(&result) {
            return Err(ControlPlaneError::Parse {
                url: url.to_string(),
                message: format!("response does not satisfy the result contract: {body}"),
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl ControlPlaneApi for ControlPlaneClient {
    async fn host(&self, request: &HostRequest) -> ControlPlaneResult<HostResult> {
        self.call(Method::POST, request, HostResult::is_well_formed)
            .await
    }

    async fn teardown(&self, host_id: &str) -> ControlPlaneResult<HostResult> {
        self.call(
            Method::DELETE,
            &TeardownBody { host_id },
            HostResult::is_well_formed_teardown,
        )
        .await
    }
}
