//! Session request and result types.

use serde::{Deserialize, Serialize};

use crate::joincode;

/// Host id prefix marking a stub session that has nothing to remove.
pub const STUB_HOST_PREFIX: &str = "stub-";

/// Request to provision a game session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRequest {
    /// Identifier of the player asking for the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<String>,
}

/// Request to tear down a game session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownRequest {
    #[serde(default)]
    pub host_id: Option<String>,
}

impl TeardownRequest {
    /// The trimmed host id, if present and non-blank.
    pub fn host_id(&self) -> Option<&str> {
        self.host_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Outcome of a host or teardown operation, whichever backend produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResult {
    /// A hosted session.
    pub fn hosted(
        join_code: impl Into<String>,
        host_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ok: true,
            join_code: Some(join_code.into()),
            host_id: Some(host_id.into()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A successful result with only a message, used by teardown.
    pub fn done(host_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            host_id: Some(host_id.into()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_ws_url(mut self, ws_url: Option<String>) -> Self {
        self.ws_url = ws_url;
        self
    }

    /// Whether this result is a stub session.
    pub fn is_stub(&self) -> bool {
        self.host_id
            .as_deref()
            .is_some_and(|id| id.starts_with(STUB_HOST_PREFIX))
    }

    /// Check the result against the host contract: a successful result
    /// carries a well-formed join code and a failed one carries an error.
    pub fn is_well_formed(&self) -> bool {
        if self.ok {
            self.join_code.as_deref().is_some_and(joincode::is_valid)
        } else {
            self.error.is_some()
        }
    }

    /// Teardown results need no join code, but a failure still needs an error.
    pub fn is_well_formed_teardown(&self) -> bool {
        self.ok || self.error.is_some()
    }
}
