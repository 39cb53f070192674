//! Join code detection on a container's log stream.
//!
//! The game server announces its relay join code either as a structured JSON
//! line or as a human-readable line, depending on its build. Each line is run
//! through [`DETECTORS`] in order and the first match wins.

mod error;
mod stream;

pub use error::{ScanError, ScanResult};
pub use stream::LogStream;

use std::time::Duration;

use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::joincode;

/// Event tag carried by structured join code lines.
pub const JOIN_CODE_EVENT: &str = "relay_join_code";

/// A join code found in the log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub join_code: String,
    pub raw_line: String,
}

/// A single line detector.
pub type Detector = fn(&str) -> Option<LogEvent>;

/// Detectors tried in order for every line.
pub const DETECTORS: &[Detector] = &[detect_structured, detect_textual];

static TEXTUAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:relay\s+join\s+code)\s*:\s*([A-Z0-9]{6,12})\b")
        .expect("join code pattern is valid")
});

#[derive(Debug, Deserialize)]
struct StructuredLine {
    #[serde(alias = "type", alias = "tag")]
    event: Option<String>,
    #[serde(alias = "joinCode", alias = "join_code")]
    code: Option<String>,
}

/// Structured detector: `{"event": "relay_join_code", "code": "ABC123"}`.
///
/// The tag is compared case-insensitively with spaces and hyphens treated as
/// underscores, so `"Relay Join Code"` is accepted too.
pub fn detect_structured(line: &str) -> Option<LogEvent> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }

    let parsed: StructuredLine = serde_json::from_str(trimmed).ok()?;
    let tag = parsed.event?;
    let normalized: String = tag
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    if normalized != JOIN_CODE_EVENT {
        return None;
    }

    let code = parsed.code?.trim().to_string();
    if !joincode::is_valid(&code) {
        debug!(code = %code, "ignoring structured join code outside the code contract");
        return None;
    }

    Some(LogEvent {
        join_code: code,
        raw_line: line.to_string(),
    })
}

/// Textual detector: `Relay Join Code: ABC123`.
pub fn detect_textual(line: &str) -> Option<LogEvent> {
    let captures = TEXTUAL_PATTERN.captures(line)?;
    let code = captures.get(1)?.as_str().to_string();
    Some(LogEvent {
        join_code: code,
        raw_line: line.to_string(),
    })
}

/// Run every detector against `line` and return the first match.
pub fn detect(line: &str) -> Option<LogEvent> {
    DETECTORS.iter().find_map(|detector| detector(line))
}

/// Scan `logs` until a join code appears, the timeout elapses, or `cancel`
/// fires.
///
/// The log follower is always stopped before this returns. If the stream
/// ends without a match the scan keeps waiting for the deadline.
pub async fn scan_for_event(
    mut logs: LogStream,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ScanResult<LogEvent> {
    let outcome = tokio::select! {
        event = first_match(&mut logs) => Ok(event),
        _ = tokio::time::sleep(timeout) => Err(ScanError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
        _ = cancel.cancelled() => Err(ScanError::Cancelled),
    };

    logs.stop().await;

    if let Ok(ref event) = outcome {
        info!(join_code = %event.join_code, "join code detected in container logs");
    }
    outcome
}

async fn first_match(logs: &mut LogStream) -> LogEvent {
    while let Some(line) = logs.lines.next().await {
        if let Some(event) = detect(&line) {
            return event;
        }
    }

    debug!("log stream ended without a join code; waiting for deadline");
    std::future::pending().await
}
