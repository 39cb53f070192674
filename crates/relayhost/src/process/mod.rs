//! External process execution.
//!
//! [`run`] executes a command to completion and reports failure through its
//! stderr. [`spawn_streaming`] starts a long-running command whose output is
//! consumed incrementally (the log follower).

mod error;

pub use error::{ProcessError, ProcessResult};

use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Run `program` with `args` and extra environment, waiting for it to exit.
///
/// Succeeds only on exit status 0. On failure the error message is the
/// trimmed stderr, or `"<program> failed (code N)"` when stderr is empty.
pub async fn run(program: &str, args: &[String], env: &[(String, String)]) -> ProcessResult<()> {
    debug!(program, ?args, "running command");

    let output = Command::new(program)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }

    let code = output.status.code();
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let message = if stderr.is_empty() {
        match code {
            Some(code) => format!("{program} failed (code {code})"),
            None => format!("{program} failed (terminated by signal)"),
        }
    } else {
        stderr.to_string()
    };

    Err(ProcessError::Failed {
        program: program.to_string(),
        code,
        message,
    })
}

/// Spawn `program` with stdout and stderr piped for incremental reading.
///
/// The child is killed if its handle is dropped.
pub fn spawn_streaming(program: &str, args: &[String]) -> ProcessResult<Child> {
    debug!(program, ?args, "spawning streaming command");

    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })
}
