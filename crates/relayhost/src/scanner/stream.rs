//! Line streams fed to the scanner.

use std::fmt;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, warn};

use crate::process::{ProcessError, ProcessResult};

/// Merged stdout/stderr lines of a log follower, plus the process that
/// produces them.
pub struct LogStream {
    pub(crate) lines: BoxStream<'static, String>,
    child: Option<Child>,
}

impl LogStream {
    /// Wrap a spawned log follower. Both stdout and stderr must be piped.
    pub fn from_child(mut child: Child) -> ProcessResult<Self> {
        let missing = |which: &str| ProcessError::Io {
            program: "log follower".to_string(),
            source: std::io::Error::other(format!("{which} was not captured")),
        };
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let stdout = LinesStream::new(BufReader::new(stdout).lines());
        let stderr = LinesStream::new(BufReader::new(stderr).lines());
        // Read errors end that half of the stream; the other half keeps going.
        let lines = stream::select(
            stdout.take_while(|line| futures::future::ready(line.is_ok())),
            stderr.take_while(|line| futures::future::ready(line.is_ok())),
        )
        .filter_map(|line| futures::future::ready(line.ok()))
        .boxed();

        Ok(Self {
            lines,
            child: Some(child),
        })
    }

    /// A finite stream of fixed lines with no backing process.
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self::from_stream(stream::iter(lines))
    }

    /// Any line stream with no backing process.
    pub fn from_stream<S>(lines: S) -> Self
    where
        S: futures::Stream<Item = String> + Send + 'static,
    {
        Self {
            lines: lines.boxed(),
            child: None,
        }
    }

    /// A stream that never yields.
    pub fn pending() -> Self {
        Self::from_stream(stream::pending())
    }

    /// Pid of the follower process while it is attached.
    pub(crate) fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Kill and reap the follower process, if any.
    pub(crate) async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        let pid = child.id();
        match child.kill().await {
            Ok(()) => debug!(?pid, "log follower stopped"),
            Err(e) => warn!(?pid, error = %e, "failed to stop log follower"),
        }
    }
}

impl fmt::Debug for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStream")
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}
