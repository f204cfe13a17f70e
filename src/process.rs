//! Child process supervision.
//!
//! [`ServerProcess`] owns the spawned server together with both ends of its
//! stdio pipes. The runner only ever sees it through [`ChildHandle`], which
//! lends the pipes out and performs the one-shot termination at the end of
//! a session.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::FuzzError;

/// How long a server gets to exit after its stdin closes before it is killed
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

pub type PipeWriter = dyn AsyncWrite + Unpin + Send;
pub type PipeReader = dyn AsyncBufRead + Unpin + Send;

#[async_trait]
pub trait ChildHandle: Send {
    /// Borrow the child's stdin and stdout. `None` once terminated.
    fn pipes(&mut self) -> Option<(&mut PipeWriter, &mut PipeReader)>;

    /// Best-effort stop. Never fails; problems are logged.
    async fn terminate(&mut self);
}

pub struct ServerProcess {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    grace_period: Duration,
    alive: bool,
}

impl ServerProcess {
    /// Launch `program` with piped stdin/stdout. Stderr is inherited so the
    /// server's diagnostics reach the operator untouched.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Self, FuzzError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FuzzError::ProcessSpawn {
                program: program.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| missing_pipe(program, "stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| missing_pipe(program, "stdout"))?;

        tracing::info!(program, pid = ?child.id(), "server spawned");

        Ok(Self {
            program: program.to_string(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            grace_period: DEFAULT_GRACE_PERIOD,
            alive: true,
        })
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

fn missing_pipe(program: &str, pipe: &str) -> FuzzError {
    FuzzError::ProcessSpawn {
        program: program.to_string(),
        source: std::io::Error::other(format!("{pipe} pipe not available")),
    }
}

#[async_trait]
impl ChildHandle for ServerProcess {
    fn pipes(&mut self) -> Option<(&mut PipeWriter, &mut PipeReader)> {
        let writer: &mut PipeWriter = self.stdin.as_mut()?;
        let reader: &mut PipeReader = &mut self.stdout;
        Some((writer, reader))
    }

    async fn terminate(&mut self) {
        if !self.alive {
            tracing::debug!(program = %self.program, "server already terminated");
            return;
        }
        self.alive = false;

        // EOF on stdin is the server's cue to shut down by itself.
        drop(self.stdin.take());

        match tokio::time::timeout(self.grace_period, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(program = %self.program, %status, "server exited");
                return;
            }
            Ok(Err(e)) => {
                tracing::warn!(program = %self.program, error = %e, "failed to wait for server");
            }
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    grace_ms = self.grace_period.as_millis() as u64,
                    "server still running after grace period, killing"
                );
            }
        }

        if let Err(e) = self.child.kill().await {
            tracing::warn!(program = %self.program, error = %e, "failed to kill server");
        }
    }
}
