//! Running external commands (`tmux`, `docker`, `file`, ...).
//!
//! Backends never spawn processes directly; they go through a
//! [`CommandRunner`] so every call carries a timeout and tests can script the
//! outputs.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::process::Command;

/// Default bound for tmux invocations.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound for auxiliary calls such as MIME sniffing.
pub const AUX_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound for reading file contents.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("`{program}` exited with status {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{0}` timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("empty command line")]
    EmptyCommand,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Stderr of a failed command, or the empty string.
    pub fn stderr(&self) -> &str {
        match self {
            ExecError::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

/// Executes an argv and returns its stdout.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        argv: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, ExecError>>;
}

pub type SharedRunner = Arc<dyn CommandRunner>;

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn shared() -> SharedRunner {
        Arc::new(ProcessRunner)
    }
}

impl CommandRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        argv: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, ExecError>> {
        Box::pin(async move {
            let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
            let child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => ExecError::NotFound(program.clone()),
                    _ => ExecError::Io(e),
                })?;

            let output = tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| ExecError::Timeout(program.clone(), timeout))??;

            if !output.status.success() {
                return Err(ExecError::Failed {
                    program: program.clone(),
                    code: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            tracing::trace!(program = %program, bytes = output.stdout.len(), "command finished");
            Ok(output.stdout)
        })
    }
}

/// Build an owned argv from string slices.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
