use crate::exec::{ExecError, SharedRunner, COMMAND_TIMEOUT};
use crate::session::{validate_session_name, SessionSummary, Window};
use crate::tmux::{self, CaptureOptions, KeyInput, Tmux};

use super::{check_size, SourceError};

/// Runs tmux commands for the local and container backends.
#[derive(Clone)]
pub struct TmuxExec {
    tmux: Tmux,
    runner: SharedRunner,
    max_capture: u64,
}

impl std::fmt::Debug for TmuxExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TmuxExec")
            .field("tmux", &self.tmux)
            .field("max_capture", &self.max_capture)
            .finish_non_exhaustive()
    }
}

impl TmuxExec {
    /// Captures longer than `max_capture` bytes are rejected as too large.
    pub fn new(tmux: Tmux, runner: SharedRunner, max_capture: u64) -> Self {
        Self {
            tmux,
            runner,
            max_capture,
        }
    }

    async fn run(&self, argv: Vec<String>) -> Result<String, ExecError> {
        let out = self.runner.run(&argv, COMMAND_TIMEOUT).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Every session with its windows. No running server means no sessions.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SourceError> {
        match self.run(self.tmux.list_all_windows()).await {
            Ok(out) => Ok(tmux::parse_sessions(&out)),
            Err(e) if tmux::is_no_server(e.stderr()) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_windows(&self, session: &str) -> Result<Vec<Window>, SourceError> {
        validate_session_name(session).map_err(SourceError::InvalidInput)?;
        let out = self
            .run(self.tmux.list_windows(session))
            .await
            .map_err(|e| missing(e, || format!("session {session}")))?;
        let windows = tmux::parse_windows(&out);
        if windows.is_empty() {
            return Err(SourceError::NotFound(format!("session {session}")));
        }
        Ok(windows)
    }

    pub async fn capture_pane(
        &self,
        session: &str,
        window: u32,
        options: CaptureOptions,
    ) -> Result<String, SourceError> {
        validate_session_name(session).map_err(SourceError::InvalidInput)?;
        let out = self
            .run(self.tmux.capture_pane(session, window, options))
            .await
            .map_err(|e| missing(e, || format!("window {session}:{window}")))?;
        let text = match options.max_lines {
            Some(n) => tmux::tail_lines(&out, n),
            None => out,
        };
        check_size(&format!("capture of {session}:{window}"), text.len(), self.max_capture)?;
        Ok(text)
    }

    pub async fn pane_width(&self, session: &str, window: u32) -> Result<u16, SourceError> {
        validate_session_name(session).map_err(SourceError::InvalidInput)?;
        let out = self
            .run(self.tmux.pane_width(session, window))
            .await
            .map_err(|e| missing(e, || format!("window {session}:{window}")))?;
        tmux::parse_pane_width(&out)
            .ok_or_else(|| SourceError::Malformed(format!("pane width {:?}", out.trim())))
    }

    /// Deliver `input`; the tmux invocations run strictly in order.
    pub async fn send_keys(
        &self,
        session: &str,
        window: u32,
        input: &KeyInput,
    ) -> Result<(), SourceError> {
        validate_session_name(session).map_err(SourceError::InvalidInput)?;
        for step in self.tmux.send_keys(session, window, input) {
            self.run(step)
                .await
                .map_err(|e| missing(e, || format!("window {session}:{window}")))?;
        }
        Ok(())
    }
}

fn missing(e: ExecError, what: impl FnOnce() -> String) -> SourceError {
    if tmux::is_missing_target(e.stderr()) || tmux::is_no_server(e.stderr()) {
        SourceError::NotFound(what())
    } else {
        e.into()
    }
}
