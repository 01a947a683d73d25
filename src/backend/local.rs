use std::path::Path;

use crate::exec::{SharedRunner, READ_TIMEOUT};
use crate::files;
use crate::source::{HOST_ID, LOCAL_ID};
use crate::tmux::Tmux;

use super::{FileContent, SourceError, TmuxExec};

/// tmux on this machine: the default server, or the host server behind a
/// bind-mounted socket.
#[derive(Clone)]
pub struct LocalBackend {
    host: bool,
    tmux: TmuxExec,
    runner: SharedRunner,
    max_file_size: u64,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("host", &self.host)
            .field("tmux", &self.tmux)
            .field("max_file_size", &self.max_file_size)
            .finish_non_exhaustive()
    }
}

impl LocalBackend {
    /// `socket` is required for the host server and ignored otherwise.
    pub fn new(
        host: bool,
        socket: Option<&str>,
        runner: SharedRunner,
        max_file_size: u64,
    ) -> Self {
        let socket = if host { socket } else { None };
        Self {
            host,
            tmux: TmuxExec::new(Tmux::local(socket), runner.clone(), max_file_size),
            runner,
            max_file_size,
        }
    }

    pub fn container_id(&self) -> &'static str {
        if self.host {
            HOST_ID
        } else {
            LOCAL_ID
        }
    }

    pub fn tmux(&self) -> &TmuxExec {
        &self.tmux
    }

    /// Read a file from the local filesystem. The size is checked against the
    /// ceiling before any content is read.
    pub async fn read_file(&self, path: &str) -> Result<FileContent, SourceError> {
        if !Path::new(path).is_absolute() {
            return Err(SourceError::InvalidInput(format!(
                "path must be absolute: {path}"
            )));
        }
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| io_error(e, path))?;
        if !metadata.is_file() {
            return Err(SourceError::NotFound(format!("not a regular file: {path}")));
        }
        if metadata.len() > self.max_file_size {
            return Err(SourceError::TooLarge(format!(
                "{path} is {} bytes, limit is {} bytes",
                metadata.len(),
                self.max_file_size
            )));
        }

        let data = tokio::time::timeout(READ_TIMEOUT, tokio::fs::read(path))
            .await
            .map_err(|_| SourceError::Timeout(READ_TIMEOUT))?
            .map_err(|e| io_error(e, path))?;
        let mime = files::detect_mime(&self.runner, &[], path).await;
        Ok(FileContent { data, mime })
    }
}

fn io_error(e: std::io::Error, path: &str) -> SourceError {
    match e.kind() {
        std::io::ErrorKind::NotFound => SourceError::NotFound(format!("no such file: {path}")),
        std::io::ErrorKind::PermissionDenied => {
            SourceError::Remote(format!("permission denied: {path}"))
        }
        _ => SourceError::Remote(format!("failed to read {path}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ProcessRunner;

    fn backend(max: u64) -> LocalBackend {
        LocalBackend::new(false, None, ProcessRunner::shared(), max)
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let err = backend(1024)
            .read_file(path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn oversized_file_is_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, vec![b'x'; 2048]).unwrap();
        let err = backend(1024)
            .read_file(path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::TooLarge(_)));
    }

    #[tokio::test]
    async fn reads_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        std::fs::write(&path, br#"{"ok":true}"#).unwrap();
        let content = backend(1024)
            .read_file(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(content.data, br#"{"ok":true}"#);
        assert!(content.mime.contains('/'));
    }

    #[tokio::test]
    async fn relative_path_is_rejected() {
        let err = backend(1024).read_file("notes.txt").await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidInput(_)));
    }

    #[test]
    fn host_backend_identifies_as_host() {
        let b = LocalBackend::new(true, Some("/tmp/sock"), ProcessRunner::shared(), 1);
        assert_eq!(b.container_id(), "host");
        assert_eq!(backend(1).container_id(), "local");
    }

    #[test]
    fn debug_omits_runner() {
        let shown = format!("{:?}", backend(7));
        assert!(shown.starts_with("LocalBackend"));
        assert!(shown.contains("max_file_size: 7"));
    }
}
