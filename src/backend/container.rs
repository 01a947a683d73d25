use crate::exec::{ExecError, SharedRunner, AUX_TIMEOUT, READ_TIMEOUT};
use crate::files;
use crate::tmux::Tmux;

use super::{FileContent, SourceError, TmuxExec};

/// Running containers whose name starts with `name_prefix` (if non-empty)
/// and that carry `label` (if given). Returns container ids.
pub async fn list_containers(
    runner: &SharedRunner,
    docker_bin: &str,
    name_prefix: &str,
    label: Option<&str>,
) -> Result<Vec<String>, SourceError> {
    let mut argv = vec![docker_bin.to_string(), "ps".into()];
    if let Some(label) = label.filter(|l| !l.is_empty()) {
        argv.push("--filter".into());
        argv.push(format!("label={label}"));
    }
    argv.push("--format".into());
    argv.push("{{.ID}}\t{{.Names}}".into());

    let out = runner.run(&argv, AUX_TIMEOUT).await?;
    Ok(parse_container_list(&String::from_utf8_lossy(&out), name_prefix))
}

fn parse_container_list(output: &str, name_prefix: &str) -> Vec<String> {
    let mut ids: Vec<String> = output
        .lines()
        .filter_map(|line| {
            let (id, names) = line.split_once('\t')?;
            let id = id.trim();
            let matches = name_prefix.is_empty()
                || names
                    .split(',')
                    .any(|n| n.trim().trim_start_matches('/').starts_with(name_prefix));
            (!id.is_empty() && matches).then(|| id.to_string())
        })
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// tmux inside a Docker container, driven through `docker exec`.
#[derive(Clone)]
pub struct ContainerBackend {
    container_id: String,
    docker_bin: String,
    tmux: TmuxExec,
    runner: SharedRunner,
    max_file_size: u64,
}

impl std::fmt::Debug for ContainerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBackend")
            .field("container_id", &self.container_id)
            .field("docker_bin", &self.docker_bin)
            .field("max_file_size", &self.max_file_size)
            .finish_non_exhaustive()
    }
}

impl ContainerBackend {
    pub fn new(
        container_id: &str,
        docker_bin: &str,
        runner: SharedRunner,
        max_file_size: u64,
    ) -> Self {
        Self {
            container_id: container_id.to_string(),
            docker_bin: docker_bin.to_string(),
            tmux: TmuxExec::new(
                Tmux::in_container(docker_bin, container_id),
                runner.clone(),
                max_file_size,
            ),
            runner,
            max_file_size,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn tmux(&self) -> &TmuxExec {
        &self.tmux
    }

    fn exec_prefix(&self) -> Vec<String> {
        vec![
            self.docker_bin.clone(),
            "exec".into(),
            self.container_id.clone(),
        ]
    }

    /// Read a file inside the container. `stat` runs first so oversized
    /// files are rejected without transferring them.
    pub async fn read_file(&self, path: &str) -> Result<FileContent, SourceError> {
        if !path.starts_with('/') {
            return Err(SourceError::InvalidInput(format!(
                "path must be absolute: {path}"
            )));
        }

        let mut stat = self.exec_prefix();
        stat.extend(["stat", "-L", "-c", "%s", "--", path].map(String::from));
        let out = self
            .runner
            .run(&stat, AUX_TIMEOUT)
            .await
            .map_err(|e| self.file_error(e, path))?;
        let size: u64 = String::from_utf8_lossy(&out)
            .trim()
            .parse()
            .map_err(|_| SourceError::Malformed(format!("stat output for {path}")))?;
        if size > self.max_file_size {
            return Err(SourceError::TooLarge(format!(
                "{path} is {size} bytes, limit is {} bytes",
                self.max_file_size
            )));
        }

        let mut cat = self.exec_prefix();
        cat.extend(["cat", "--", path].map(String::from));
        let data = self
            .runner
            .run(&cat, READ_TIMEOUT)
            .await
            .map_err(|e| self.file_error(e, path))?;
        // The file may have grown between stat and cat.
        if data.len() as u64 > self.max_file_size {
            return Err(SourceError::TooLarge(format!(
                "{path} is {} bytes, limit is {} bytes",
                data.len(),
                self.max_file_size
            )));
        }

        let mime = files::detect_mime(&self.runner, &self.exec_prefix(), path).await;
        Ok(FileContent { data, mime })
    }

    fn file_error(&self, e: ExecError, path: &str) -> SourceError {
        let stderr = e.stderr();
        if stderr.contains("No such file") {
            SourceError::NotFound(format!("no such file: {path}"))
        } else if stderr.contains("No such container") || stderr.contains("is not running") {
            SourceError::NotFound(format!("container {}", self.container_id))
        } else {
            e.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::exec::ProcessRunner;

    #[test]
    fn filters_containers_by_name_prefix() {
        let out = "b2\ttmuxdeck-api\n\
                   a1\ttmuxdeck-web,alias\n\
                   c3\tpostgres\n\
                   \n";
        assert_eq!(parse_container_list(out, "tmuxdeck"), vec!["a1", "b2"]);
        assert_eq!(parse_container_list(out, ""), vec!["a1", "b2", "c3"]);
    }

    #[test]
    fn debug_names_container() {
        let backend = ContainerBackend::new("a1", "docker", ProcessRunner::shared(), 1);
        let shown = format!("{:?}", Backend::Container(backend));
        assert!(shown.contains("container_id: \"a1\""));
    }
}
