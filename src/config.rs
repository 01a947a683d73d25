use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default ceiling for file reads and captures (20 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

/// Top-level config, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    pub local: LocalConfig,
    pub docker: DockerConfig,
    pub bridge: BridgeConfig,
    pub limits: LimitsConfig,
    pub render: RenderConfig,
}

/// Sessions on this machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Enumerate the default tmux server as the `local` source.
    pub enabled: bool,
    /// Path to a host tmux socket (e.g. bind-mounted into the control plane's
    /// container). Enables the `host` source.
    pub host_tmux_socket: Option<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host_tmux_socket: None,
        }
    }
}

/// Sessions inside Docker containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub enabled: bool,
    pub docker_bin: String,
    /// Only containers whose name starts with this prefix are listed.
    pub name_prefix: String,
    /// Optional `key=value` label filter.
    pub label: Option<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            docker_bin: "docker".into(),
            name_prefix: "tmuxdeck".into(),
            label: None,
        }
    }
}

/// Remote agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Tokens accepted from connecting agents. Empty means no agent can connect.
    pub tokens: Vec<String>,
    /// Deadline for a single request to an agent.
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            request_timeout_secs: 30,
        }
    }
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum payload accepted from any file read.
    pub max_file_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Screenshot rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Fonts tried before the built-in search list.
    pub font_paths: Vec<PathBuf>,
    pub font_size: f32,
    pub padding: u32,
    /// Default foreground: a color name or six hex digits.
    pub foreground: String,
    /// Default background: a color name or six hex digits.
    pub background: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_paths: Vec::new(),
            font_size: 14.0,
            padding: 10,
            foreground: "e5e5e5".into(),
            background: "1e1e1e".into(),
        }
    }
}

impl DeckConfig {
    /// Load config from a TOML file path. Returns None if file doesn't exist.
    ///
    /// Checks file permissions and warns if world-readable.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        check_config_permissions(path);

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(Some(config))
    }

    /// Reject values that would make a source unusable at runtime.
    pub fn validate(&self) -> Result<(), String> {
        if self.docker.enabled && self.docker.docker_bin.trim().is_empty() {
            return Err("docker.docker_bin must not be empty".into());
        }
        if self.limits.max_file_size == 0 {
            return Err("limits.max_file_size must be positive".into());
        }
        if self.render.font_size.is_nan() || self.render.font_size <= 0.0 {
            return Err("render.font_size must be positive".into());
        }
        if self.bridge.tokens.iter().any(|t| t.is_empty()) {
            return Err("bridge.tokens must not contain empty tokens".into());
        }
        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/tmuxdeck/config.toml`, if a config dir exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tmuxdeck").join("config.toml"))
}

/// Errors that can occur when loading config.
#[derive(Debug)]
pub enum ConfigError {
    ReadFailed(PathBuf, std::io::Error),
    ParseFailed(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadFailed(path, e) => {
                write!(f, "Failed to read config {}: {}", path.display(), e)
            }
            Self::ParseFailed(path, e) => {
                write!(f, "Failed to parse config {}: {}", path.display(), e)
            }
            Self::Invalid(detail) => write!(f, "Invalid config: {}", detail),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Check file permissions on a config file and warn if world-readable.
///
/// The config may hold bridge tokens.
#[cfg(unix)]
pub fn check_config_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return,
    };

    let mode = metadata.permissions().mode();
    if is_world_readable(mode) {
        tracing::warn!(
            "Config file {} is world-readable (mode {:o}). \
             It may contain bridge tokens -- consider restricting permissions to 600.",
            path.display(),
            mode & 0o7777,
        );
    }
}

#[cfg(not(unix))]
pub fn check_config_permissions(_path: &Path) {}

pub fn is_world_readable(mode: u32) -> bool {
    mode & 0o004 != 0
}

/// Resolve the agent's display name: explicit value, else the system hostname.
pub fn resolve_agent_name(explicit: Option<&str>) -> String {
    if let Some(name) = explicit {
        return name.to_string();
    }
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| h.split('.').next().unwrap_or_default().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "bridge".to_string())
}
