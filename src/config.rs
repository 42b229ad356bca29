use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, SandboxError};

const CONFIG_FILE: &str = "devbox.toml";

/// Environment variable overriding the devbox home directory.
pub const HOME_ENV: &str = "DEVBOX_HOME";

/// Contents of `devbox.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// `[sandbox]`
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// `[storage]`
    #[serde(default)]
    pub storage: StorageConfig,
    /// `[readiness]`
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// `[sync]`
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Container launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Image every project container is started from
    #[serde(default = "default_image")]
    pub image: String,

    /// Shell command the container runs on start
    #[serde(default = "default_command")]
    pub command: String,

    /// Container names are `<prefix>_<project>_<suffix>`
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Host port mapped to the service port
    #[serde(default = "default_host_port")]
    pub host_port: u16,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            command: default_command(),
            name_prefix: default_name_prefix(),
            host_port: default_host_port(),
        }
    }
}

/// Where project files and records live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where project directories are allocated (default: `<tmp>/devbox_projects`)
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Project store document (default: `<home>/projects.toml`)
    #[serde(default)]
    pub store_file: Option<PathBuf>,
}

/// How the service port is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Host the service port is probed on
    #[serde(default = "default_probe_host")]
    pub probe_host: String,

    /// Per-request timeout for a single probe
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            probe_host: default_probe_host(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ReadinessConfig {
    /// Per-request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// File write behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Push written files into the running container as well as the host mirror
    #[serde(default = "default_true")]
    pub push_writes: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { push_writes: true }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_image() -> String {
    "node:18-alpine".to_string()
}

fn default_command() -> String {
    "cd /app && npm install && npm run dev".to_string()
}

fn default_name_prefix() -> String {
    "devbox_project".to_string()
}

fn default_host_port() -> u16 {
    crate::SERVICE_PORT
}

fn default_probe_host() -> String {
    "127.0.0.1".to_string()
}

fn default_request_timeout() -> u64 {
    2
}

impl Config {
    /// Load configuration from `<home>/devbox.toml`, using defaults if not found
    pub fn load(home: &Path) -> Result<Self> {
        let config_path = home.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content =
            fs::read_to_string(&config_path).map_err(|e| SandboxError::io(&config_path, e))?;

        toml::from_str(&content).map_err(|e| {
            SandboxError::config(format!(
                "Failed to parse config file {}: {e}",
                config_path.display()
            ))
        })
    }

    /// Directory new project directories are allocated under.
    pub fn scratch_root(&self) -> PathBuf {
        self.storage
            .scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("devbox_projects"))
    }

    /// Path of the project store document.
    pub fn store_file(&self, home: &Path) -> PathBuf {
        self.storage
            .store_file
            .clone()
            .unwrap_or_else(|| home.join("projects.toml"))
    }
}

/// Resolve the devbox home directory: `$DEVBOX_HOME`, else `<data dir>/devbox`.
pub fn resolve_home(env_home: Option<&str>) -> Result<PathBuf> {
    match env_home.filter(|h| !h.is_empty()) {
        Some(home) => Ok(PathBuf::from(home)),
        None => dirs::data_dir()
            .map(|d| d.join("devbox"))
            .ok_or_else(|| SandboxError::config("Could not determine data directory")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sandbox.image, "node:18-alpine");
        assert_eq!(config.sandbox.host_port, 3000);
        assert!(config.sync.push_writes);
        assert_eq!(config.readiness.probe_host, "127.0.0.1");
        assert!(config.scratch_root().ends_with("devbox_projects"));
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[sandbox]
image = "node:20-alpine"
host_port = 3100

[storage]
scratch_root = "/var/lib/devbox/projects"

[sync]
push_writes = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sandbox.image, "node:20-alpine");
        assert_eq!(config.sandbox.host_port, 3100);
        assert_eq!(config.sandbox.name_prefix, "devbox_project");
        assert!(!config.sync.push_writes);
        assert_eq!(
            config.scratch_root(),
            PathBuf::from("/var/lib/devbox/projects")
        );
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.sandbox.command, "cd /app && npm install && npm run dev");
        assert_eq!(config.store_file(dir.path()), dir.path().join("projects.toml"));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[sandbox\nimage = ").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_resolve_home_prefers_env() {
        assert_eq!(
            resolve_home(Some("/srv/devbox")).unwrap(),
            PathBuf::from("/srv/devbox")
        );
    }

    #[test]
    fn test_resolve_home_ignores_empty_env() {
        if let Some(data) = dirs::data_dir() {
            assert_eq!(resolve_home(Some("")).unwrap(), data.join("devbox"));
        }
    }
}
