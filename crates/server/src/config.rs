//! Configuration management for the TermBridge server.
//!
//! This module provides TOML-based configuration file loading with
//! environment variable overrides. The default configuration path is
//! `~/.config/termbridge/config.toml`; a missing file yields defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be non-zero")]
    InvalidPort,

    #[error("idle_timeout_ms must be greater than 0, got {0}")]
    InvalidIdleTimeout(u64),

    #[error("memory_bytes must be at least 4 MiB, got {0}")]
    InvalidMemoryLimit(i64),

    #[error("nano_cpus must be greater than 0, got {0}")]
    InvalidCpuLimit(i64),

    #[error("default_shell path does not exist: {0}")]
    InvalidShellPath(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the TermBridge server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP/WebSocket listener configuration.
    pub server: ServerConfig,

    /// Terminal session configuration.
    pub session: SessionConfig,

    /// Container backend configuration.
    pub container: ContainerConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP/WebSocket listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port to listen on.
    pub port: u16,

    /// Address to bind.
    pub bind: String,
}

/// Terminal session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle timeout in milliseconds before a container session is evicted.
    pub idle_timeout_ms: u64,

    /// Directory bind-mounted into containers and used as the working
    /// directory for local shell fallbacks.
    pub workspace_dir: PathBuf,

    /// Shell used by the PTY and plain-process backends.
    pub default_shell: String,
}

/// Container backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContainerConfig {
    /// Whether the container backend may be selected at all. Disabling
    /// this forces the local shell fallback, which is useful in
    /// development and in tests.
    pub enabled: bool,

    /// Hard memory cap per container, in bytes.
    pub memory_bytes: i64,

    /// CPU quota per container, in units of 1e-9 CPUs.
    pub nano_cpus: i64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            bind: "0.0.0.0".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 10 * 60 * 1000, // 10 minutes
            workspace_dir: default_workspace_dir(),
            default_shell: default_shell(),
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_bytes: 512 * 1024 * 1024, // 512 MiB
            nano_cpus: 1_000_000_000,        // one full core
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("termbridge")
        .join("config.toml")
}

/// Returns the default workspace directory (the server's working
/// directory).
fn default_workspace_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the default shell for the current platform.
fn default_shell() -> String {
    if cfg!(windows) {
        "cmd.exe".to_string()
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - PORT: Override the listening port
    /// - SESSION_IDLE_MS: Override the idle timeout in milliseconds
    /// - TERMBRIDGE_LOG_LEVEL: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) if port > 0 => {
                    tracing::info!("Overriding port from environment: {}", port);
                    self.server.port = port;
                }
                _ => {
                    tracing::warn!("Ignoring invalid PORT value: {}", port);
                }
            }
        }

        if let Ok(idle) = std::env::var("SESSION_IDLE_MS") {
            match idle.parse::<u64>() {
                Ok(ms) if ms > 0 => {
                    tracing::info!("Overriding idle_timeout_ms from environment: {}", ms);
                    self.session.idle_timeout_ms = ms;
                }
                _ => {
                    tracing::warn!("Ignoring invalid SESSION_IDLE_MS value: {}", idle);
                }
            }
        }

        if let Ok(level) = std::env::var("TERMBRIDGE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid
    /// range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.session.idle_timeout_ms == 0 {
            return Err(ConfigError::InvalidIdleTimeout(self.session.idle_timeout_ms));
        }

        if self.container.memory_bytes < 4 * 1024 * 1024 {
            return Err(ConfigError::InvalidMemoryLimit(self.container.memory_bytes));
        }

        if self.container.nano_cpus <= 0 {
            return Err(ConfigError::InvalidCpuLimit(self.container.nano_cpus));
        }

        // Validate default_shell: absolute paths must exist, bare names
        // must resolve in PATH.
        let shell_path = Path::new(&self.session.default_shell);
        if shell_path.is_absolute() {
            if !shell_path.exists() {
                return Err(ConfigError::InvalidShellPath(
                    self.session.default_shell.clone(),
                ));
            }
        } else if which::which(&self.session.default_shell).is_err() {
            return Err(ConfigError::InvalidShellPath(
                self.session.default_shell.clone(),
            ));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", e.message()))
    }

    /// Idle timeout as a [`std::time::Duration`].
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.session.idle_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.session.idle_timeout_ms, 600_000);
        assert!(config.container.enabled);
        assert_eq!(config.container.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(config.container.nano_cpus, 1_000_000_000);
    }

    #[test]
    fn test_default_shell_not_empty() {
        let shell = default_shell();
        assert!(!shell.is_empty());
        if cfg!(windows) {
            assert!(shell.contains("cmd"));
        }
    }

    #[test]
    fn test_from_toml_empty_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, Config::default().server.port);
        assert_eq!(
            config.session.idle_timeout_ms,
            Config::default().session.idle_timeout_ms
        );
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[server]
port = 8080

[session]
idle_timeout_ms = 5000
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.idle_timeout_ms, 5000);
        // Untouched sections keep defaults
        assert!(config.container.enabled);
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "debug"

[server]
port = 4000
bind = "127.0.0.1"

[session]
idle_timeout_ms = 120000
workspace_dir = "/srv/workspace"
default_shell = "/bin/sh"

[container]
enabled = false
memory_bytes = 268435456
nano_cpus = 500000000
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.session.idle_timeout_ms, 120_000);
        assert_eq!(config.session.workspace_dir, PathBuf::from("/srv/workspace"));
        assert_eq!(config.session.default_shell, "/bin/sh");
        assert!(!config.container.enabled);
        assert_eq!(config.container.memory_bytes, 268_435_456);
        assert_eq!(config.container.nano_cpus, 500_000_000);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[server\nport = 8080");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let result = Config::from_toml("[server]\nport = \"not a number\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = 9999\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 9999);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "invalid [ toml").unwrap();

        let result = Config::load(&path);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_idle_timeout() {
        let mut config = Config::default();
        config.session.idle_timeout_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidIdleTimeout(0)));
    }

    #[test]
    fn test_validate_memory_too_small() {
        let mut config = Config::default();
        config.container.memory_bytes = 1024;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMemoryLimit(1024))
        );
    }

    #[test]
    fn test_validate_zero_cpus() {
        let mut config = Config::default();
        config.container.nano_cpus = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidCpuLimit(0)));
    }

    #[test]
    #[cfg(unix)]
    fn test_validate_shell_absolute_exists() {
        let mut config = Config::default();
        config.session.default_shell = "/bin/sh".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_shell_absolute_missing() {
        let mut config = Config::default();
        config.session.default_shell = "/nonexistent/shell".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidShellPath("/nonexistent/shell".to_string()))
        );
    }

    #[test]
    fn test_validate_shell_not_in_path() {
        let mut config = Config::default();
        config.session.default_shell = "no_such_shell_xyz".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_log_levels() {
        let mut config = Config::default();
        for level in ["trace", "debug", "info", "warn", "error", "WARN", "Info"] {
            config.daemon.log_level = level.to_string();
            assert!(config.validate().is_ok(), "level {} should be valid", level);
        }

        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_idle_timeout_duration() {
        let mut config = Config::default();
        config.session.idle_timeout_ms = 1500;
        assert_eq!(config.idle_timeout(), std::time::Duration::from_millis(1500));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("termbridge"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_override_port() {
        std::env::set_var("PORT", "8123");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.port, 8123);

        std::env::remove_var("PORT");
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_port_ignored() {
        std::env::set_var("PORT", "not-a-port");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.port, 3000);

        std::env::remove_var("PORT");
    }

    #[test]
    #[serial]
    fn test_env_override_idle_timeout() {
        std::env::set_var("SESSION_IDLE_MS", "30000");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.session.idle_timeout_ms, 30_000);

        std::env::remove_var("SESSION_IDLE_MS");
    }

    #[test]
    #[serial]
    fn test_env_override_zero_idle_timeout_ignored() {
        std::env::set_var("SESSION_IDLE_MS", "0");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.session.idle_timeout_ms, 600_000);

        std::env::remove_var("SESSION_IDLE_MS");
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::set_var("TERMBRIDGE_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.daemon.log_level, "debug");

        std::env::remove_var("TERMBRIDGE_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        std::env::remove_var("PORT");
        std::env::remove_var("SESSION_IDLE_MS");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.session.idle_timeout_ms, 600_000);
    }
}
