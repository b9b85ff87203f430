//! Configuration loading and validation.
//!
//! Resolution order (highest to lowest priority):
//! 1. Explicit CLI flags (via [`ConfigOptions`])
//! 2. Environment variables (`SODIUM_ADB`, `ANDROID_SERIAL`,
//!    `SODIUM_TIMEOUT_MS`, `SODIUM_DEADLINE_MS`)
//! 3. `config.json` in the config directory
//! 4. Built-in defaults

use crate::adb::AdbConfig;
use crate::resolve::Resolver;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default XDG config directory name.
const CONFIG_DIR_NAME: &str = "sodium";

/// Config file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl From<ConfigError> for sodium_common::Error {
    fn from(err: ConfigError) -> Self {
        sodium_common::Error::Config(err.to_string())
    }
}

/// Settings as stored in `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SodiumConfig {
    /// Path or name of the adb client.
    pub adb_path: PathBuf,
    /// adb server host; the client default when unset.
    pub host: Option<String>,
    /// adb server port.
    pub port: Option<u16>,
    /// Device serial; adb picks the only attached device when unset.
    pub serial: Option<String>,
    /// Per-command timeout.
    pub command_timeout_ms: u64,
    /// Aggregate deadline per property chain; unbounded when unset.
    pub chain_deadline_ms: Option<u64>,
    /// Cap on captured output per command.
    pub max_output_bytes: usize,
}

impl Default for SodiumConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            host: None,
            port: None,
            serial: None,
            command_timeout_ms: crate::resolve::DEFAULT_COMMAND_TIMEOUT.as_millis() as u64,
            chain_deadline_ms: None,
            max_output_bytes: crate::adb::runner::DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl SodiumConfig {
    /// Reject values that would make every command fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "command_timeout_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.chain_deadline_ms == Some(0) {
            return Err(ConfigError::Invalid {
                key: "chain_deadline_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.max_output_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "max_output_bytes".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn chain_deadline(&self) -> Option<Duration> {
        self.chain_deadline_ms.map(Duration::from_millis)
    }

    pub fn adb_config(&self) -> AdbConfig {
        AdbConfig {
            adb_path: self.adb_path.clone(),
            host: self.host.clone(),
            port: self.port,
            serial: self.serial.clone(),
            default_timeout: Some(self.command_timeout()),
            max_output_bytes: self.max_output_bytes,
        }
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new()
            .with_default_timeout(Some(self.command_timeout()))
            .with_deadline(self.chain_deadline())
    }
}

/// Configuration resolution options (CLI layer).
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config directory (highest priority).
    pub config_dir: Option<PathBuf>,
    pub adb_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub serial: Option<String>,
    pub timeout_ms: Option<u64>,
    pub deadline_ms: Option<u64>,
}

/// Resolved configuration with provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub settings: SodiumConfig,
    /// Config file that was read, if one existed.
    pub config_path: Option<PathBuf>,
    /// The config directory used for resolution.
    pub config_dir: PathBuf,
}

/// Load configuration from the process environment.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    load_config_with_env(options, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup.
pub fn load_config_with_env<F>(options: &ConfigOptions, env: F) -> Result<ResolvedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_dir = resolve_config_dir(options, &env);
    let path = config_dir.join(CONFIG_FILE_NAME);

    let (mut settings, config_path) = if path.exists() {
        (load_config_file(&path)?, Some(path))
    } else {
        debug!(path = %path.display(), "no config file, using defaults");
        (SodiumConfig::default(), None)
    };

    apply_env_overrides(&mut settings, &env)?;
    apply_cli_overrides(&mut settings, options);
    settings.validate()?;

    Ok(ResolvedConfig {
        settings,
        config_path,
        config_dir,
    })
}

/// Resolve the config directory using the standard resolution order.
fn resolve_config_dir<F>(options: &ConfigOptions, env: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = &options.config_dir {
        return dir.clone();
    }
    if let Some(dir) = env("SODIUM_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    let xdg_config = env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
    xdg_config.join(CONFIG_DIR_NAME)
}

fn load_config_file(path: &Path) -> Result<SodiumConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config = serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

fn apply_env_overrides<F>(settings: &mut SodiumConfig, env: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(adb) = env("SODIUM_ADB").filter(|v| !v.is_empty()) {
        settings.adb_path = PathBuf::from(adb);
    }
    if let Some(serial) = env("ANDROID_SERIAL").filter(|v| !v.is_empty()) {
        settings.serial = Some(serial);
    }
    if let Some(ms) = env("SODIUM_TIMEOUT_MS") {
        settings.command_timeout_ms = parse_millis("SODIUM_TIMEOUT_MS", &ms)?;
    }
    if let Some(ms) = env("SODIUM_DEADLINE_MS") {
        settings.chain_deadline_ms = Some(parse_millis("SODIUM_DEADLINE_MS", &ms)?);
    }
    Ok(())
}

fn apply_cli_overrides(settings: &mut SodiumConfig, options: &ConfigOptions) {
    if let Some(adb) = &options.adb_path {
        settings.adb_path = adb.clone();
    }
    if let Some(host) = &options.host {
        settings.host = Some(host.clone());
    }
    if let Some(port) = options.port {
        settings.port = Some(port);
    }
    if let Some(serial) = &options.serial {
        settings.serial = Some(serial.clone());
    }
    if let Some(ms) = options.timeout_ms {
        settings.command_timeout_ms = ms;
    }
    if let Some(ms) = options.deadline_ms {
        settings.chain_deadline_ms = Some(ms);
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        message: format!("expected milliseconds, got {value:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn options_in(dir: &TempDir) -> ConfigOptions {
        ConfigOptions {
            config_dir: Some(dir.path().to_path_buf()),
            ..ConfigOptions::default()
        }
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let resolved = load_config_with_env(&options_in(&dir), env_of(&[])).unwrap();

        assert_eq!(resolved.settings, SodiumConfig::default());
        assert!(resolved.config_path.is_none());
        assert_eq!(resolved.settings.command_timeout(), Duration::from_secs(10));
        assert_eq!(resolved.settings.chain_deadline(), None);
    }

    #[test]
    fn test_file_then_env_then_cli() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "serial": "file-serial", "command_timeout_ms": 3000, "port": 5038 }"#,
        )
        .unwrap();

        let env = env_of(&[("ANDROID_SERIAL", "env-serial"), ("SODIUM_DEADLINE_MS", "8000")]);
        let mut options = options_in(&dir);
        options.timeout_ms = Some(1500);
        let resolved = load_config_with_env(&options, env).unwrap();

        assert_eq!(resolved.config_path, Some(dir.path().join(CONFIG_FILE_NAME)));
        assert_eq!(resolved.settings.serial.as_deref(), Some("env-serial"));
        assert_eq!(resolved.settings.port, Some(5038));
        assert_eq!(resolved.settings.command_timeout_ms, 1500);
        assert_eq!(resolved.settings.chain_deadline_ms, Some(8000));
    }

    #[test]
    fn test_config_dir_from_env() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{ "adb_path": "/opt/adb" }"#).unwrap();
        let dir_str = dir.path().to_string_lossy().into_owned();

        let resolved =
            load_config_with_env(&ConfigOptions::default(), env_of(&[("SODIUM_CONFIG_DIR", dir_str.as_str())]))
                .unwrap();
        assert_eq!(resolved.settings.adb_path, PathBuf::from("/opt/adb"));
    }

    #[test]
    fn test_xdg_config_home() {
        let dir = TempDir::new().unwrap();
        let dir_str = dir.path().to_string_lossy().into_owned();
        let resolved =
            load_config_with_env(&ConfigOptions::default(), env_of(&[("XDG_CONFIG_HOME", dir_str.as_str())]))
                .unwrap();
        assert_eq!(resolved.config_dir, dir.path().join("sodium"));
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();
        let err = load_config_with_env(&options_in(&dir), env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let dir = TempDir::new().unwrap();
        let err = load_config_with_env(&options_in(&dir), env_of(&[("SODIUM_TIMEOUT_MS", "0")]))
            .unwrap_err();
        match err {
            ConfigError::Invalid { key, .. } => assert_eq!(key, "command_timeout_ms"),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_env_value() {
        let dir = TempDir::new().unwrap();
        let err = load_config_with_env(&options_in(&dir), env_of(&[("SODIUM_DEADLINE_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "SODIUM_DEADLINE_MS"));
    }

    #[test]
    fn test_resolver_and_adb_config() {
        let settings = SodiumConfig {
            serial: Some("R58M".into()),
            chain_deadline_ms: Some(2500),
            ..SodiumConfig::default()
        };
        let resolver = settings.resolver();
        assert_eq!(resolver.deadline(), Some(Duration::from_millis(2500)));
        assert_eq!(resolver.default_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(settings.adb_config().global_args(), vec!["-s", "R58M"]);
    }
}
