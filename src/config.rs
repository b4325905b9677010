use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::platform::Backend;
use crate::watcher::{WatcherSettings, DEFAULT_MAX_VOLUME, DEFAULT_MIN_VOLUME};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WatcherConfig {
    pub max_volume: f32,
    pub min_volume: f32,
    pub write_delay_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_volume: DEFAULT_MAX_VOLUME,
            min_volume: DEFAULT_MIN_VOLUME,
            write_delay_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PlatformConfig {
    pub backend: Backend,
    pub poll_interval_ms: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub log_path: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "~/.volume-watcher/watcher.log".to_owned(),
        }
    }
}

const fn default_backend() -> Backend {
    if cfg!(target_os = "macos") {
        Backend::Osascript
    } else {
        Backend::Wpctl
    }
}

impl Config {
    /// Load config from ~/.volume-watcher.toml, creating it if missing
    ///
    /// # Errors
    /// Returns error if HOME is unset or the file cannot be written, read or parsed
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("failed to read config file")?;
        toml::from_str(&contents).context("failed to parse config TOML")
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".volume-watcher.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        let backend = match default_backend() {
            Backend::Osascript => "osascript",
            Backend::Wpctl => "wpctl",
        };
        let default_config = format!(
            r#"[watcher]
max_volume = 0.99999
min_volume = 0.00001
write_delay_ms = 10

[platform]
backend = "{backend}"
poll_interval_ms = 50

[telemetry]
enabled = true
log_path = "~/.volume-watcher/watcher.log"
"#
        );
        fs::write(path, default_config).context("failed to write default config")?;
        Ok(())
    }

    /// Validated watcher settings
    ///
    /// # Errors
    /// Returns error if the interior bounds are invalid
    pub fn watcher_settings(&self) -> Result<WatcherSettings> {
        WatcherSettings::new(
            self.watcher.max_volume,
            self.watcher.min_volume,
            Duration::from_millis(self.watcher.write_delay_ms),
        )
        .context("invalid [watcher] settings")
    }

    /// How often the system backend is polled for volume changes
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.platform.poll_interval_ms)
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if the path starts with `~/` and HOME is unset
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_round_trips_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        Config::create_default(&path).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.watcher, WatcherConfig::default());
        assert_eq!(config.platform, PlatformConfig::default());
        assert_eq!(config.telemetry, TelemetryConfig::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"[watcher]
max_volume = 0.95

[platform]
backend = "osascript"
"#,
        )
        .unwrap();
        assert_eq!(config.watcher.max_volume, 0.95);
        assert_eq!(config.watcher.min_volume, DEFAULT_MIN_VOLUME);
        assert_eq!(config.platform.backend, Backend::Osascript);
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert!(config.telemetry.enabled);
    }

    #[test]
    fn test_watcher_settings_valid() {
        let config: Config = toml::from_str("").unwrap();
        let settings = config.watcher_settings().unwrap();
        assert_eq!(settings, WatcherSettings::default());
    }

    #[test]
    fn test_watcher_settings_invalid() {
        let config: Config = toml::from_str("[watcher]\nmin_volume = 0.5\nmax_volume = 0.4\n").unwrap();
        let err = config.watcher_settings().unwrap_err();
        assert!(err.to_string().contains("invalid [watcher] settings"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: Result<Config, _> = toml::from_str("[platform]\nbackend = \"coreaudio\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Config::load_from(&dir.path().join("absent.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_path() {
        let home = std::env::var("HOME").expect("HOME not set");
        assert_eq!(
            Config::expand_path("~/logs/watcher.log").unwrap(),
            PathBuf::from(home).join("logs/watcher.log")
        );
        assert_eq!(
            Config::expand_path("/var/log/watcher.log").unwrap(),
            PathBuf::from("/var/log/watcher.log")
        );
    }
}
