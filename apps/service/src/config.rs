use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file")]
    ReadFailed,
    #[error("failed to write config file")]
    WriteFailed,
    #[error("failed to parse config file")]
    ParseFailed,
    #[error("no config path available")]
    ConfigPathUnavailable,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub probe: ProbeConfig,
    pub registry: RegistryConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_seconds: u64,
    pub concurrency: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub max_targets_per_owner: usize,
    pub cascade_logs_on_remove: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub resync_seconds: u64,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            probe: ProbeConfig::default(),
            registry: RegistryConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "vigil.db".into(), pool_size: 4 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: crate::monitoring::probe::DEFAULT_TIMEOUT_SECONDS,
            concurrency: 8,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_targets_per_owner: 20, cascade_logs_on_remove: true }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { resync_seconds: 30 }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current Internal Configuration State:")?;
        writeln!(f, "  Database")?;
        writeln!(f, "    Path: {}", self.database.path)?;
        writeln!(f, "    Pool Size: {}", self.database.pool_size)?;
        writeln!(f, "  Probe")?;
        writeln!(f, "    Timeout Seconds: {}", self.probe.timeout_seconds)?;
        writeln!(f, "    Concurrency: {}", self.probe.concurrency)?;
        writeln!(f, "  Registry")?;
        writeln!(f, "    Max Targets Per Owner: {}", self.registry.max_targets_per_owner)?;
        writeln!(f, "    Cascade Logs On Remove: {}", self.registry.cascade_logs_on_remove)?;
        writeln!(f, "  Scheduler")?;
        writeln!(f, "    Resync Seconds: {}", self.scheduler.resync_seconds)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    /// or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string =
                fs::read_to_string(&config_path).map_err(|_err| Error::ReadFailed)?;
            toml::from_str(raw_string.as_str()).map_err(|_err| Error::ParseFailed)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String =
            toml::to_string_pretty(self).map_err(|_err| Error::ParseFailed)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_err| Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(|_err| Error::WriteFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_creates_defaults_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::from_config(Some(&path)).unwrap();

        assert!(path.exists());
        assert_eq!(config.registry.max_targets_per_owner, 20);
        assert!(config.registry.cascade_logs_on_remove);
        assert_eq!(config.probe.timeout_seconds, 10);
    }

    #[test]
    fn partial_file_falls_back_to_defaults_per_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[registry]\nmax_targets_per_owner = 5\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();

        assert_eq!(config.registry.max_targets_per_owner, 5);
        assert_eq!(config.scheduler.resync_seconds, 30);
    }

    #[test]
    fn extension_is_normalized_to_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.conf");

        Config::from_config(Some(&path)).unwrap();

        assert!(dir.path().join("config.toml").exists());
    }
}
