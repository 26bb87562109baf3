use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crawler::engine::Fidelity;

pub(crate) mod directory;
pub(crate) mod keywords;

/// Name of the configuration file.
pub(crate) const CONFIG_NAME: &str = "config.toml";

#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub(crate) type ConfigResult<T> = Result<T, ConfigError>;

/// Settings shared by the scheduler, the workers and the auditor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub(crate) struct Config {
    /// Root under which one directory per keyword is created.
    pub(crate) download_directory: PathBuf,
    /// Newline-separated keyword list, rewritten sorted on every run.
    pub(crate) keywords_file: PathBuf,
    /// Skip keywords whose directory already exists.
    pub(crate) skip_existing: bool,
    /// Size of the worker pool.
    pub(crate) threads: usize,
    pub(crate) google: bool,
    pub(crate) bing: bool,
    /// Download original images instead of thumbnails (slow).
    pub(crate) full_resolution: bool,
    /// Restrict results to faces.
    pub(crate) face: bool,
    /// Per-request timeout in seconds, 0 disables it.
    pub(crate) fetch_timeout_secs: u64,
    pub(crate) user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_directory: PathBuf::from("download"),
            keywords_file: PathBuf::from("keywords.txt"),
            skip_existing: true,
            threads: 4,
            google: true,
            bing: true,
            full_resolution: false,
            face: false,
            fetch_timeout_secs: 30,
            user_agent: format!(
                "Mozilla/5.0 (X11; Linux x86_64) {}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

impl Config {
    /// Loads the config file, writing defaults when it is missing.
    ///
    /// A file that no longer parses is moved to `<name>.backup` and replaced with defaults.
    pub(crate) fn load_or_create(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            warn!("Config file not found: {}", path.display());
            let config = Config::default();
            config.save(path)?;
            info!("Created {} with default values", path.display());
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                error!("Failed to parse {}: {}", path.display(), e);
                info!("Backing up old config and creating new one with default values");

                let mut backup = path.as_os_str().to_owned();
                backup.push(".backup");
                if let Err(backup_err) = fs::rename(path, &backup) {
                    warn!("Failed to backup old config: {}", backup_err);
                }

                let config = Config::default();
                config.save(path)?;
                Ok(config)
            }
        }
    }

    pub(crate) fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub(crate) fn fidelity(&self) -> Fidelity {
        if self.full_resolution {
            Fidelity::Full
        } else {
            Fidelity::Thumbnail
        }
    }

    pub(crate) fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Pool size, never below one.
    pub(crate) fn worker_count(&self) -> usize {
        self.threads.max(1)
    }
}
