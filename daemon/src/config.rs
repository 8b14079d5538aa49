use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

pub const MIN_UPDATE_INTERVAL_SECS: u64 = 1;
/// Ten years. Longer intervals are clamped so deadlines stay representable.
pub const MAX_UPDATE_INTERVAL_SECS: u64 = 10 * 365 * 86_400;
/// One day.
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_LOG_DIR: &str = "./log/npm-updater";
pub const DEFAULT_PACKAGE_MANAGER: &str = "npm";

/// Root of the config file. Everything lives under the `[updater]` table.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    updater: Config,
}

/// Settings for one update cycle.
///
/// A `Config` is never mutated once a cycle has started; the scheduler
/// replaces it wholesale after each reload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Project directory the package manager runs in.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Directory for the monthly log files. Relative paths are resolved
    /// against `working_dir`.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Seconds between two checks. Clamped to at least one second.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// When false, cycles only log the outdated report and never run the update.
    #[serde(default = "default_autoupdate")]
    pub autoupdate: bool,
    /// Diagnostic mode: also records "next check" markers in the durable log.
    #[serde(default)]
    pub verbose: bool,
    /// Executable invoked as `<package_manager> update` / `<package_manager> outdated`.
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            log_dir: default_log_dir(),
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            autoupdate: true,
            verbose: false,
            package_manager: DEFAULT_PACKAGE_MANAGER.to_string(),
        }
    }
}

impl Config {
    /// Returns the check interval, clamped to
    /// [`MIN_UPDATE_INTERVAL_SECS`]..=[`MAX_UPDATE_INTERVAL_SECS`].
    pub fn effective_interval(&self) -> Duration {
        Duration::from_secs(
            self.update_interval_secs
                .clamp(MIN_UPDATE_INTERVAL_SECS, MAX_UPDATE_INTERVAL_SECS),
        )
    }

    /// Returns the log directory, resolved against the working directory.
    pub fn resolved_log_dir(&self) -> PathBuf {
        paths::resolve_against(&self.working_dir, &self.log_dir)
    }
}

/// Runtime arguments that take priority over the config file.
///
/// Applied after every load so a reload never silently drops them.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub working_dir: Option<PathBuf>,
    pub update_interval_secs: Option<u64>,
    pub verbose: Option<bool>,
    pub autoupdate: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(dir) = &self.working_dir {
            config.working_dir = dir.clone();
        }
        if let Some(secs) = self.update_interval_secs {
            config.update_interval_secs = secs;
        }
        if let Some(verbose) = self.verbose {
            config.verbose = verbose;
        }
        if let Some(autoupdate) = self.autoupdate {
            config.autoupdate = autoupdate;
        }
        config
    }
}

/// Anything the scheduler can re-read its configuration from.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<Config>;
}

/// A TOML file on disk, with runtime overrides layered on top.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
    overrides: ConfigOverrides,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>, overrides: ConfigOverrides) -> Self {
        Self {
            path: path.into(),
            overrides,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<Config> {
        let config = load_or_default(&self.path)?;
        Ok(self.overrides.apply(config))
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let file: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(file.updater)
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

fn default_update_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

fn default_autoupdate() -> bool {
    true
}

fn default_package_manager() -> String {
    DEFAULT_PACKAGE_MANAGER.to_string()
}
