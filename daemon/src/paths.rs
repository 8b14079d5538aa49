/// Canonical file locations for the updater.
///
///   - npm-updater.toml  Looked up in the process working directory unless
///                       `--config` names another file.
///   - package.json      The manifest of the project being kept up to date.
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "npm-updater.toml";
pub const MANIFEST_FILE_NAME: &str = "package.json";

/// Returns the default config file path: `<current dir>/npm-updater.toml`.
pub fn config_file_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

/// Returns the manifest path of the project in `working_dir`.
pub fn manifest_path(working_dir: &Path) -> PathBuf {
    working_dir.join(MANIFEST_FILE_NAME)
}

/// Joins `path` onto `base` unless it is already absolute.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
