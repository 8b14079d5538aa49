use serde::Deserialize;
use std::path::Path;

use crate::error::{Result, UpdaterError};
use crate::paths;

/// Name used when the manifest has no usable `name` field.
pub const NAMELESS: &str = "nameless";

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    name: Option<String>,
}

/// Identity of the project being updated. Resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    pub name: String,
}

impl ProjectIdentity {
    pub fn nameless() -> Self {
        Self {
            name: NAMELESS.to_string(),
        }
    }

    /// Reads the project name from `<working_dir>/package.json`.
    ///
    /// A manifest without a name yields [`NAMELESS`]; a missing or malformed
    /// manifest means the working directory is wrong and is reported as a
    /// configuration error.
    pub fn resolve(working_dir: &Path) -> Result<Self> {
        let path = paths::manifest_path(working_dir);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            UpdaterError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let manifest: PackageManifest = serde_json::from_str(&content).map_err(|e| {
            UpdaterError::Configuration(format!("cannot parse {}: {e}", path.display()))
        })?;
        let name = manifest
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| NAMELESS.to_string());
        Ok(Self { name })
    }
}
