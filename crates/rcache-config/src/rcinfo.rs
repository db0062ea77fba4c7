use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Shared configuration file, committed next to the project.
pub const RCINFO_FILE: &str = ".rcinfo";
/// Per-developer overrides, never committed.
pub const USER_RCINFO_FILE: &str = "user.rcinfo";

/// Which side of the cache this machine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Downloads artifacts and adapts them from generic to local form.
    #[default]
    Consumer,
    /// Builds and publishes artifacts, adapting them from local to generic form.
    Producer,
}

/// What to do when two overlay-remapped dependency keys collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMerge {
    /// Merge the dependency lists of colliding keys.
    #[default]
    Union,
    /// Treat any collision as an error.
    Strict,
}

/// The `.rcinfo` configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcConfig {
    pub mode: Mode,
    /// Extra environment variables that contribute to the environment fingerprint.
    pub custom_fingerprint_envs: Vec<String>,
    /// Regular expressions of dependency paths that never affect the fingerprint.
    pub irrelevant_dependencies_paths: Vec<String>,
    /// Extension of the per-file sidecar fingerprint written next to artifact headers.
    pub override_extension: String,
    /// Name of the marker file created in the target temp dir.
    pub marker_filename: String,
    /// Enables the asset catalog decision flow.
    pub assets_caching: bool,
    pub overlay_merge: OverlayMerge,
    /// Extra generic placeholder to local path rules, e.g. `"$(PODS_ROOT)" = "/src/Pods"`.
    pub path_mappings: BTreeMap<String, String>,
}

impl Default for RcConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            custom_fingerprint_envs: Vec::new(),
            irrelevant_dependencies_paths: Vec::new(),
            override_extension: "sha256".to_owned(),
            marker_filename: "rc.enabled".to_owned(),
            assets_caching: true,
            overlay_merge: OverlayMerge::default(),
            path_mappings: BTreeMap::new(),
        }
    }
}

impl RcConfig {
    /// Read and parse a single configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Load `.rcinfo` from `source_root`, overlaid with `user.rcinfo` if present.
    ///
    /// Top-level keys in the user file replace the shared ones. A project with
    /// no `.rcinfo` gets the defaults.
    ///
    /// # Errors
    /// Returns an error if either file exists but cannot be read or parsed.
    pub fn load(source_root: &Path) -> Result<Self, ConfigError> {
        let shared_path = source_root.join(RCINFO_FILE);
        let mut merged = read_table(&shared_path)?.unwrap_or_default();
        if let Some(user) = read_table(&source_root.join(USER_RCINFO_FILE))? {
            merged.extend(user);
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(|e| ConfigError::Parse {
                path: shared_path.display().to_string(),
                source: e,
            })
    }
}

fn read_table(path: &Path) -> Result<Option<toml::Table>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let table = content
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
    Ok(Some(table))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}
