//! Configuration resolution for MRP runs.
//!
//! Implements deterministic config resolution order:
//! 1. Explicit CLI flag (--config)
//! 2. Environment variable (MRP_CONFIG)
//! 3. XDG config dir ($XDG_CONFIG_HOME/dwelling_mrp/config.{toml,json})
//! 4. Built-in defaults

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{ConfigResolution, ConfigSource, MrpConfig};
use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "MRP_CONFIG";

/// Directory name under the user config dir.
pub const CONFIG_DIR_NAME: &str = "dwelling_mrp";

const CONFIG_FILE_NAMES: [&str; 2] = ["config.toml", "config.json"];

/// Configuration file paths from the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Explicit config file
    pub config_path: Option<PathBuf>,
    /// Override for the config directory searched in step 3
    pub config_dir: Option<PathBuf>,
}

/// Configuration resolver with deterministic resolution order.
#[derive(Debug)]
pub struct ConfigResolver {
    cli_paths: ConfigPaths,
}

impl ConfigResolver {
    pub fn new(paths: ConfigPaths) -> Self {
        ConfigResolver { cli_paths: paths }
    }

    /// Resolve the directory searched for `config.toml` / `config.json`.
    pub fn resolve_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.cli_paths.config_dir {
            return Some(dir.clone());
        }
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join(CONFIG_DIR_NAME));
        }
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME))
    }

    /// Resolve the config file path and how it was found.
    pub fn resolve_config_path(&self) -> (Option<PathBuf>, ConfigResolution) {
        if let Some(ref path) = self.cli_paths.config_path {
            return (Some(path.clone()), ConfigResolution::CliFlag);
        }

        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return (Some(PathBuf::from(path)), ConfigResolution::EnvVar);
            }
        }

        if let Some(dir) = self.resolve_config_dir() {
            for name in CONFIG_FILE_NAMES {
                let path = dir.join(name);
                if path.exists() {
                    return (Some(path), ConfigResolution::XdgConfig);
                }
            }
        }

        (None, ConfigResolution::Default)
    }

    /// Load and validate the resolved config, or built-in defaults.
    pub fn load(&self) -> Result<(MrpConfig, ConfigSource)> {
        let (path, resolution) = self.resolve_config_path();

        match path {
            Some(p) => {
                let content = fs::read_to_string(&p).map_err(|e| {
                    Error::Config(format!("failed to read config from {}: {}", p.display(), e))
                })?;
                let hash = compute_sha256(&content);
                let config = parse_config(&p, &content)?;
                config.validate()?;

                Ok((
                    config,
                    ConfigSource {
                        path: Some(p.to_string_lossy().to_string()),
                        hash: Some(hash),
                        resolution,
                    },
                ))
            }
            None => Ok((MrpConfig::default(), ConfigSource::defaults())),
        }
    }
}

/// Parse a config file by extension: `.json` is JSON, anything else TOML.
pub fn parse_config(path: &Path, content: &str) -> Result<MrpConfig> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    } else {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }
}

/// Compute SHA-256 hash of a string.
pub(crate) fn compute_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
