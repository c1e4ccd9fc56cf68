//! Configuration loading and validation for MRP runs.
//!
//! This module provides:
//! - Typed configuration for priors, sampler, diagnostics, and prediction
//! - Deterministic config resolution (CLI > env > XDG > defaults)
//! - Semantic validation
//! - Config snapshots recorded in every report

pub mod model;
pub mod resolve;
pub mod sampler;
pub mod snapshot;

pub use model::{AgePooling, ModelPriors, NormalPrior, StudentTPrior};
pub use resolve::{ConfigPaths, ConfigResolver};
pub use sampler::{DiagnosticsSettings, PredictiveSettings, SamplerSettings, MIN_CHAINS};
pub use snapshot::ConfigSnapshot;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

fn default_schema_version() -> String {
    CONFIG_SCHEMA_VERSION.to_string()
}

/// Complete run configuration.
///
/// Every section has defaults, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MrpConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub model: ModelPriors,
    #[serde(default)]
    pub sampler: SamplerSettings,
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,
    #[serde(default)]
    pub predictive: PredictiveSettings,
}

impl Default for MrpConfig {
    fn default() -> Self {
        MrpConfig {
            schema_version: default_schema_version(),
            model: ModelPriors::default(),
            sampler: SamplerSettings::default(),
            diagnostics: DiagnosticsSettings::default(),
            predictive: PredictiveSettings::default(),
        }
    }
}

impl MrpConfig {
    /// Validate configuration semantically.
    pub fn validate(&self) -> Result<()> {
        let major = self.schema_version.split('.').next().unwrap_or_default();
        if major != "1" {
            return Err(Error::InvalidConfig(format!(
                "unsupported schema_version {} (expected 1.x)",
                self.schema_version
            )));
        }
        self.model.validate()?;
        self.sampler.validate()?;
        self.diagnostics.validate()?;
        self.predictive.validate()?;
        Ok(())
    }
}

/// A validated configuration with the record of where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: MrpConfig,
    pub snapshot: ConfigSnapshot,
}

impl ResolvedConfig {
    /// Load configuration with resolution from CLI, env, or defaults.
    pub fn load(resolver: &ConfigResolver) -> Result<Self> {
        let (config, source) = resolver.load()?;
        let snapshot = ConfigSnapshot::new(&config, source)?;
        Ok(ResolvedConfig { config, snapshot })
    }

    /// Built-in defaults only.
    pub fn load_defaults() -> Result<Self> {
        let config = MrpConfig::default();
        let snapshot = ConfigSnapshot::from_defaults(&config)?;
        Ok(ResolvedConfig { config, snapshot })
    }
}

/// Configuration source for a file.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file, or None if using defaults
    pub path: Option<String>,
    /// SHA-256 hash of file contents, or None if defaults
    pub hash: Option<String>,
    /// How this source was resolved
    pub resolution: ConfigResolution,
}

impl ConfigSource {
    pub fn defaults() -> Self {
        ConfigSource {
            path: None,
            hash: None,
            resolution: ConfigResolution::Default,
        }
    }
}

/// How a config file was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigResolution {
    /// From explicit CLI flag
    CliFlag,
    /// From environment variable
    EnvVar,
    /// From XDG config directory
    XdgConfig,
    /// Using built-in defaults
    Default,
}

impl std::fmt::Display for ConfigResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigResolution::CliFlag => write!(f, "cli"),
            ConfigResolution::EnvVar => write!(f, "env"),
            ConfigResolution::XdgConfig => write!(f, "xdg"),
            ConfigResolution::Default => write!(f, "default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MrpConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_toml_is_default() {
        let config: MrpConfig = toml::from_str("").unwrap();
        assert_eq!(config, MrpConfig::default());
    }

    #[test]
    fn sections_override_independently() {
        let config: MrpConfig = toml::from_str(
            r#"
            [sampler]
            chains = 2
            draws = 200

            [diagnostics]
            rhat_threshold = 1.01
            "#,
        )
        .unwrap();
        assert_eq!(config.sampler.chains, 2);
        assert_eq!(config.sampler.draws, 200);
        assert_eq!(config.sampler.warmup, 1000);
        assert_eq!(config.diagnostics.rhat_threshold, 1.01);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unsupported_schema_version() {
        let config = MrpConfig {
            schema_version: "2.0.0".into(),
            ..MrpConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn load_defaults_snapshot() {
        let resolved = ResolvedConfig::load_defaults().unwrap();
        assert!(resolved.snapshot.is_default());
    }
}
