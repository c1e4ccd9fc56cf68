//! Configuration snapshots embedded in run reports.
//!
//! Captures where the active configuration came from, a hash of its
//! effective values, and the schema version, so a report can be tied back
//! to the exact settings that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ConfigSource, MrpConfig};
use crate::error::{Error, Result};

/// Configuration snapshot for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Timestamp when snapshot was created
    pub snapshot_at: DateTime<Utc>,

    /// Hash of the effective (post-default) configuration
    pub effective_hash: String,

    /// Source file information
    pub source: SourceInfo,

    /// Config schema version
    pub schema_version: String,
}

impl ConfigSnapshot {
    pub fn new(config: &MrpConfig, source: ConfigSource) -> Result<Self> {
        let effective = serde_json::to_string(config)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;

        Ok(ConfigSnapshot {
            snapshot_at: Utc::now(),
            effective_hash: compute_effective_hash(&effective),
            source: SourceInfo::from_config_source(source),
            schema_version: config.schema_version.clone(),
        })
    }

    /// Create a snapshot for built-in defaults.
    pub fn from_defaults(config: &MrpConfig) -> Result<Self> {
        ConfigSnapshot::new(config, ConfigSource::defaults())
    }

    /// Return true if the config came from built-in defaults.
    pub fn is_default(&self) -> bool {
        self.source.resolution == "default"
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "snapshot_at": self.snapshot_at.to_rfc3339(),
            "effective_hash": self.effective_hash,
            "source": {
                "path": self.source.path,
                "hash": self.source.hash,
                "resolution": self.source.resolution,
            },
            "schema_version": self.schema_version,
        })
    }
}

/// Source information for a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Path to the file (None if defaults)
    pub path: Option<String>,

    /// SHA-256 hash of file content (None if defaults)
    pub hash: Option<String>,

    /// How the config was resolved
    pub resolution: String,
}

impl SourceInfo {
    fn from_config_source(source: ConfigSource) -> Self {
        SourceInfo {
            path: source.path,
            hash: source.hash,
            resolution: source.resolution.to_string(),
        }
    }
}

fn compute_effective_hash(effective: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"mrp-config:");
    hasher.update(effective.as_bytes());
    hex::encode(hasher.finalize())
}
