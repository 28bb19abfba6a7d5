//! `spacekeep.toml` configuration.
//!
//! A missing file is not an error: every field has a default and the engine runs in
//! pure local-first mode unless a remote mirror directory is configured.

use crate::core::error::SpaceError;
use crate::core::time::DAY_MS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const REMOTE_DIR_ENV: &str = "SPACEKEEP_REMOTE_DIR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    pub store: StoreConfig,
    pub trash: TrashConfig,
    pub remote: RemoteConfig,
    pub entitlements: EntitlementsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Quiet window before a local write is mirrored remotely.
    pub remote_debounce_ms: u64,
    /// Delay between the last interaction ending and the suppressed save.
    pub interaction_settle_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            remote_debounce_ms: 400,
            interaction_settle_ms: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrashConfig {
    pub retention_days: u64,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

impl TrashConfig {
    pub fn retention_ms(&self) -> u64 {
        self.retention_days.saturating_mul(DAY_MS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub mirror_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementsConfig {
    pub plan: String,
    /// 0 disables the limit.
    pub spaces_max: u64,
    /// 0 disables the limit.
    pub share_links_max: u64,
    pub share_enabled: bool,
}

impl Default for EntitlementsConfig {
    fn default() -> Self {
        Self {
            plan: "free".to_string(),
            spaces_max: 12,
            share_links_max: 8,
            share_enabled: true,
        }
    }
}

/// Load config from `<store_root>/spacekeep.toml`, then apply environment overrides.
pub fn load_config(store_root: &Path) -> Result<SpaceConfig, SpaceError> {
    let path = store_root.join(crate::core::schemas::CONFIG_FILE_NAME);
    let mut config = if path.exists() {
        let content = fs::read_to_string(&path)?;
        parse_config(&content)?
    } else {
        SpaceConfig::default()
    };

    if let Ok(dir) = std::env::var(REMOTE_DIR_ENV) {
        if !dir.trim().is_empty() {
            config.remote.mirror_dir = Some(PathBuf::from(dir.trim()));
        }
    }
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<SpaceConfig, SpaceError> {
    toml::from_str(content).map_err(|e| SpaceError::Config(e.to_string()))
}

pub fn write_default_config(store_root: &Path) -> Result<PathBuf, SpaceError> {
    let path = store_root.join(crate::core::schemas::CONFIG_FILE_NAME);
    if !path.exists() {
        let body = toml::to_string_pretty(&SpaceConfig::default())
            .map_err(|e| SpaceError::Config(e.to_string()))?;
        fs::write(&path, body)?;
    }
    Ok(path)
}
