use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::types::{ALIGNMENT_SECTORS, GUARD_GAP_SECTORS, MIB};
use crate::common::paths;

fn default_alignment_sectors() -> u64 {
    ALIGNMENT_SECTORS
}

fn default_guard_gap_sectors() -> u64 {
    GUARD_GAP_SECTORS
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_backup_head_bytes() -> u64 {
    MIB
}

fn default_settle_timeout_secs() -> u64 {
    10
}

fn default_dd_block_size() -> String {
    "4M".to_string()
}

fn default_mount_options() -> String {
    "ro".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CloneConfig {
    #[serde(default = "default_alignment_sectors")]
    pub alignment_sectors: u64,
    #[serde(default = "default_guard_gap_sectors")]
    pub guard_gap_sectors: u64,
    /// Default end-of-disk reserve for --fill, in GiB
    pub fill_reserve_gib: f64,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    #[serde(default = "default_backup_head_bytes")]
    pub backup_head_bytes: u64,
    #[serde(default = "default_settle_timeout_secs")]
    pub settle_timeout_secs: u64,
    #[serde(default = "default_dd_block_size")]
    pub dd_block_size: String,
    #[serde(default = "default_mount_options")]
    pub mount_options: String,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            alignment_sectors: default_alignment_sectors(),
            guard_gap_sectors: default_guard_gap_sectors(),
            fill_reserve_gib: 0.0,
            backup_dir: default_backup_dir(),
            backup_head_bytes: default_backup_head_bytes(),
            settle_timeout_secs: default_settle_timeout_secs(),
            dd_block_size: default_dd_block_size(),
            mount_options: default_mount_options(),
        }
    }
}

impl CloneConfig {
    pub fn config_file_path() -> Result<PathBuf> {
        paths::default_config_file()
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = Self::config_file_path()?;
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };

        let s = fs::read_to_string(&cfg_path)
            .with_context(|| format!("reading config {}", cfg_path.display()))?;
        let config: Self = toml::from_str(&s)
            .with_context(|| format!("parsing config toml {}", cfg_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.alignment_sectors == 0 {
            anyhow::bail!("alignment_sectors must be at least 1");
        }
        if !self.fill_reserve_gib.is_finite() || self.fill_reserve_gib < 0.0 {
            anyhow::bail!("fill_reserve_gib must be a non-negative number");
        }
        if self.backup_head_bytes == 0 {
            anyhow::bail!("backup_head_bytes must be greater than zero");
        }
        Ok(())
    }
}
