use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_FILE_COUNT: u64 = 10_000;
const DEFAULT_MAX_TOTAL_BYTES: u64 = 1024 * 1024 * 1024;
const DEFAULT_MEMORY_THRESHOLD: usize = 1_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_file_count: u64,
    pub max_total_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_file_count: DEFAULT_MAX_FILE_COUNT,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

/// Phase timeouts, stored as whole seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timeouts {
    pub update_secs: u64,
    pub backup_secs: u64,
    pub extraction_secs: u64,
    pub package_validation_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            update_secs: 5 * 60,
            backup_secs: 2 * 60,
            extraction_secs: 2 * 60,
            package_validation_secs: 5,
        }
    }
}

impl Timeouts {
    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update_secs)
    }

    pub fn backup(&self) -> Duration {
        Duration::from_secs(self.backup_secs)
    }

    pub fn extraction(&self) -> Duration {
        Duration::from_secs(self.extraction_secs)
    }

    pub fn package_validation(&self) -> Duration {
        Duration::from_secs(self.package_validation_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: ResourceLimits,
    pub timeouts: Timeouts,
    /// Combined file count above which comparisons run in batches.
    pub memory_threshold: usize,
    pub backup_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            timeouts: Timeouts::default(),
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            backup_root: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse asm engine config")?;
        if config.limits.max_file_count == 0 {
            return Err(anyhow!("limits.max_file_count must be greater than zero"));
        }
        if config.limits.max_total_bytes == 0 {
            return Err(anyhow!("limits.max_total_bytes must be greater than zero"));
        }
        if config.memory_threshold == 0 {
            return Err(anyhow!("memory_threshold must be greater than zero"));
        }
        for (field, value) in [
            ("timeouts.update_secs", config.timeouts.update_secs),
            ("timeouts.backup_secs", config.timeouts.backup_secs),
            ("timeouts.extraction_secs", config.timeouts.extraction_secs),
            (
                "timeouts.package_validation_secs",
                config.timeouts.package_validation_secs,
            ),
        ] {
            if value == 0 {
                return Err(anyhow!("{field} must be greater than zero"));
            }
        }
        Ok(config)
    }

    /// Reads `path` if it exists, otherwise returns the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed parsing config file: {}", path.display()))
    }
}
