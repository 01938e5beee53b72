use anyhow::Result;
use asm_core::home_dir;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const LOCK_SUFFIX: &str = ".asm-update.lock";

/// Directories the engine owns under `~/.asm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmLayout {
    home: PathBuf,
}

impl AsmLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(default_asm_home()?))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.home.join("backups")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.home.join("tmp")
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }
}

pub fn default_asm_home() -> Result<PathBuf> {
    Ok(home_dir()?.join(".asm"))
}

/// `<parent>/<skill>.asm-update.lock`, a sibling of the skill directory.
pub fn lock_path_for(skill_path: &Path) -> PathBuf {
    let mut file_name = skill_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("skill"));
    file_name.push(LOCK_SUFFIX);
    match skill_path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}
