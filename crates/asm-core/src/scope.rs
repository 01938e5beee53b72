use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Project,
    Personal,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Personal => "personal",
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "personal" | "user" => Ok(Self::Personal),
            other => Err(anyhow!(
                "invalid scope '{other}'; expected 'project' or 'personal'"
            )),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root directories that skills are installed under, per scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRoots {
    project: PathBuf,
    personal: PathBuf,
}

impl ScopeRoots {
    pub fn new(project: impl Into<PathBuf>, personal: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            personal: personal.into(),
        }
    }

    /// `<project_dir>/.claude/skills` and `~/.claude/skills`.
    pub fn from_env(project_dir: &Path) -> Result<Self> {
        let home = home_dir()?;
        Ok(Self::new(
            project_dir.join(".claude").join("skills"),
            home.join(".claude").join("skills"),
        ))
    }

    pub fn resolve(&self, scope: Scope) -> &Path {
        match scope {
            Scope::Project => &self.project,
            Scope::Personal => &self.personal,
        }
    }
}

pub fn home_dir() -> Result<PathBuf> {
    if cfg!(windows) {
        let profile = std::env::var("USERPROFILE")
            .context("USERPROFILE is not set; cannot resolve personal skills directory")?;
        return Ok(PathBuf::from(profile));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve personal scope")?;
    Ok(PathBuf::from(home))
}
