//! Phase contexts. Each phase consumes the previous value and returns the
//! next one, so a later phase can never run on state an earlier phase did
//! not produce.

use std::path::{Path, PathBuf};

use asm_core::{PackageEntry, Scope, SkillManifest, SkillPackage, SkillSummary};

use crate::downgrade::DowngradeCheck;
use crate::fs_utils::ScratchDir;
use crate::lock::UpdateLock;
use crate::types::VersionComparison;

use super::request::{BackupState, UpdateOptions, UpdatePreview};

#[derive(Debug)]
pub(crate) struct ValidatedRequest {
    pub skill_name: String,
    pub scope: Scope,
    pub scope_root: PathBuf,
    pub package_path: PathBuf,
    pub package: SkillPackage,
    pub options: UpdateOptions,
}

#[derive(Debug)]
pub(crate) struct DiscoveredSkill {
    pub request: ValidatedRequest,
    pub skill_path: PathBuf,
}

#[derive(Debug)]
pub(crate) struct ExtractedPackage {
    pub skill_name: String,
    pub scope: Scope,
    pub scope_root: PathBuf,
    pub skill_path: PathBuf,
    pub package_path: PathBuf,
    pub options: UpdateOptions,
    pub entries: Vec<PackageEntry>,
    pub manifest: SkillManifest,
    pub scratch: ScratchDir,
    pub extracted_root: PathBuf,
    pub files_written: usize,
}

#[derive(Debug)]
pub(crate) struct AnalyzedUpdate {
    pub package: ExtractedPackage,
    /// Canonical skill directory, proven to be inside the scope root.
    pub resolved_skill_path: PathBuf,
    pub installed_version: Option<String>,
    pub installed_summary: SkillSummary,
    pub incoming_summary: SkillSummary,
    pub comparison: VersionComparison,
    pub downgrade: DowngradeCheck,
    pub warnings: Vec<String>,
}

impl AnalyzedUpdate {
    pub fn options(&self) -> &UpdateOptions {
        &self.package.options
    }

    pub fn skill_name(&self) -> &str {
        &self.package.skill_name
    }

    pub fn preview(&self, backup_path: Option<&Path>) -> UpdatePreview {
        UpdatePreview {
            skill_name: self.package.skill_name.clone(),
            scope: self.package.scope,
            skill_path: self.package.skill_path.clone(),
            package_path: self.package.package_path.clone(),
            installed_version: self.installed_version.clone(),
            incoming_version: self.package.manifest.version.clone(),
            installed_summary: self.installed_summary,
            incoming_summary: self.incoming_summary,
            comparison: self.comparison.clone(),
            downgrade: self.downgrade.clone(),
            backup_path: backup_path.map(Path::to_path_buf),
            warnings: self.warnings.clone(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct PreparedUpdate {
    pub analyzed: AnalyzedUpdate,
    pub lock: UpdateLock,
    pub backup: BackupState,
}
