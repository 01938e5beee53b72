mod archive;
mod config;
mod manifest;
mod scope;
mod skill_name;
mod walk;

pub use archive::{PackageEntry, PackageFormat, SkillPackage};
pub use config::{EngineConfig, ResourceLimits, Timeouts};
pub use manifest::{
    parse_skill_manifest, SkillManifest, MAX_MANIFEST_BYTES, SKILL_MANIFEST_FILE,
};
pub use scope::{home_dir, Scope, ScopeRoots};
pub use skill_name::validate_skill_name;
pub use walk::{
    check_resource_limits, enumerate, summarize, FileRecord, FileWalk, ResourceCheck,
    SkillSummary,
};
