mod backup;
mod compare;
mod discovery;
mod downgrade;
mod fs_utils;
mod layout;
mod lock;
mod types;
mod uninstall;
mod update;

pub use backup::{
    backup_file_name, create_backup, delete_backup, list_backups, restore_backup,
    BackupOptions,
};
pub use compare::{compare_directories, compare_versions, stream_changes, ChangeStream};
pub use discovery::{find_installed_skill, SkillLookup};
pub use downgrade::{detect_downgrade, DowngradeCheck, VersionOrdering};
pub use layout::{default_asm_home, lock_path_for, AsmLayout};
pub use lock::{
    acquire_skill_lock, acquire_update_lock, release_lock_path, LockError, LockInfo,
    UpdateLock, LOCK_STALE_AFTER,
};
pub use types::{
    BackupInfo, ChangeType, CompareOptions, FileChange, VersionComparison,
};
pub use uninstall::{uninstall_skills, UninstallResult, UninstallStatus};
pub use update::{
    BackupState, CancelReason, Confirm, UpdateEngine, UpdateError, UpdateOptions,
    UpdateOutcome, UpdatePhase, UpdatePreview, UpdateReport, UpdateRequest,
};

#[cfg(test)]
mod tests;
