mod context;
mod error;
mod request;

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use asm_core::{
    check_resource_limits, parse_skill_manifest, summarize, validate_skill_name, EngineConfig,
    PackageFormat, ResourceCheck, Scope, ScopeRoots, SkillPackage, MAX_MANIFEST_BYTES,
    SKILL_MANIFEST_FILE,
};
use asm_security::{
    check_hard_links, check_symlink_escape, resolve_within, validate_package_entries,
    validate_zip_entry_security, SecurityCheck, SecurityReason,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backup::{create_backup, delete_backup, restore_backup, BackupOptions};
use crate::compare::compare_directories;
use crate::discovery::{find_installed_skill, SkillLookup};
use crate::downgrade::{detect_downgrade, DowngradeCheck};
use crate::fs_utils::{replace_directory, ScratchDir};
use crate::layout::{lock_path_for, AsmLayout};
use crate::lock::acquire_update_lock;
use crate::types::{BackupInfo, CompareOptions};

use context::{AnalyzedUpdate, DiscoveredSkill, ExtractedPackage, PreparedUpdate, ValidatedRequest};

pub use error::UpdateError;
pub use request::{
    BackupState, CancelReason, Confirm, UpdateOptions, UpdateOutcome, UpdatePhase, UpdatePreview,
    UpdateReport, UpdateRequest,
};

type OpenFn = fn(&Path) -> Result<SkillPackage>;
type ExtractFn = fn(&mut SkillPackage, &Path) -> Result<usize>;
type BackupFn = fn(&Path, &str, &BackupOptions) -> Result<BackupInfo>;
type ApplyFn = fn(&Path, &Path) -> Result<()>;
type RestoreFn = fn(&Path, &Path, &BackupOptions) -> Result<usize>;

/// Blocking filesystem steps of an update, replaceable in tests to force
/// failures or slow steps.
#[derive(Clone, Copy)]
pub(crate) struct ExecutionHooks {
    pub open: OpenFn,
    pub extract: ExtractFn,
    pub backup: BackupFn,
    pub apply: ApplyFn,
    pub restore: RestoreFn,
}

impl std::fmt::Debug for ExecutionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHooks").finish_non_exhaustive()
    }
}

impl Default for ExecutionHooks {
    fn default() -> Self {
        Self {
            open: SkillPackage::open,
            extract: SkillPackage::extract_to,
            backup: create_backup,
            apply: replace_directory,
            restore: restore_backup,
        }
    }
}

/// Why a phase stopped the pipeline early.
enum Stop {
    Cancelled(CancelReason),
    Error(UpdateError),
}

impl From<UpdateError> for Stop {
    fn from(err: UpdateError) -> Self {
        Self::Error(err)
    }
}

enum Preparation {
    Ready(PreparedUpdate),
    Declined,
}

enum Execution {
    Applied,
    RolledBack { update_error: String },
    RollbackFailed {
        update_error: String,
        rollback_error: String,
    },
    NoBackup { update_error: String },
}

#[derive(Debug, Clone)]
pub struct UpdateEngine {
    scopes: ScopeRoots,
    layout: AsmLayout,
    config: EngineConfig,
    hooks: ExecutionHooks,
}

impl UpdateEngine {
    pub fn new(scopes: ScopeRoots, layout: AsmLayout, config: EngineConfig) -> Self {
        Self {
            scopes,
            layout,
            config,
            hooks: ExecutionHooks::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_hooks(mut self, hooks: ExecutionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scopes(&self) -> &ScopeRoots {
        &self.scopes
    }

    pub fn backup_options(&self) -> BackupOptions {
        BackupOptions::from_config(&self.layout, &self.config)
    }

    /// Runs one update from validation to cleanup.
    ///
    /// Never returns an `Err`: every failure is folded into the outcome. The
    /// whole run is bounded by the configured update timeout.
    pub async fn update_skill(
        &self,
        request: UpdateRequest,
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
    ) -> UpdateOutcome {
        let limit = self.config.timeouts.update();
        let span = tracing::info_span!("update", skill = %request.skill_name, scope = %request.scope);
        let skill_name = request.skill_name.clone();

        let run = async {
            match self.run_phases(request, confirm, cancel).await {
                Ok(outcome) => outcome,
                Err(Stop::Cancelled(reason)) => {
                    tracing::info!(?reason, "update cancelled");
                    UpdateOutcome::Cancelled { skill_name, reason }
                }
                Err(Stop::Error(err)) => {
                    tracing::warn!(code = err.code(), error = %err, "update failed");
                    UpdateOutcome::Failed(err)
                }
            }
        };

        match tokio::time::timeout(limit, run).instrument(span).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(seconds = limit.as_secs(), "update timed out");
                UpdateOutcome::Failed(UpdateError::Timeout {
                    operation: "update".to_string(),
                    seconds: limit.as_secs(),
                })
            }
        }
    }

    async fn run_phases(
        &self,
        request: UpdateRequest,
        confirm: &dyn Confirm,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, Stop> {
        checkpoint(cancel, UpdatePhase::Validation)?;
        let validated = self.validate_request(request).await?;
        checkpoint(cancel, UpdatePhase::Discovery)?;
        let discovered = self.discover(validated)?;
        checkpoint(cancel, UpdatePhase::PackageValidation)?;
        let extracted = self.validate_package(discovered).await?;
        checkpoint(cancel, UpdatePhase::SecurityCheck)?;
        let analyzed = self.check_security(extracted).await?;

        if analyzed.options().dry_run {
            tracing::info!("dry run; no changes made");
            return Ok(UpdateOutcome::DryRunPreview(analyzed.preview(None)));
        }

        checkpoint(cancel, UpdatePhase::Preparation)?;
        let prepared = match self.prepare(analyzed, confirm).await? {
            Preparation::Ready(prepared) => prepared,
            Preparation::Declined => return Err(Stop::Cancelled(CancelReason::UserDeclined)),
        };

        if cancel.is_cancelled() {
            self.abandon(prepared);
            return Err(Stop::Cancelled(CancelReason::Signal));
        }
        Ok(self.execute(prepared).await)
    }

    async fn validate_request(&self, request: UpdateRequest) -> Result<ValidatedRequest, Stop> {
        tracing::debug!(phase = %UpdatePhase::Validation, "starting phase");
        validate_skill_name(&request.skill_name)
            .map_err(|err| UpdateError::validation("skill name", format!("{err:#}")))?;
        let scope = Scope::parse(&request.scope)
            .map_err(|err| UpdateError::validation("scope", format!("{err:#}")))?;

        let package_path = request.package_path.clone();
        match fs::metadata(&package_path) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                return Err(UpdateError::validation(
                    "package path",
                    format!("not a file: {}", package_path.display()),
                )
                .into());
            }
            Err(err) => {
                return Err(UpdateError::validation(
                    "package path",
                    format!("{}: {err}", package_path.display()),
                )
                .into());
            }
        }
        if PackageFormat::from_path(&package_path).is_none() {
            return Err(UpdateError::validation(
                "package extension",
                format!(
                    "expected a .skill or .zip file: {}",
                    package_path.display()
                ),
            )
            .into());
        }

        let limit = self.config.timeouts.package_validation();
        let open = self.hooks.open;
        let open_path = package_path.clone();
        let package = with_timeout(
            "package validation",
            limit,
            run_blocking("package validation", &package_path, move || open(&open_path)),
        )
        .await??
        .map_err(|err| UpdateError::validation("package", format!("{err:#}")))?;

        Ok(ValidatedRequest {
            skill_name: request.skill_name,
            scope,
            scope_root: self.scopes.resolve(scope).to_path_buf(),
            package_path,
            package,
            options: request.options,
        })
    }

    fn discover(&self, request: ValidatedRequest) -> Result<DiscoveredSkill, Stop> {
        tracing::debug!(phase = %UpdatePhase::Discovery, "starting phase");
        let lookup = find_installed_skill(&request.scope_root, &request.skill_name)
            .map_err(|err| UpdateError::filesystem("skill lookup", &request.scope_root, &err))?;

        match lookup {
            SkillLookup::Found { path } => {
                tracing::debug!(skill_path = %path.display(), "found installed skill");
                Ok(DiscoveredSkill {
                    request,
                    skill_path: path,
                })
            }
            SkillLookup::NotFound => Err(UpdateError::SkillNotFound {
                path: request.scope_root.join(&request.skill_name),
                name: request.skill_name,
                scope: request.scope.as_str().to_string(),
            }
            .into()),
            SkillLookup::CaseMismatch { requested, actual } => Err(UpdateError::security(
                SecurityReason::CaseMismatch,
                format!("requested '{requested}' but the installed directory is '{actual}'"),
            )
            .into()),
        }
    }

    async fn validate_package(&self, discovered: DiscoveredSkill) -> Result<ExtractedPackage, Stop> {
        tracing::debug!(phase = %UpdatePhase::PackageValidation, "starting phase");
        let DiscoveredSkill {
            request,
            skill_path,
        } = discovered;
        let ValidatedRequest {
            skill_name,
            scope,
            scope_root,
            package_path,
            mut package,
            options,
        } = request;

        for entry in package.entries() {
            let root = entry.root_segment().unwrap_or_default();
            security_verdict(
                validate_zip_entry_security(&entry.name, root),
                "package entry check",
                &package_path,
            )?;
        }

        let roots = package.root_directories();
        let package_root = match roots.iter().next() {
            Some(root) if roots.len() == 1 => root.clone(),
            _ => {
                return Err(UpdateError::validation(
                    "package structure",
                    format!(
                        "expected exactly one top-level directory, found {}: {}",
                        roots.len(),
                        roots.iter().cloned().collect::<Vec<_>>().join(", ")
                    ),
                )
                .into());
            }
        };
        if package_root != skill_name {
            return Err(UpdateError::PackageMismatch {
                installed_skill_name: skill_name,
                package_skill_name: package_root,
            }
            .into());
        }
        security_verdict(
            validate_package_entries(package.entries(), &package_root),
            "package entry check",
            &package_path,
        )?;

        let manifest_entry = format!("{package_root}/{SKILL_MANIFEST_FILE}");
        let manifest = package
            .read_entry_text(&manifest_entry, MAX_MANIFEST_BYTES)
            .and_then(|raw| parse_skill_manifest(&raw))
            .map_err(|err| UpdateError::validation(SKILL_MANIFEST_FILE, format!("{err:#}")))?;
        if manifest.name != skill_name {
            return Err(UpdateError::PackageMismatch {
                installed_skill_name: skill_name,
                package_skill_name: manifest.name,
            }
            .into());
        }

        let tmp_dir = self.layout.tmp_dir();
        let scratch = ScratchDir::create(&tmp_dir, &skill_name)
            .map_err(|err| UpdateError::filesystem("scratch directory", &tmp_dir, &err))?;
        let scratch_path = scratch.path().to_path_buf();
        let entries = package.entries().to_vec();
        let extract = self.hooks.extract;

        // The scratch tree travels with the extraction so an abandoned
        // extraction still removes it once the worker finishes.
        let (scratch, extracted) = with_timeout(
            "extraction",
            self.config.timeouts.extraction(),
            run_blocking("extraction", &scratch_path, move || {
                let extracted = extract(&mut package, scratch.path());
                (scratch, extracted)
            }),
        )
        .await??;
        let files_written = extracted
            .map_err(|err| UpdateError::filesystem("extraction", &scratch_path, &err))?;

        let extracted_root = scratch.path().join(&package_root);
        tracing::debug!(
            files = files_written,
            root = %extracted_root.display(),
            "extracted package"
        );

        Ok(ExtractedPackage {
            skill_name,
            scope,
            scope_root,
            skill_path,
            package_path,
            options,
            entries,
            manifest,
            scratch,
            extracted_root,
            files_written,
        })
    }

    async fn check_security(&self, package: ExtractedPackage) -> Result<AnalyzedUpdate, Stop> {
        tracing::debug!(phase = %UpdatePhase::SecurityCheck, "starting phase");
        let options = package.options;
        let mut warnings = Vec::new();

        security_verdict(
            check_symlink_escape(&package.skill_path, &package.scope_root),
            "symlink check",
            &package.skill_path,
        )?;

        let skill_path = package.skill_path.clone();
        let hard_links = run_blocking("hard link check", &package.skill_path, move || {
            check_hard_links(&skill_path)
        })
        .await?;
        match hard_links {
            SecurityCheck::Unsafe { detail, .. } if options.allow_hard_links => {
                tracing::warn!(%detail, "hard links allowed by override");
                warnings.push(format!("hard links present: {detail}"));
            }
            other => security_verdict(other, "hard link check", &package.skill_path)?,
        }

        security_verdict(
            validate_package_entries(&package.entries, &package.skill_name),
            "package entry check",
            &package.package_path,
        )?;

        let installed_dir = package.skill_path.clone();
        let incoming_dir = package.extracted_root.clone();
        let (installed_summary, incoming_summary) =
            run_blocking("resource limits", &package.skill_path, move || {
                (summarize(&installed_dir), summarize(&incoming_dir))
            })
            .await?;
        for (label, summary) in [
            ("installed skill", &installed_summary),
            ("package", &incoming_summary),
        ] {
            if let ResourceCheck::ExceedsLimits { reasons } =
                check_resource_limits(summary, &self.config.limits)
            {
                let detail = format!("{label}: {}", reasons.join("; "));
                if !options.force {
                    return Err(UpdateError::validation("resource limits", detail).into());
                }
                tracing::warn!(%detail, "resource limits overridden by force");
                warnings.push(format!("resource limits exceeded ({detail})"));
            }
        }

        let resolved_skill_path = resolve_within(&package.skill_path, &package.scope_root)
            .map_err(|err| {
                UpdateError::security(SecurityReason::ContainmentViolation, format!("{err:#}"))
            })?;
        resolve_within(&package.extracted_root, package.scratch.path()).map_err(|err| {
            UpdateError::security(SecurityReason::ContainmentViolation, format!("{err:#}"))
        })?;

        let comparison = compare_directories(
            &resolved_skill_path,
            &package.extracted_root,
            CompareOptions {
                thorough: options.thorough,
                memory_threshold: self.config.memory_threshold,
            },
        )
        .await
        .map_err(|err| UpdateError::filesystem("version comparison", &resolved_skill_path, &err))?;
        tracing::info!(
            added = comparison.added_count,
            removed = comparison.removed_count,
            modified = comparison.modified_count,
            size_change = comparison.size_change,
            "compared installed skill with package"
        );

        let installed_manifest_path = resolved_skill_path.join(SKILL_MANIFEST_FILE);
        let installed_version = fs::read_to_string(&installed_manifest_path)
            .ok()
            .and_then(|raw| parse_skill_manifest(&raw).ok())
            .and_then(|manifest| manifest.version);
        let downgrade = detect_downgrade(
            installed_version.as_deref(),
            package.manifest.version.as_deref(),
            modified_time(&installed_manifest_path),
            modified_time(&package.extracted_root.join(SKILL_MANIFEST_FILE)),
            options.version_ordering,
        );
        match &downgrade {
            DowngradeCheck::Downgrade {
                installed,
                incoming,
            } => {
                tracing::warn!(%installed, %incoming, "package version is older than installed");
                warnings.push(format!(
                    "package version {incoming} is older than installed version {installed}"
                ));
            }
            DowngradeCheck::OlderByModifiedTime => {
                tracing::warn!("package SKILL.md is older than the installed one");
                warnings.push("package SKILL.md is older than the installed one".to_string());
            }
            DowngradeCheck::NotDowngrade | DowngradeCheck::Unknown => {}
        }

        Ok(AnalyzedUpdate {
            package,
            resolved_skill_path,
            installed_version,
            installed_summary,
            incoming_summary,
            comparison,
            downgrade,
            warnings,
        })
    }

    async fn prepare(
        &self,
        analyzed: AnalyzedUpdate,
        confirm: &dyn Confirm,
    ) -> Result<Preparation, Stop> {
        tracing::debug!(phase = %UpdatePhase::Preparation, "starting phase");
        let skill_path = analyzed.package.skill_path.clone();
        let lock = acquire_update_lock(&skill_path, &analyzed.package.package_path).map_err(
            |err| UpdateError::Filesystem {
                operation: "lock".to_string(),
                path: lock_path_for(&skill_path),
                message: err.to_string(),
            },
        )?;

        let backup_options = self.backup_options();
        let skill_name = analyzed.skill_name().to_string();
        let backup = if analyzed.options().skip_backup {
            let skipped = BackupState::skipped(&backup_options.backup_root, &skill_name);
            tracing::warn!(
                placeholder = %skipped.path().display(),
                "backup skipped; a failed update cannot be rolled back"
            );
            skipped
        } else {
            let resolved = analyzed.resolved_skill_path.clone();
            let options = backup_options.clone();
            let name = skill_name.clone();
            let create = self.hooks.backup;
            let info = with_timeout(
                "backup",
                self.config.timeouts.backup(),
                run_blocking("backup", &analyzed.resolved_skill_path, move || {
                    create(&resolved, &name, &options).map(|info| UnclaimedBackup {
                        info,
                        options,
                        claimed: false,
                    })
                }),
            )
            .await??
            .map_err(|err| UpdateError::BackupCreation {
                message: format!("{err:#}"),
            })?
            .claim();
            BackupState::Created(info)
        };

        if !analyzed.options().force {
            let preview = analyzed.preview(Some(backup.path()));
            if !confirm.confirm(&preview) {
                tracing::info!("update declined");
                lock.release();
                discard_backup(&backup, &backup_options);
                return Ok(Preparation::Declined);
            }
        }

        Ok(Preparation::Ready(PreparedUpdate {
            analyzed,
            lock,
            backup,
        }))
    }

    fn abandon(&self, prepared: PreparedUpdate) {
        let PreparedUpdate {
            analyzed: _,
            lock,
            backup,
        } = prepared;
        lock.release();
        discard_backup(&backup, &self.backup_options());
    }

    async fn execute(&self, prepared: PreparedUpdate) -> UpdateOutcome {
        tracing::debug!(phase = %UpdatePhase::Execution, "starting phase");
        let PreparedUpdate {
            analyzed,
            lock,
            backup,
        } = prepared;
        let AnalyzedUpdate {
            package,
            resolved_skill_path,
            comparison,
            warnings,
            ..
        } = analyzed;
        let ExtractedPackage {
            skill_name,
            scope,
            manifest,
            scratch,
            extracted_root,
            files_written,
            options,
            ..
        } = package;

        let hooks = self.hooks;
        let backup_options = self.backup_options();
        let restore_from = backup.created().map(|info| info.path.clone());
        let target = resolved_skill_path.clone();
        let restore_options = backup_options.clone();

        // The lock and scratch tree move into the blocking task so they
        // outlive the filesystem work even if this future is dropped.
        let execution = run_blocking("execution", &resolved_skill_path, move || {
            let result = match (hooks.apply)(&extracted_root, &target) {
                Ok(()) => Execution::Applied,
                Err(apply_err) => {
                    let update_error = format!("{apply_err:#}");
                    tracing::warn!(error = %update_error, "applying update failed");
                    match &restore_from {
                        Some(backup_path) => {
                            match (hooks.restore)(backup_path, &target, &restore_options) {
                                Ok(_) => Execution::RolledBack { update_error },
                                Err(restore_err) => Execution::RollbackFailed {
                                    update_error,
                                    rollback_error: format!("{restore_err:#}"),
                                },
                            }
                        }
                        None => Execution::NoBackup { update_error },
                    }
                }
            };
            tracing::debug!(phase = %UpdatePhase::Cleanup, "starting phase");
            drop(scratch);
            lock.release();
            result
        })
        .await;

        let execution = match execution {
            Ok(execution) => execution,
            Err(err) => return UpdateOutcome::Failed(err),
        };

        match execution {
            Execution::Applied => {
                let backup_path = match &backup {
                    BackupState::Created(info) if options.keep_backup => Some(info.path.clone()),
                    BackupState::Created(_) => {
                        discard_backup(&backup, &backup_options);
                        None
                    }
                    BackupState::Skipped { .. } => None,
                };
                tracing::info!(
                    skill = %skill_name,
                    files = files_written,
                    "skill updated"
                );
                UpdateOutcome::Success(UpdateReport {
                    skill_name,
                    skill_path: resolved_skill_path,
                    incoming_version: manifest.version,
                    comparison,
                    files_written,
                    backup_path,
                    backup_skipped: matches!(backup, BackupState::Skipped { .. }),
                    warnings,
                })
            }
            Execution::RolledBack { update_error } => {
                let backup_path = backup.path().to_path_buf();
                tracing::warn!(backup = %backup_path.display(), "update rolled back");
                UpdateOutcome::RolledBack {
                    skill_name,
                    backup_path,
                    error: UpdateError::Filesystem {
                        operation: "apply update".to_string(),
                        path: resolved_skill_path,
                        message: update_error,
                    },
                }
            }
            Execution::RollbackFailed {
                update_error,
                rollback_error,
            } => {
                let backup_path = backup.path().to_path_buf();
                tracing::error!(
                    backup = %backup_path.display(),
                    error = %rollback_error,
                    "rollback failed; manual recovery required"
                );
                UpdateOutcome::RollbackFailed {
                    recovery_instructions: recovery_instructions(
                        &skill_name,
                        scope,
                        &resolved_skill_path,
                        &backup_path,
                    ),
                    skill_name,
                    error: UpdateError::Critical {
                        update_error,
                        rollback_error,
                        backup_path: backup_path.clone(),
                    },
                    backup_path,
                }
            }
            Execution::NoBackup { update_error } => UpdateOutcome::Failed(UpdateError::Rollback {
                message: format!("update failed and no backup exists to restore: {update_error}"),
            }),
        }
    }
}

fn checkpoint(cancel: &CancellationToken, next: UpdatePhase) -> Result<(), Stop> {
    if cancel.is_cancelled() {
        tracing::debug!(phase = %next, "cancellation observed before phase");
        return Err(Stop::Cancelled(CancelReason::Signal));
    }
    Ok(())
}

fn security_verdict(check: SecurityCheck, operation: &str, path: &Path) -> Result<(), UpdateError> {
    match check {
        SecurityCheck::Safe => Ok(()),
        SecurityCheck::Unsafe { reason, detail } => Err(UpdateError::security(reason, detail)),
        SecurityCheck::Failed { message } => Err(UpdateError::Filesystem {
            operation: operation.to_string(),
            path: path.to_path_buf(),
            message,
        }),
    }
}

fn discard_backup(backup: &BackupState, options: &BackupOptions) {
    if let BackupState::Created(info) = backup {
        if let Err(err) = delete_backup(&info.path, options) {
            let message = format!("{err:#}");
            tracing::warn!(
                backup = %info.path.display(),
                error = %message,
                "failed to delete backup"
            );
        }
    }
}

/// A backup the worker finished after its caller may have given up on it.
/// Deleted on drop unless claimed.
struct UnclaimedBackup {
    info: BackupInfo,
    options: BackupOptions,
    claimed: bool,
}

impl UnclaimedBackup {
    fn claim(mut self) -> BackupInfo {
        self.claimed = true;
        self.info.clone()
    }
}

impl Drop for UnclaimedBackup {
    fn drop(&mut self) {
        if !self.claimed {
            tracing::debug!(backup = %self.info.path.display(), "removing abandoned backup");
            discard_backup(&BackupState::Created(self.info.clone()), &self.options);
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|metadata| metadata.modified()).ok()
}

fn recovery_instructions(
    skill_name: &str,
    scope: Scope,
    skill_path: &Path,
    backup_path: &Path,
) -> Vec<String> {
    let parent = skill_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    vec![
        format!(
            "The skill directory {} may be incomplete; do not use it until restored.",
            skill_path.display()
        ),
        format!("The backup is kept at {}.", backup_path.display()),
        format!(
            "Restore it with: asm restore {skill_name} --scope {scope} --backup {}",
            backup_path.display()
        ),
        format!(
            "Or remove {} and unzip the backup into {} by hand.",
            skill_path.display(),
            parent.display()
        ),
        format!(
            "If a lock file remains at {}, delete it once no update is running.",
            lock_path_for(skill_path).display()
        ),
    ]
}

async fn run_blocking<T, F>(operation: &str, path: &Path, task: F) -> Result<T, UpdateError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| UpdateError::Filesystem {
            operation: operation.to_string(),
            path: path.to_path_buf(),
            message: format!("worker task failed: {err}"),
        })
}

/// Bounds a phase. On expiry the phase's eventual result is dropped.
async fn with_timeout<T>(
    operation: &str,
    limit: Duration,
    phase: impl Future<Output = T>,
) -> Result<T, UpdateError> {
    tokio::time::timeout(limit, phase)
        .await
        .map_err(|_| UpdateError::Timeout {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        })
}
