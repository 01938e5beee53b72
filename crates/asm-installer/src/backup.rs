use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use asm_core::{enumerate, EngineConfig, SkillPackage};
use asm_security::{resolve_within, validate_package_entries, SecurityCheck};

use crate::fs_utils::{
    mode_of, random_hex_suffix, remove_dir_all_if_exists, remove_file_if_exists,
    replace_directory, set_mode, sibling_path,
};
use crate::layout::AsmLayout;
use crate::types::BackupInfo;

const BACKUP_EXTENSION: &str = "skill";
const RANDOM_NAME_ATTEMPTS: usize = 5;
const NUMERIC_NAME_ATTEMPTS: usize = 1_000;
const GROUP_OTHER_WRITE: u32 = 0o022;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    pub backup_root: PathBuf,
}

impl BackupOptions {
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
        }
    }

    pub fn from_config(layout: &AsmLayout, config: &EngineConfig) -> Self {
        Self::new(
            config
                .backup_root
                .clone()
                .unwrap_or_else(|| layout.backups_dir()),
        )
    }
}

/// `<skill>-<YYYYMMDD>-<HHMMSS>-<suffix>.skill`
pub fn backup_file_name(skill_name: &str, at: DateTime<Utc>, suffix: &str) -> String {
    format!(
        "{skill_name}-{}-{suffix}.{BACKUP_EXTENSION}",
        at.format("%Y%m%d-%H%M%S")
    )
}

/// Archives every regular file of `skill_path` into a new, uniquely named
/// backup under the backup root. Entries are stored as `<skill>/<relative>`
/// so the archive is itself a valid skill package.
pub fn create_backup(
    skill_path: &Path,
    skill_name: &str,
    options: &BackupOptions,
) -> Result<BackupInfo> {
    let metadata = fs::symlink_metadata(skill_path)
        .with_context(|| format!("failed to stat skill directory {}", skill_path.display()))?;
    if !metadata.file_type().is_dir() {
        return Err(anyhow!(
            "skill path is not a real directory: {}",
            skill_path.display()
        ));
    }

    let root = &options.backup_root;
    ensure_backup_root(root)?;
    probe_writable(root)?;

    let started_at = Utc::now();
    let (path, file) = claim_backup_file(root, skill_name, started_at)?;

    match write_backup_archive(file, skill_path, skill_name) {
        Ok(file_count) => {
            set_mode(&path, 0o600)
                .with_context(|| format!("failed to restrict backup {}", path.display()))?;
            let size = fs::metadata(&path)
                .with_context(|| format!("failed to stat backup {}", path.display()))?
                .len();
            tracing::info!(
                backup = %path.display(),
                files = file_count,
                bytes = size,
                "created skill backup"
            );
            Ok(BackupInfo {
                path,
                size,
                file_count,
                skill_name: skill_name.to_string(),
            })
        }
        Err(err) => {
            let _ = remove_file_if_exists(&path);
            Err(err.context(format!("failed to write backup {}", path.display())))
        }
    }
}

/// Replaces `skill_path` with the contents of `backup_path`.
pub fn restore_backup(
    backup_path: &Path,
    skill_path: &Path,
    options: &BackupOptions,
) -> Result<usize> {
    check_backup_root(&options.backup_root)?;
    probe_writable(&options.backup_root)?;
    let backup = resolve_within(backup_path, &options.backup_root)
        .context("backup path is outside the backup root")?;

    let skill_name = skill_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("skill path has no usable name: {}", skill_path.display()))?;

    let mut package = SkillPackage::open(&backup)?;
    match validate_package_entries(package.entries(), skill_name) {
        SecurityCheck::Safe => {}
        SecurityCheck::Unsafe { reason, detail } => {
            return Err(anyhow!("backup failed entry validation ({reason}): {detail}"));
        }
        SecurityCheck::Failed { message } => {
            return Err(anyhow!("backup entry validation failed: {message}"));
        }
    }

    let staging = sibling_path(skill_path, "restore");
    let restored = package
        .extract_to(&staging)
        .and_then(|count| {
            let tree = staging.join(skill_name);
            fs::create_dir_all(&tree)
                .with_context(|| format!("failed to create {}", tree.display()))?;
            replace_directory(&tree, skill_path)?;
            Ok(count)
        });
    let _ = remove_dir_all_if_exists(&staging);
    let count = restored
        .with_context(|| format!("failed to restore {} from {}", skill_path.display(), backup.display()))?;

    tracing::info!(
        skill = %skill_path.display(),
        backup = %backup.display(),
        files = count,
        "restored skill from backup"
    );
    Ok(count)
}

/// Deletes a backup after re-validating the backup root; a root that was
/// swapped for a symlink or opened up to other users is refused.
pub fn delete_backup(backup_path: &Path, options: &BackupOptions) -> Result<()> {
    check_backup_root(&options.backup_root)?;
    probe_writable(&options.backup_root)?;
    let backup = resolve_within(backup_path, &options.backup_root)
        .context("refusing to delete a file outside the backup root")?;
    remove_file_if_exists(&backup)
        .with_context(|| format!("failed to delete backup {}", backup.display()))?;
    tracing::debug!(backup = %backup.display(), "deleted backup");
    Ok(())
}

/// Backups of `skill_name` found in the backup root, newest first.
pub fn list_backups(skill_name: &str, options: &BackupOptions) -> Result<Vec<BackupInfo>> {
    let root = &options.backup_root;
    let reader = match fs::read_dir(root) {
        Ok(reader) => reader,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", root.display()));
        }
    };

    let mut found = Vec::new();
    for entry in reader {
        let entry = entry.with_context(|| format!("failed to iterate {}", root.display()))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(stamp) = backup_timestamp(file_name, skill_name) else {
            continue;
        };
        let path = entry.path();
        let Ok(metadata) = fs::symlink_metadata(&path) else {
            continue;
        };
        if !metadata.file_type().is_file() {
            continue;
        }
        let file_count = SkillPackage::open(&path)
            .map(|package| {
                package
                    .entries()
                    .iter()
                    .filter(|entry| !entry.is_dir)
                    .count()
            })
            .unwrap_or(0);
        found.push((
            stamp.to_string(),
            BackupInfo {
                path,
                size: metadata.len(),
                file_count,
                skill_name: skill_name.to_string(),
            },
        ));
    }

    found.sort_by(|(left_stamp, left), (right_stamp, right)| {
        right_stamp
            .cmp(left_stamp)
            .then_with(|| right.path.cmp(&left.path))
    });
    Ok(found.into_iter().map(|(_, info)| info).collect())
}

fn backup_timestamp<'a>(file_name: &'a str, skill_name: &str) -> Option<&'a str> {
    let rest = file_name
        .strip_prefix(skill_name)?
        .strip_prefix('-')?
        .strip_suffix(".skill")?;
    let stamp = rest.get(..15)?;
    let (date, time) = stamp.split_once('-')?;
    let digits = |part: &str, len: usize| part.len() == len && part.bytes().all(|b| b.is_ascii_digit());
    if !digits(date, 8) || !digits(time, 6) || !rest[15..].starts_with('-') {
        return None;
    }
    Some(stamp)
}

fn ensure_backup_root(root: &Path) -> Result<()> {
    match fs::symlink_metadata(root) {
        Ok(_) => check_backup_root(root),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(root)
                .with_context(|| format!("failed to create backup root {}", root.display()))?;
            set_mode(root, 0o700)
                .with_context(|| format!("failed to restrict backup root {}", root.display()))?;
            Ok(())
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to stat backup root {}", root.display()))
        }
    }
}

fn check_backup_root(root: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(root)
        .with_context(|| format!("failed to stat backup root {}", root.display()))?;
    if metadata.file_type().is_symlink() {
        return Err(anyhow!("backup root must not be a symlink: {}", root.display()));
    }
    if !metadata.is_dir() {
        return Err(anyhow!("backup root is not a directory: {}", root.display()));
    }
    let mode = mode_of(&metadata);
    if mode & GROUP_OTHER_WRITE != 0 {
        return Err(anyhow!(
            "backup root {} is writable by group or others (mode {mode:o})",
            root.display()
        ));
    }
    Ok(())
}

fn probe_writable(root: &Path) -> Result<()> {
    let probe = root.join(format!(".write-probe-{}", random_hex_suffix()));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
        .and_then(|mut file| file.write_all(b"probe"))
        .with_context(|| format!("backup root is not writable: {}", root.display()))?;
    remove_file_if_exists(&probe)
        .with_context(|| format!("failed to remove write probe {}", probe.display()))?;
    Ok(())
}

fn claim_backup_file(root: &Path, skill_name: &str, at: DateTime<Utc>) -> Result<(PathBuf, File)> {
    let random_names = (0..RANDOM_NAME_ATTEMPTS).map(|_| random_hex_suffix());
    let fallback_suffix = random_hex_suffix();
    let numeric_names = (1..=NUMERIC_NAME_ATTEMPTS).map(|n| format!("{fallback_suffix}-{n}"));

    for suffix in random_names.chain(numeric_names) {
        let candidate = root.join(backup_file_name(skill_name, at, &suffix));
        let candidate = resolve_within(&candidate, root)
            .context("generated backup path escapes the backup root")?;
        let mut open = OpenOptions::new();
        open.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            open.mode(0o600);
        }
        match open.open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(candidate = %candidate.display(), "backup name taken");
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create backup {}", candidate.display()));
            }
        }
    }
    Err(anyhow!(
        "could not find a free backup file name for '{skill_name}' in {}",
        root.display()
    ))
}

fn write_backup_archive(file: File, skill_path: &Path, skill_name: &str) -> Result<usize> {
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut file_count = 0_usize;
    for record in enumerate(skill_path) {
        if record.is_symlink {
            tracing::debug!(path = %record.absolute_path.display(), "not backing up symlink");
            continue;
        }
        if record.is_directory {
            continue;
        }
        let entry_name = format!("{skill_name}/{}", record.relative_key());
        writer
            .start_file(entry_name.as_str(), options)
            .with_context(|| format!("failed to start backup entry {entry_name}"))?;
        let mut source = File::open(&record.absolute_path)
            .with_context(|| format!("failed to open {}", record.absolute_path.display()))?;
        io::copy(&mut source, &mut writer)
            .with_context(|| format!("failed to archive {}", record.absolute_path.display()))?;
        file_count += 1;
    }

    let mut file = writer.finish().context("failed to finalize backup archive")?;
    file.flush().context("failed to flush backup archive")?;
    Ok(file_count)
}
