use anyhow::{Context, Result};
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use asm_core::enumerate;

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
pub fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
pub fn mode_of(_metadata: &fs::Metadata) -> u32 {
    0o700
}

pub fn random_hex_suffix() -> String {
    format!("{:08x}", rand::thread_rng().gen::<u32>())
}

/// Sibling path of `path` that does not exist yet, tagged with `label`.
pub fn sibling_path(path: &Path, label: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "skill".to_string());
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    loop {
        let candidate = parent.join(format!(".{name}.{label}-{}", random_hex_suffix()));
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
    }
}

pub fn move_dir_or_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_dir_tree(src, dst)?;
            fs::remove_dir_all(src)
                .with_context(|| format!("failed to remove source dir {}", src.display()))?;
            Ok(())
        }
    }
}

/// Copies regular files and directories from `src` into `dst`. Symlinks are
/// not recreated.
pub fn copy_dir_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for record in enumerate(src) {
        let target = dst.join(&record.relative_path);
        if record.is_symlink {
            tracing::debug!(path = %record.absolute_path.display(), "not copying symlink");
            continue;
        }
        if record.is_directory {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
            continue;
        }
        fs::copy(&record.absolute_path, &target).with_context(|| {
            format!(
                "failed to copy {} to {}",
                record.absolute_path.display(),
                target.display()
            )
        })?;
    }
    Ok(())
}

/// Per-update working directory, removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(base: &Path, skill_name: &str) -> Result<Self> {
        fs::create_dir_all(base).with_context(|| format!("failed to create {}", base.display()))?;
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let path = base.join(format!(
            "update-{skill_name}-{}-{stamp}-{}",
            std::process::id(),
            random_hex_suffix()
        ));
        fs::create_dir(&path)
            .with_context(|| format!("failed to create scratch dir {}", path.display()))?;
        set_mode(&path, 0o700)
            .with_context(|| format!("failed to restrict scratch dir {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(err) = remove_dir_all_if_exists(&self.path) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove scratch directory"
            );
        }
    }
}

/// Swaps `target` for the tree at `source`.
///
/// `source` is first moved into a staging directory beside `target` so the
/// swap itself is two renames on the same filesystem. When the final rename
/// fails, the previous `target` is put back.
pub fn replace_directory(source: &Path, target: &Path) -> Result<()> {
    let staged = sibling_path(target, "incoming");
    if let Err(err) = move_dir_or_copy(source, &staged) {
        let _ = remove_dir_all_if_exists(&staged);
        return Err(err.context(format!("failed to stage {}", target.display())));
    }

    let aside = match fs::symlink_metadata(target) {
        Ok(_) => {
            let aside = sibling_path(target, "previous");
            if let Err(err) = fs::rename(target, &aside) {
                let _ = remove_dir_all_if_exists(&staged);
                return Err(err)
                    .with_context(|| format!("failed to move aside {}", target.display()));
            }
            Some(aside)
        }
        Err(_) => None,
    };

    if let Err(err) = fs::rename(&staged, target) {
        let _ = remove_dir_all_if_exists(&staged);
        if let Some(aside) = &aside {
            if let Err(undo) = fs::rename(aside, target) {
                return Err(anyhow::anyhow!(
                    "failed to swap in {} ({err}); previous tree left at {} ({undo})",
                    target.display(),
                    aside.display()
                ));
            }
        }
        return Err(err).with_context(|| format!("failed to swap in {}", target.display()));
    }

    if let Some(aside) = aside {
        if let Err(err) = remove_dir_all_if_exists(&aside) {
            tracing::warn!(
                path = %aside.display(),
                error = %err,
                "failed to remove previous skill tree"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_directory_swaps_contents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let target = tmp.path().join("skills").join("pdf");
        fs::create_dir_all(&target).expect("mkdir");
        fs::write(target.join("old.txt"), b"old").expect("write");
        let source = tmp.path().join("scratch").join("pdf");
        fs::create_dir_all(source.join("nested")).expect("mkdir");
        fs::write(source.join("nested").join("new.txt"), b"new").expect("write");

        replace_directory(&source, &target).expect("must replace");

        assert!(!target.join("old.txt").exists());
        assert_eq!(
            fs::read(target.join("nested").join("new.txt")).expect("read"),
            b"new"
        );
        assert!(!source.exists());
        let leftovers = fs::read_dir(tmp.path().join("skills"))
            .expect("read_dir")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn replace_directory_creates_missing_target() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let source = tmp.path().join("src");
        fs::create_dir_all(&source).expect("mkdir");
        fs::write(source.join("a.txt"), b"a").expect("write");
        let target = tmp.path().join("dst");

        replace_directory(&source, &target).expect("must replace");
        assert!(target.join("a.txt").is_file());
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let base = tmp.path().join(".asm").join("tmp");
        let path = {
            let scratch = ScratchDir::create(&base, "pdf").expect("scratch");
            fs::write(scratch.path().join("x"), b"x").expect("write");
            scratch.path().to_path_buf()
        };
        assert!(base.is_dir());
        assert!(!path.exists());
    }
}
