use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillLookup {
    Found { path: PathBuf },
    NotFound,
    /// A directory exists whose name differs from the request only in case.
    CaseMismatch { requested: String, actual: String },
}

/// Looks up `name` in `scope_root` by comparing directory entry names
/// byte-for-byte, so case-insensitive filesystems cannot alias two skills.
pub fn find_installed_skill(scope_root: &Path, name: &str) -> Result<SkillLookup> {
    let reader = match fs::read_dir(scope_root) {
        Ok(reader) => reader,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SkillLookup::NotFound),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read scope root {}", scope_root.display()));
        }
    };

    let mut case_variant = None;
    for entry in reader {
        let entry =
            entry.with_context(|| format!("failed to iterate {}", scope_root.display()))?;
        let file_name = entry.file_name();
        let path = entry.path();
        if !fs::metadata(&path).is_ok_and(|metadata| metadata.is_dir()) {
            continue;
        }

        if file_name.as_encoded_bytes() == name.as_bytes() {
            return Ok(SkillLookup::Found { path });
        }
        if case_variant.is_none() {
            if let Some(actual) = file_name.to_str() {
                if actual.eq_ignore_ascii_case(name) {
                    case_variant = Some(actual.to_string());
                }
            }
        }
    }

    Ok(match case_variant {
        Some(actual) => SkillLookup::CaseMismatch {
            requested: name.to_string(),
            actual,
        },
        None => SkillLookup::NotFound,
    })
}
