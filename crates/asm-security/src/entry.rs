use asm_core::PackageEntry;

use crate::check::{SecurityCheck, SecurityReason};

/// Checks one archive entry name against the package contract: relative,
/// no `..` segment, no NUL byte, and located under `expected_root`.
pub fn validate_zip_entry_security(entry_name: &str, expected_root: &str) -> SecurityCheck {
    if entry_name.is_empty() {
        return SecurityCheck::unsafe_because(SecurityReason::ZipEntryEscape, "empty entry name");
    }
    if entry_name.contains('\0') {
        return SecurityCheck::unsafe_because(
            SecurityReason::ZipEntryEscape,
            format!("entry name contains a null byte: {}", entry_name.escape_debug()),
        );
    }
    if is_absolute_entry_name(entry_name) {
        return SecurityCheck::unsafe_because(
            SecurityReason::ZipEntryEscape,
            format!("entry name is absolute: {entry_name}"),
        );
    }

    let segments = entry_name
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    if segments.iter().any(|segment| *segment == "..") {
        return SecurityCheck::unsafe_because(
            SecurityReason::PathTraversal,
            format!("entry name contains '..': {entry_name}"),
        );
    }

    match segments.first() {
        Some(root) if *root == expected_root => SecurityCheck::Safe,
        Some(root) => SecurityCheck::unsafe_because(
            SecurityReason::ZipEntryEscape,
            format!("entry '{entry_name}' is outside package root '{expected_root}' (root='{root}')"),
        ),
        None => SecurityCheck::unsafe_because(
            SecurityReason::ZipEntryEscape,
            format!("entry name has no path segments: {entry_name}"),
        ),
    }
}

/// Runs [`validate_zip_entry_security`] over every entry; the first unsafe
/// entry wins. Symlink entries are unsafe regardless of their name.
pub fn validate_package_entries(entries: &[PackageEntry], expected_root: &str) -> SecurityCheck {
    for entry in entries {
        let check = validate_zip_entry_security(&entry.name, expected_root);
        if !check.is_safe() {
            return check;
        }
        if entry.is_symlink {
            return SecurityCheck::unsafe_because(
                SecurityReason::SymlinkEscape,
                format!("package contains a symlink entry: {}", entry.name),
            );
        }
    }
    SecurityCheck::Safe
}

fn is_absolute_entry_name(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
