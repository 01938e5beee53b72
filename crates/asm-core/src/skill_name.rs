use anyhow::{anyhow, Result};

const MAX_SKILL_NAME_LEN: usize = 64;

/// Checks a skill name before it is ever joined onto a filesystem path.
///
/// Accepted names are 1-64 characters of lowercase ASCII letters, digits and
/// single hyphens, not starting or ending with a hyphen. Anything else
/// (separators, dots, uppercase, whitespace, NUL) is rejected.
pub fn validate_skill_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("skill name must not be empty"));
    }
    if name.len() > MAX_SKILL_NAME_LEN {
        return Err(anyhow!(
            "skill name exceeds {MAX_SKILL_NAME_LEN} characters: {}",
            name.len()
        ));
    }
    if name
        .chars()
        .any(|ch| !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-'))
    {
        return Err(anyhow!(
            "skill name contains invalid character(s); allowed: a-z, 0-9, '-': {}",
            name.escape_debug()
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(anyhow!("skill name must not start or end with '-': {name}"));
    }
    if name.contains("--") {
        return Err(anyhow!("skill name must not contain consecutive '-': {name}"));
    }

    Ok(())
}
