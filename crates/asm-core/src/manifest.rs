use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const SKILL_MANIFEST_FILE: &str = "SKILL.md";
/// Largest `SKILL.md` read out of a package.
pub const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

const MAX_DESCRIPTION_LEN: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillManifest {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFrontmatter {
    name: Option<String>,
    description: Option<String>,
    version: Option<serde_yaml::Value>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_yaml::Value>,
}

/// Parses the YAML frontmatter block at the top of a `SKILL.md` file.
///
/// `version` is read from the top level first and from `metadata.version`
/// second; numeric YAML scalars are kept in their textual form.
pub fn parse_skill_manifest(content: &str) -> Result<SkillManifest> {
    let normalized = content.replace("\r\n", "\n");
    let body = normalized
        .strip_prefix("---\n")
        .ok_or_else(|| anyhow!("{SKILL_MANIFEST_FILE} must start with a '---' frontmatter block"))?;
    let end = body
        .find("\n---")
        .ok_or_else(|| anyhow!("{SKILL_MANIFEST_FILE} frontmatter is not closed with '---'"))?;
    let yaml = &body[..end];

    let raw: RawFrontmatter =
        serde_yaml::from_str(yaml).context("failed to parse skill frontmatter")?;

    let name = raw
        .name
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("skill frontmatter is missing required field: name"))?;
    let description = raw
        .description
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("skill frontmatter is missing required field: description"))?;
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(anyhow!(
            "skill description exceeds {MAX_DESCRIPTION_LEN} characters"
        ));
    }

    let version = raw
        .version
        .as_ref()
        .or_else(|| raw.metadata.get("version"))
        .and_then(yaml_scalar_text);

    Ok(SkillManifest {
        name,
        description,
        version,
    })
}

fn yaml_scalar_text(value: &serde_yaml::Value) -> Option<String> {
    let text = match value {
        serde_yaml::Value::String(text) => text.trim().to_string(),
        serde_yaml::Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
