//! Skill discovery.
//!
//! A skill is a markdown capability document at
//! `workspace/skills/<name>/SKILL.md` with optional YAML frontmatter:
//!
//! ```text
//! ---
//! name: git-release
//! description: Cut a release with changelog and tags
//! always: false
//! ---
//! ...instructions...
//! ```
//!
//! Skills marked `always: true` are injected into every context build in
//! full; the rest appear only as a name/description/path summary that the
//! model reads on demand with the file tools.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

/// A loadable capability document.
#[derive(Debug, Clone)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    /// Path to the SKILL.md file.
    pub path: PathBuf,
    /// When true, the full body is materialized into every context build.
    pub always: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    always: bool,
}

impl SkillDescriptor {
    /// The skill body with frontmatter stripped.
    pub fn load_body(&self) -> std::io::Result<String> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(strip_frontmatter(&content).to_string())
    }
}

/// Split the YAML frontmatter block out of a SKILL.md document.
fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content.strip_prefix("---") else {
        return (None, content);
    };
    match rest.split_once("\n---") {
        Some((yaml, body)) => {
            let body = body.strip_prefix('\n').unwrap_or(body);
            (Some(yaml), body)
        }
        None => (None, content),
    }
}

fn strip_frontmatter(content: &str) -> &str {
    split_frontmatter(content).1
}

/// Discover all skills under `workspace/skills/`.
///
/// A missing skills directory yields no skills. Malformed frontmatter is
/// logged and the directory name is used instead. Results are sorted by
/// name so context assembly stays deterministic.
pub fn load_skills(workspace: &Path) -> Vec<SkillDescriptor> {
    let skills_dir = workspace.join("skills");
    let Ok(entries) = std::fs::read_dir(&skills_dir) else {
        return Vec::new();
    };

    let mut skills = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let skill_file = dir.join("SKILL.md");
        if !skill_file.exists() {
            continue;
        }
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let content = match std::fs::read_to_string(&skill_file) {
            Ok(c) => c,
            Err(e) => {
                warn!(skill = %dir_name, error = %e, "Failed to read skill file");
                continue;
            }
        };

        let frontmatter = match split_frontmatter(&content).0 {
            Some(yaml) => serde_yaml::from_str::<Frontmatter>(yaml).unwrap_or_else(|e| {
                warn!(skill = %dir_name, error = %e, "Malformed skill frontmatter");
                Frontmatter::default()
            }),
            None => Frontmatter::default(),
        };

        skills.push(SkillDescriptor {
            name: frontmatter.name.unwrap_or_else(|| dir_name.clone()),
            description: frontmatter.description.unwrap_or_default(),
            path: skill_file,
            always: frontmatter.always,
        });
    }

    skills.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = skills.len(), "Loaded skills");
    skills
}
