//! Skill packs
//!
//! A skill pack is a markdown file at `.aidp/skills/<id>/SKILL.md` with YAML
//! front matter (name, description, arbitrary keys) and a body the REPL can
//! inject into the work loop as guidance.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

/// Skills directory under `.aidp/`.
pub const SKILLS_DIR: &str = "skills";

/// Skill file name inside each pack directory.
pub const SKILL_FILE: &str = "SKILL.md";

/// Error kinds for skill loading
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("Skill not found: {0}")]
    NotFound(String),

    #[error("Malformed skill front matter in {0}: {1}")]
    Malformed(String, String),
}

/// Front-matter metadata of a skill pack
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkillMeta {
    pub name: String,
    pub description: String,
}

/// One loaded skill pack
#[derive(Debug, Clone)]
pub struct SkillPack {
    pub id: String,
    pub meta: SkillMeta,
    pub body: String,
}

fn skills_root(project_dir: &Path) -> PathBuf {
    project_dir.join(".aidp").join(SKILLS_DIR)
}

/// Split `---`-delimited YAML front matter from the body.
fn split_front_matter(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content.strip_prefix("---\n") else {
        return (None, content);
    };
    match rest.split_once("\n---") {
        Some((front, body)) => (Some(front), body.trim_start_matches(['-', '\n'])),
        None => (None, content),
    }
}

/// Load one skill pack by id.
pub fn load(project_dir: &Path, id: &str) -> Result<SkillPack, SkillError> {
    let path = skills_root(project_dir).join(id).join(SKILL_FILE);
    debug!(path = %path.display(), "skills::load");

    let content = std::fs::read_to_string(&path).map_err(|_| SkillError::NotFound(id.to_string()))?;
    let (front, body) = split_front_matter(&content);

    let meta = match front {
        Some(front) => serde_yaml::from_str(front)
            .map_err(|e| SkillError::Malformed(path.display().to_string(), e.to_string()))?,
        None => SkillMeta::default(),
    };

    Ok(SkillPack {
        id: id.to_string(),
        meta,
        body: body.trim().to_string(),
    })
}

/// List all skill packs under the project, skipping unreadable ones.
pub fn list(project_dir: &Path) -> Vec<SkillPack> {
    let root = skills_root(project_dir);
    let Ok(entries) = std::fs::read_dir(&root) else {
        return Vec::new();
    };

    let mut packs = Vec::new();
    for entry in entries.flatten() {
        let id = entry.file_name().to_string_lossy().to_string();
        match load(project_dir, &id) {
            Ok(pack) => packs.push(pack),
            Err(e) => warn!(%id, error = %e, "Skipping unreadable skill pack"),
        }
    }
    packs.sort_by(|a, b| a.id.cmp(&b.id));
    packs
}

/// Case-insensitive search over ids, names, and descriptions.
pub fn search(project_dir: &Path, term: &str) -> Vec<SkillPack> {
    let needle = term.to_lowercase();
    list(project_dir)
        .into_iter()
        .filter(|pack| {
            pack.id.to_lowercase().contains(&needle)
                || pack.meta.name.to_lowercase().contains(&needle)
                || pack.meta.description.to_lowercase().contains(&needle)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_skill(dir: &Path, id: &str, content: &str) {
        let skill_dir = skills_root(dir).join(id);
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(skill_dir.join(SKILL_FILE), content).unwrap();
    }

    #[test]
    fn test_load_with_front_matter() {
        let temp = tempdir().unwrap();
        write_skill(
            temp.path(),
            "tdd",
            "---\nname: TDD discipline\ndescription: Red-green-refactor loop\n---\n\nWrite the failing test first.\n",
        );

        let pack = load(temp.path(), "tdd").unwrap();
        assert_eq!(pack.meta.name, "TDD discipline");
        assert_eq!(pack.body, "Write the failing test first.");
    }

    #[test]
    fn test_load_without_front_matter() {
        let temp = tempdir().unwrap();
        write_skill(temp.path(), "bare", "Just a body.\n");

        let pack = load(temp.path(), "bare").unwrap();
        assert_eq!(pack.meta.name, "");
        assert_eq!(pack.body, "Just a body.");
    }

    #[test]
    fn test_load_missing_fails() {
        let temp = tempdir().unwrap();
        assert!(matches!(load(temp.path(), "ghost"), Err(SkillError::NotFound(_))));
    }

    #[test]
    fn test_malformed_front_matter_fails() {
        let temp = tempdir().unwrap();
        write_skill(temp.path(), "broken", "---\n{not yaml\n---\nbody\n");
        assert!(matches!(
            load(temp.path(), "broken"),
            Err(SkillError::Malformed(..))
        ));
    }

    #[test]
    fn test_list_and_search() {
        let temp = tempdir().unwrap();
        write_skill(temp.path(), "tdd", "---\nname: TDD\ndescription: test first\n---\nbody");
        write_skill(temp.path(), "perf", "---\nname: Perf\ndescription: profiling habits\n---\nbody");

        let all = list(temp.path());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "perf", "sorted by id");

        let found = search(temp.path(), "profil");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "perf");
    }
}
