// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Skill library: resolves skill names to materialized bundles.
//!
//! Skills live control-plane-side as directories of files
//! (`<skills_dir>/<name>/prompt.md`, ...). At dispatch time the requested
//! names are resolved to [`SkillBundle`]s and POSTed to the worker's
//! `/prepare`, which writes them into the workspace.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use conveyor_worker::SkillBundle;
use tracing::warn;

pub struct SkillLibrary {
    dir: PathBuf,
}

impl SkillLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolve names to bundles, deduplicating while preserving order.
    ///
    /// Unknown skills are skipped with a warning rather than failing the
    /// task; the worker simply runs without them.
    pub fn resolve(&self, names: &[String]) -> Vec<SkillBundle> {
        let mut seen = std::collections::HashSet::new();
        let mut bundles = Vec::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            match self.load_bundle(name) {
                Some(bundle) => bundles.push(bundle),
                None => warn!(skill = name, "skill not found in library, skipping"),
            }
        }
        bundles
    }

    fn load_bundle(&self, name: &str) -> Option<SkillBundle> {
        // Reject names that could escape the library directory.
        if name.contains('/') || name.contains("..") {
            return None;
        }
        let skill_dir = self.dir.join(name);
        if !skill_dir.is_dir() {
            return None;
        }

        let mut files = BTreeMap::new();
        collect_files(&skill_dir, Path::new(""), &mut files);
        if files.is_empty() {
            return None;
        }
        Some(SkillBundle {
            name: name.to_string(),
            files,
        })
    }
}

fn collect_files(dir: &Path, prefix: &Path, files: &mut BTreeMap<String, String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let relative = prefix.join(entry.file_name());
        if path.is_dir() {
            collect_files(&path, &relative, files);
        } else if let Ok(content) = std::fs::read_to_string(&path) {
            files.insert(relative.to_string_lossy().into_owned(), content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_skill(dir: &Path, name: &str, files: &[(&str, &str)]) {
        for (file, content) in files {
            let path = dir.join(name).join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn resolves_bundles_with_nested_files() {
        let dir = tempdir().unwrap();
        write_skill(
            dir.path(),
            "code-review",
            &[("prompt.md", "review carefully"), ("refs/style.md", "4 spaces")],
        );

        let library = SkillLibrary::new(dir.path());
        let bundles = library.resolve(&["code-review".to_string()]);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].name, "code-review");
        assert_eq!(
            bundles[0].files.get("prompt.md").map(String::as_str),
            Some("review carefully")
        );
        assert_eq!(
            bundles[0].files.get("refs/style.md").map(String::as_str),
            Some("4 spaces")
        );
    }

    #[test]
    fn unknown_skills_are_skipped_in_order() {
        let dir = tempdir().unwrap();
        write_skill(dir.path(), "a", &[("prompt.md", "a")]);
        write_skill(dir.path(), "b", &[("prompt.md", "b")]);

        let library = SkillLibrary::new(dir.path());
        let bundles = library.resolve(&[
            "b".to_string(),
            "ghost".to_string(),
            "a".to_string(),
            "b".to_string(), // duplicate
        ]);
        let names: Vec<&str> = bundles.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn path_traversal_names_are_rejected() {
        let dir = tempdir().unwrap();
        write_skill(dir.path(), "safe", &[("prompt.md", "ok")]);

        let library = SkillLibrary::new(dir.path().join("safe"));
        assert!(library.resolve(&["../safe".to_string()]).is_empty());
        assert!(library.resolve(&["a/b".to_string()]).is_empty());
    }
}
