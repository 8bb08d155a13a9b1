//! `read_file`, `write_file`, `edit_file`, `list_files`, `search_in_files`,
//! `file_exists`, `get_working_directory` (§4.2).

use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::CoreError;
use crate::error::Result;
use crate::path_validator::PathValidator;

/// Applied when the caller does not pass its own `exclude_patterns`; an
/// explicit empty list disables exclusion entirely.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    ".pytest_cache",
    ".venv",
    "venv",
    "env",
    "dist",
    "build",
    ".next",
    ".nuxt",
    ".output",
    "coverage",
    ".DS_Store",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    "*.egg-info",
    ".tox",
    ".mypy_cache",
    ".ruff_cache",
    "target",
    "bin",
    "obj",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReadFileResult {
    pub content: String,
    pub lines: usize,
    pub size_bytes: u64,
    pub path: String,
}

pub async fn read_file(
    validator: &PathValidator,
    path: &Path,
    start_line: Option<usize>,
    end_line: Option<usize>,
) -> Result<ReadFileResult> {
    let resolved = validator.validate(path)?;
    let raw = tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|e| CoreError::ToolFailure(format!("could not read {}: {e}", path.display())))?;
    let size_bytes = raw.len() as u64;

    let all_lines: Vec<&str> = raw.lines().collect();
    let start = start_line.unwrap_or(1).max(1);
    let end = end_line.unwrap_or(all_lines.len()).min(all_lines.len());

    let content = if start > all_lines.len() || start > end {
        String::new()
    } else {
        all_lines[start - 1..end].join("\n")
    };

    Ok(ReadFileResult {
        content,
        lines: all_lines.len(),
        size_bytes,
        path: resolved.display().to_string(),
    })
}

pub async fn write_file(
    validator: &PathValidator,
    path: &Path,
    content: &str,
    create_dirs: bool,
) -> Result<String> {
    let resolved = validate_for_write(validator, path)?;

    if create_dirs {
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::ToolFailure(format!("could not create directories: {e}")))?;
        }
    }

    tokio::fs::write(&resolved, content)
        .await
        .map_err(|e| CoreError::ToolFailure(format!("could not write {}: {e}", path.display())))?;

    Ok(format!("wrote {} bytes to {}", content.len(), resolved.display()))
}

/// The target of a `write_file` need not exist yet; validate its parent
/// directory's containment and rejoin the file name lexically.
fn validate_for_write(validator: &PathValidator, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return validator.validate(path);
    }
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return validator.validate(path);
    };
    let file_name = path.file_name().ok_or_else(|| {
        CoreError::InvalidPath(format!("{} has no file name component", path.display()))
    })?;
    let resolved_parent = validator.validate(parent)?;
    Ok(resolved_parent.join(file_name))
}

/// Replaces the first occurrence of `old` with `new`; fails if `old` is not
/// present verbatim. Exactly-once replacement.
pub async fn edit_file(validator: &PathValidator, path: &Path, old: &str, new: &str) -> Result<String> {
    let resolved = validator.validate(path)?;
    let content = tokio::fs::read_to_string(&resolved)
        .await
        .map_err(|e| CoreError::ToolFailure(format!("could not read {}: {e}", path.display())))?;

    let Some(pos) = content.find(old) else {
        return Err(CoreError::ToolFailure("Could not find old_content".into()));
    };

    let mut updated = String::with_capacity(content.len() - old.len() + new.len());
    updated.push_str(&content[..pos]);
    updated.push_str(new);
    updated.push_str(&content[pos + old.len()..]);

    tokio::fs::write(&resolved, &updated)
        .await
        .map_err(|e| CoreError::ToolFailure(format!("could not write {}: {e}", path.display())))?;

    Ok(format!("edited {}", resolved.display()))
}

pub async fn file_exists(validator: &PathValidator, path: &Path) -> bool {
    match validator.validate(path) {
        Ok(resolved) => resolved.exists(),
        Err(_) => false,
    }
}

pub fn get_working_directory(sandbox_root: &Path) -> String {
    sandbox_root.display().to_string()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListFilesOptions {
    pub pattern: String,
    pub recursive: bool,
    pub include_dirs: bool,
    pub exclude_patterns: Option<Vec<String>>,
    pub respect_gitignore: bool,
}

impl Default for ListFilesOptions {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            recursive: false,
            include_dirs: false,
            exclude_patterns: None,
            respect_gitignore: true,
        }
    }
}

/// Glob-filtered listing relative to `directory`, sorted lexicographically.
pub async fn list_files(
    validator: &PathValidator,
    directory: &Path,
    options: &ListFilesOptions,
) -> Result<Vec<String>> {
    let resolved_root = validator.validate(directory)?;
    let exclusions: Vec<&str> = options
        .exclude_patterns
        .as_deref()
        .unwrap_or(DEFAULT_EXCLUDE_PATTERNS);

    let pattern = glob::Pattern::new(&options.pattern)
        .map_err(|e| CoreError::ToolFailure(format!("invalid pattern: {e}")))?;

    let gitignore = if options.respect_gitignore {
        ignore::gitignore::Gitignore::new(resolved_root.join(".gitignore")).0
    } else {
        ignore::gitignore::Gitignore::empty()
    };

    let mut results = Vec::new();
    let walker = ignore::WalkBuilder::new(&resolved_root)
        .max_depth(if options.recursive { None } else { Some(1) })
        .hidden(false)
        .git_ignore(false)
        .git_exclude(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if path == resolved_root {
            continue;
        }
        let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
        if is_dir && !options.include_dirs {
            continue;
        }

        let relative = match path.strip_prefix(&resolved_root) {
            Ok(r) => r,
            Err(_) => continue,
        };

        if is_excluded(relative, &exclusions) {
            continue;
        }
        if gitignore.matched(relative, is_dir).is_ignore() {
            continue;
        }

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !pattern.matches(file_name) {
            continue;
        }

        results.push(relative.display().to_string());
    }

    results.sort();
    Ok(results)
}

fn is_excluded(relative: &Path, exclusions: &[&str]) -> bool {
    exclusions.iter().any(|pattern| {
        let Ok(glob_pattern) = glob::Pattern::new(pattern) else {
            return false;
        };
        relative
            .components()
            .any(|c| glob_pattern.matches(&c.as_os_str().to_string_lossy()))
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchMatch {
    pub line_number: usize,
    pub content: String,
}

/// Plain substring search (not regex). Files that cannot be read are
/// silently skipped.
pub async fn search_in_files(
    validator: &PathValidator,
    pattern: &str,
    directory: &Path,
    file_pattern: &str,
) -> Result<Vec<(String, Vec<SearchMatch>)>> {
    let resolved_root = validator.validate(directory)?;
    let glob_pattern = glob::Pattern::new(file_pattern)
        .map_err(|e| CoreError::ToolFailure(format!("invalid file pattern: {e}")))?;

    let mut results = Vec::new();
    let walker = ignore::WalkBuilder::new(&resolved_root).hidden(false).build();

    for entry in walker {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !glob_pattern.matches(file_name) {
            continue;
        }

        let Ok(content) = tokio::fs::read_to_string(path).await else {
            continue;
        };

        let matches: Vec<SearchMatch> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains(pattern))
            .map(|(idx, line)| SearchMatch {
                line_number: idx + 1,
                content: line.to_string(),
            })
            .collect();

        if !matches.is_empty() {
            let relative = path
                .strip_prefix(&resolved_root)
                .unwrap_or(path)
                .display()
                .to_string();
            results.push((relative, matches));
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator_for(root: &Path) -> PathValidator {
        PathValidator::new([root]).unwrap()
    }

    #[tokio::test]
    async fn write_then_read_round_trips_content() {
        let tmp = tempfile::tempdir().unwrap();
        let validator = validator_for(tmp.path());
        let path = tmp.path().join("a.txt");

        write_file(&validator, &path, "hello\nworld", true).await.unwrap();
        let read = read_file(&validator, &path, None, None).await.unwrap();
        assert_eq!(read.content, "hello\nworld");
        assert_eq!(read.lines, 2);
    }

    #[tokio::test]
    async fn read_file_respects_line_range() {
        let tmp = tempfile::tempdir().unwrap();
        let validator = validator_for(tmp.path());
        let path = tmp.path().join("a.txt");
        write_file(&validator, &path, "one\ntwo\nthree", true).await.unwrap();

        let read = read_file(&validator, &path, Some(2), Some(2)).await.unwrap();
        assert_eq!(read.content, "two");
    }

    #[tokio::test]
    async fn edit_file_replaces_first_occurrence_only_once() {
        let tmp = tempfile::tempdir().unwrap();
        let validator = validator_for(tmp.path());
        let path = tmp.path().join("a.txt");
        write_file(&validator, &path, "X", true).await.unwrap();

        edit_file(&validator, &path, "X", "Y").await.unwrap();
        let err = edit_file(&validator, &path, "X", "Y").await.unwrap_err();
        assert!(err.to_string().contains("Could not find old_content"));

        let read = read_file(&validator, &path, None, None).await.unwrap();
        assert_eq!(read.content, "Y");
    }

    #[tokio::test]
    async fn list_files_applies_default_exclusions() {
        let tmp = tempfile::tempdir().unwrap();
        let validator = validator_for(tmp.path());

        tokio::fs::create_dir_all(tmp.path().join("node_modules")).await.unwrap();
        tokio::fs::write(tmp.path().join("node_modules/x"), "x").await.unwrap();
        tokio::fs::create_dir_all(tmp.path().join("src")).await.unwrap();
        tokio::fs::write(tmp.path().join("src/a.py"), "a").await.unwrap();
        tokio::fs::write(tmp.path().join("src/b.pyc"), "b").await.unwrap();

        let options = ListFilesOptions { recursive: true, ..Default::default() };
        let files = list_files(&validator, tmp.path(), &options).await.unwrap();
        assert_eq!(files, vec!["src/a.py".to_string()]);
    }

    #[tokio::test]
    async fn search_in_files_finds_substring_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let validator = validator_for(tmp.path());
        tokio::fs::write(tmp.path().join("a.txt"), "hello\nneedle here\nbye").await.unwrap();

        let results = search_in_files(&validator, "needle", tmp.path(), "*.txt").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1[0].line_number, 2);
    }

    #[tokio::test]
    async fn file_exists_is_false_for_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let validator = validator_for(tmp.path());
        assert!(!file_exists(&validator, &tmp.path().join("missing.txt")).await);
    }
}
