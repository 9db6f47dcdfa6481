//! Repository loading: clone (or update) a git repo and walk its source
//! files into memory with language metadata.

use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Per-file size cap; larger files are skipped during the walk.
const MAX_FILE_BYTES: u64 = 500_000;

/// A file extracted from a repository.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub relative_path: String,
    pub content: String,
    pub language: String,
}

/// Extract a repository name from a clone URL.
pub fn repo_name_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit('/')
        .next()
        .unwrap_or("repo")
        .to_string()
}

/// Clone `url` into `target`, or update the existing clone when `target`
/// already holds the same remote. A clone of a different remote at the same
/// path is removed and replaced.
pub fn clone_or_update(url: &str, target: &Path) -> Result<()> {
    if target.exists() {
        match open_matching_repo(url, target) {
            Some(repo) => {
                tracing::info!("Updating existing clone at {}", target.display());
                return fast_forward(&repo)
                    .with_context(|| format!("Failed to update clone of {url}"));
            }
            None => {
                tracing::info!("Replacing stale clone at {}", target.display());
                std::fs::remove_dir_all(target)
                    .with_context(|| format!("Failed to remove {}", target.display()))?;
            }
        }
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!("Cloning {} into {}", url, target.display());
    git2::Repository::clone(url, target).with_context(|| format!("Failed to clone {url}"))?;
    Ok(())
}

/// Open the repo at `target` if its origin matches `url` (ignoring a
/// trailing `.git`).
fn open_matching_repo(url: &str, target: &Path) -> Option<git2::Repository> {
    let repo = git2::Repository::open(target).ok()?;
    let matches = {
        let origin = repo.find_remote("origin").ok()?;
        let existing = origin.url().unwrap_or_default();
        normalize_url(existing) == normalize_url(url)
    };
    matches.then_some(repo)
}

fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').trim_end_matches(".git").to_string()
}

/// Fetch origin and hard-reset the working tree to the fetched head.
fn fast_forward(repo: &git2::Repository) -> Result<()> {
    let mut remote = repo.find_remote("origin")?;
    remote.fetch(&["HEAD"], None, None)?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let commit = repo.reference_to_annotated_commit(&fetch_head)?;
    let object = repo.find_object(commit.id(), None)?;
    repo.reset(&object, git2::ResetType::Hard, None)?;
    Ok(())
}

/// Walk all indexable text files under `root` and load their contents.
pub fn load_directory(root: &Path) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        anyhow::bail!("Directory not found: {}", root.display());
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_hidden_or_ignored(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_indexable_file(path) {
            continue;
        }

        if let Ok(meta) = std::fs::metadata(path) {
            if meta.len() > MAX_FILE_BYTES {
                continue;
            }
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        // Skip files that can't be read as UTF-8.
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        if content.trim().is_empty() {
            continue;
        }

        files.push(SourceFile {
            relative_path: relative,
            language: detect_language(path),
            content,
        });
    }

    Ok(files)
}

fn is_hidden_or_ignored(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    matches!(
        name.as_ref(),
        "node_modules"
            | "target"
            | "dist"
            | "build"
            | "__pycache__"
            | "vendor"
            | "venv"
            | "env"
            | "obj"
            | "bin"
    )
}

fn is_indexable_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    matches!(
        ext.as_str(),
        "rs" | "py"
            | "js"
            | "ts"
            | "tsx"
            | "jsx"
            | "java"
            | "go"
            | "cpp"
            | "c"
            | "h"
            | "hpp"
            | "cs"
            | "rb"
            | "php"
            | "swift"
            | "kt"
            | "dart"
            | "html"
            | "css"
            | "scss"
            | "json"
            | "yaml"
            | "yml"
            | "toml"
            | "md"
            | "txt"
            | "sql"
            | "sh"
            | "bat"
            | "ps1"
    )
}

fn detect_language(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "tsx" => "tsx",
        "jsx" => "jsx",
        "java" => "java",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        "dart" => "dart",
        "html" => "html",
        "css" | "scss" => "css",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "sql" => "sql",
        "sh" => "shell",
        "bat" => "batch",
        "ps1" => "powershell",
        "txt" => "text",
        _ => "unknown",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name_from_url() {
        assert_eq!(repo_name_from_url("https://github.com/acme/widget.git"), "widget");
        assert_eq!(repo_name_from_url("https://github.com/acme/widget"), "widget");
        assert_eq!(repo_name_from_url("https://github.com/acme/widget/"), "widget");
    }

    #[test]
    fn test_load_directory_filters_and_detects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("notes.md"), "# notes").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules").join("dep.js"), "x").unwrap();

        let mut files = load_directory(dir.path()).unwrap();
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative_path, "main.rs");
        assert_eq!(files[0].language, "rust");
        assert_eq!(files[1].relative_path, "notes.md");
        assert_eq!(files[1].language, "markdown");
    }

    #[test]
    fn test_load_directory_skips_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.rs"), "   \n").unwrap();
        let files = load_directory(dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_load_directory_missing_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(load_directory(&missing).is_err());
    }
}
