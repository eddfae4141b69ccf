// ABOUTME: Walks a project directory and loads source files for the pipeline.
// ABOUTME: Honors .gitignore plus a fixed list of build and dependency directories.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use codescan_core::FileInfo;
use ignore::{overrides::OverrideBuilder, WalkBuilder};
use std::path::Path;
use tracing::{debug, info, warn};

const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/coverage/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/.codescan/**",
];

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub exclude_patterns: Vec<String>,
    /// Files above this size are handed over without content.
    pub max_file_size: u64,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            max_file_size: 1024 * 1024,
        }
    }
}

/// Collects files under `root`. Paths are relative to `root` with `/`
/// separators, sorted. Non UTF-8 files are left out.
pub fn collect_source_files(root: &Path, options: &CollectOptions) -> Result<Vec<FileInfo>> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    info!("Collecting source files from {}", root.display());

    let mut overrides = OverrideBuilder::new(root);
    for pattern in DEFAULT_EXCLUDES
        .iter()
        .copied()
        .chain(options.exclude_patterns.iter().map(String::as_str))
    {
        overrides
            .add(&format!("!{}", pattern))
            .with_context(|| format!("Invalid exclude pattern: {}", pattern))?;
    }
    let overrides = overrides.build().context("Failed to build exclude patterns")?;

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .require_git(false)
        .ignore(true)
        .overrides(overrides)
        .build();

    let mut files = Vec::new();
    let mut unreadable = 0usize;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Walker error: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let relative = relative_path(root, path);
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(file = %relative, "cannot stat file: {}", e);
                unreadable += 1;
                continue;
            }
        };
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        if metadata.len() > options.max_file_size {
            debug!(file = %relative, size = metadata.len(), "not loading large file");
            let mut file = FileInfo::without_content(relative, metadata.len());
            file.modified = modified;
            files.push(file);
            continue;
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %relative, "cannot read file: {}", e);
                unreadable += 1;
                continue;
            }
        };
        match String::from_utf8(bytes) {
            Ok(content) => {
                let mut file = FileInfo::new(relative, content);
                file.modified = modified;
                files.push(file);
            }
            Err(_) => {
                debug!(file = %relative, "skipping non UTF-8 file");
                unreadable += 1;
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    info!(
        "File collection complete: {} files, {} unreadable",
        files.len(),
        unreadable
    );
    Ok(files)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = PathBuf::from("/project");
        let path = root.join("src").join("app.ts");
        assert_eq!(relative_path(&root, &path), "src/app.ts");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = collect_source_files(Path::new("/definitely/not/here"), &CollectOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
