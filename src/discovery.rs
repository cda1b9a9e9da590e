//! File discovery for the Ingestion Coordinator (C10).
//!
//! Walks a root path and returns every file that survives the
//! `IngestionConfig` include/exclude glob filters, in deterministic
//! (path-sorted) order — a plain path list for C10 to feed through
//! C1–C9.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::IngestionConfig;
use crate::error::{EngineError, EngineResult};

fn build_globset(patterns: &[String]) -> EngineResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| EngineError::Unknown {
            reason: format!("invalid glob pattern {pattern}: {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| EngineError::Unknown {
        reason: format!("failed to build glob set: {e}"),
    })
}

/// Walks `root`, applying `config`'s include/exclude globs (matched
/// against the path relative to `root`) and symlink policy. Returns
/// absolute paths in sorted order for deterministic, resumable
/// iteration.
pub fn discover_files(root: &Path, config: &IngestionConfig) -> EngineResult<Vec<PathBuf>> {
    if !root.exists() {
        return Err(EngineError::NotFound {
            what: format!("ingestion root {}", root.display()),
        });
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut paths = Vec::new();
    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry.map_err(|e| EngineError::Unknown {
            reason: format!("walking {}: {e}", root.display()),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) {
            continue;
        }
        if !include_set.is_match(rel_str.as_ref()) {
            continue;
        }
        paths.push(path.to_path_buf());
    }

    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn cfg() -> IngestionConfig {
        IngestionConfig {
            worker_count: Some(1),
            queue_capacity: 8,
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec!["**/.git/**".to_string()],
            follow_symlinks: false,
        }
    }

    #[test]
    fn discovers_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let found = discover_files(dir.path(), &cfg()).unwrap();
        let names: Vec<_> = found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn excludes_git_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(dir.path().join("doc.txt"), "hello").unwrap();
        let found = discover_files(dir.path(), &cfg()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name().unwrap(), "doc.txt");
    }

    #[test]
    fn missing_root_is_not_found() {
        let err = discover_files(Path::new("/nonexistent/path/xyz"), &cfg()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn include_glob_restricts_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("note.md"), "m").unwrap();
        fs::write(dir.path().join("image.png"), "p").unwrap();
        let mut c = cfg();
        c.include_globs = vec!["**/*.md".to_string()];
        let found = discover_files(dir.path(), &c).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name().unwrap(), "note.md");
    }
}
