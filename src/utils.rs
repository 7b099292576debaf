//! General utility functions for pakscope
//!
//! This module contains common helper functions used across the library.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};

use crate::error::{Error, Result};

/// Format a file size in human-readable form (B, KB, MB, GB)
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

/// Create a glob matcher from a pattern string
///
/// Handles common patterns:
/// - `*.ext` becomes `**/*.ext` (match in any directory)
/// - Plain text without wildcards becomes `**/*text*` (substring search)
pub fn create_glob_matcher(pattern: &str) -> Result<GlobMatcher> {
    let pattern = if pattern.starts_with("*.") {
        format!("**/{}", pattern)
    } else if !pattern.contains('*') && !pattern.contains('?') {
        format!("**/*{}*", pattern)
    } else {
        pattern.to_string()
    };

    let glob = Glob::new(&pattern)
        .map_err(|e| Error::InvalidPattern(format!("{}: {}", pattern, e)))?;
    Ok(glob.compile_matcher())
}

/// Check if a name matches the optional filter
pub fn matches_filter(name: &str, matcher: Option<&GlobMatcher>) -> bool {
    match matcher {
        Some(m) => m.is_match(name),
        None => true,
    }
}

/// Recursively collect all files in a directory
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files_recursive(dir, &mut files)?;
    Ok(files)
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                collect_files_recursive(&path, files)?;
            } else {
                files.push(path);
            }
        }
    }
    Ok(())
}

/// Final component of a virtual path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Lowercased extension of a virtual path, without the dot
pub fn extension(path: &str) -> String {
    let name = file_name(path);
    match name.rfind('.') {
        Some(pos) if pos + 1 < name.len() => name[pos + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// Destination of a virtual path under `base`, keeping its directories or
/// only its file name
pub fn output_path(base: &Path, path: &str, keep_structure: bool) -> PathBuf {
    let path = path.trim_start_matches('/');
    let relative = if keep_structure { path } else { file_name(path) };
    relative
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

/// Virtual path with its extension removed
pub fn strip_extension(path: &str) -> &str {
    let name_start = path.len() - file_name(path).len();
    match path[name_start..].rfind('.') {
        Some(pos) => &path[..name_start + pos],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_glob_matcher_shorthands() {
        let ext = create_glob_matcher("*.uasset").unwrap();
        assert!(matches_filter("Game/Content/a.uasset", Some(&ext)));
        assert!(!matches_filter("Game/Content/a.umap", Some(&ext)));

        let text = create_glob_matcher("Sounds").unwrap();
        assert!(matches_filter("Game/Sounds/x.wem", Some(&text)));
        assert!(matches_filter("anything", None));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(file_name("Game/Content/T_Rock.uasset"), "T_Rock.uasset");
        assert_eq!(extension("Game/Content/T_Rock.UASSET"), "uasset");
        assert_eq!(extension("Game/Content/README"), "");
        assert_eq!(extension("Game/v1.2/README"), "");
        assert_eq!(strip_extension("Game/Content/T_Rock.uasset"), "Game/Content/T_Rock");
        assert_eq!(strip_extension("Game/v1.2/README"), "Game/v1.2/README");
    }

    #[test]
    fn test_output_path() {
        let base = Path::new("out");
        assert_eq!(
            output_path(base, "/Game/Sounds/a.wem", true),
            Path::new("out").join("Game").join("Sounds").join("a.wem")
        );
        assert_eq!(output_path(base, "Game/Sounds/a.wem", false), Path::new("out").join("a.wem"));
    }

    #[test]
    fn test_collect_files_recurses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.pak"), b"x").unwrap();
        std::fs::write(dir.path().join("top.pak"), b"x").unwrap();
        assert_eq!(collect_files(dir.path()).unwrap().len(), 2);
    }
}
