//! Hasher & File Scanner (spec §4.1)

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use nsite_core::path::{normalize_display_path, normalize_key};
use nsite_core::FileEntry;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::ScanError;

/// Built-in ignore patterns, applied on top of whatever `.gitignore`/
/// `.nsiteignore` the `ignore` crate's matcher already honors (spec.md §4.1:
/// "hidden files, version-control metadata, editor backups").
const BUILTIN_IGNORES: &[&str] = &[".git", ".DS_Store", ".nsiteignore"];

fn is_builtin_ignored(file_name: &str) -> bool {
    BUILTIN_IGNORES.contains(&file_name)
        || file_name.ends_with('~')
        || file_name.ends_with(".swp")
}

fn infer_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// One file the scanner could not read; recorded but does not abort the
/// scan (spec §4.1: "unreadable files produce per-file errors that do not
/// abort the scan").
#[derive(Debug, Clone)]
pub struct ScanIssue {
    pub path: PathBuf,
    pub message: String,
}

pub struct ScanResult {
    pub files: Vec<FileEntry>,
    pub issues: Vec<ScanIssue>,
}

/// Walk `root`, honoring ignore files plus built-in defaults, and hash every
/// non-ignored file. Symlinks that resolve outside `root` are rejected.
pub fn scan(root: &Path) -> Result<ScanResult, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::RootInaccessible(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        )));
    }

    let canonical_root = root
        .canonicalize()
        .map_err(ScanError::RootInaccessible)?;

    let mut files = Vec::new();
    let mut issues = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .add_custom_ignore_filename(".nsiteignore")
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                issues.push(ScanIssue {
                    path: root.to_path_buf(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }

        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();
        if is_builtin_ignored(&file_name) {
            continue;
        }

        if entry.path_is_symlink() {
            match path.canonicalize() {
                Ok(resolved) if resolved.starts_with(&canonical_root) => {}
                _ => {
                    issues.push(ScanIssue {
                        path: path.to_path_buf(),
                        message: "symlink escapes target root".into(),
                    });
                    continue;
                }
            }
        }

        match load_entry(root, path) {
            Ok(entry) => files.push(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file");
                issues.push(ScanIssue {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(ScanResult { files, issues })
}

fn load_entry(root: &Path, path: &Path) -> std::io::Result<FileEntry> {
    let bytes = std::fs::read(path)?;
    let size = bytes.len() as u64;
    let sha256 = hex::encode(Sha256::digest(&bytes));

    let relative = path.strip_prefix(root).unwrap_or(path);
    let display_path = normalize_display_path(&relative.to_string_lossy().replace('\\', "/"));
    let key = normalize_key(&display_path);
    let content_type = infer_content_type(path);

    Ok(FileEntry {
        path: key,
        display_path,
        size,
        content_type,
        sha256,
        bytes: Some(bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn scans_files_and_computes_sha256() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.html"), b"<html></html>").unwrap();
        fs::create_dir(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/app.css"), b"body{}").unwrap();

        let result = scan(dir.path()).unwrap();
        assert_eq!(result.files.len(), 2);
        assert!(result.issues.is_empty());

        let index = result
            .files
            .iter()
            .find(|f| f.display_path == "/index.html")
            .unwrap();
        assert_eq!(index.sha256, hex::encode(Sha256::digest(b"<html></html>")));
        assert_eq!(index.content_type, "text/html");
    }

    #[test]
    fn ignores_git_directory_and_editor_backups() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), b"ref: refs/heads/main").unwrap();
        fs::write(dir.path().join("index.html"), b"x").unwrap();
        fs::write(dir.path().join("index.html~"), b"x").unwrap();

        let result = scan(dir.path()).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].display_path, "/index.html");
    }

    #[test]
    fn zero_byte_files_are_legal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("empty.txt"), b"").unwrap();

        let result = scan(dir.path()).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].size, 0);
    }

    #[test]
    fn fails_when_root_is_inaccessible() {
        let missing = Path::new("/nonexistent/nsite-scan-test-root");
        assert!(scan(missing).is_err());
    }
}
