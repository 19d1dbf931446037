//! Staged artifact writes
//!
//! Callers stage every file of a module first and rename only once all of
//! them staged, so a failure never leaves a half-written module behind.

use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Path of the staging file used before the final rename
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Whether `path` already holds exactly `contents`
pub fn is_unchanged(path: &Path, contents: &[u8]) -> bool {
    fs::read(path).is_ok_and(|existing| existing == contents)
}

/// Stage `contents` next to `path` without touching `path` itself
pub fn stage(path: &Path, contents: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = staging_path(path);
    let file = fs::File::create(&temp_path)?;
    let mut writer = std::io::BufWriter::new(file);
    writer.write_all(contents)?;
    writer.flush()?;
    Ok(temp_path)
}

#[cfg(test)]
mod tests {
    use crate::manifest_writer::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_leaves_target_untouched() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let path = temp_dir.path().join("out").join("Shim.g.cs");

        let Ok(staged) = stage(&path, b"class A {}") else {
            panic!("staging should create the parent directory");
        };
        assert_eq!(staged, staging_path(&path));
        assert!(!path.exists());
        assert!(is_unchanged(&staged, b"class A {}"));
        assert!(!is_unchanged(&staged, b"class B {}"));
    }

    #[test]
    fn test_missing_file_is_never_unchanged() {
        assert!(!is_unchanged(std::path::Path::new("/nonexistent/Shim.g.cs"), b""));
    }

    #[test]
    fn test_staging_path_keeps_extension() {
        let path = std::path::Path::new("/out/Demo.pplugin");
        assert_eq!(staging_path(path), std::path::PathBuf::from("/out/Demo.pplugin.tmp"));
    }
}
