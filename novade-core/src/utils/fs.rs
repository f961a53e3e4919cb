//! Filesystem helpers mapping `std::io::Error` into [`CoreError`].

use crate::error::CoreError;
use std::fs;
use std::path::Path;

/// Creates `path` and its parents unless it already is a directory. Fails if
/// `path` exists but is not a directory.
pub fn ensure_dir_exists(path: &Path) -> Result<(), CoreError> {
    if path.exists() {
        if path.is_dir() {
            Ok(())
        } else {
            Err(CoreError::Filesystem {
                message: "Path exists but is not a directory".to_string(),
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "Path exists but is not a directory"),
            })
        }
    } else {
        fs::create_dir_all(path).map_err(|e| CoreError::Filesystem {
            message: "Failed to create directory".to_string(),
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_exists_creates_nested() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b/c");
        ensure_dir_exists(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir_exists(&nested).unwrap();
    }

    #[test]
    fn test_ensure_dir_exists_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(matches!(ensure_dir_exists(&file), Err(CoreError::Filesystem { .. })));
    }
}
