use std::{fs, path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};

/// Create the directory if it doesn't exist; error if a non-directory exists there.
pub(crate) fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() { bail!("Path exists but is not a directory: {}", path.display()); }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Error unless the file already exists.
pub(crate) fn require_file_exists(path: &Path) -> Result<()> {
    if !path.exists() { bail!("File does not exist: {}", path.display()); }
    if !path.is_file() { bail!("Path exists but is not a file: {}", path.display()); }
    Ok(())
}

/// Resolve `path` against `base` unless it is already absolute.
pub(crate) fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b/c");
        ensure_dir_exists(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir_exists(&nested).unwrap(); // idempotent
    }

    #[test]
    fn ensure_dir_rejects_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f.txt");
        fs::write(&file, b"x").unwrap();
        assert!(ensure_dir_exists(&file).is_err());
        assert!(require_file_exists(&file).is_ok());
        assert!(require_file_exists(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let base = Path::new("/data/run");
        assert_eq!(resolve_path(base, Path::new("lights/2013.tif")), PathBuf::from("/data/run/lights/2013.tif"));
        assert_eq!(resolve_path(base, Path::new("/abs/x.tif")), PathBuf::from("/abs/x.tif"));
    }
}
