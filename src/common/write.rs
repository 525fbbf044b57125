use std::{fs::{self, File}, io::{self, Write}, path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};
use tempfile::NamedTempFile;

pub(crate) fn assert_not_stdout(path: &Path) -> Result<()> {
    if path == Path::new("-") {
        bail!("stdout is not supported; provide a real file path.");
    }
    Ok(())
}

/// Write-then-rename wrapper for atomic table outputs
pub(crate) struct PendingWrite {
    target: PathBuf,
    tmp: Option<NamedTempFile>,
}

pub(crate) fn open_for_write(target: &Path, force: bool) -> Result<PendingWrite> {
    assert_not_stdout(target)?;
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("create dir {}", parent.display()))?;
    if !force && target.exists() {
        bail!("Refusing to overwrite existing file: {} (use --force)", target.display());
    }
    let tmp = NamedTempFile::new_in(parent).context("create temp file")?;

    Ok(PendingWrite { target: target.to_path_buf(), tmp: Some(tmp) })
}

impl PendingWrite {
    fn file(&mut self) -> io::Result<&mut NamedTempFile> {
        self.tmp.as_mut().ok_or_else(|| io::Error::other("write already finalized"))
    }

    /// Persist the temp file at its target path.
    pub(crate) fn finalize(mut self) -> Result<PathBuf> {
        let Some(tmp) = self.tmp.take() else { bail!("write already finalized") };
        tmp.as_file().sync_all().ok(); // best-effort fsync file
        tmp.persist(&self.target)
            .with_context(|| format!("rename to {}", self.target.display()))?;
        if let Some(dir) = self.target.parent() {
            let _ = File::open(dir).and_then(|f| f.sync_all());
        }
        Ok(self.target)
    }
}

impl Write for PendingWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.file()?.write(buf) }
    fn flush(&mut self) -> io::Result<()> { self.file()?.flush() }
}

/// Atomically write `bytes` to `target`.
pub(crate) fn write_bytes_atomic(target: &Path, bytes: &[u8], force: bool) -> Result<PathBuf> {
    let mut pending = open_for_write(target, force)?;
    pending.write_all(bytes)
        .with_context(|| format!("write {}", target.display()))?;
    pending.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_and_refuse_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("out/table.csv");

        write_bytes_atomic(&target, b"a,b\n1,2\n", false).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"a,b\n1,2\n");

        assert!(write_bytes_atomic(&target, b"x", false).is_err());
        write_bytes_atomic(&target, b"x", true).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"x");
    }

    #[test]
    fn stdout_is_rejected() {
        assert!(open_for_write(Path::new("-"), true).is_err());
    }
}
