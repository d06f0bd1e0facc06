//! Per-run scratch directory for the local clone.
//!
//! Every command works in a fresh working copy and removes it on the way out,
//! success or failure. Removal happens in `Drop` so an early `?` return can't
//! leave a clone (and its embedded credentials) behind.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Owns the working-copy directory and deletes it when dropped.
#[derive(Debug)]
pub struct WorkingCopy {
    path: Option<PathBuf>,
}

impl WorkingCopy {
    /// Claim `path` for this run, clearing anything a previous run left.
    ///
    /// The directory itself is not created; cloning does that.
    pub fn prepare(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if path.exists() {
            warn!(path = %path.display(), "removing stale working copy");
            std::fs::remove_dir_all(&path)?;
        }
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Remove now and report errors, instead of best-effort on drop.
    pub fn remove(mut self) -> io::Result<()> {
        match self.path.take() {
            Some(path) => remove_if_exists(&path),
            None => Ok(()),
        }
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if let Some(path) = self.path.take()
            && let Err(e) = remove_if_exists(&path)
        {
            warn!(path = %path.display(), "failed to remove working copy: {}", e);
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed working copy");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".blocks");
        {
            let wc = WorkingCopy::prepare(&path).unwrap();
            std::fs::create_dir_all(wc.path().join("nested")).unwrap();
            std::fs::write(wc.path().join("blocks.json"), "[]").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_prepare_clears_stale_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".blocks");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("leftover"), "x").unwrap();

        let wc = WorkingCopy::prepare(&path).unwrap();
        assert!(!path.exists());
        wc.remove().unwrap();
    }

    #[test]
    fn test_remove_tolerates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let wc = WorkingCopy::prepare(dir.path().join("never-created")).unwrap();
        assert!(wc.remove().is_ok());
    }
}
