use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use tracing::debug;

use crate::util::ensure_directory;

/// Advisory single-instance guard for one pipeline stage. The lock is held
/// for as long as the value lives and released when the file handle closes.
#[derive(Debug)]
pub struct StageLock {
    path: PathBuf,
    file: File,
}

impl StageLock {
    pub fn acquire(lock_dir: &Path, stage: &str) -> Result<Self> {
        ensure_directory(lock_dir)?;
        let path = lock_dir.join(format!("{stage}.lock"));

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;

        if let Err(err) = file.try_lock_exclusive() {
            bail!(
                "stage {stage} is already running (lock {} held): {err}",
                path.display()
            );
        }

        debug!(stage, path = %path.display(), "acquired stage lock");
        Ok(Self { path, file })
    }
}

impl Drop for StageLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "released stage lock");
    }
}
