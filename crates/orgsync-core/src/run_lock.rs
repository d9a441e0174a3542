use anyhow::{Context, bail};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const RUN_LOCK_FILE: &str = ".orgsync.lock";

/// Exclusive lock on a destination root, held for the whole run.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Takes the lock or returns `None` when another run holds it.
    pub fn try_acquire(root: &Path, run_id: &str) -> anyhow::Result<Option<Self>> {
        fs::create_dir_all(root)
            .with_context(|| format!("create destination root {}", root.display()))?;
        let path = root.join(RUN_LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("open run lock {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                file.set_len(0).context("truncate run lock")?;
                writeln!(file, "{run_id}").context("write run lock")?;
                Ok(Some(Self { path, file }))
            }
            Err(err) if is_lock_held(&err) => Ok(None),
            Err(err) => Err(err).context("lock run lock exclusively"),
        }
    }

    pub fn acquire(root: &Path, run_id: &str) -> anyhow::Result<Self> {
        match Self::try_acquire(root, run_id)? {
            Some(lock) => Ok(lock),
            None => bail!(
                "another sync run already holds {}",
                root.join(RUN_LOCK_FILE).display()
            ),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn is_lock_held(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return true;
    }
    // ERROR_LOCK_VIOLATION on Windows.
    matches!(err.raw_os_error(), Some(33))
}
