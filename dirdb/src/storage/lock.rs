use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{DirDbError, Result};

/// Longest time a caller waits for another holder to finish its
/// read-modify-write cycle before giving up with `Locked`.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(2);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusive advisory lock (`flock(2)` on Unix) on a table's lock file.
///
/// Locks taken through separate `TableLock`s conflict whether they live in
/// the same process or not. The lock is released when this struct is
/// dropped, on every exit path.
#[derive(Debug)]
pub struct TableLock {
    file: File,
    path: PathBuf,
}

impl TableLock {
    /// Acquire the lock at `path`, waiting at most [`LOCK_TIMEOUT`].
    ///
    /// Creates the lock file if it does not exist. Fails with `NotFound` if
    /// the directory holding it is missing.
    pub fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_within(path, LOCK_TIMEOUT)
    }

    pub fn acquire_within(path: &Path, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            let file = open(path)?;
            lock_until(&file, path, deadline)?;
            // A holder may have discarded the file while we waited on it.
            if is_current(&file, path)? {
                log::trace!("Acquired table lock {}", path.display());
                return Ok(TableLock {
                    file,
                    path: path.to_path_buf(),
                });
            }
            log::trace!("Lock file {} was replaced, retrying", path.display());
        }
    }

    /// Try once, without waiting.
    pub fn try_acquire(path: &Path) -> Result<Self> {
        Self::acquire_within(path, Duration::ZERO)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file, then release the lock. Used once the table it
    /// guards is gone; callers still waiting on the old file retry on
    /// whatever is at the path afterwards.
    pub fn discard(self) {
        if let Err(e) = super::delete_file(&self.path) {
            log::warn!("Failed to remove lock file {}: {e}", self.path.display());
        }
    }
}

fn open(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| DirDbError::from_io(path, e))
}

fn lock_until(file: &File, path: &Path, deadline: Instant) -> Result<()> {
    let mut wait = POLL_INTERVAL;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                if Instant::now() >= deadline {
                    return Err(DirDbError::Locked {
                        path: path.to_path_buf(),
                    });
                }
                thread::sleep(wait);
                wait = (wait * 2).min(MAX_POLL_INTERVAL);
            }
            Err(e) => return Err(DirDbError::from_io(path, e)),
        }
    }
}

/// Whether the locked handle is still the file linked at `path`.
#[cfg(unix)]
fn is_current(file: &File, path: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata().map_err(|e| DirDbError::from_io(path, e))?;
    match fs::metadata(path) {
        Ok(linked) => Ok(held.dev() == linked.dev() && held.ino() == linked.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DirDbError::from_io(path, e)),
    }
}

// Windows refuses to delete a file that is open, so the handle is always current.
#[cfg(not(unix))]
fn is_current(_file: &File, _path: &Path) -> Result<bool> {
    Ok(true)
}

impl Drop for TableLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        log::trace!("Released table lock {}", self.path.display());
    }
}
