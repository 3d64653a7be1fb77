// Storage primitives - durable create/read/write/rename/delete on the raw filesystem

pub mod lock;

pub use lock::TableLock;

use crate::error::{DirDbError, Result};
use glob::MatchOptions;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Which kind of directory entry [`list_entries`] should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Create a single directory. Fails with `AlreadyExists` if anything is
/// already at `path`, and with `NotFound` if its parent is missing.
pub fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir(path).map_err(|e| DirDbError::from_io(path, e))?;
    sync_parent(path)
}

/// Create `path` and any missing ancestors. Existing directories are fine.
pub fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| DirDbError::from_io(path, e))
}

/// Create a new empty file. Fails with `AlreadyExists` if the file exists,
/// without a window in which a concurrent creator could be clobbered.
pub fn create_file(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| DirDbError::from_io(path, e))?;
    file.sync_all().map_err(|e| DirDbError::from_io(path, e))?;
    sync_parent(path)
}

/// Whether anything exists at `path`. Permission errors are reported rather
/// than being read as "absent".
pub fn exists(path: &Path) -> Result<bool> {
    path.try_exists().map_err(|e| DirDbError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Whether `path` exists and is a directory.
pub fn is_dir(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DirDbError::from_io(path, e)),
    }
}

/// Whether `path` exists and is a regular file.
pub fn is_file(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DirDbError::from_io(path, e)),
    }
}

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| DirDbError::from_io(path, e))
}

/// Replace the contents of `path` atomically.
///
/// The bytes go to a temp file in the same directory, which is fsynced and
/// then renamed over `path`; the directory is fsynced afterwards. A reader
/// sees either the old or the new contents, never a mix.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| DirDbError::from_io(path, e))?;
    tmp.write_all(bytes)
        .map_err(|e| DirDbError::from_io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| DirDbError::from_io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| DirDbError::from_io(path, e.error))?;
    sync_dir(parent)
}

/// Rename `from` to `to`. Refuses to replace an existing destination.
///
/// Files are moved with `link(2)` then `unlink(2)`, so a destination that
/// appears concurrently makes the call fail instead of being overwritten.
pub fn rename_entry(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(from).map_err(|e| DirDbError::from_io(from, e))?;
    if meta.is_dir() {
        if exists(to)? {
            return Err(DirDbError::AlreadyExists {
                path: to.to_path_buf(),
            });
        }
        fs::rename(from, to).map_err(|e| DirDbError::from_io(from, e))?;
    } else {
        fs::hard_link(from, to).map_err(|e| DirDbError::from_io(to, e))?;
        fs::remove_file(from).map_err(|e| DirDbError::from_io(from, e))?;
    }
    sync_parent(to)?;
    if parent_dir(from) != parent_dir(to) {
        sync_parent(from)?;
    }
    Ok(())
}

pub fn delete_file(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| DirDbError::from_io(path, e))?;
    sync_parent(path)
}

pub fn delete_dir_recursive(path: &Path) -> Result<()> {
    fs::remove_dir_all(path).map_err(|e| DirDbError::from_io(path, e))?;
    sync_parent(path)
}

/// List the names of visible entries of `kind` directly inside `dir`.
///
/// Dot-prefixed entries (temp files, lock files) are never reported. A
/// missing directory yields an empty list. Names come back sorted.
pub fn list_entries(dir: &Path, kind: EntryKind) -> Result<Vec<String>> {
    let pattern = format!(
        "{}/*",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };
    let paths = glob::glob_with(&pattern, options).map_err(|e| DirDbError::Io {
        path: dir.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
    })?;

    let mut names = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            DirDbError::from_io(path, e.into_error())
        })?;
        let matches_kind = match kind {
            EntryKind::File => path.is_file(),
            EntryKind::Dir => path.is_dir(),
        };
        if !matches_kind {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn sync_parent(path: &Path) -> Result<()> {
    sync_dir(parent_dir(path))
}

/// Flush directory metadata (new, renamed or removed entries) to disk.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    let handle = fs::File::open(dir).map_err(|e| DirDbError::from_io(dir, e))?;
    handle.sync_all().map_err(|e| DirDbError::from_io(dir, e))
}

// Directories cannot be opened as files on Windows; NTFS journals the rename.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
