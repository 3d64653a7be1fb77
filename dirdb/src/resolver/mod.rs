// Path resolver - maps (root, database, table) onto on-disk locations

use crate::error::{DirDbError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Longest name accepted for a database or table (a single path component).
pub const MAX_NAME_LEN: usize = 255;

/// Suffix of the hidden per-table lock file.
const LOCK_SUFFIX: &str = ".lock";

/// Longest table name. Its lock file `.<table>.lock` must also fit in a
/// single path component.
pub const MAX_TABLE_NAME_LEN: usize = MAX_NAME_LEN - 1 - LOCK_SUFFIX.len();

/// Characters that may never appear in a name: path separators and control
/// characters (NUL included).
fn forbidden_chars() -> &'static Regex {
    static FORBIDDEN: OnceLock<Regex> = OnceLock::new();
    FORBIDDEN.get_or_init(|| Regex::new(r"[/\\\x00-\x1f\x7f]").expect("static regex"))
}

/// Validate a database or table name.
///
/// Names are a single path component. Leading dots are reserved for the
/// engine's temp and lock files, which also rules out `.` and `..`.
pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    check_name(kind, name, MAX_NAME_LEN)
}

/// Validate a table name: as [`validate_name`], but capped at
/// [`MAX_TABLE_NAME_LEN`].
pub fn validate_table_name(name: &str) -> Result<()> {
    check_name("table", name, MAX_TABLE_NAME_LEN)
}

fn check_name(kind: &'static str, name: &str, max_len: usize) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.len() > max_len {
        Some("name is too long")
    } else if name.starts_with('.') {
        Some("names starting with '.' are reserved")
    } else if forbidden_chars().is_match(name) {
        Some("name contains a path separator or control character")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DirDbError::InvalidName {
            kind,
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// `<root>/<database>`
pub fn database_dir(root: &Path, database: &str) -> Result<PathBuf> {
    validate_name("database", database)?;
    Ok(root.join(database))
}

/// `<root>/<database>/<table>`
pub fn table_file(root: &Path, database: &str, table: &str) -> Result<PathBuf> {
    let dir = database_dir(root, database)?;
    validate_table_name(table)?;
    Ok(dir.join(table))
}

/// `<root>/<database>/.<table>.lock`
pub fn lock_file(root: &Path, database: &str, table: &str) -> Result<PathBuf> {
    let dir = database_dir(root, database)?;
    validate_table_name(table)?;
    Ok(dir.join(format!(".{table}{LOCK_SUFFIX}")))
}
