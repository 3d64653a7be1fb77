// Database/table lifecycle - create, rename, delete and list

use crate::error::{DirDbError, Result};
use crate::resolver;
use crate::storage::{self, EntryKind, TableLock};
use std::path::{Path, PathBuf};

/// Create `<root>/<name>`. The root itself is created if missing.
pub fn create_database(root: &Path, name: &str) -> Result<()> {
    let dir = resolver::database_dir(root, name)?;
    storage::create_dir_all(root)?;
    storage::create_dir(&dir)?;
    log::debug!("Created database {name} at {}", dir.display());
    Ok(())
}

/// Rename a database directory. Fails if the new name is taken.
pub fn rename_database(root: &Path, old_name: &str, new_name: &str) -> Result<()> {
    let from = existing_database(root, old_name)?;
    let to = resolver::database_dir(root, new_name)?;
    storage::rename_entry(&from, &to)?;
    log::debug!("Renamed database {old_name} to {new_name}");
    Ok(())
}

/// Remove a database and every table in it.
pub fn delete_database(root: &Path, name: &str) -> Result<()> {
    let dir = existing_database(root, name)?;
    storage::delete_dir_recursive(&dir).map_err(|e| match e {
        DirDbError::NotFound { .. } => DirDbError::DatabaseNotFound {
            database: name.to_string(),
        },
        other => other,
    })?;
    log::debug!("Deleted database {name}");
    Ok(())
}

/// Names of the databases under `root`, sorted. A missing root has none.
pub fn list_databases(root: &Path) -> Result<Vec<String>> {
    storage::list_entries(root, EntryKind::Dir)
}

/// Create an empty table file inside an existing database.
pub fn create_table(root: &Path, database: &str, table: &str) -> Result<()> {
    existing_database(root, database)?;
    let path = resolver::table_file(root, database, table)?;
    storage::create_file(&path)?;
    log::debug!("Created table {database}/{table}");
    Ok(())
}

/// Rename a table within its database.
///
/// The source table's lock is held across the rename, so no
/// read-modify-write cycle on the old name straddles it.
pub fn rename_table(root: &Path, database: &str, old_name: &str, new_name: &str) -> Result<()> {
    existing_database(root, database)?;
    let from = existing_table(root, database, old_name)?;
    let to = resolver::table_file(root, database, new_name)?;
    if storage::exists(&to)? {
        return Err(DirDbError::AlreadyExists { path: to });
    }

    let lock_path = resolver::lock_file(root, database, old_name)?;
    let lock = TableLock::acquire(&lock_path)?;
    storage::rename_entry(&from, &to).map_err(|e| match e {
        DirDbError::NotFound { .. } => table_not_found(database, old_name),
        other => other,
    })?;
    lock.discard();

    log::debug!("Renamed table {database}/{old_name} to {database}/{new_name}");
    Ok(())
}

/// Remove one table file.
pub fn delete_table(root: &Path, database: &str, table: &str) -> Result<()> {
    existing_database(root, database)?;
    let path = existing_table(root, database, table)?;

    let lock_path = resolver::lock_file(root, database, table)?;
    let lock = TableLock::acquire(&lock_path)?;
    storage::delete_file(&path).map_err(|e| match e {
        DirDbError::NotFound { .. } => table_not_found(database, table),
        other => other,
    })?;
    lock.discard();

    log::debug!("Deleted table {database}/{table}");
    Ok(())
}

/// Names of the tables in a database, sorted.
pub fn list_tables(root: &Path, database: &str) -> Result<Vec<String>> {
    let dir = existing_database(root, database)?;
    storage::list_entries(&dir, EntryKind::File)
}

fn existing_database(root: &Path, name: &str) -> Result<PathBuf> {
    let dir = resolver::database_dir(root, name)?;
    if !storage::is_dir(&dir)? {
        return Err(DirDbError::DatabaseNotFound {
            database: name.to_string(),
        });
    }
    Ok(dir)
}

fn existing_table(root: &Path, database: &str, table: &str) -> Result<PathBuf> {
    let path = resolver::table_file(root, database, table)?;
    if !storage::is_file(&path)? {
        return Err(table_not_found(database, table));
    }
    Ok(path)
}

fn table_not_found(database: &str, table: &str) -> DirDbError {
    DirDbError::TableNotFound {
        database: database.to_string(),
        table: table.to_string(),
    }
}
