use crate::error::{DirDbError, Result};
use crate::lifecycle;
use crate::record::Record;
use crate::repository::{Table, UpdateOutcome};
use crate::watcher::TableWatcher;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// The main entry point for DirDB.
///
/// A `Store` only remembers the root directory it was given; it holds no
/// other state, so any number of stores (or the free functions in
/// [`lifecycle`] and [`Table`]) may address the same root at once.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Bind a store to `root`. Nothing is touched on disk until the first
    /// operation; `create_database` creates the root if needed.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Store { root: root.into() }
    }

    /// Get the root data directory path
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Databases ──────────────────────────────────────────────────

    pub fn create_database(&self, name: &str) -> Result<()> {
        lifecycle::create_database(&self.root, name)
    }

    pub fn rename_database(&self, old_name: &str, new_name: &str) -> Result<()> {
        lifecycle::rename_database(&self.root, old_name, new_name)
    }

    pub fn delete_database(&self, name: &str) -> Result<()> {
        lifecycle::delete_database(&self.root, name)
    }

    pub fn list_databases(&self) -> Result<Vec<String>> {
        lifecycle::list_databases(&self.root)
    }

    // ── Tables ─────────────────────────────────────────────────────

    pub fn create_table(&self, database: &str, table: &str) -> Result<()> {
        lifecycle::create_table(&self.root, database, table)
    }

    pub fn rename_table(&self, database: &str, old_name: &str, new_name: &str) -> Result<()> {
        lifecycle::rename_table(&self.root, database, old_name, new_name)
    }

    pub fn delete_table(&self, database: &str, table: &str) -> Result<()> {
        lifecycle::delete_table(&self.root, database, table)
    }

    pub fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        lifecycle::list_tables(&self.root, database)
    }

    /// Get a handle for record operations on one table.
    pub fn table(&self, database: &str, table: &str) -> Result<Table> {
        Table::resolve(&self.root, database, table)
    }

    /// Watch a database directory for table changes.
    pub fn watch(&self, database: &str) -> Result<TableWatcher> {
        TableWatcher::start(&self.root, database)
    }

    // ── Dynamic (untyped) API for the CLI ──────────────────────────

    /// Insert a record given as a JSON value. It must be an object.
    pub fn insert_dynamic(&self, database: &str, table: &str, record: Value) -> Result<()> {
        self.table(database, table)?.insert(into_record(record)?)
    }

    /// All records of a table as a JSON array.
    pub fn find_dynamic(&self, database: &str, table: &str) -> Result<Value> {
        let records = self.table(database, table)?.find_all()?;
        Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
    }

    /// The first record with `id`, or `null` when there is none.
    pub fn get_dynamic(&self, database: &str, table: &str, id: &Value) -> Result<Value> {
        Ok(self
            .table(database, table)?
            .find_by_id(id)?
            .map(Value::Object)
            .unwrap_or(Value::Null))
    }

    /// Merge `patch` (a JSON object) into the first record with `id`.
    pub fn update_dynamic(
        &self,
        database: &str,
        table: &str,
        id: &Value,
        patch: Value,
    ) -> Result<UpdateOutcome> {
        self.table(database, table)?
            .update_by_id(id, into_record(patch)?)
    }

    /// Delete the first record with `id`, returning it.
    pub fn delete_dynamic(&self, database: &str, table: &str, id: &Value) -> Result<Value> {
        let removed = self.table(database, table)?.delete_by_id(id)?;
        Ok(Value::Object(removed))
    }
}

fn into_record(value: Value) -> Result<Record> {
    match value {
        Value::Object(record) => Ok(record),
        _ => Err(DirDbError::InvalidRecord(serde::de::Error::custom(
            "record must be a JSON object",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup_test_store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(tmp.path().join("data"));
        (tmp, store)
    }

    #[test]
    fn test_shop_scenario() {
        let (_tmp, store) = setup_test_store();
        store.create_database("shop").unwrap();
        store.create_table("shop", "orders").unwrap();

        store
            .insert_dynamic("shop", "orders", json!({ "id": 1, "item": "pen" }))
            .unwrap();
        store
            .insert_dynamic("shop", "orders", json!({ "id": 2, "item": "cup" }))
            .unwrap();

        let outcome = store
            .update_dynamic("shop", "orders", &json!(1), json!({ "item": "pencil" }))
            .unwrap();
        assert!(outcome.is_updated());
        assert_eq!(
            store.find_dynamic("shop", "orders").unwrap(),
            json!([{ "id": 1, "item": "pencil" }, { "id": 2, "item": "cup" }])
        );

        let removed = store.delete_dynamic("shop", "orders", &json!(2)).unwrap();
        assert_eq!(removed, json!({ "id": 2, "item": "cup" }));
        assert_eq!(
            store.find_dynamic("shop", "orders").unwrap(),
            json!([{ "id": 1, "item": "pencil" }])
        );
    }

    #[test]
    fn test_corrupt_content_is_reported() {
        let (_tmp, store) = setup_test_store();
        store.create_database("shop").unwrap();
        store.create_table("shop", "orders").unwrap();
        std::fs::write(store.root().join("shop/orders"), "not json").unwrap();

        let err = store.find_dynamic("shop", "orders").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptTable);
        assert!(err.to_string().contains("shop/orders"));
    }

    #[test]
    fn test_get_dynamic() {
        let (_tmp, store) = setup_test_store();
        store.create_database("shop").unwrap();
        store.create_table("shop", "orders").unwrap();
        store
            .insert_dynamic("shop", "orders", json!({ "id": "a", "n": 1 }))
            .unwrap();

        assert_eq!(
            store.get_dynamic("shop", "orders", &json!("a")).unwrap(),
            json!({ "id": "a", "n": 1 })
        );
        assert_eq!(
            store.get_dynamic("shop", "orders", &json!("b")).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_dynamic_rejects_non_objects() {
        let (_tmp, store) = setup_test_store();
        store.create_database("shop").unwrap();
        store.create_table("shop", "orders").unwrap();

        let err = store
            .insert_dynamic("shop", "orders", json!([1, 2]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRecord);
        let err = store
            .update_dynamic("shop", "orders", &json!(1), json!("x"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRecord);
    }

    #[test]
    fn test_lifecycle_through_store() {
        let (_tmp, store) = setup_test_store();
        store.create_database("shop").unwrap();
        store.create_database("crm").unwrap();
        store.create_table("shop", "orders").unwrap();
        store.rename_table("shop", "orders", "sales").unwrap();
        assert_eq!(store.list_tables("shop").unwrap(), vec!["sales".to_string()]);

        store.rename_database("crm", "contacts").unwrap();
        assert_eq!(
            store.list_databases().unwrap(),
            vec!["contacts".to_string(), "shop".to_string()]
        );

        store.delete_table("shop", "sales").unwrap();
        store.delete_database("shop").unwrap();
        assert_eq!(store.list_databases().unwrap(), vec!["contacts".to_string()]);
    }

    #[test]
    fn test_stores_on_different_roots_are_independent() {
        let tmp = TempDir::new().unwrap();
        let a = Store::new(tmp.path().join("a"));
        let b = Store::new(tmp.path().join("b"));
        a.create_database("shop").unwrap();
        b.create_database("shop").unwrap();
        a.create_table("shop", "orders").unwrap();

        assert!(b.list_tables("shop").unwrap().is_empty());
        assert!(matches!(
            b.find_dynamic("shop", "orders").unwrap_err(),
            DirDbError::TableNotFound { .. }
        ));
    }
}
