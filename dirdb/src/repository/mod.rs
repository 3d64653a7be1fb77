// Record repository - CRUD over one table's records

use crate::codec;
use crate::error::{DirDbError, Result};
use crate::record::{self, Record};
use crate::resolver;
use crate::storage::{self, TableLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Result of [`Table::update_by_id`]. A missing id is an ordinary outcome,
/// not an error; a missing table or database still is.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum UpdateOutcome {
    /// The first matching record, as stored after the merge.
    Updated(Record),
    /// No record carried the id; the table was left untouched.
    NotFound,
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }
}

/// What a mutation decided to do with the loaded records.
enum Change<R> {
    Write(R),
    Keep(R),
}

/// A handle to one table, resolved against an explicit root.
///
/// Every mutation is a full read-decode-mutate-encode-write cycle run under
/// the table's advisory lock. Reads take no lock: writes replace the file by
/// rename, so a reader always sees one complete version.
#[derive(Debug, Clone)]
pub struct Table {
    database: String,
    name: String,
    database_dir: PathBuf,
    path: PathBuf,
    lock_path: PathBuf,
}

impl Table {
    /// Resolve `<root>/<database>/<table>`. Validates names only; existence
    /// is checked by each operation.
    pub fn resolve(root: &Path, database: &str, table: &str) -> Result<Self> {
        Ok(Table {
            database: database.to_string(),
            name: table.to_string(),
            database_dir: resolver::database_dir(root, database)?,
            path: resolver::table_file(root, database, table)?,
            lock_path: resolver::lock_file(root, database, table)?,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// On-disk location of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, in insertion order.
    pub fn find_all(&self) -> Result<Vec<Record>> {
        self.load()
    }

    /// All records, deserialized into `T`.
    pub fn find_all_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.load()?
            .into_iter()
            .map(|record| serde_json::from_value(Value::Object(record)).map_err(DirDbError::from))
            .collect()
    }

    /// The first record whose `id` equals `id`.
    pub fn find_by_id(&self, id: &Value) -> Result<Option<Record>> {
        let mut records = self.load()?;
        Ok(record::position_of(&records, id).map(|index| records.swap_remove(index)))
    }

    /// Append `record`. Ids are not checked for uniqueness.
    pub fn insert(&self, record: Record) -> Result<()> {
        self.insert_many(vec![record])
    }

    /// Append several records in one locked cycle.
    pub fn insert_many(&self, new_records: Vec<Record>) -> Result<()> {
        let count = new_records.len();
        self.modify(|records| {
            records.extend(new_records);
            Ok(Change::Write(()))
        })?;
        log::debug!(
            "Inserted {count} record(s) into {}/{}",
            self.database,
            self.name
        );
        Ok(())
    }

    /// Serialize `value` and append it. It must serialize to a JSON object.
    pub fn insert_as<T: Serialize>(&self, value: &T) -> Result<()> {
        match serde_json::to_value(value)? {
            Value::Object(record) => self.insert(record),
            _ => Err(DirDbError::InvalidRecord(serde::ser::Error::custom(
                "record must serialize to a JSON object",
            ))),
        }
    }

    /// Merge `patch` over the first record with a matching `id`: patch
    /// fields win, every other field is kept.
    pub fn update_by_id(&self, id: &Value, patch: Record) -> Result<UpdateOutcome> {
        let outcome = self.modify(|records| match record::position_of(records, id) {
            Some(index) => {
                record::merge(&mut records[index], patch);
                Ok(Change::Write(UpdateOutcome::Updated(records[index].clone())))
            }
            None => Ok(Change::Keep(UpdateOutcome::NotFound)),
        })?;

        match &outcome {
            UpdateOutcome::Updated(_) => log::debug!(
                "Updated record {} in {}/{}",
                record::display_id(id),
                self.database,
                self.name
            ),
            UpdateOutcome::NotFound => log::debug!(
                "No record {} to update in {}/{}",
                record::display_id(id),
                self.database,
                self.name
            ),
        }
        Ok(outcome)
    }

    /// Remove the first record with a matching `id` and return it.
    pub fn delete_by_id(&self, id: &Value) -> Result<Record> {
        let removed = self.modify(|records| match record::position_of(records, id) {
            Some(index) => Ok(Change::Write(records.remove(index))),
            None => Err(DirDbError::RecordNotFound {
                database: self.database.clone(),
                table: self.name.clone(),
                id: record::display_id(id),
            }),
        })?;
        log::debug!(
            "Deleted record {} from {}/{}",
            record::display_id(id),
            self.database,
            self.name
        );
        Ok(removed)
    }

    /// Run `mutate` over the current records while holding the table lock,
    /// persisting the result when it asks for a write.
    fn modify<R>(&self, mutate: impl FnOnce(&mut Vec<Record>) -> Result<Change<R>>) -> Result<R> {
        // Checked before locking so a missing table leaves no lock file behind.
        if !storage::is_file(&self.path)? {
            return Err(self.missing());
        }

        let lock = TableLock::acquire(&self.lock_path).map_err(|e| self.in_context(e))?;
        let mut records = match self.load() {
            Ok(records) => records,
            // Deleted while we waited; the lock file we opened is an orphan.
            Err(e @ DirDbError::TableNotFound { .. }) => {
                lock.discard();
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        match mutate(&mut records)? {
            Change::Write(out) => {
                self.persist(&records)?;
                Ok(out)
            }
            Change::Keep(out) => Ok(out),
        }
    }

    fn load(&self) -> Result<Vec<Record>> {
        let bytes = storage::read_file(&self.path).map_err(|e| self.in_context(e))?;
        codec::decode(&bytes).map_err(|source| DirDbError::CorruptTable {
            database: self.database.clone(),
            table: self.name.clone(),
            source,
        })
    }

    fn persist(&self, records: &[Record]) -> Result<()> {
        let bytes = codec::encode(records)?;
        storage::write_file(&self.path, &bytes).map_err(|e| self.in_context(e))
    }

    /// Turn a storage-level `NotFound` into the database/table it means.
    fn in_context(&self, err: DirDbError) -> DirDbError {
        match err {
            DirDbError::NotFound { .. } => self.missing(),
            other => other,
        }
    }

    fn missing(&self) -> DirDbError {
        match storage::is_dir(&self.database_dir) {
            Ok(true) => DirDbError::TableNotFound {
                database: self.database.clone(),
                table: self.name.clone(),
            },
            Ok(false) => DirDbError::DatabaseNotFound {
                database: self.database.clone(),
            },
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::lifecycle;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn rec(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn setup_table() -> (TempDir, Table) {
        let tmp = TempDir::new().unwrap();
        lifecycle::create_database(tmp.path(), "shop").unwrap();
        lifecycle::create_table(tmp.path(), "shop", "orders").unwrap();
        let table = Table::resolve(tmp.path(), "shop", "orders").unwrap();
        (tmp, table)
    }

    #[test]
    fn test_new_table_is_empty() {
        let (_tmp, table) = setup_table();
        assert_eq!(table.find_all().unwrap(), Vec::<Record>::new());
    }

    #[test]
    fn test_insert_then_find_appends_last() {
        let (_tmp, table) = setup_table();
        table.insert(rec(json!({ "id": 1, "item": "pen" }))).unwrap();
        let cup = rec(json!({ "id": 2, "item": "cup" }));
        table.insert(cup.clone()).unwrap();

        let all = table.find_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.last(), Some(&cup));
    }

    #[test]
    fn test_find_all_is_idempotent() {
        let (_tmp, table) = setup_table();
        table.insert(rec(json!({ "id": 1 }))).unwrap();
        assert_eq!(table.find_all().unwrap(), table.find_all().unwrap());
    }

    #[test]
    fn test_insert_allows_duplicate_ids() {
        let (_tmp, table) = setup_table();
        table.insert(rec(json!({ "id": 1, "n": "a" }))).unwrap();
        table.insert(rec(json!({ "id": 1, "n": "b" }))).unwrap();
        assert_eq!(table.find_all().unwrap().len(), 2);
        assert_eq!(
            table.find_by_id(&json!(1)).unwrap(),
            Some(rec(json!({ "id": 1, "n": "a" })))
        );
    }

    #[test]
    fn test_insert_many_keeps_order() {
        let (_tmp, table) = setup_table();
        table
            .insert_many(vec![rec(json!({ "id": "a" })), rec(json!({ "id": "b" }))])
            .unwrap();
        table.insert(rec(json!({ "id": "c" }))).unwrap();
        let ids: Vec<Value> = table
            .find_all()
            .unwrap()
            .iter()
            .map(|r| r["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_update_merges_fields() {
        let (_tmp, table) = setup_table();
        table.insert(rec(json!({ "id": 7, "a": 0, "b": 2 }))).unwrap();
        table.insert(rec(json!({ "id": 8, "a": 0 }))).unwrap();

        let outcome = table.update_by_id(&json!(7), rec(json!({ "a": 1 }))).unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated(rec(json!({ "id": 7, "a": 1, "b": 2 }))));

        assert_eq!(
            table.find_all().unwrap(),
            vec![
                rec(json!({ "id": 7, "a": 1, "b": 2 })),
                rec(json!({ "id": 8, "a": 0 })),
            ]
        );
    }

    #[test]
    fn test_update_missing_id_is_not_an_error() {
        let (_tmp, table) = setup_table();
        table.insert(rec(json!({ "id": 1 }))).unwrap();
        let before = std::fs::read(table.path()).unwrap();

        let outcome = table.update_by_id(&json!(99), rec(json!({ "a": 1 }))).unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);
        assert!(!outcome.is_updated());
        assert_eq!(std::fs::read(table.path()).unwrap(), before);
    }

    #[test]
    fn test_update_only_touches_first_duplicate() {
        let (_tmp, table) = setup_table();
        table.insert(rec(json!({ "id": 1, "n": 0 }))).unwrap();
        table.insert(rec(json!({ "id": 1, "n": 0 }))).unwrap();
        table.update_by_id(&json!(1), rec(json!({ "n": 5 }))).unwrap();

        let all = table.find_all().unwrap();
        assert_eq!(all[0]["n"], json!(5));
        assert_eq!(all[1]["n"], json!(0));
    }

    #[test]
    fn test_delete_removes_only_first_match() {
        let (_tmp, table) = setup_table();
        table.insert(rec(json!({ "id": 1, "copy": "first" }))).unwrap();
        table.insert(rec(json!({ "id": 2 }))).unwrap();
        table.insert(rec(json!({ "id": 1, "copy": "second" }))).unwrap();

        let removed = table.delete_by_id(&json!(1)).unwrap();
        assert_eq!(removed, rec(json!({ "id": 1, "copy": "first" })));
        assert_eq!(
            table.find_all().unwrap(),
            vec![rec(json!({ "id": 2 })), rec(json!({ "id": 1, "copy": "second" }))]
        );
    }

    #[test]
    fn test_delete_missing_id_fails() {
        let (_tmp, table) = setup_table();
        table.insert(rec(json!({ "id": 1 }))).unwrap();
        let err = table.delete_by_id(&json!("nope")).unwrap_err();
        assert!(matches!(err, DirDbError::RecordNotFound { ref id, .. } if id == "nope"));
        assert_eq!(err.kind(), ErrorKind::RecordNotFound);
        assert_eq!(table.find_all().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_table_is_distinct_from_empty() {
        let (tmp, _table) = setup_table();
        let missing = Table::resolve(tmp.path(), "shop", "ghost").unwrap();
        assert!(matches!(
            missing.find_all().unwrap_err(),
            DirDbError::TableNotFound { .. }
        ));
        assert!(matches!(
            missing.insert(rec(json!({ "id": 1 }))).unwrap_err(),
            DirDbError::TableNotFound { .. }
        ));
        assert!(matches!(
            missing.update_by_id(&json!(1), Record::new()).unwrap_err(),
            DirDbError::TableNotFound { .. }
        ));
        // No lock file is left behind for a table that does not exist.
        assert!(!tmp.path().join("shop/.ghost.lock").exists());
    }

    #[test]
    fn test_table_deleted_while_waiting_leaves_no_lock_file() {
        let (tmp, table) = setup_table();
        let lock_path = tmp.path().join("shop/.orders.lock");
        let held = TableLock::acquire(&lock_path).unwrap();

        let writer = {
            let table = table.clone();
            thread::spawn(move || table.insert(rec(json!({ "id": 1 }))))
        };
        // The writer has seen the table and is now queued on the lock.
        thread::sleep(Duration::from_millis(100));
        std::fs::remove_file(table.path()).unwrap();
        drop(held);

        assert!(matches!(
            writer.join().unwrap().unwrap_err(),
            DirDbError::TableNotFound { .. }
        ));
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_longest_table_name_is_writable() {
        let tmp = TempDir::new().unwrap();
        let name = "t".repeat(resolver::MAX_TABLE_NAME_LEN);
        lifecycle::create_database(tmp.path(), "shop").unwrap();
        lifecycle::create_table(tmp.path(), "shop", &name).unwrap();

        let table = Table::resolve(tmp.path(), "shop", &name).unwrap();
        table.insert(rec(json!({ "id": 1 }))).unwrap();
        table.update_by_id(&json!(1), rec(json!({ "n": 2 }))).unwrap();
        assert_eq!(table.find_all().unwrap(), vec![rec(json!({ "id": 1, "n": 2 }))]);
        lifecycle::delete_table(tmp.path(), "shop", &name).unwrap();

        let err = lifecycle::create_table(tmp.path(), "shop", &format!("{name}t")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);
    }

    #[test]
    fn test_missing_database() {
        let tmp = TempDir::new().unwrap();
        let table = Table::resolve(tmp.path(), "nowhere", "orders").unwrap();
        assert!(matches!(
            table.find_all().unwrap_err(),
            DirDbError::DatabaseNotFound { .. }
        ));
        assert!(matches!(
            table.delete_by_id(&json!(1)).unwrap_err(),
            DirDbError::DatabaseNotFound { .. }
        ));
    }

    #[test]
    fn test_corrupt_table() {
        let (_tmp, table) = setup_table();
        std::fs::write(table.path(), "not json").unwrap();

        let err = table.find_all().unwrap_err();
        assert!(matches!(err, DirDbError::CorruptTable { .. }));
        assert_eq!(err.kind(), ErrorKind::CorruptTable);

        // Mutations refuse to overwrite what they cannot read.
        assert!(table.insert(rec(json!({ "id": 1 }))).is_err());
        assert_eq!(std::fs::read_to_string(table.path()).unwrap(), "not json");
    }

    #[test]
    fn test_top_level_object_is_corrupt() {
        let (_tmp, table) = setup_table();
        std::fs::write(table.path(), r#"{"id": 1}"#).unwrap();
        assert!(matches!(
            table.find_all().unwrap_err(),
            DirDbError::CorruptTable { .. }
        ));
    }

    #[test]
    fn test_whitespace_table_reads_as_empty() {
        let (_tmp, table) = setup_table();
        std::fs::write(table.path(), "\n   \n").unwrap();
        assert!(table.find_all().unwrap().is_empty());
        table.insert(rec(json!({ "id": 1 }))).unwrap();
        assert_eq!(table.find_all().unwrap().len(), 1);
    }

    #[test]
    fn test_file_is_pretty_json_array() {
        let (_tmp, table) = setup_table();
        table.insert(rec(json!({ "id": 1, "item": "pen" }))).unwrap();
        let text = std::fs::read_to_string(table.path()).unwrap();
        assert!(text.starts_with("[\n  {"));
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!([{ "id": 1, "item": "pen" }]));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u32,
        item: String,
    }

    #[test]
    fn test_typed_round_trip() {
        let (_tmp, table) = setup_table();
        table
            .insert_as(&Order {
                id: 1,
                item: "pen".into(),
            })
            .unwrap();
        let orders: Vec<Order> = table.find_all_as().unwrap();
        assert_eq!(
            orders,
            vec![Order {
                id: 1,
                item: "pen".into()
            }]
        );
    }

    #[test]
    fn test_insert_as_rejects_non_objects() {
        let (_tmp, table) = setup_table();
        let err = table.insert_as(&vec![1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRecord);
        assert!(table.find_all().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_inserts_lose_nothing() {
        let (_tmp, table) = setup_table();
        let table = Arc::new(table);

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for n in 0..10 {
                        table
                            .insert(rec(json!({ "id": format!("{worker}-{n}") })))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.find_all().unwrap().len(), 80);
    }
}
