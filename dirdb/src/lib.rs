//! DirDB - a minimal embedded document store.
//!
//! Databases are directories under a caller-supplied root, tables are files
//! holding a pretty-printed JSON array of records, and records are JSON
//! objects identified by an `id` field.
//!
//! ```no_run
//! use dirdb::Store;
//! use serde_json::json;
//!
//! # fn main() -> dirdb::Result<()> {
//! let store = Store::new("data");
//! store.create_database("shop")?;
//! store.create_table("shop", "orders")?;
//! store.insert_dynamic("shop", "orders", json!({ "id": 1, "item": "pen" }))?;
//! let orders = store.table("shop", "orders")?.find_all()?;
//! assert_eq!(orders.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod lifecycle;
pub mod record;
pub mod repository;
pub mod resolver;
pub mod storage;
pub mod store;
pub mod watcher;

pub use error::{DirDbError, ErrorKind, Result};
pub use record::Record;
pub use repository::{Table, UpdateOutcome};
pub use store::Store;
pub use watcher::{ChangeKind, TableEvent, TableWatcher};
