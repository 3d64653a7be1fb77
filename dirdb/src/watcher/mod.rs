use crate::error::{DirDbError, Result};
use crate::resolver;
use crate::storage;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// How long the watcher waits for a burst of filesystem events to settle.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// A change to one table of the watched database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEvent {
    pub table: String,
    pub kind: ChangeKind,
}

/// The kind of table change detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// Watches one database directory and reports table-level changes.
/// Debounced events are sent through an mpsc channel.
pub struct TableWatcher {
    _watcher: RecommendedWatcher,
    _thread: std::thread::JoinHandle<()>,
    /// Receiver for debounced table events
    pub event_rx: mpsc::Receiver<TableEvent>,
}

impl TableWatcher {
    /// Start watching `<root>/<database>`.
    ///
    /// Temp files and lock files are ignored; an atomic table rewrite shows
    /// up as a single `Modified` event for the table. A table renamed with
    /// [`rename_table`](crate::lifecycle::rename_table) reports `Deleted`
    /// for the old name and `Created` for the new one.
    pub fn start(root: &Path, database: &str) -> Result<Self> {
        let dir = resolver::database_dir(root, database)?;
        if !storage::is_dir(&dir)? {
            return Err(DirDbError::DatabaseNotFound {
                database: database.to_string(),
            });
        }

        // Backends report canonical paths on some platforms.
        let dir = dir
            .canonicalize()
            .map_err(|e| DirDbError::from_io(&dir, e))?;

        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();
        let (event_tx, event_rx) = mpsc::channel::<TableEvent>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let thread = std::thread::spawn(move || {
            let mut pending: Vec<(String, ChangeKind)> = Vec::new();
            let mut last_event = Instant::now();

            loop {
                match notify_rx.recv_timeout(DEBOUNCE) {
                    Ok(Ok(event)) => {
                        for path in &event.paths {
                            if let Some(table) = table_name(&dir, path) {
                                if let Some(kind) = classify(&event.kind, path) {
                                    pending.push((table, kind));
                                }
                            }
                        }
                        last_event = Instant::now();
                    }
                    Ok(Err(e)) => {
                        log::warn!("Table watcher error: {e}");
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if !pending.is_empty() && last_event.elapsed() >= DEBOUNCE {
                            if !flush(&mut pending, &event_tx) {
                                return;
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(TableWatcher {
            _watcher: watcher,
            _thread: thread,
            event_rx,
        })
    }
}

/// Send pending events, one per table in first-seen order. Returns `false`
/// once the receiver is gone.
fn flush(pending: &mut Vec<(String, ChangeKind)>, event_tx: &mpsc::Sender<TableEvent>) -> bool {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, ChangeKind> = HashMap::new();
    for (table, kind) in pending.drain(..) {
        match latest.get_mut(&table) {
            Some(earlier) => *earlier = coalesce(*earlier, kind),
            None => {
                order.push(table.clone());
                latest.insert(table, kind);
            }
        }
    }
    for table in order {
        let kind = latest[&table];
        if event_tx.send(TableEvent { table, kind }).is_err() {
            return false;
        }
    }
    true
}

/// Fold a later change to a table into the one already pending for it.
fn coalesce(earlier: ChangeKind, later: ChangeKind) -> ChangeKind {
    match (earlier, later) {
        // Metadata noise right after creation.
        (ChangeKind::Created, ChangeKind::Modified) => ChangeKind::Created,
        // Gone and back within one window: the table was replaced.
        (ChangeKind::Deleted, ChangeKind::Created) => ChangeKind::Modified,
        (_, later) => later,
    }
}

/// Table name for a path directly inside the database directory, skipping
/// the engine's dot-prefixed temp and lock files.
fn table_name(dir: &Path, path: &Path) -> Option<String> {
    if path.parent() != Some(dir) {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    Some(name.to_string())
}

fn classify(kind: &EventKind, path: &Path) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        // Renames report both ends; whichever end still exists was written.
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
            if path.exists() {
                Some(ChangeKind::Modified)
            } else {
                Some(ChangeKind::Deleted)
            }
        }
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        _ => None,
    }
}
