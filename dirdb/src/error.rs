use crate::codec::CodecError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirDbError {
    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("Already exists: {}", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Database not found: {database}")]
    DatabaseNotFound { database: String },

    #[error("Table not found: {database}/{table}")]
    TableNotFound { database: String, table: String },

    #[error("Record not found: {database}/{table} (id {id})")]
    RecordNotFound {
        database: String,
        table: String,
        id: String,
    },

    #[error("Corrupt table {database}/{table}: {source}")]
    CorruptTable {
        database: String,
        table: String,
        #[source]
        source: CodecError,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] serde_json::Error),

    #[error("Timed out waiting for lock on {}", .path.display())]
    Locked { path: PathBuf },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Coarse classification of a [`DirDbError`], for callers that only need to
/// branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidName,
    AlreadyExists,
    NotFound,
    RecordNotFound,
    CorruptTable,
    InvalidRecord,
    Locked,
    IoFailure,
}

impl DirDbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DirDbError::InvalidName { .. } => ErrorKind::InvalidName,
            DirDbError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            DirDbError::NotFound { .. }
            | DirDbError::DatabaseNotFound { .. }
            | DirDbError::TableNotFound { .. } => ErrorKind::NotFound,
            DirDbError::RecordNotFound { .. } => ErrorKind::RecordNotFound,
            DirDbError::CorruptTable { .. } => ErrorKind::CorruptTable,
            DirDbError::Locked { .. } => ErrorKind::Locked,
            DirDbError::InvalidRecord(_) => ErrorKind::InvalidRecord,
            DirDbError::Io { .. } | DirDbError::Watch(_) => ErrorKind::IoFailure,
        }
    }

    /// Wrap an `std::io::Error` raised while touching `path`, keeping the
    /// existence-related kinds distinct from genuine OS failures.
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => DirDbError::NotFound { path },
            std::io::ErrorKind::AlreadyExists => DirDbError::AlreadyExists { path },
            _ => DirDbError::Io { path, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, DirDbError>;
