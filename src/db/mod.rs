//! Storage layer for the roadlog logbook.
//!
//! Defines the backend-neutral adapter contract and the two engine bindings
//! that satisfy it, plus schema versioning and upgrade-script handling.

pub mod adapter;
pub mod client;
pub mod native;
pub mod schema;
pub mod scripts;
pub mod value;

pub use adapter::{StorageAdapter, ID_COLUMN, NOT_EQUAL_SUFFIX};
pub use client::ClientAdapter;
pub use native::NativeAdapter;
pub use schema::{read_schema_version, SchemaManager};
pub use scripts::{DirScriptProvider, MemoryScripts, ScriptProvider};
pub use value::SqlValue;

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Which engine binding an adapter runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Embedded SQLite library, linked into the process.
    Native,
    /// Generic SQL-client driver.
    Client,
}

impl Backend {
    /// Stable name for display and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Native => "native",
            Backend::Client => "client",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of one logbook database file: where it lives and which backend
/// opens it.
#[derive(Debug, Clone)]
pub struct DbFile {
    path: PathBuf,
    backend: Backend,
}

impl DbFile {
    /// Describe a database file without opening it.
    pub fn new<P: AsRef<Path>>(path: P, backend: Backend) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            backend,
        }
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The backend used to open this file.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Whether the database file exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Open a boxed adapter over this file.
    pub fn open(&self) -> Result<Box<dyn StorageAdapter>> {
        Ok(match self.backend {
            Backend::Native => Box::new(NativeAdapter::open(&self.path)?),
            Backend::Client => Box::new(ClientAdapter::open(&self.path)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn each_backend(check: impl Fn(&mut dyn StorageAdapter)) {
        for backend in [Backend::Native, Backend::Client] {
            let dir = tempfile::tempdir().unwrap();
            let db = DbFile::new(dir.path().join("logbook.db"), backend);
            let mut adapter = db.open().unwrap();
            adapter
                .exec_structural_update(
                    "CREATE TABLE trips (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        vehicle_id INTEGER NOT NULL,
                        note TEXT,
                        distance INTEGER
                    )",
                )
                .unwrap();
            check(adapter.as_mut());
        }
    }

    #[test]
    fn test_backends_agree_on_round_trip_and_null() {
        each_backend(|adapter| {
            let id = adapter
                .insert(
                    "trips",
                    &["vehicle_id", "note", "distance"],
                    &[SqlValue::Integer(1), SqlValue::Null, SqlValue::Integer(12)],
                    false,
                )
                .unwrap();
            let row = adapter
                .get_row("trips", id, &["vehicle_id", "note", "distance"])
                .unwrap()
                .unwrap();
            assert_eq!(
                row,
                vec![SqlValue::Integer(1), SqlValue::Null, SqlValue::Integer(12)]
            );
            assert!(adapter.get_row("trips", id + 1, &["note"]).unwrap().is_none());
        });
    }

    #[test]
    fn test_backends_agree_on_aggregate_quirk() {
        each_backend(|adapter| {
            assert_eq!(
                adapter.get_scalar("trips", "max(distance)", None, &[]).unwrap(),
                Some(SqlValue::Null)
            );
        });
    }

    #[test]
    fn test_backends_agree_on_key_suffix_convention() {
        each_backend(|adapter| {
            adapter
                .insert(
                    "trips",
                    &["vehicle_id", "note"],
                    &[SqlValue::Integer(1), SqlValue::from("fuel stop")],
                    false,
                )
                .unwrap();
            adapter
                .insert(
                    "trips",
                    &["vehicle_id", "note"],
                    &[SqlValue::Integer(2), SqlValue::Null],
                    false,
                )
                .unwrap();

            // "note<>" with NULL selects IS NOT NULL.
            let rows = adapter
                .get_row_by_key("trips", "note<>", &SqlValue::Null, &["vehicle_id"])
                .unwrap()
                .unwrap();
            assert_eq!(rows[0], SqlValue::Integer(1));

            assert_eq!(
                adapter
                    .count("trips", Some(("vehicle_id<>", &SqlValue::Integer(1))))
                    .unwrap(),
                1
            );
        });
    }

    #[test]
    fn test_backends_agree_on_update_and_delete() {
        each_backend(|adapter| {
            let id = adapter
                .insert(
                    "trips",
                    &["vehicle_id", "note"],
                    &[SqlValue::Integer(1), SqlValue::from("old")],
                    false,
                )
                .unwrap();

            let changed = adapter
                .update_rows_by_key(
                    "trips",
                    "note",
                    &SqlValue::from("old"),
                    &["note"],
                    &[SqlValue::from("new")],
                )
                .unwrap();
            assert_eq!(changed, 1);
            assert_eq!(
                adapter.get_text_field("trips", id, "note").unwrap().as_deref(),
                Some("new")
            );

            assert_eq!(adapter.delete_row("trips", id).unwrap(), 1);
            assert_eq!(adapter.count("trips", None).unwrap(), 0);

            let err = adapter.delete_rows("trips", "", None).unwrap_err();
            assert!(matches!(err, Error::Argument(_)));
        });
    }

    #[test]
    fn test_has_same_owner_by_file_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logbook.db");
        let mut first = DbFile::new(&path, Backend::Native).open().unwrap();
        let second = DbFile::new(&path, Backend::Client).open().unwrap();
        let other = DbFile::new(dir.path().join("other.db"), Backend::Native)
            .open()
            .unwrap();

        assert!(first.has_same_owner(second.as_ref()));
        assert!(!first.has_same_owner(other.as_ref()));

        first.close().unwrap();
    }
}
