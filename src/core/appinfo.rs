//! AppInfo key-value bookkeeping.
//!
//! A reserved table of small named string values stored inside the database
//! itself. Schema versioning mirrors its marker here and the backup protocol
//! keeps its two-generation history here.

use crate::db::{SqlValue, StorageAdapter};
use crate::error::Result;

/// Name of the reserved key-value table.
pub const APP_INFO_TABLE: &str = "app_info";

/// Mirror of the engine-native schema version counter.
pub const DB_CURRENT_SCHEMAVERSION: &str = "DB_CURRENT_SCHEMAVERSION";

/// File name of the most recent fully-succeeded backup.
pub const DB_BACKUP_THISFILE: &str = "DB_BACKUP_THISFILE";

/// Timestamp of the most recent fully-succeeded backup.
pub const DB_BACKUP_THISTIME: &str = "DB_BACKUP_THISTIME";

/// Directory of the most recent fully-succeeded backup.
pub const DB_BACKUP_THISDIR: &str = "DB_BACKUP_THISDIR";

/// File name of the backup before the most recent one.
pub const DB_BACKUP_PREVFILE: &str = "DB_BACKUP_PREVFILE";

/// Timestamp of the backup before the most recent one.
pub const DB_BACKUP_PREVTIME: &str = "DB_BACKUP_PREVTIME";

/// Read the value stored under a key.
pub fn get(adapter: &mut dyn StorageAdapter, key: &str) -> Result<Option<String>> {
    let row = adapter.get_row_by_key(APP_INFO_TABLE, "key", &SqlValue::from(key), &["value"])?;
    Ok(row.map(|fields| fields[0].display()))
}

/// Write a value under a key: update if the key exists, insert otherwise.
pub fn put(adapter: &mut dyn StorageAdapter, key: &str, value: &str) -> Result<()> {
    let changed = adapter.update_rows_by_key(
        APP_INFO_TABLE,
        "key",
        &SqlValue::from(key),
        &["value"],
        &[SqlValue::from(value)],
    )?;
    if changed == 0 {
        adapter.insert(
            APP_INFO_TABLE,
            &["key", "value"],
            &[SqlValue::from(key), SqlValue::from(value)],
            false,
        )?;
    }
    Ok(())
}

/// Upsert a value, or delete the key when the value is absent. Used by the
/// backup compensation path to restore an exact prior state.
pub fn put_opt(adapter: &mut dyn StorageAdapter, key: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) => put(adapter, key, value),
        None => delete(adapter, key),
    }
}

/// Remove a key. Removing an absent key is not an error.
pub fn delete(adapter: &mut dyn StorageAdapter, key: &str) -> Result<()> {
    adapter.delete_rows(APP_INFO_TABLE, "key = ?", Some(&SqlValue::from(key)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Backend, DbFile};

    fn open_with_app_info() -> (tempfile::TempDir, Box<dyn StorageAdapter>) {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = DbFile::new(dir.path().join("logbook.db"), Backend::Native)
            .open()
            .unwrap();
        adapter
            .exec_structural_update("CREATE TABLE app_info (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .unwrap();
        (dir, adapter)
    }

    #[test]
    fn test_get_absent_key_is_none() {
        let (_dir, mut adapter) = open_with_app_info();
        assert_eq!(get(adapter.as_mut(), DB_BACKUP_THISFILE).unwrap(), None);
    }

    #[test]
    fn test_put_inserts_then_updates_in_place() {
        let (_dir, mut adapter) = open_with_app_info();
        put(adapter.as_mut(), DB_CURRENT_SCHEMAVERSION, "2").unwrap();
        assert_eq!(
            get(adapter.as_mut(), DB_CURRENT_SCHEMAVERSION).unwrap().as_deref(),
            Some("2")
        );

        put(adapter.as_mut(), DB_CURRENT_SCHEMAVERSION, "3").unwrap();
        assert_eq!(
            get(adapter.as_mut(), DB_CURRENT_SCHEMAVERSION).unwrap().as_deref(),
            Some("3")
        );
        assert_eq!(adapter.count(APP_INFO_TABLE, None).unwrap(), 1);
    }

    #[test]
    fn test_put_opt_none_deletes() {
        let (_dir, mut adapter) = open_with_app_info();
        put(adapter.as_mut(), DB_BACKUP_THISFILE, "db-20260101-1200.bak").unwrap();
        put_opt(adapter.as_mut(), DB_BACKUP_THISFILE, None).unwrap();
        assert_eq!(get(adapter.as_mut(), DB_BACKUP_THISFILE).unwrap(), None);
    }

    #[test]
    fn test_delete_absent_key_is_ok() {
        let (_dir, mut adapter) = open_with_app_info();
        delete(adapter.as_mut(), DB_BACKUP_PREVFILE).unwrap();
    }
}
