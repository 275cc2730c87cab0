//! Adapter backend over the embedded SQLite engine binding.

use crate::db::adapter::{
    check_pairs, check_predicate, is_transaction_control, select_sql, set_clause, strip_id_column,
    StorageAdapter,
};
use crate::db::value::SqlValue;
use crate::db::Backend;
use crate::error::{Error, Result};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage adapter bound directly to the embedded SQLite library.
pub struct NativeAdapter {
    path: PathBuf,
    conn: Option<Connection>,
}

impl NativeAdapter {
    /// Open (creating if absent) the database file at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        tracing::debug!(path = %path.display(), "opened native adapter");
        Ok(Self {
            path,
            conn: Some(conn),
        })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(Error::closed)
    }
}

fn bind_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Blob(v) => Value::Blob(v.clone()),
    }
}

fn column_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
    }
}

impl StorageAdapter for NativeAdapter {
    fn get_rows(
        &mut self,
        table: &str,
        predicate: Option<&str>,
        args: &[SqlValue],
        columns: &[&str],
        order_by: Option<&str>,
    ) -> Result<Vec<Vec<SqlValue>>> {
        if columns.is_empty() {
            return Err(Error::argument("no columns given"));
        }
        let sql = select_sql(table, columns, predicate, order_by);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args.iter().map(bind_value)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fields = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                fields.push(column_value(row.get_ref(index)?));
            }
            out.push(fields);
        }
        Ok(out)
    }

    fn get_scalar(
        &mut self,
        table: &str,
        column: &str,
        predicate: Option<&str>,
        args: &[SqlValue],
    ) -> Result<Option<SqlValue>> {
        let sql = select_sql(table, &[column], predicate, None);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(args.iter().map(bind_value)))?;
        match rows.next()? {
            Some(row) => Ok(Some(column_value(row.get_ref(0)?))),
            None => Ok(None),
        }
    }

    fn count(&mut self, table: &str, key: Option<(&str, &SqlValue)>) -> Result<i64> {
        let (predicate, args) = match key {
            Some((key_field, value)) => {
                let (clause, args) = crate::db::adapter::key_clause(key_field, value)?;
                (Some(clause), args)
            }
            None => (None, Vec::new()),
        };
        let sql = select_sql(table, &["count(*)"], predicate.as_deref(), None);
        let conn = self.conn()?;
        let count = conn.query_row(&sql, params_from_iter(args.iter().map(bind_value)), |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    fn insert(
        &mut self,
        table: &str,
        columns: &[&str],
        values: &[SqlValue],
        skip_id: bool,
    ) -> Result<i64> {
        check_pairs(columns, values)?;
        let (columns, values) = if skip_id {
            strip_id_column(columns, values)
        } else {
            (columns.to_vec(), values.to_vec())
        };
        if columns.is_empty() {
            return Err(Error::argument("no columns left to insert"));
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        let conn = self.conn()?;
        conn.execute(&sql, params_from_iter(values.iter().map(bind_value)))?;
        Ok(conn.last_insert_rowid())
    }

    fn update_rows(
        &mut self,
        table: &str,
        predicate: &str,
        args: &[SqlValue],
        columns: &[&str],
        values: &[SqlValue],
    ) -> Result<usize> {
        check_predicate(predicate)?;
        check_pairs(columns, values)?;

        let sql = format!(
            "UPDATE {table} SET {} WHERE {predicate}",
            set_clause(columns)
        );
        let bound: Vec<Value> = values.iter().chain(args.iter()).map(bind_value).collect();
        let conn = self.conn()?;
        Ok(conn.execute(&sql, params_from_iter(bound))?)
    }

    fn delete_rows(
        &mut self,
        table: &str,
        predicate: &str,
        arg: Option<&SqlValue>,
    ) -> Result<usize> {
        check_predicate(predicate)?;
        let sql = format!("DELETE FROM {table} WHERE {predicate}");
        let conn = self.conn()?;
        let changed = if predicate.contains('?') {
            let arg = arg.ok_or_else(|| Error::argument("predicate has a placeholder but no argument"))?;
            conn.execute(&sql, [bind_value(arg)])?
        } else {
            conn.execute(&sql, [])?
        };
        Ok(changed)
    }

    fn exec_structural_update(&mut self, sql: &str) -> Result<()> {
        if is_transaction_control(sql) {
            return Ok(());
        }
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn integrity_check(&mut self) -> Result<Option<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("PRAGMA integrity_check")?;
        let mut rows = stmt.query([])?;
        let mut lines = Vec::new();
        while let Some(row) = rows.next()? {
            lines.push(row.get::<_, String>(0)?);
        }
        if lines.len() == 1 && lines[0].eq_ignore_ascii_case("ok") {
            Ok(None)
        } else {
            Ok(Some(lines.join("\n")))
        }
    }

    fn user_version(&mut self) -> Result<i64> {
        let version = self
            .conn()?
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    fn set_user_version(&mut self, version: i64) -> Result<()> {
        self.conn()?.pragma_update(None, "user_version", version)?;
        Ok(())
    }

    fn table_exists(&mut self, name: &str) -> Result<bool> {
        let count: i64 = self.conn()?.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn file_path(&self) -> &Path {
        &self.path
    }

    fn backend(&self) -> Backend {
        Backend::Native
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            // Close failures are swallowed; the handle is gone either way.
            let _ = conn.close();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, NativeAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = NativeAdapter::open(dir.path().join("logbook.db")).unwrap();
        (dir, adapter)
    }

    fn create_vehicles(adapter: &mut NativeAdapter) {
        adapter
            .exec_structural_update(
                "CREATE TABLE vehicles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    plate TEXT,
                    odometer INTEGER
                )",
            )
            .unwrap();
    }

    #[test]
    fn test_insert_get_row_round_trip() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);

        let id = adapter
            .insert(
                "vehicles",
                &["name", "plate", "odometer"],
                &[SqlValue::from("Golf"), SqlValue::Null, SqlValue::from(42_000i64)],
                false,
            )
            .unwrap();

        let row = adapter
            .get_row("vehicles", id, &["name", "plate", "odometer"])
            .unwrap()
            .unwrap();
        assert_eq!(row[0], SqlValue::from("Golf"));
        assert_eq!(row[1], SqlValue::Null);
        assert_eq!(row[2], SqlValue::Integer(42_000));
    }

    #[test]
    fn test_get_row_absent_id_is_none() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        assert!(adapter.get_row("vehicles", 99, &["name"]).unwrap().is_none());
    }

    #[test]
    fn test_insert_length_mismatch_is_argument_error() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        let err = adapter
            .insert("vehicles", &["name", "plate"], &[SqlValue::from("Golf")], false)
            .unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_insert_skip_id_lets_engine_assign() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        let id = adapter
            .insert(
                "vehicles",
                &["id", "name"],
                &[SqlValue::Integer(7), SqlValue::from("Golf")],
                true,
            )
            .unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_count_total_and_by_key() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        for name in ["Golf", "Polo", "Golf"] {
            adapter
                .insert("vehicles", &["name"], &[SqlValue::from(name)], false)
                .unwrap();
        }
        assert_eq!(adapter.count("vehicles", None).unwrap(), 3);
        assert_eq!(
            adapter
                .count("vehicles", Some(("name", &SqlValue::from("Golf"))))
                .unwrap(),
            2
        );
        assert_eq!(
            adapter
                .count("vehicles", Some(("name<>", &SqlValue::from("Golf"))))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_aggregate_over_zero_rows_is_present_but_null() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        let scalar = adapter
            .get_scalar("vehicles", "max(odometer)", None, &[])
            .unwrap();
        assert_eq!(scalar, Some(SqlValue::Null));
    }

    #[test]
    fn test_get_field_distinguishes_no_row_from_null() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        let id = adapter
            .insert(
                "vehicles",
                &["name", "odometer"],
                &[SqlValue::from("Golf"), SqlValue::Null],
                false,
            )
            .unwrap();

        assert_eq!(adapter.get_field("vehicles", 99, "odometer").unwrap(), None);
        assert_eq!(
            adapter.get_field("vehicles", id, "odometer").unwrap(),
            Some(SqlValue::Null)
        );
        assert_eq!(adapter.get_i64_field_or("vehicles", id, "odometer", 0).unwrap(), 0);
        assert_eq!(adapter.get_i64_field("vehicles", id, "odometer").unwrap(), None);
    }

    #[test]
    fn test_update_single_field_null_clears() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        let id = adapter
            .insert(
                "vehicles",
                &["name", "plate"],
                &[SqlValue::from("Golf"), SqlValue::from("B-XY 1")],
                false,
            )
            .unwrap();

        let changed = adapter
            .update_single_field("vehicles", id, "plate", &SqlValue::Null)
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(
            adapter.get_field("vehicles", id, "plate").unwrap(),
            Some(SqlValue::Null)
        );
    }

    #[test]
    fn test_delete_rows_static_predicate_binds_nothing() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        adapter
            .insert(
                "vehicles",
                &["name", "plate"],
                &[SqlValue::from("Golf"), SqlValue::from("B-XY 1")],
                false,
            )
            .unwrap();
        adapter
            .insert("vehicles", &["name"], &[SqlValue::from("Polo")], false)
            .unwrap();

        let deleted = adapter
            .delete_rows("vehicles", "plate is not null", None)
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(adapter.count("vehicles", None).unwrap(), 1);
    }

    #[test]
    fn test_delete_rows_empty_predicate_is_argument_error() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        let err = adapter.delete_rows("vehicles", "  ", None).unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }

    #[test]
    fn test_exec_structural_update_skips_transaction_control() {
        let (_dir, mut adapter) = open_temp();
        adapter.exec_structural_update("BEGIN TRANSACTION;").unwrap();
        adapter.exec_structural_update("COMMIT;").unwrap();
        assert!(!adapter.table_exists("vehicles").unwrap());
    }

    #[test]
    fn test_integrity_check_ok_is_none() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        assert!(adapter.integrity_check().unwrap().is_none());
    }

    #[test]
    fn test_user_version_round_trip() {
        let (_dir, mut adapter) = open_temp();
        assert_eq!(adapter.user_version().unwrap(), 0);
        adapter.set_user_version(961).unwrap();
        assert_eq!(adapter.user_version().unwrap(), 961);
    }

    #[test]
    fn test_closed_adapter_fails_with_state_error() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        adapter.close().unwrap();
        assert!(!adapter.is_open());

        let err = adapter.count("vehicles", None).unwrap_err();
        assert!(matches!(err, Error::State(_)));
        // Close stays idempotent.
        adapter.close().unwrap();
    }

    #[test]
    fn test_engine_error_leaves_adapter_usable() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        assert!(adapter.count("no_such_table", None).is_err());
        assert_eq!(adapter.count("vehicles", None).unwrap(), 0);
    }
}
