//! Adapter backend over the generic SQL-client driver.
//!
//! The driver is async; this backend owns a private current-thread runtime
//! and blocks on every call, so the adapter surface stays synchronous and
//! matches the embedded backend exactly.

use crate::db::adapter::{
    check_pairs, check_predicate, is_transaction_control, select_sql, set_clause, strip_id_column,
    StorageAdapter,
};
use crate::db::value::SqlValue;
use crate::db::Backend;
use crate::error::{Error, Result};
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection as _, Row as _, TypeInfo as _, ValueRef as _};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Runtime;

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>;

/// Storage adapter bound to the generic SQL-client driver.
pub struct ClientAdapter {
    path: PathBuf,
    rt: Runtime,
    conn: Option<SqliteConnection>,
}

impl ClientAdapter {
    /// Open (creating if absent) the database file at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);
        let conn = rt.block_on(options.connect())?;
        tracing::debug!(path = %path.display(), "opened client adapter");
        Ok(Self {
            path,
            rt,
            conn: Some(conn),
        })
    }

    fn parts(&mut self) -> Result<(&Runtime, &mut SqliteConnection)> {
        let Self { rt, conn, .. } = self;
        match conn.as_mut() {
            Some(conn) => Ok((rt, conn)),
            None => Err(Error::closed()),
        }
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Integer(v) => query.bind(*v),
        SqlValue::Real(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Blob(v) => query.bind(v.clone()),
    }
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, args: &[SqlValue]) -> SqliteQuery<'q> {
    for value in args {
        query = bind_value(query, value);
    }
    query
}

fn column_value(row: &SqliteRow, index: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "INTEGER" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
        "REAL" => SqlValue::Real(row.try_get::<f64, _>(index)?),
        "BLOB" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(index)?),
        _ => SqlValue::Text(row.try_get::<String, _>(index)?),
    };
    Ok(value)
}

impl StorageAdapter for ClientAdapter {
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
        let (rt, conn) = self.parts()?;
        let rows = rt.block_on(bind_all(sqlx::query(&sql), args).fetch_all(&mut *conn))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut fields = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                fields.push(column_value(row, index)?);
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
        let (rt, conn) = self.parts()?;
        let row = rt.block_on(bind_all(sqlx::query(&sql), args).fetch_optional(&mut *conn))?;
        match row {
            Some(row) => Ok(Some(column_value(&row, 0)?)),
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
        let (rt, conn) = self.parts()?;
        let row = rt.block_on(bind_all(sqlx::query(&sql), &args).fetch_one(&mut *conn))?;
        Ok(row.try_get::<i64, _>(0)?)
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
        let (rt, conn) = self.parts()?;
        let result = rt.block_on(bind_all(sqlx::query(&sql), &values).execute(&mut *conn))?;
        Ok(result.last_insert_rowid())
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
        let (rt, conn) = self.parts()?;
        let mut query = bind_all(sqlx::query(&sql), values);
        query = bind_all(query, args);
        let result = rt.block_on(query.execute(&mut *conn))?;
        Ok(result.rows_affected() as usize)
    }

    fn delete_rows(
        &mut self,
        table: &str,
        predicate: &str,
        arg: Option<&SqlValue>,
    ) -> Result<usize> {
        check_predicate(predicate)?;
        let sql = format!("DELETE FROM {table} WHERE {predicate}");
        let mut query = sqlx::query(&sql);
        if predicate.contains('?') {
            let arg = arg.ok_or_else(|| Error::argument("predicate has a placeholder but no argument"))?;
            query = bind_value(query, arg);
        }
        let (rt, conn) = self.parts()?;
        let result = rt.block_on(query.execute(&mut *conn))?;
        Ok(result.rows_affected() as usize)
    }

    fn exec_structural_update(&mut self, sql: &str) -> Result<()> {
        if is_transaction_control(sql) {
            return Ok(());
        }
        let (rt, conn) = self.parts()?;
        rt.block_on(sqlx::raw_sql(sql).execute(&mut *conn))?;
        Ok(())
    }

    fn integrity_check(&mut self) -> Result<Option<String>> {
        let (rt, conn) = self.parts()?;
        let rows = rt.block_on(sqlx::query("PRAGMA integrity_check").fetch_all(&mut *conn))?;
        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            lines.push(row.try_get::<String, _>(0)?);
        }
        if lines.len() == 1 && lines[0].eq_ignore_ascii_case("ok") {
            Ok(None)
        } else {
            Ok(Some(lines.join("\n")))
        }
    }

    fn user_version(&mut self) -> Result<i64> {
        let (rt, conn) = self.parts()?;
        let row = rt.block_on(sqlx::query("PRAGMA user_version").fetch_one(&mut *conn))?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    fn set_user_version(&mut self, version: i64) -> Result<()> {
        let (rt, conn) = self.parts()?;
        rt.block_on(sqlx::raw_sql(&format!("PRAGMA user_version = {version}")).execute(&mut *conn))?;
        Ok(())
    }

    fn table_exists(&mut self, name: &str) -> Result<bool> {
        let (rt, conn) = self.parts()?;
        let row = rt.block_on(
            sqlx::query("SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name.to_string())
                .fetch_one(&mut *conn),
        )?;
        Ok(row.try_get::<i64, _>(0)? > 0)
    }

    fn file_path(&self) -> &Path {
        &self.path
    }

    fn backend(&self) -> Backend {
        Backend::Client
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            // Close failures are swallowed; the handle is gone either way.
            let _ = self.rt.block_on(conn.close());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, ClientAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = ClientAdapter::open(dir.path().join("logbook.db")).unwrap();
        (dir, adapter)
    }

    fn create_vehicles(adapter: &mut ClientAdapter) {
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
    fn test_aggregate_over_zero_rows_is_present_but_null() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        let scalar = adapter
            .get_scalar("vehicles", "max(odometer)", None, &[])
            .unwrap();
        assert_eq!(scalar, Some(SqlValue::Null));
    }

    #[test]
    fn test_count_with_integer_and_string_keys() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        adapter
            .insert(
                "vehicles",
                &["name", "odometer"],
                &[SqlValue::from("Golf"), SqlValue::from(100i64)],
                false,
            )
            .unwrap();
        assert_eq!(
            adapter
                .count("vehicles", Some(("odometer", &SqlValue::Integer(100))))
                .unwrap(),
            1
        );
        assert_eq!(
            adapter
                .count("vehicles", Some(("name", &SqlValue::from("Golf"))))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_closed_adapter_fails_with_state_error() {
        let (_dir, mut adapter) = open_temp();
        create_vehicles(&mut adapter);
        adapter.close().unwrap();
        let err = adapter.count("vehicles", None).unwrap_err();
        assert!(matches!(err, Error::State(_)));
        adapter.close().unwrap();
    }

    #[test]
    fn test_user_version_round_trip() {
        let (_dir, mut adapter) = open_temp();
        adapter.set_user_version(943).unwrap();
        assert_eq!(adapter.user_version().unwrap(), 943);
    }
}
