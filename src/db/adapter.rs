//! Storage adapter contract.
//!
//! One trait, implemented identically by every backend. The SQL text both
//! backends execute is built by the helpers at the bottom of this module, so
//! the contract's conventions (key-suffix inequality, NULL handling, pair
//! validation) cannot drift between engines; only the engine bridging differs
//! per backend.

use crate::db::value::SqlValue;
use crate::db::Backend;
use crate::error::{Error, Result};
use std::path::Path;

/// Name of the integer primary key column every row table carries.
pub const ID_COLUMN: &str = "id";

/// Two-character suffix on a key-field name selecting inequality semantics.
pub const NOT_EQUAL_SUFFIX: &str = "<>";

/// One open session to exactly one database file.
///
/// Not safe for concurrent use; callers needing concurrent access must
/// serialize externally. Every operation either completes or fails before
/// returning, and once [`StorageAdapter::close`] has run all further
/// operations fail with a state error — an adapter never reopens silently.
pub trait StorageAdapter {
    /// Rows matching an arbitrary parameterized predicate, with positional
    /// `?` arguments. Field order in each returned row follows `columns`.
    fn get_rows(
        &mut self,
        table: &str,
        predicate: Option<&str>,
        args: &[SqlValue],
        columns: &[&str],
        order_by: Option<&str>,
    ) -> Result<Vec<Vec<SqlValue>>>;

    /// A single scalar, where `column` may be an aggregate expression.
    ///
    /// `Ok(None)` means no row matched. `Ok(Some(SqlValue::Null))` means a
    /// row was present with a NULL value — notably, an aggregate such as
    /// `max(...)` over zero matching rows yields this present-but-null
    /// scalar, and both backends surface it identically.
    fn get_scalar(
        &mut self,
        table: &str,
        column: &str,
        predicate: Option<&str>,
        args: &[SqlValue],
    ) -> Result<Option<SqlValue>>;

    /// Row count matching key equality (string or integer value, `<>` suffix
    /// honored), or the total row count when `key` is absent.
    fn count(&mut self, table: &str, key: Option<(&str, &SqlValue)>) -> Result<i64>;

    /// Insert one row and return the newly assigned integer primary key.
    ///
    /// `columns` and `values` must be the same length. NULL values persist as
    /// SQL-NULL. With `skip_id` set, any caller-supplied [`ID_COLUMN`] is
    /// dropped so the engine assigns the key.
    fn insert(
        &mut self,
        table: &str,
        columns: &[&str],
        values: &[SqlValue],
        skip_id: bool,
    ) -> Result<i64>;

    /// Update all rows matching a predicate. Returns the number of rows
    /// changed. NULL values clear the corresponding fields.
    fn update_rows(
        &mut self,
        table: &str,
        predicate: &str,
        args: &[SqlValue],
        columns: &[&str],
        values: &[SqlValue],
    ) -> Result<usize>;

    /// Delete rows matching a predicate, which must be non-empty. When the
    /// predicate contains no `?` placeholder the argument is not bound,
    /// supporting static predicates such as `note is not null`.
    fn delete_rows(&mut self, table: &str, predicate: &str, arg: Option<&SqlValue>)
        -> Result<usize>;

    /// Execute a raw DDL/utility statement. Transaction-control statements
    /// are silently skipped: the engines scope their own transactions, so
    /// scripts carrying BEGIN/COMMIT run correctly on both backends.
    fn exec_structural_update(&mut self, sql: &str) -> Result<()>;

    /// `None` when the engine reports `ok`, otherwise the diagnostic text.
    fn integrity_check(&mut self) -> Result<Option<String>>;

    /// The engine-native schema version counter.
    fn user_version(&mut self) -> Result<i64>;

    /// Set the engine-native schema version counter.
    fn set_user_version(&mut self, version: i64) -> Result<()>;

    /// Whether a table of the given name exists.
    fn table_exists(&mut self, name: &str) -> Result<bool>;

    /// Path of the database file this adapter is bound to.
    fn file_path(&self) -> &Path;

    /// Which backend this adapter runs on.
    fn backend(&self) -> Backend;

    /// False once [`StorageAdapter::close`] has run.
    fn is_open(&self) -> bool;

    /// Release the connection. Idempotent; engine-side close failures are
    /// swallowed so the primary result of the surrounding operation is never
    /// masked.
    fn close(&mut self) -> Result<()>;

    /// One row by integer primary key. `Ok(None)` when the id is absent.
    fn get_row(&mut self, table: &str, id: i64, columns: &[&str]) -> Result<Option<Vec<SqlValue>>> {
        let predicate = format!("{ID_COLUMN} = ?");
        let mut rows = self.get_rows(table, Some(&predicate), &[SqlValue::Integer(id)], columns, None)?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    /// First row matching single key-field equality, or inequality via the
    /// `<>` suffix convention on the key-field name.
    fn get_row_by_key(
        &mut self,
        table: &str,
        key_field: &str,
        key: &SqlValue,
        columns: &[&str],
    ) -> Result<Option<Vec<SqlValue>>> {
        let (clause, args) = key_clause(key_field, key)?;
        let mut rows = self.get_rows(table, Some(&clause), &args, columns, None)?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    /// One field of the row with the given id. `Ok(None)` for no row,
    /// `Ok(Some(SqlValue::Null))` for a present NULL.
    fn get_field(&mut self, table: &str, id: i64, column: &str) -> Result<Option<SqlValue>> {
        let predicate = format!("{ID_COLUMN} = ?");
        self.get_scalar(table, column, Some(&predicate), &[SqlValue::Integer(id)])
    }

    /// Text field; NULL and no-row both map to `None`.
    fn get_text_field(&mut self, table: &str, id: i64, column: &str) -> Result<Option<String>> {
        match self.get_field(table, id, column)? {
            None | Some(SqlValue::Null) => Ok(None),
            Some(value) => Ok(Some(value.display())),
        }
    }

    /// Text field with a default substituted on NULL or no-row.
    fn get_text_field_or(
        &mut self,
        table: &str,
        id: i64,
        column: &str,
        default: &str,
    ) -> Result<String> {
        Ok(self
            .get_text_field(table, id, column)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Integer field; NULL and no-row both map to `None`.
    fn get_i64_field(&mut self, table: &str, id: i64, column: &str) -> Result<Option<i64>> {
        match self.get_field(table, id, column)? {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Integer(value)) => Ok(Some(value)),
            Some(other) => Err(Error::State(format!(
                "field {table}.{column} is not an integer: {other:?}"
            ))),
        }
    }

    /// Integer field with a default substituted on NULL or no-row.
    fn get_i64_field_or(&mut self, table: &str, id: i64, column: &str, default: i64) -> Result<i64> {
        Ok(self.get_i64_field(table, id, column)?.unwrap_or(default))
    }

    /// Update one row by integer primary key.
    fn update_row(
        &mut self,
        table: &str,
        id: i64,
        columns: &[&str],
        values: &[SqlValue],
    ) -> Result<usize> {
        let predicate = format!("{ID_COLUMN} = ?");
        self.update_rows(table, &predicate, &[SqlValue::Integer(id)], columns, values)
    }

    /// Update all rows matching a single key field (suffix convention as in
    /// [`StorageAdapter::get_row_by_key`]).
    fn update_rows_by_key(
        &mut self,
        table: &str,
        key_field: &str,
        key: &SqlValue,
        columns: &[&str],
        values: &[SqlValue],
    ) -> Result<usize> {
        let (clause, args) = key_clause(key_field, key)?;
        self.update_rows(table, &clause, &args, columns, values)
    }

    /// Update one field of one row; a NULL value clears the field.
    fn update_single_field(
        &mut self,
        table: &str,
        id: i64,
        column: &str,
        value: &SqlValue,
    ) -> Result<usize> {
        self.update_row(table, id, &[column], std::slice::from_ref(value))
    }

    /// Delete one row by integer primary key.
    fn delete_row(&mut self, table: &str, id: i64) -> Result<usize> {
        let predicate = format!("{ID_COLUMN} = ?");
        self.delete_rows(table, &predicate, Some(&SqlValue::Integer(id)))
    }

    /// Two adapters have the same owner iff they resolve to the same file,
    /// letting higher layers detect redundant opens without sharing state.
    fn has_same_owner(&self, other: &dyn StorageAdapter) -> bool {
        owner_key(self.file_path()) == owner_key(other.file_path())
    }
}

/// Canonical identity of a database file, falling back to the raw path when
/// the file cannot be resolved (already deleted, relative to a gone cwd).
pub(crate) fn owner_key(path: &Path) -> String {
    match path.canonicalize() {
        Ok(resolved) => resolved.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// WHERE clause for a single key field.
///
/// A key-field name ending in `<>` selects `column <> ?`, or `column IS NOT
/// NULL` when the key is NULL. A plain key field selects `column = ?`, or
/// `column IS NULL` when the key is NULL. The returned argument list is empty
/// for the IS NULL / IS NOT NULL forms.
pub(crate) fn key_clause(key_field: &str, key: &SqlValue) -> Result<(String, Vec<SqlValue>)> {
    let trimmed = key_field.trim();
    if trimmed.is_empty() {
        return Err(Error::argument("key field must not be empty"));
    }

    if let Some(column) = trimmed.strip_suffix(NOT_EQUAL_SUFFIX) {
        let column = column.trim_end();
        if column.is_empty() {
            return Err(Error::argument("key field must not be empty"));
        }
        return Ok(if key.is_null() {
            (format!("{column} IS NOT NULL"), Vec::new())
        } else {
            (format!("{column} <> ?"), vec![key.clone()])
        });
    }

    Ok(if key.is_null() {
        (format!("{trimmed} IS NULL"), Vec::new())
    } else {
        (format!("{trimmed} = ?"), vec![key.clone()])
    })
}

/// Validate a (columns, values) pair for insert/update.
pub(crate) fn check_pairs(columns: &[&str], values: &[SqlValue]) -> Result<()> {
    if columns.is_empty() {
        return Err(Error::argument("no columns given"));
    }
    if columns.len() != values.len() {
        return Err(Error::argument(format!(
            "{} columns but {} values",
            columns.len(),
            values.len()
        )));
    }
    Ok(())
}

/// Validate a delete/update predicate.
pub(crate) fn check_predicate(predicate: &str) -> Result<()> {
    if predicate.trim().is_empty() {
        return Err(Error::argument("predicate must not be empty"));
    }
    Ok(())
}

/// SELECT statement over explicit columns, preserving the requested order.
pub(crate) fn select_sql(
    table: &str,
    columns: &[&str],
    predicate: Option<&str>,
    order_by: Option<&str>,
) -> String {
    let mut sql = format!("SELECT {} FROM {table}", columns.join(", "));
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
    if let Some(order_by) = order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }
    sql
}

/// UPDATE SET clause over the given columns, one placeholder each.
pub(crate) fn set_clause(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Filter the [`ID_COLUMN`] out of a (columns, values) pair for inserts that
/// let the engine assign the key.
pub(crate) fn strip_id_column<'a>(
    columns: &[&'a str],
    values: &[SqlValue],
) -> (Vec<&'a str>, Vec<SqlValue>) {
    let mut kept_columns = Vec::with_capacity(columns.len());
    let mut kept_values = Vec::with_capacity(values.len());
    for (column, value) in columns.iter().zip(values.iter()) {
        if *column != ID_COLUMN {
            kept_columns.push(*column);
            kept_values.push(value.clone());
        }
    }
    (kept_columns, kept_values)
}

/// True for BEGIN/COMMIT/ROLLBACK/END statements, which the backends skip in
/// [`StorageAdapter::exec_structural_update`].
pub(crate) fn is_transaction_control(sql: &str) -> bool {
    let first = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches(';')
        .to_ascii_uppercase();
    matches!(first.as_str(), "BEGIN" | "COMMIT" | "ROLLBACK" | "END")
}
