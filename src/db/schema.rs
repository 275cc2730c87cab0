//! Schema versioning and in-place upgrades.
//!
//! A database file carries its schema version in the engine-native
//! `user_version` counter, mirrored in the app_info table so the version is
//! readable through a plain read-only open. Upgrades walk the registered
//! script chain from the observed version to the target, one script at a
//! time, advancing the marker only after a script fully applies.

use crate::core::appinfo;
use crate::db::scripts::{split_statements, ScriptProvider};
use crate::db::{DbFile, StorageAdapter};
use crate::error::{Error, Result};
use std::path::Path;

/// Drives a database file to the target schema version.
pub struct SchemaManager<'a> {
    scripts: &'a dyn ScriptProvider,
    target: i64,
}

impl<'a> SchemaManager<'a> {
    /// Manager over the given script provider and target version.
    pub fn new(scripts: &'a dyn ScriptProvider, target: i64) -> Self {
        Self { scripts, target }
    }

    /// The target schema version.
    pub fn target(&self) -> i64 {
        self.target
    }

    /// Open the file, observe its version, upgrade to current, and hand the
    /// adapter back. The normal application open path.
    pub fn open_current(&self, db: &DbFile) -> Result<Box<dyn StorageAdapter>> {
        let mut adapter = db.open()?;
        let observed = adapter.user_version()?;
        self.upgrade_to_current(adapter.as_mut(), observed)?;
        Ok(adapter)
    }

    /// Upgrade from the observed version to the target.
    ///
    /// Version 0 means a freshly created file: the creation script runs
    /// instead of an upgrade chain. Otherwise every registered upgrade script
    /// in `(observed, target]` applies in ascending order, each one statement
    /// by statement in file order. A failing statement aborts with
    /// [`Error::UpgradeFailed`] and leaves the marker at the last
    /// fully-applied version, so a retry resumes at the failed script.
    pub fn upgrade_to_current(
        &self,
        adapter: &mut dyn StorageAdapter,
        observed: i64,
    ) -> Result<i64> {
        if observed == self.target {
            return Ok(self.target);
        }
        if observed > self.target {
            return Err(Error::State(format!(
                "database version {observed} is newer than the supported version {}",
                self.target
            )));
        }

        if observed == 0 {
            let script = self.scripts.create_script()?;
            self.apply_script(adapter, 0, &script)?;
            self.set_marker(adapter, self.target)?;
            tracing::info!(version = self.target, "created schema");
            return Ok(self.target);
        }

        let pending: Vec<i64> = self
            .scripts
            .upgrade_versions()?
            .into_iter()
            .filter(|&version| version > observed && version <= self.target)
            .collect();

        for &version in &pending {
            let script = self.scripts.upgrade_script(version)?;
            self.apply_script(adapter, version, &script)?;
            self.set_marker(adapter, version)?;
            tracing::info!(version, "applied upgrade script");
        }

        if adapter.user_version()? != self.target {
            self.set_marker(adapter, self.target)?;
        }
        Ok(self.target)
    }

    fn apply_script(
        &self,
        adapter: &mut dyn StorageAdapter,
        version: i64,
        script: &str,
    ) -> Result<()> {
        for statement in split_statements(script) {
            adapter
                .exec_structural_update(&statement)
                .map_err(|err| Error::UpgradeFailed {
                    version,
                    message: err.to_string(),
                })?;
        }
        Ok(())
    }

    fn set_marker(&self, adapter: &mut dyn StorageAdapter, version: i64) -> Result<()> {
        adapter.set_user_version(version)?;
        appinfo::put(adapter, appinfo::DB_CURRENT_SCHEMAVERSION, &version.to_string())
    }
}

/// Read the stored schema version of a database file through a plain
/// read-only open, with no adapter apparatus and no upgrade side effects.
/// Used to judge whether a candidate backup file is compatible for restore.
pub fn read_schema_version<P: AsRef<Path>>(path: P) -> Result<i64> {
    let conn = rusqlite::Connection::open_with_flags(
        path.as_ref(),
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )?;
    let version = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}
