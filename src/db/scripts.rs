//! Schema script resources.
//!
//! Upgrade scripts are versioned SQL text resources owned by a
//! [`ScriptProvider`] collaborator, not by the schema machinery itself. The
//! crate ships the bundled logbook scripts and a directory-backed provider;
//! tests assemble in-memory providers with arbitrary version chains.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed resource name of the creation script (version-tag 0).
pub const CREATE_SCRIPT_NAME: &str = "create.sql";

/// Prefix of upgrade script resource names.
pub const UPGRADE_SCRIPT_PREFIX: &str = "upgrade-";

/// Suffix of upgrade script resource names.
pub const UPGRADE_SCRIPT_SUFFIX: &str = ".sql";

/// Schema version the bundled scripts produce.
pub const CURRENT_SCHEMA_VERSION: i64 = 3;

/// Resource name for the upgrade script targeting a version, with the
/// version number zero-padded to at least four digits.
pub fn upgrade_script_name(version: i64) -> String {
    format!("{UPGRADE_SCRIPT_PREFIX}{version:04}{UPGRADE_SCRIPT_SUFFIX}")
}

/// Parse an upgrade script resource name back into its target version.
pub fn parse_upgrade_script_name(name: &str) -> Option<i64> {
    let digits = name
        .strip_prefix(UPGRADE_SCRIPT_PREFIX)?
        .strip_suffix(UPGRADE_SCRIPT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Split a script into its statements, in file order.
///
/// Line comments are stripped; statements are separated by `;`. The bundled
/// scripts keep semicolons out of string literals, so no quote tracking is
/// needed here.
pub fn split_statements(script: &str) -> Vec<String> {
    let without_comments: String = script
        .lines()
        .map(|line| match line.find("--") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

/// Supplies the creation script and the ordered set of upgrade scripts.
pub trait ScriptProvider {
    /// The creation script producing the full current schema.
    fn create_script(&self) -> Result<String>;

    /// Versions an upgrade script is registered for, ascending.
    fn upgrade_versions(&self) -> Result<Vec<i64>>;

    /// The upgrade script targeting the given version.
    fn upgrade_script(&self, version: i64) -> Result<String>;
}

/// Script provider over a directory of `.sql` resources.
pub struct DirScriptProvider {
    dir: PathBuf,
}

impl DirScriptProvider {
    /// Provider over the given directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl ScriptProvider for DirScriptProvider {
    fn create_script(&self) -> Result<String> {
        Ok(fs::read_to_string(self.dir.join(CREATE_SCRIPT_NAME))?)
    }

    fn upgrade_versions(&self) -> Result<Vec<i64>> {
        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(version) = entry
                .file_name()
                .to_str()
                .and_then(parse_upgrade_script_name)
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn upgrade_script(&self, version: i64) -> Result<String> {
        Ok(fs::read_to_string(
            self.dir.join(upgrade_script_name(version)),
        )?)
    }
}

/// In-memory script provider, used by tests and embedding callers.
#[derive(Default)]
pub struct MemoryScripts {
    create_sql: String,
    upgrades: BTreeMap<i64, String>,
}

impl MemoryScripts {
    /// Provider with the given creation script and no upgrades.
    pub fn new(create_sql: impl Into<String>) -> Self {
        Self {
            create_sql: create_sql.into(),
            upgrades: BTreeMap::new(),
        }
    }

    /// Register an upgrade script for a version.
    pub fn with_upgrade(mut self, version: i64, sql: impl Into<String>) -> Self {
        self.upgrades.insert(version, sql.into());
        self
    }
}

impl ScriptProvider for MemoryScripts {
    fn create_script(&self) -> Result<String> {
        Ok(self.create_sql.clone())
    }

    fn upgrade_versions(&self) -> Result<Vec<i64>> {
        Ok(self.upgrades.keys().copied().collect())
    }

    fn upgrade_script(&self, version: i64) -> Result<String> {
        self.upgrades.get(&version).cloned().ok_or_else(|| {
            Error::State(format!(
                "no upgrade script registered for version {version}"
            ))
        })
    }
}

/// The bundled logbook scripts producing [`CURRENT_SCHEMA_VERSION`].
pub fn bundled() -> MemoryScripts {
    MemoryScripts::new(LOGBOOK_CREATE_SQL)
        .with_upgrade(2, LOGBOOK_UPGRADE_0002_SQL)
        .with_upgrade(3, LOGBOOK_UPGRADE_0003_SQL)
}

/// Creation script: the full current logbook schema.
pub const LOGBOOK_CREATE_SQL: &str = r#"
-- Logbook schema, current version.

CREATE TABLE app_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE vehicles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    plate TEXT,
    make TEXT,
    model TEXT,
    odometer INTEGER
);

CREATE TABLE drivers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    license_no TEXT
);

CREATE TABLE trips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_id INTEGER NOT NULL REFERENCES vehicles(id),
    driver_id INTEGER REFERENCES drivers(id),
    started_at TEXT NOT NULL,
    ended_at TEXT,
    start_odo INTEGER,
    end_odo INTEGER,
    purpose TEXT,
    note TEXT
);

CREATE INDEX idx_trips_vehicle ON trips(vehicle_id);
CREATE INDEX idx_trips_started_at ON trips(started_at);
"#;

/// Version 1 -> 2: named drivers, trips attributable to a driver.
pub const LOGBOOK_UPGRADE_0002_SQL: &str = r#"
CREATE TABLE drivers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    license_no TEXT
);

ALTER TABLE trips ADD COLUMN driver_id INTEGER REFERENCES drivers(id);
"#;

/// Version 2 -> 3: odometer tracking on vehicles and trips.
pub const LOGBOOK_UPGRADE_0003_SQL: &str = r#"
ALTER TABLE vehicles ADD COLUMN odometer INTEGER;
ALTER TABLE trips ADD COLUMN start_odo INTEGER;
ALTER TABLE trips ADD COLUMN end_odo INTEGER;

CREATE INDEX idx_trips_started_at ON trips(started_at);
"#;
