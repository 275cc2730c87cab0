//! # roadlog - vehicle logbook storage core
//!
//! Persists a vehicle logbook in an embedded relational store behind a single
//! storage-adapter contract with two interchangeable backends, versioned
//! in-place schema upgrades driven by ordered SQL scripts, and a
//! two-generation backup history kept inside the database itself.

pub mod cli;
pub mod core;
pub mod db;
pub mod error;

// Re-export commonly used types
pub use crate::core::{BackupCoordinator, BackupHistory, BackupRecord, SortOrder};
pub use crate::db::{Backend, DbFile, SchemaManager, SqlValue, StorageAdapter};
pub use crate::error::{Error, Result};
