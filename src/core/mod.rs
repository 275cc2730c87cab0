//! Bookkeeping kept inside the database: app_info key-values and the backup
//! protocol built on them.

pub mod appinfo;
pub mod backup;

pub use backup::{
    read_history, BackupCoordinator, BackupHistory, BackupRecord, FileCopy, FsCopy, SortOrder,
};
