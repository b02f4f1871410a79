//! # snapback - Tiered hard-link snapshots
//!
//! A snapshot backup library that keeps a rotating history of directory
//! trees as hourly, daily, weekly and monthly snapshots, with unchanged files
//! shared between snapshots through hard links.
//!
//! ## Overview
//!
//! snapback maintains a snapshot base directory that looks like this:
//!
//! ```text
//! .Snapshots/
//! ├── hour-0/      newest hourly snapshot
//! │   └── Documents/
//! ├── hour-1/ ... hour-23/
//! ├── day-0/ ... day-7/
//! ├── week-0/ ... week-4/
//! ├── month-0/ ... month-12/
//! └── release-1/   user tag, never rotated
//! ```
//!
//! Each snapshot holds one subdirectory per configured source directory,
//! named after the source's basename.
//!
//! ## Architecture
//!
//! - **Rotation**: [`RotationEngine`] shifts each tier's ring one slot older
//!   and promotes the oldest slot of the tier below. Promotions into the daily
//!   and monthly rings are renames; weekly promotions are hard-link copies so
//!   `day-N` survives.
//! - **Hard-link copies**: [`copy_with_hard_links`] mirrors a tree, linking
//!   every regular file instead of copying its bytes.
//! - **Sync**: file content moves through a [`Syncer`]; [`Rsync`] is the
//!   production implementation.
//! - **Path safety**: every path that is created, renamed or removed is
//!   checked against a [`WorkspaceContext`], which confines project-local
//!   configurations to their directory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapback::{Backup, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let store = config.store();
//! let workspace = config.workspace();
//! store.init()?;
//!
//! let backup = Backup::new(&store, &config.dirs, &workspace, config.syncer());
//! let report = backup.hourly(false)?;
//! println!("{} sources synced", report.sync.succeeded.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Recovery
//!
//! ```rust,no_run
//! use snapback::{Config, RecoveryOps};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let store = config.store();
//! let workspace = config.workspace();
//! let ops = RecoveryOps::new(&store, &config.dirs, &workspace, config.syncer());
//!
//! // Bring back deleted files without touching existing ones
//! ops.undelete("hour-3", false)?;
//!
//! // Keep a snapshot forever
//! ops.tag("day-0", "before-refactor", false)?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod compare;
pub mod config;
pub mod diff;
pub mod error;
pub mod gitignore;
pub mod hardlink;
pub mod history;
pub mod path_safety;
pub mod recovery;
pub mod rotation;
pub mod store;
pub mod sync;
pub mod tier;
pub mod utils;

// Re-export main types for convenience
pub use backup::{Backup, BackupReport};
pub use config::Config;
pub use error::{ErrorKind, Result, SnapbackError};
pub use hardlink::{copy_with_hard_links, LinkStats};
pub use path_safety::WorkspaceContext;
pub use recovery::{DeleteOutcome, RecoveryOps};
pub use rotation::{RotationEngine, RotationOp};
pub use store::{SnapshotInfo, SnapshotStore};
pub use sync::{Rsync, SyncMode, SyncRequest, SyncSummary, Syncer};
pub use tier::{Retention, SnapshotName, Tier};
