//! Four-tier rotation state machine
//!
//! Each rotation call loads the presence of every slot once, plans the
//! transition against that simulated state, and then executes the plan in
//! order. A dry run returns the identical plan without touching the disk.
//!
//! ## Transitions
//!
//! With `N_h`, `N_d`, `N_w`, `N_m` the retention counts:
//!
//! - **hourly**: delete `hour-N_h`, shift `hour-i -> hour-(i+1)`. `hour-0` is
//!   left empty for the next ingest.
//! - **daily**: `day-N_d` becomes `week-0` by *rename* when `week-0` is free,
//!   otherwise it is deleted; shift days; `hour-N_h -> day-0`.
//! - **weekly**: `week-N_w` becomes `month-0` by rename when free, otherwise it
//!   is deleted; shift weeks; then `week-0` is replaced by a *hard-link copy*
//!   of `day-N_d`, which stays in place.
//! - **monthly**: delete `month-N_m`, shift months, `week-N_w -> month-0`.
//!
//! Missing source slots are skipped. A slot name taken by anything other
//! than a directory fails the rotation before any step runs. Every delete goes through
//! [`safe_remove`]; every rename and copy validates both ends against the
//! workspace.

use crate::error::{Result, SnapbackError};
use crate::hardlink::copy_with_hard_links;
use crate::path_safety::{safe_remove, WorkspaceContext};
use crate::tier::{Retention, SnapshotName, Tier};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One filesystem step of a rotation plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RotationOp {
    /// Remove a slot recursively
    Delete {
        /// Slot directory
        path: PathBuf,
    },
    /// Move a slot to a new name
    Rename {
        /// Current location
        from: PathBuf,
        /// New location
        to: PathBuf,
    },
    /// Duplicate a slot with [`copy_with_hard_links`]
    HardLinkCopy {
        /// Slot to duplicate
        from: PathBuf,
        /// Destination slot
        to: PathBuf,
    },
}

impl fmt::Display for RotationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationOp::Delete { path } => write!(f, "delete {}", path.display()),
            RotationOp::Rename { from, to } => {
                write!(f, "rename {} -> {}", from.display(), to.display())
            }
            RotationOp::HardLinkCopy { from, to } => {
                write!(f, "hard-link copy {} -> {}", from.display(), to.display())
            }
        }
    }
}

/// Plans transitions against a simulated slot presence set
struct Planner<'a> {
    base: &'a Path,
    present: HashSet<SnapshotName>,
    ops: Vec<RotationOp>,
}

impl<'a> Planner<'a> {
    fn load(base: &'a Path, retention: &Retention) -> Self {
        let present = retention
            .all_slots()
            .filter(|slot| base.join(slot.to_string()).is_dir())
            .collect();
        Self {
            base,
            present,
            ops: Vec::new(),
        }
    }

    fn path(&self, slot: SnapshotName) -> PathBuf {
        self.base.join(slot.to_string())
    }

    fn has(&self, slot: SnapshotName) -> bool {
        self.present.contains(&slot)
    }

    fn delete(&mut self, slot: SnapshotName) {
        if self.present.remove(&slot) {
            self.ops.push(RotationOp::Delete { path: self.path(slot) });
        }
    }

    fn rename(&mut self, from: SnapshotName, to: SnapshotName) {
        if self.present.remove(&from) {
            self.present.insert(to);
            self.ops.push(RotationOp::Rename {
                from: self.path(from),
                to: self.path(to),
            });
        }
    }

    fn link_copy(&mut self, from: SnapshotName, to: SnapshotName) {
        if self.has(from) {
            self.present.insert(to);
            self.ops.push(RotationOp::HardLinkCopy {
                from: self.path(from),
                to: self.path(to),
            });
        }
    }

    /// Move `slot-i` to `slot-(i+1)` for i = count-1 down to 0
    fn shift(&mut self, tier: Tier, count: u32) {
        for i in (0..count).rev() {
            self.rename(tier.slot(i), tier.slot(i + 1));
        }
    }

    /// Move the oldest slot of `from` into slot 0 of `into`, or drop it if occupied
    fn promote_or_drop(&mut self, from: SnapshotName, into: Tier) {
        let head = into.slot(0);
        if self.has(head) {
            self.delete(from);
        } else {
            self.rename(from, head);
        }
    }
}

/// Executes tier rotations for one snapshot base
#[derive(Debug, Clone)]
pub struct RotationEngine {
    base: PathBuf,
    retention: Retention,
    workspace: WorkspaceContext,
}

impl RotationEngine {
    /// Create an engine over `base`
    pub fn new(base: impl Into<PathBuf>, retention: Retention, workspace: WorkspaceContext) -> Self {
        Self {
            base: base.into(),
            retention,
            workspace,
        }
    }

    /// Snapshot base directory
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Compute the operations a rotation of `tier` would perform right now
    pub fn plan(&self, tier: Tier) -> Vec<RotationOp> {
        let r = &self.retention;
        let mut planner = Planner::load(&self.base, r);

        match tier {
            Tier::Hour => {
                planner.delete(r.last(Tier::Hour));
                planner.shift(Tier::Hour, r.hourly);
            }
            Tier::Day => {
                planner.promote_or_drop(r.last(Tier::Day), Tier::Week);
                planner.shift(Tier::Day, r.daily);
                planner.rename(r.last(Tier::Hour), Tier::Day.slot(0));
            }
            Tier::Week => {
                planner.promote_or_drop(r.last(Tier::Week), Tier::Month);
                planner.shift(Tier::Week, r.weekly);
                let oldest_day = r.last(Tier::Day);
                if planner.has(oldest_day) {
                    planner.delete(Tier::Week.slot(0));
                    planner.link_copy(oldest_day, Tier::Week.slot(0));
                }
            }
            Tier::Month => {
                planner.delete(r.last(Tier::Month));
                planner.shift(Tier::Month, r.monthly);
                planner.rename(r.last(Tier::Week), Tier::Month.slot(0));
            }
        }

        planner.ops
    }

    /// Rotate `tier`, returning the executed (or, for a dry run, planned) operations
    pub fn rotate(&self, tier: Tier, dry_run: bool) -> Result<Vec<RotationOp>> {
        self.check_slots()?;
        let ops = self.plan(tier);
        if dry_run {
            for op in &ops {
                info!("[dry-run] would {}", op);
            }
            return Ok(ops);
        }

        for op in &ops {
            self.apply(op)?;
        }
        info!("Rotated {} tier ({} operations)", tier, ops.len());
        Ok(ops)
    }

    /// Rotate the hourly ring
    pub fn rotate_hourly(&self, dry_run: bool) -> Result<Vec<RotationOp>> {
        self.rotate(Tier::Hour, dry_run)
    }

    /// Rotate the daily ring, promoting the oldest hour
    pub fn rotate_daily(&self, dry_run: bool) -> Result<Vec<RotationOp>> {
        self.rotate(Tier::Day, dry_run)
    }

    /// Rotate the weekly ring, seeding `week-0` from the oldest day
    pub fn rotate_weekly(&self, dry_run: bool) -> Result<Vec<RotationOp>> {
        self.rotate(Tier::Week, dry_run)
    }

    /// Rotate the monthly ring, promoting the oldest week
    pub fn rotate_monthly(&self, dry_run: bool) -> Result<Vec<RotationOp>> {
        self.rotate(Tier::Month, dry_run)
    }

    fn check_slots(&self) -> Result<()> {
        for slot in self.retention.all_slots() {
            let path = self.base.join(slot.to_string());
            if fs::symlink_metadata(&path).is_ok() && !path.is_dir() {
                return Err(SnapbackError::invalid(format!(
                    "{} exists but is not a snapshot directory; remove it before rotating",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn apply(&self, op: &RotationOp) -> Result<()> {
        debug!("Rotation: {}", op);
        match op {
            RotationOp::Delete { path } => safe_remove(path, &self.workspace, "rotation delete"),
            RotationOp::Rename { from, to } => {
                self.workspace.validate(from, "rotation rename source")?;
                self.workspace.validate(to, "rotation rename destination")?;
                fs::rename(from, to)?;
                Ok(())
            }
            RotationOp::HardLinkCopy { from, to } => {
                self.workspace.validate(from, "rotation copy source")?;
                self.workspace.validate(to, "rotation copy destination")?;
                copy_with_hard_links(from, to)?;
                Ok(())
            }
        }
    }
}
