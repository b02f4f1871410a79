//! Tiers, slot names and age ordering
//!
//! A snapshot slot is named `<tier>-<index>` (`hour-0`, `day-6`, ...). Index 0
//! is the newest slot of its tier. Any other directory name in the snapshot
//! base is a tag.
//!
//! Slots are ordered by the approximate number of hours they lie in the past:
//!
//! | slot      | hours ago        |
//! |-----------|------------------|
//! | `hour-N`  | `N`              |
//! | `day-N`   | `(N + 1) * 24`   |
//! | `week-N`  | `(N + 1) * 168`  |
//! | `month-N` | `(N + 1) * 720`  |
//! | tag       | [`TAG_AGE`]      |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Age assigned to tags so they sort after every standard slot
pub const TAG_AGE: u64 = u64::MAX;

/// One of the four rotation tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// `hour-N`
    Hour,
    /// `day-N`
    Day,
    /// `week-N`
    Week,
    /// `month-N`
    Month,
}

impl Tier {
    /// All tiers from finest to coarsest
    pub const ALL: [Tier; 4] = [Tier::Hour, Tier::Day, Tier::Week, Tier::Month];

    /// Name prefix used on disk
    pub fn prefix(self) -> &'static str {
        match self {
            Tier::Hour => "hour",
            Tier::Day => "day",
            Tier::Week => "week",
            Tier::Month => "month",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Tier::ALL.into_iter().find(|t| t.prefix() == prefix)
    }

    /// Hours between two consecutive slots of this tier
    pub fn hours_per_slot(self) -> u64 {
        match self {
            Tier::Hour => 1,
            Tier::Day => 24,
            Tier::Week => 24 * 7,
            Tier::Month => 24 * 30,
        }
    }

    /// Slot `index` of this tier
    pub fn slot(self, index: u32) -> SnapshotName {
        SnapshotName::new(self, index)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A standard (rotated) snapshot slot name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotName {
    /// Tier the slot belongs to
    pub tier: Tier,
    /// Position in the tier, 0 is newest
    pub index: u32,
}

impl SnapshotName {
    /// Create a slot name
    pub fn new(tier: Tier, index: u32) -> Self {
        Self { tier, index }
    }

    /// Parse `hour-3` style names; anything else is `None`
    pub fn parse(name: &str) -> Option<Self> {
        let (prefix, digits) = name.split_once('-')?;
        let tier = Tier::from_prefix(prefix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index = digits.parse().ok()?;
        Some(Self { tier, index })
    }

    /// Approximate age of the slot in hours
    pub fn hours_ago(&self) -> u64 {
        match self.tier {
            Tier::Hour => u64::from(self.index),
            tier => (u64::from(self.index) + 1) * tier.hours_per_slot(),
        }
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tier.prefix(), self.index)
    }
}

impl FromStr for SnapshotName {
    type Err = crate::error::SnapbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SnapshotName::parse(s).ok_or_else(|| {
            crate::error::SnapbackError::invalid(format!("{:?} is not a standard snapshot name", s))
        })
    }
}

/// Whether `name` matches `^(hour|day|week|month)-\d+$`
///
/// Unlike [`SnapshotName::parse`] this does not care whether the index fits
/// in a `u32`, so an absurdly long index is still reserved.
pub fn is_standard_name(name: &str) -> bool {
    match name.split_once('-') {
        Some((prefix, digits)) => {
            Tier::from_prefix(prefix).is_some()
                && !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Hours ago for any directory name; tags get [`TAG_AGE`]
pub fn hours_ago(name: &str) -> u64 {
    SnapshotName::parse(name).map_or(TAG_AGE, |n| n.hours_ago())
}

/// Stable sort, newest first, tags last in their original order
pub fn sort_by_age<T: AsRef<str>>(names: &mut [T]) {
    names.sort_by_key(|name| hours_ago(name.as_ref()));
}

/// Highest slot index kept per tier
///
/// Each tier holds slots `0..=count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    /// `hsnaps`
    pub hourly: u32,
    /// `dsnaps`
    pub daily: u32,
    /// `wsnaps`
    pub weekly: u32,
    /// `msnaps`
    pub monthly: u32,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            hourly: 23,
            daily: 7,
            weekly: 4,
            monthly: 12,
        }
    }
}

impl Retention {
    /// Highest index of `tier`
    pub fn count(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Hour => self.hourly,
            Tier::Day => self.daily,
            Tier::Week => self.weekly,
            Tier::Month => self.monthly,
        }
    }

    /// The oldest slot of `tier`
    pub fn last(&self, tier: Tier) -> SnapshotName {
        tier.slot(self.count(tier))
    }

    /// Every slot of `tier`, newest first
    pub fn slots(&self, tier: Tier) -> impl Iterator<Item = SnapshotName> {
        (0..=self.count(tier)).map(move |i| tier.slot(i))
    }

    /// Every slot of every tier
    pub fn all_slots(&self) -> impl Iterator<Item = SnapshotName> + '_ {
        Tier::ALL.into_iter().flat_map(move |tier| self.slots(tier))
    }
}
