//! Property-based testing for snapback
//!
//! Uses proptest to check age ordering, slot naming and the ring
//! invariants of rotation across randomly generated inputs.

use ::snapback::tier::{hours_ago, is_standard_name, sort_by_age, TAG_AGE};
use ::snapback::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn tier_strategy() -> impl Strategy<Value = Tier> {
    prop_oneof![
        Just(Tier::Hour),
        Just(Tier::Day),
        Just(Tier::Week),
        Just(Tier::Month),
    ]
}

/// Slot names and tag-like names mixed together
fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (tier_strategy(), 0u32..50).prop_map(|(tier, i)| tier.slot(i).to_string()),
        "[a-z]{1,8}(-[a-z0-9]{1,4})?",
    ]
}

fn small_retention() -> Retention {
    Retention {
        hourly: 4,
        daily: 3,
        weekly: 2,
        monthly: 2,
    }
}

/// Write a marker file into every listed slot and return slot -> marker
fn populate(base: &Path, slots: &[SnapshotName]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut markers = BTreeMap::new();
    for slot in slots {
        let dir = base.join(slot.to_string());
        fs::create_dir_all(&dir)?;
        let marker = format!("from {}", slot);
        fs::write(dir.join("marker"), &marker)?;
        markers.insert(slot.to_string(), marker);
    }
    Ok(markers)
}

fn marker_at(base: &Path, slot: &str) -> Option<String> {
    fs::read_to_string(base.join(slot).join("marker")).ok()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sorted_names_are_newest_first(mut names in prop::collection::vec(name_strategy(), 0..30)) {
        sort_by_age(&mut names);

        let ages: Vec<u64> = names.iter().map(|n| hours_ago(n)).collect();
        prop_assert!(ages.windows(2).all(|w| w[0] <= w[1]));

        // Tags come after every slot
        if let Some(first_tag) = ages.iter().position(|&a| a == TAG_AGE) {
            prop_assert!(ages[first_tag..].iter().all(|&a| a == TAG_AGE));
        }
    }

    #[test]
    fn prop_slot_names_parse_back(tier in tier_strategy(), index in 0u32..10_000) {
        let name = tier.slot(index).to_string();

        prop_assert!(is_standard_name(&name));
        let parsed = SnapshotName::parse(&name).unwrap();
        prop_assert_eq!(parsed.tier, tier);
        prop_assert_eq!(parsed.index, index);
        prop_assert_eq!(parsed.hours_ago(), hours_ago(&name));
    }

    #[test]
    fn prop_older_index_is_older(tier in tier_strategy(), index in 0u32..10_000) {
        prop_assert!(tier.slot(index).hours_ago() < tier.slot(index + 1).hours_ago());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_hourly_rotation_shifts_every_slot(present in prop::collection::vec(any::<bool>(), 5)) {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("snaps");
        let retention = small_retention();
        let slots: Vec<SnapshotName> = (0..=retention.hourly)
            .filter(|&i| present[i as usize])
            .map(|i| Tier::Hour.slot(i))
            .collect();
        let markers = populate(&base, &slots).unwrap();

        RotationEngine::new(&base, retention, WorkspaceContext::global())
            .rotate_hourly(false)
            .unwrap();

        prop_assert!(!base.join("hour-0").exists());
        for i in 0..retention.hourly {
            let expected = markers.get(&format!("hour-{}", i)).cloned();
            prop_assert_eq!(marker_at(&base, &format!("hour-{}", i + 1)), expected);
        }
        // Nothing is ever created past the last slot
        let past = format!("hour-{}", retention.hourly + 1);
        prop_assert!(!base.join(past).exists());
    }

    #[test]
    fn prop_daily_rotation_keeps_or_evicts(
        hours in prop::collection::vec(any::<bool>(), 5),
        days in prop::collection::vec(any::<bool>(), 4),
        week0 in any::<bool>(),
    ) {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("snaps");
        let retention = small_retention();
        let mut slots: Vec<SnapshotName> = Vec::new();
        slots.extend((0..=retention.hourly).filter(|&i| hours[i as usize]).map(|i| Tier::Hour.slot(i)));
        slots.extend((0..=retention.daily).filter(|&i| days[i as usize]).map(|i| Tier::Day.slot(i)));
        if week0 {
            slots.push(Tier::Week.slot(0));
        }
        let markers = populate(&base, &slots).unwrap();
        let oldest_day = format!("day-{}", retention.daily);
        let oldest_hour = format!("hour-{}", retention.hourly);

        RotationEngine::new(&base, retention, WorkspaceContext::global())
            .rotate_daily(false)
            .unwrap();

        // Days shift by one and the oldest hour becomes day-0
        prop_assert_eq!(marker_at(&base, "day-0"), markers.get(&oldest_hour).cloned());
        for i in 0..retention.daily {
            let expected = markers.get(&format!("day-{}", i)).cloned();
            prop_assert_eq!(marker_at(&base, &format!("day-{}", i + 1)), expected);
        }
        prop_assert!(!base.join(&oldest_hour).exists());

        // The oldest day moves into an empty week-0, otherwise it is dropped
        let expected_week0 = if week0 {
            markers.get("week-0").cloned()
        } else {
            markers.get(&oldest_day).cloned()
        };
        prop_assert_eq!(marker_at(&base, "week-0"), expected_week0);

        // Every other hour is untouched
        for i in 0..retention.hourly {
            let slot = format!("hour-{}", i);
            prop_assert_eq!(marker_at(&base, &slot), markers.get(&slot).cloned());
        }
    }

    #[test]
    fn prop_dry_run_matches_execution(present in prop::collection::vec(any::<bool>(), 4)) {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("snaps");
        let retention = small_retention();
        let slots: Vec<SnapshotName> = (0..=retention.weekly)
            .filter(|&i| present[i as usize])
            .map(|i| Tier::Week.slot(i))
            .chain(present[3].then(|| Tier::Day.slot(retention.daily)))
            .collect();
        populate(&base, &slots).unwrap();
        let engine = RotationEngine::new(&base, retention, WorkspaceContext::global());

        let planned = engine.rotate_weekly(true).unwrap();
        for slot in &slots {
            prop_assert!(base.join(slot.to_string()).is_dir());
        }
        let executed = engine.rotate_weekly(false).unwrap();

        prop_assert_eq!(planned, executed);
    }
}
