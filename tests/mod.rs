//! Main test module for snapback
//!
//! This module includes all test suites:
//! - Integration tests for backup, rotation and recovery scenarios
//! - Property-based tests for ordering and ring invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::snapback::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_rotation_on_missing_base_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path().join("never-created"), Retention::default());

        for tier in Tier::ALL {
            let ops = store.engine(WorkspaceContext::global()).rotate(tier, false).unwrap();
            assert!(ops.is_empty(), "{} rotation did something", tier);
        }
        assert!(store.snapshots_by_age().unwrap().is_empty());
    }

    #[test]
    fn test_special_directory_names_survive_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path().join("snaps"), Retention::default());
        store.init().unwrap();

        let names = [
            "dir with spaces",
            "dir-with-dashes",
            "dir.with.dots",
            "dir(with)parens",
            "файл",
            "文件",
        ];
        let mut created = Vec::new();
        for name in names {
            let dir = store.path_of("hour-0").join(name);
            if fs::create_dir_all(&dir).is_ok() && fs::write(dir.join("f.txt"), name).is_ok() {
                created.push(name);
            }
        }

        store.engine(WorkspaceContext::global()).rotate_hourly(false).unwrap();

        for name in created {
            let moved = store.path_of("hour-1").join(name).join("f.txt");
            assert_eq!(fs::read_to_string(&moved).unwrap(), name);
        }
    }

    #[test]
    fn test_hard_link_copy_of_empty_tree() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("a/b/c")).unwrap();

        let stats = copy_with_hard_links(&src, &temp_dir.path().join("dst")).unwrap();

        assert_eq!(stats.files(), 0);
        assert_eq!(stats.dirs, 3);
        assert!(temp_dir.path().join("dst/a/b/c").is_dir());
    }

    #[test]
    fn test_tag_named_like_a_slot_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path().join("snaps"), Retention::default());
        store.init().unwrap();
        let workspace = WorkspaceContext::global();
        let ops = RecoveryOps::new(&store, &[], &workspace, Rsync::new());

        for name in ["hour-5", "day-0", "week-100", "month-1"] {
            let err = ops.tag("hour-0", name, false).unwrap_err();
            assert!(
                matches!(err, SnapbackError::StandardSnapshotName(_)),
                "{} was accepted as a tag",
                name
            );
        }
        for name in ["hour-", "days-1", "hour-1a", "Hour-1"] {
            ops.tag("hour-0", name, false).unwrap();
        }
        assert_eq!(ops.list_tags().unwrap(), vec!["Hour-1", "days-1", "hour-", "hour-1a"]);
    }
}
