//! Property-based tests for argument handling and RAM disk storage
//!
//! Uses proptest to check invariants across many random inputs

use ivm_harness::catalog;
use ivm_harness::fs::{FileSystem, RamFs};
use ivm_harness::harness::{async_mode, Mode};
use ivm_harness::RamDiskConfig;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn flag() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("--iterations=10".to_string()),
        Just("--log-count=1".to_string()),
        Just("--async=1".to_string()),
        Just("-async".to_string()),
        Just("async".to_string()),
        "[a-z-]{0,12}",
    ]
}

proptest! {
    #[test]
    fn prop_async_detected_anywhere(
        mut flags in prop::collection::vec(flag(), 0..10),
        position in any::<prop::sample::Index>(),
        with_async in any::<bool>(),
    ) {
        flags.retain(|f| f != "--async");
        if with_async {
            let at = position.index(flags.len() + 1);
            flags.insert(at, "--async".to_string());
        }

        let mut args = vec!["program".to_string()];
        args.extend(flags);

        prop_assert_eq!(async_mode(&args), with_async);
        prop_assert_eq!(Mode::detect(&args) == Mode::Async, with_async);
    }

    #[test]
    fn prop_program_name_never_selects_async(
        flags in prop::collection::vec(flag(), 0..6),
    ) {
        let mut args = vec!["--async".to_string()];
        args.extend(flags.into_iter().filter(|f| f != "--async"));
        prop_assert!(!async_mode(&args));
    }

    #[test]
    fn prop_normalized_paths_are_absolute_and_clean(
        parts in prop::collection::vec("[a-z0-9.]{0,6}", 0..8),
    ) {
        let raw = parts.join("/");
        match catalog::normalize(&raw) {
            Ok(path) => {
                prop_assert!(path.starts_with('/'));
                prop_assert!(!path.contains("//"));
                prop_assert!(path == "/" || !path.ends_with('/'));
                prop_assert!(!path.split('/').any(|c| c == ".." || c == "."));
            }
            Err(_) => prop_assert!(parts.iter().any(|p| p == "..")),
        }
    }

    #[test]
    fn prop_ram_fs_preserves_content_and_space(
        files in prop::collection::btree_map("[a-z]{1,8}", prop::collection::vec(any::<u8>(), 0..3000), 1..12),
    ) {
        let fs = RamFs::new(RamDiskConfig::new(512, 256)).unwrap();
        let initial_free = fs.free_bytes();

        for (name, content) in &files {
            fs.write(&format!("/files/{}", name), content, 0o644).unwrap();
        }

        let used: u64 = files
            .values()
            .map(|c| (c.len() as u64 + 511) / 512 * 512)
            .sum();
        prop_assert_eq!(fs.free_bytes(), initial_free - used);

        for (name, content) in &files {
            prop_assert_eq!(&fs.read(&format!("files/{}", name)).unwrap(), content);
        }

        // Overwriting with empty content gives every block back
        for name in files.keys() {
            fs.write(&format!("/files/{}", name), b"", 0o644).unwrap();
        }
        prop_assert_eq!(fs.free_bytes(), initial_free);

        let listed: BTreeMap<String, ()> = fs
            .list("/files")
            .unwrap()
            .into_iter()
            .map(|n| (n, ()))
            .collect();
        prop_assert_eq!(listed.len(), files.len());
    }
}
