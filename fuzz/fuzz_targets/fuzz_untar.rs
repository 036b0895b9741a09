#![no_main]
use ivm_harness::fs::{FileSystem, RamFs};
use ivm_harness::untar::untar_from_memory;
use ivm_harness::RamDiskConfig;
use libfuzzer_sys::fuzz_target;

// Arbitrary archive images must either extract or fail with a status code,
// never panic, and never place entries outside the root.
fuzz_target!(|data: &[u8]| {
    let fs = match RamFs::new(RamDiskConfig::new(512, 256)) {
        Ok(fs) => fs,
        Err(_) => return,
    };

    match untar_from_memory(data, &fs, &mut std::io::sink()) {
        Ok(_) => {
            for path in fs.walk() {
                assert!(path.starts_with('/'));
                assert!(!path.split('/').any(|c| c == ".."));
                let _ = fs.read(&path);
            }
        }
        Err(e) => assert_ne!(e.status().code(), 0),
    }
});
