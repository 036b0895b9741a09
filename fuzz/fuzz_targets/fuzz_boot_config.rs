#![no_main]
use ivm_harness::boot::BootConfig;
use ivm_harness::fs::RamFs;
use libfuzzer_sys::fuzz_target;

// Any configuration that parses must describe exactly one device that can
// actually be formatted.
fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(config) = BootConfig::from_toml_str(input) {
        let device = config.device_table().sole().unwrap();
        assert!(device.block_size.is_power_of_two());
        assert!(device.block_num > 0);
        assert_eq!(config.program.to_argv()[0], config.program.name);

        let fs = RamFs::new(device).unwrap();
        assert_eq!(fs.capacity(), device.capacity());
    }
});
