//! RAM disk configuration records
//!
//! A device table is an ordered list of [`RamDiskConfig`] records, each naming
//! a block size and a block count. The boot path always declares exactly one
//! record; capacity is a static engineering parameter sized generously above
//! the unpacked archive, never computed from it.

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};

/// Size of the boot RAM disk in MiB
pub const RAMDISK_SIZE_MB: u64 = 48;

/// Block size of the boot RAM disk in bytes
pub const RAMDISK_BLOCK_SIZE: u32 = 512;

/// Number of blocks in the boot RAM disk
pub const RAMDISK_BLOCK_NUM: u64 = RAMDISK_SIZE_MB * 1024 * 1024 / RAMDISK_BLOCK_SIZE as u64;

/// Largest block size a device may declare
pub const MAX_BLOCK_SIZE: u32 = 64 * 1024;

/// Largest capacity a device may declare (4 GiB)
pub const MAX_CAPACITY: u64 = 4 * 1024 * 1024 * 1024;

/// One RAM-backed block device
///
/// Total capacity is `block_size * block_num` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamDiskConfig {
    /// Block size in bytes
    pub block_size: u32,

    /// Number of blocks
    pub block_num: u64,
}

impl RamDiskConfig {
    pub const fn new(block_size: u32, block_num: u64) -> Self {
        RamDiskConfig {
            block_size,
            block_num,
        }
    }

    /// Capacity in bytes, `None` on overflow
    pub fn checked_capacity(&self) -> Option<u64> {
        (self.block_size as u64).checked_mul(self.block_num)
    }

    /// Capacity in bytes (saturating; exact for any validated record)
    pub fn capacity(&self) -> u64 {
        self.checked_capacity().unwrap_or(u64::MAX)
    }

    /// Number of blocks needed to hold `size` bytes
    pub fn blocks_for(&self, size: u64) -> usize {
        let block_size = self.block_size as u64;
        ((size + block_size - 1) / block_size) as usize
    }

    /// Validate block size and count
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0
            || !self.block_size.is_power_of_two()
            || self.block_size > MAX_BLOCK_SIZE
        {
            return Err(StorageError::InvalidBlockSize(self.block_size));
        }

        let within_limits = self
            .checked_capacity()
            .is_some_and(|capacity| capacity <= MAX_CAPACITY);
        if self.block_num == 0 || !within_limits || usize::try_from(self.block_num).is_err() {
            return Err(StorageError::InvalidBlockCount(self.block_num));
        }

        Ok(())
    }
}

impl Default for RamDiskConfig {
    fn default() -> Self {
        RamDiskConfig::new(RAMDISK_BLOCK_SIZE, RAMDISK_BLOCK_NUM)
    }
}

/// Ordered device table handed to the storage service at boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTable {
    records: Vec<RamDiskConfig>,
}

impl DeviceTable {
    /// Table with a single device
    pub fn single(config: RamDiskConfig) -> Self {
        DeviceTable {
            records: vec![config],
        }
    }

    pub fn from_records(records: Vec<RamDiskConfig>) -> Self {
        DeviceTable { records }
    }

    pub fn records(&self) -> &[RamDiskConfig] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The one device this system supports
    ///
    /// Fails unless the table holds exactly one valid record.
    pub fn sole(&self) -> Result<RamDiskConfig> {
        match self.records.as_slice() {
            [config] => {
                config.validate()?;
                Ok(*config)
            }
            records => Err(StorageError::DeviceCount(records.len())),
        }
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        DeviceTable::single(RamDiskConfig::default())
    }
}
