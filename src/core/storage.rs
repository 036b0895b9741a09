//! Storage service injected into the boot sequence
//!
//! The boot loader never touches device globals directly. It hands a
//! [`DeviceTable`] to a [`StorageService`], asks it to unpack the archive
//! image, and then takes the mounted filesystem from it.

use crate::device::DeviceTable;
use crate::error::{ExtractError, Result, StorageError};
use crate::fs::{RamFs, SharedFs};
use crate::untar::{self, ExtractReport};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

/// Block-device and archive primitives of the target platform
pub trait StorageService {
    /// Register the device table; called exactly once per boot
    fn configure(&mut self, devices: &DeviceTable) -> Result<()>;

    /// Unpack an in-memory tar image onto the configured device
    fn untar_from_memory(
        &mut self,
        image: &[u8],
        printer: &mut dyn Write,
    ) -> std::result::Result<ExtractReport, ExtractError>;

    /// The filesystem populated by extraction
    fn filesystem(&self) -> Result<SharedFs>;
}

/// In-process storage service backed by a [`RamFs`]
#[derive(Default)]
pub struct RamStorage {
    fs: Option<Arc<RamFs>>,
}

impl RamStorage {
    pub fn new() -> Self {
        RamStorage::default()
    }

    /// Concrete handle to the RAM filesystem, for inspection
    pub fn ram_fs(&self) -> Option<&Arc<RamFs>> {
        self.fs.as_ref()
    }
}

impl StorageService for RamStorage {
    fn configure(&mut self, devices: &DeviceTable) -> Result<()> {
        if self.fs.is_some() {
            return Err(StorageError::AlreadyConfigured);
        }

        let config = devices.sole()?;
        info!(
            "Configuring RAM disk: {} x {} bytes ({} bytes total)",
            config.block_num,
            config.block_size,
            config.capacity()
        );

        self.fs = Some(Arc::new(RamFs::new(config)?));
        Ok(())
    }

    fn untar_from_memory(
        &mut self,
        image: &[u8],
        printer: &mut dyn Write,
    ) -> std::result::Result<ExtractReport, ExtractError> {
        let fs = self.fs.as_ref().ok_or(StorageError::NoDevice)?;
        untar::untar_from_memory(image, fs, printer)
    }

    fn filesystem(&self) -> Result<SharedFs> {
        match &self.fs {
            Some(fs) => Ok(fs.clone() as SharedFs),
            None => Err(StorageError::NoDevice),
        }
    }
}
