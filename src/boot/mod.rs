//! Boot loader for embedded deployments
//!
//! Brings up the single RAM disk, unpacks the archive image that carries the
//! program's input files, and then hands control to the harness entry with a
//! fixed argument vector. The loader touches storage exactly once; a second
//! [`BootLoader::boot`] on the same storage is rejected by the service.
//!
//! ```rust,no_run
//! use ivm_harness::boot::{ArchiveImage, BootConfig, BootLoader};
//! use ivm_harness::harness;
//! use ivm_harness::program::OrdersProgram;
//! use ivm_harness::storage::RamStorage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = std::fs::read("fs-root.tar")?;
//! let mut loader = BootLoader::new(BootConfig::default(), RamStorage::new());
//!
//! let outcome = loader.boot(
//!     ArchiveImage::new(&image),
//!     &mut std::io::stdout(),
//!     |args, fs| harness::run_main::<OrdersProgram>(args, fs),
//! )?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

pub mod config;

pub use config::{BootConfig, ConfigError, ProgramArgs};

use crate::error::StorageError;
use crate::fs::SharedFs;
use crate::harness::{self, HarnessError};
use crate::storage::StorageService;
use crate::untar::{ExtractReport, ExtractStatus};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use thiserror::Error;
use tracing::{error, info};

/// Exit code after the program returned
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code when the archive image could not be unpacked
pub const EXIT_STORAGE_FAILURE: i32 = 1;

#[derive(Error, Debug)]
pub enum BootError {
    #[error("Console error: {0}")]
    Console(#[from] io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Harness error: {0}")]
    Harness(#[from] HarnessError),
}

/// Tar archive linked into the boot image
#[derive(Debug, Clone, Copy)]
pub struct ArchiveImage<'a> {
    bytes: &'a [u8],
}

impl<'a> ArchiveImage<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ArchiveImage { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Hex SHA-256 of the image
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.bytes))
    }
}

/// How a boot ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// Filesystem populated and the program returned
    Completed {
        report: ExtractReport,
        harness_status: i32,
    },
    /// Extraction failed; the program was never started
    StorageFailure { status: ExtractStatus },
}

impl BootOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            BootOutcome::Completed { .. } => EXIT_SUCCESS,
            BootOutcome::StorageFailure { .. } => EXIT_STORAGE_FAILURE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BootOutcome::Completed { .. })
    }
}

/// Single-shot boot sequence over an injected storage service
pub struct BootLoader<S: StorageService> {
    config: BootConfig,
    storage: S,
}

impl<S: StorageService> BootLoader<S> {
    pub fn new(config: BootConfig, storage: S) -> Self {
        BootLoader { config, storage }
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Argument vector passed to the harness entry
    pub fn argv(&self) -> Vec<String> {
        self.config.program.to_argv()
    }

    /// Populate storage from `image` and call `entry`
    ///
    /// Banner and progress go to `console`. An extraction failure prints its
    /// status and returns [`BootOutcome::StorageFailure`] without calling
    /// `entry`. The harness status is recorded but does not change the exit
    /// code once the program has returned.
    pub fn boot<F>(
        &mut self,
        image: ArchiveImage<'_>,
        console: &mut dyn Write,
        entry: F,
    ) -> Result<BootOutcome, BootError>
    where
        F: FnOnce(&[String], SharedFs) -> harness::Result<i32>,
    {
        let name = self.config.program.name.clone();

        writeln!(console, "Welcome to {} on ivm-harness", name)?;
        writeln!(console, "Populating filesystem")?;

        info!(
            "Archive image: {} bytes, sha256 {}",
            image.len(),
            image.digest()
        );

        self.storage.configure(&self.config.device_table())?;

        let report = match self.storage.untar_from_memory(image.as_bytes(), console) {
            Ok(report) => report,
            Err(e) => {
                let status = e.status();
                error!("Extraction failed: {}", e);
                writeln!(
                    console,
                    "Internal error: Can't unpack tar filesystem: {}",
                    status.code()
                )?;
                console.flush()?;
                return Ok(BootOutcome::StorageFailure { status });
            }
        };

        let fs = self.storage.filesystem()?;
        let argv = self.argv();

        writeln!(console, "Running {}", name)?;
        console.flush()?;
        info!("Dispatching {:?}", argv);

        let harness_status = entry(&argv, fs)?;

        writeln!(console, "{} finished", name)?;
        console.flush()?;
        info!("Program returned status {}", harness_status);

        Ok(BootOutcome::Completed {
            report,
            harness_status,
        })
    }
}
