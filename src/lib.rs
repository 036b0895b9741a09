//! # ivm-harness - Boot and execution harness for streaming-query programs
//!
//! `ivm-harness` runs generated incremental-view-maintenance programs the
//! same way on a conventional OS and in an embedded, single-image deployment:
//!
//! - **Boot loader**: one RAM disk, an in-memory tar image unpacked onto it,
//!   then an in-process call into the harness with a fixed argument vector
//! - **Harness**: `--async` detection, program lifecycle, one final snapshot
//!   written as a tagged JSON record
//! - **Storage**: bitmap-allocated RAM disk with a path catalog on top
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ivm_harness::fs::{HostFs, SharedFs};
//! use ivm_harness::harness;
//! use ivm_harness::program::OrdersProgram;
//! use std::sync::Arc;
//!
//! # fn main() -> ivm_harness::harness::Result<()> {
//! let args: Vec<String> = std::env::args().collect();
//! let fs: SharedFs = Arc::new(HostFs::new("."));
//!
//! // Prints <snap>{...}</snap> on stdout
//! let status = harness::run_main::<OrdersProgram>(&args, fs)?;
//! std::process::exit(status);
//! # }
//! ```
//!
//! ## Embedded boot
//!
//! ```rust,no_run
//! use ivm_harness::{ArchiveImage, BootConfig, BootLoader, RamStorage};
//! use ivm_harness::harness;
//! use ivm_harness::program::OrdersProgram;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = std::fs::read("fs-root.tar")?;
//! let mut loader = BootLoader::new(BootConfig::default(), RamStorage::new());
//! let outcome = loader.boot(ArchiveImage::new(&image), &mut std::io::stdout(), |args, fs| {
//!     harness::run_main::<OrdersProgram>(args, fs)
//! })?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

// Storage primitives
pub mod core;

pub use crate::core::{allocator, catalog, device, error, fs, ramdisk, storage, untar};

pub mod boot;
pub mod harness;
pub mod program;

pub use crate::boot::{ArchiveImage, BootConfig, BootError, BootLoader, BootOutcome};
pub use crate::core::{
    device::{DeviceTable, RamDiskConfig},
    error::{ExtractError, Result, StorageError},
    fs::{FileSystem, HostFs, RamFs, SharedFs},
    storage::{RamStorage, StorageService},
    untar::{ExtractReport, ExtractStatus},
};
pub use crate::harness::{Harness, HarnessBuilder, HarnessError, Mode, Program, SnapshotSink};
