//! Conventional process entry for a query program
//!
//! Input files are read from the host directory named by `IVM_FS_ROOT`
//! (current directory when unset). Every argument is forwarded to the
//! harness; snapshots go to stdout, logs to stderr.

use anyhow::Context;
use ivm_harness::fs::{HostFs, SharedFs};
use ivm_harness::harness;
use ivm_harness::program::OrdersProgram;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Root directory for program input files
const FS_ROOT_ENV: &str = "IVM_FS_ROOT";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let root = std::env::var_os(FS_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Filesystem root: {}", root.display());

    let fs: SharedFs = Arc::new(HostFs::new(&root));
    let args: Vec<String> = std::env::args().collect();

    let status = harness::run_main::<OrdersProgram>(&args, fs)
        .with_context(|| format!("query program failed (fs root {})", root.display()))?;

    std::process::exit(status);
}
