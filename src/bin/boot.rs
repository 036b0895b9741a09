//! Embedded deployment entry
//!
//! Boots from the `fs-root/` archive packed into the binary at build time:
//! RAM disk, untar, then the query program with the configured arguments.

use anyhow::Context;
use clap::Parser;
use ivm_harness::boot::{ArchiveImage, BootConfig, BootLoader};
use ivm_harness::harness;
use ivm_harness::program::OrdersProgram;
use ivm_harness::storage::RamStorage;
use std::path::PathBuf;
use tracing::info;

static FS_ROOT_TAR: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/fs-root.tar"));

#[derive(Parser, Debug)]
#[command(name = "ivm-boot")]
#[command(about = "Boot a query program from its embedded filesystem image")]
struct Args {
    /// Boot configuration (TOML); built-in defaults when omitted
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BootConfig::from_file(path)
            .with_context(|| format!("loading boot config {}", path.display()))?,
        None => BootConfig::default(),
    };
    info!("Boot configuration: {:?}", config);

    let mut loader = BootLoader::new(config, RamStorage::new());
    let stdout = std::io::stdout();
    let mut console = stdout.lock();

    let outcome = loader
        .boot(ArchiveImage::new(FS_ROOT_TAR), &mut console, |argv, fs| {
            harness::run_main::<OrdersProgram>(argv, fs)
        })
        .context("boot failed")?;

    drop(console);
    std::process::exit(outcome.exit_code());
}
