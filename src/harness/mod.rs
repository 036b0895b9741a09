//! Execution and snapshot harness
//!
//! Drives a [`Program`] through its lifecycle:
//!
//! ```text
//! from_args -> init -> run(blocking) -> [poll snapshots] -> final snapshot
//! ```
//!
//! The only argument the harness interprets is `--async`. Everything else is
//! handed to the program untouched.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ivm_harness::fs::{HostFs, SharedFs};
//! use ivm_harness::harness::Harness;
//! use ivm_harness::program::OrdersProgram;
//! use std::sync::Arc;
//!
//! # fn main() -> ivm_harness::harness::Result<()> {
//! let args: Vec<String> = std::env::args().collect();
//! let fs: SharedFs = Arc::new(HostFs::new("fs-root"));
//!
//! let harness = Harness::builder().live_polling(true).build();
//! let status = harness.run::<OrdersProgram>(&args, fs, &mut std::io::stdout())?;
//! std::process::exit(status);
//! # }
//! ```

pub mod error;
pub mod serialize;

pub use error::{HarnessError, ProgramFailure, Result};

use crate::fs::SharedFs;
use serde::Serialize;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, info};

/// Flag selecting asynchronous execution
pub const ASYNC_FLAG: &str = "--async";

/// Process status for a completed run
pub const EXIT_SUCCESS: i32 = 0;

/// Tag of the final snapshot record
pub const SNAPSHOT_TAG: &str = "snap";

/// Environment variable that enables live snapshot polling
pub const LIVE_POLLING_ENV: &str = "IVM_LIVE_POLLING";

/// Environment variable selecting the final snapshot sink (`serialize` or `log-buffer`)
pub const SNAPSHOT_SINK_ENV: &str = "IVM_SNAPSHOT_SINK";

/// A generated streaming-query program
///
/// The harness treats implementations as opaque state machines. When
/// [`run`](Program::run) is called with `blocking == false` the program must
/// continue on a worker of its own, and [`snapshot`](Program::snapshot) must
/// stay safe to call while that worker mutates state.
pub trait Program: Sized {
    /// Point-in-time copy of the program's results
    type Snapshot: Serialize;

    /// Error raised by construction, initialization or execution
    type Error: std::error::Error + Send + Sync + 'static;

    /// Construct from the full argument vector and the mounted filesystem
    fn from_args(args: &[String], fs: SharedFs) -> std::result::Result<Self, Self::Error>;

    /// One-time setup before [`run`](Program::run)
    fn init(&mut self) -> std::result::Result<(), Self::Error>;

    /// Process the input stream
    ///
    /// Returns only after completion when `blocking`; otherwise returns
    /// immediately and keeps going in the background.
    fn run(&mut self, blocking: bool) -> std::result::Result<(), Self::Error>;

    /// Whether all processing has finished
    fn is_finished(&self) -> bool;

    /// Owned, self-consistent copy of the current results
    fn snapshot(&self) -> Self::Snapshot;

    /// Wait for background work and report how it ended
    ///
    /// A worker panic resumes on the caller. Programs that never run in the
    /// background keep the default.
    fn join(&mut self) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    /// Print the program's own log buffer, ending with `snapshot`
    ///
    /// Programs without a log buffer print the snapshot record alone.
    fn print_log_buffer(&self, snapshot: &Self::Snapshot, out: &mut dyn Write) -> io::Result<()> {
        serialize::write_nvp(out, SNAPSHOT_TAG, snapshot)
    }
}

/// Execution regime, fixed before any work begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Async,
}

impl Mode {
    /// Detect the mode from a process argument vector
    pub fn detect(args: &[String]) -> Self {
        if async_mode(args) {
            Mode::Async
        } else {
            Mode::Sync
        }
    }

    /// Whether `run` should block until completion
    pub fn is_blocking(self) -> bool {
        self == Mode::Sync
    }
}

/// Whether `--async` appears among the arguments (argv[0] excluded)
pub fn async_mode(args: &[String]) -> bool {
    args.iter().skip(1).any(|arg| arg == ASYNC_FLAG)
}

/// Where the final snapshot goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotSink {
    /// Serialize directly as a named-value record
    #[default]
    Serialize,
    /// Hand off to [`Program::print_log_buffer`]
    LogBuffer,
}

impl SnapshotSink {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "serialize" => Some(SnapshotSink::Serialize),
            "log-buffer" | "log_buffer" | "logbuffer" => Some(SnapshotSink::LogBuffer),
            _ => None,
        }
    }
}

/// Counters for one harness run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: Mode,
    /// Snapshots written by the live-polling loop
    pub polled: usize,
    pub status: i32,
}

/// Configured harness
///
/// Live polling is off by default: only the final snapshot is taken, in
/// both modes.
#[derive(Debug, Clone)]
pub struct Harness {
    live_polling: bool,
    poll_interval: Duration,
    sink: SnapshotSink,
}

impl Default for Harness {
    fn default() -> Self {
        Harness {
            live_polling: false,
            poll_interval: Duration::from_millis(10),
            sink: SnapshotSink::Serialize,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    /// Harness configured from `IVM_LIVE_POLLING` and `IVM_SNAPSHOT_SINK`
    pub fn from_env() -> Self {
        let mut builder = HarnessBuilder::new();

        if let Ok(value) = std::env::var(LIVE_POLLING_ENV) {
            builder = builder.live_polling(matches!(value.as_str(), "1" | "true" | "yes"));
        }
        if let Some(sink) = std::env::var(SNAPSHOT_SINK_ENV)
            .ok()
            .and_then(|value| SnapshotSink::parse(&value))
        {
            builder = builder.sink(sink);
        }

        builder.build()
    }

    pub fn live_polling(&self) -> bool {
        self.live_polling
    }

    pub fn sink(&self) -> SnapshotSink {
        self.sink
    }

    /// Run a program to its final snapshot and return the process status
    pub fn run<P: Program>(&self, args: &[String], fs: SharedFs, out: &mut dyn Write) -> Result<i32> {
        self.run_with_summary::<P>(args, fs, out)
            .map(|summary| summary.status)
    }

    /// Like [`run`](Harness::run), also reporting what happened
    pub fn run_with_summary<P: Program>(
        &self,
        args: &[String],
        fs: SharedFs,
        out: &mut dyn Write,
    ) -> Result<RunSummary> {
        let mode = Mode::detect(args);
        info!("Starting program in {:?} mode", mode);

        let mut program =
            P::from_args(args, fs).map_err(|e| HarnessError::Construct(Box::new(e)))?;
        program
            .init()
            .map_err(|e| HarnessError::Init(Box::new(e)))?;

        program
            .run(mode.is_blocking())
            .map_err(|e| HarnessError::Run(Box::new(e)))?;

        let mut polled = 0;
        if self.live_polling {
            while !program.is_finished() {
                let snap = program.snapshot();
                serialize::write_nvp_line(out, SNAPSHOT_TAG, &snap)?;
                polled += 1;
                debug!("Polled snapshot {}", polled);
                std::thread::sleep(self.poll_interval);
            }
        }

        let snap = program.snapshot();
        match self.sink {
            SnapshotSink::Serialize => serialize::write_nvp(out, SNAPSHOT_TAG, &snap)?,
            SnapshotSink::LogBuffer => program.print_log_buffer(&snap, out)?,
        }
        writeln!(out)?;
        out.flush()?;

        info!(
            "Final snapshot written (finished: {}, polled: {})",
            program.is_finished(),
            polled
        );

        program.join().map_err(|e| HarnessError::Run(Box::new(e)))?;

        Ok(RunSummary {
            mode,
            polled,
            status: EXIT_SUCCESS,
        })
    }
}

/// Builder for [`Harness`]
#[derive(Debug, Clone, Default)]
pub struct HarnessBuilder {
    harness: Harness,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        HarnessBuilder::default()
    }

    /// Serialize a snapshot on every poll while an asynchronous run is in flight
    pub fn live_polling(mut self, enabled: bool) -> Self {
        self.harness.live_polling = enabled;
        self
    }

    /// Delay between polled snapshots
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.harness.poll_interval = interval;
        self
    }

    pub fn sink(mut self, sink: SnapshotSink) -> Self {
        self.harness.sink = sink;
        self
    }

    pub fn build(self) -> Harness {
        self.harness
    }
}

/// Shared entry point for every deployment: `(arguments) -> exit status`
///
/// Writes snapshots to stdout with the harness configured from the
/// environment.
pub fn run_main<P: Program>(args: &[String], fs: SharedFs) -> Result<i32> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    Harness::from_env().run::<P>(args, fs, &mut out)
}
