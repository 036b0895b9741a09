//! `SELECT customer, SUM(amount), COUNT(*) FROM orders GROUP BY customer`
//!
//! The input stream is a CSV file on the mounted filesystem, one
//! `customer,amount` tuple per line. Every tuple is applied to the view under
//! a single write lock, so a snapshot always sees whole tuples: the sum of
//! per-customer counts equals the number of tuples processed.

use crate::error::StorageError;
use crate::fs::SharedFs;
use crate::harness::{serialize, Program, SNAPSHOT_TAG};
use clap::Parser;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Tag of log-buffer records
pub const LOG_TAG: &str = "log";

/// Flags the program understands; anything else is ignored
const KNOWN_FLAGS: &[&str] = &["--iterations", "--log-count", "--data", "--async"];

#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("Invalid arguments: {0}")]
    Args(#[from] clap::Error),

    #[error("Cannot load input stream: {0}")]
    Storage(#[from] StorageError),

    #[error("Malformed input at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Program not initialized")]
    NotInitialized,

    #[error("Program already started")]
    AlreadyStarted,

    #[error("Failed to spawn worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("Total for {customer} overflows at tuple {tuple}")]
    Overflow { customer: String, tuple: u64 },
}

/// Command-line options of the orders program
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "dbtoaster")]
pub struct OrdersArgs {
    /// Replay the input stream this many times
    #[arg(long, default_value_t = 1)]
    pub iterations: u64,

    /// Record a snapshot in the log buffer every N tuples (0 disables)
    #[arg(long = "log-count", default_value_t = 0)]
    pub log_count: u64,

    /// Input stream path on the mounted filesystem
    #[arg(long, default_value = "data/orders.csv")]
    pub data: String,

    /// Interpreted by the harness, accepted here so it can be passed through
    #[arg(long = "async")]
    pub async_mode: bool,
}

impl OrdersArgs {
    /// Parse a full argument vector, dropping flags this program does not know
    pub fn parse_lenient(args: &[String]) -> Result<Self, ProgramError> {
        let mut kept = Vec::with_capacity(args.len());
        let mut iter = args.iter();
        if let Some(name) = iter.next() {
            kept.push(name.clone());
        }

        let mut expecting_value = false;
        for arg in iter {
            if expecting_value {
                kept.push(arg.clone());
                expecting_value = false;
                continue;
            }

            let flag = arg.split('=').next().unwrap_or(arg);
            if KNOWN_FLAGS.contains(&flag) {
                expecting_value = !arg.contains('=') && flag != "--async";
                kept.push(arg.clone());
            } else {
                warn!("Ignoring unrecognized argument {}", arg);
            }
        }

        Ok(OrdersArgs::try_parse_from(kept)?)
    }
}

/// One input tuple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub customer: String,
    pub amount: i64,
}

/// Parse the CSV input stream
///
/// Blank lines, `#` comments and a `customer,amount` header are skipped.
pub fn parse_orders(input: &str) -> Result<Vec<Order>, ProgramError> {
    let mut orders = Vec::new();

    for (idx, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.eq_ignore_ascii_case("customer,amount")
        {
            continue;
        }

        let parse_error = |message: String| ProgramError::Parse {
            line: idx + 1,
            message,
        };

        let (customer, amount) = line
            .split_once(',')
            .ok_or_else(|| parse_error(format!("expected `customer,amount`, got `{}`", line)))?;
        let customer = customer.trim();
        if customer.is_empty() {
            return Err(parse_error("empty customer".to_string()));
        }
        let amount = amount
            .trim()
            .parse::<i64>()
            .map_err(|e| parse_error(format!("bad amount `{}`: {}", amount.trim(), e)))?;

        orders.push(Order {
            customer: customer.to_string(),
            amount,
        });
    }

    Ok(orders)
}

/// Aggregate for one customer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerTotal {
    pub total: i64,
    pub count: u64,
}

/// Point-in-time copy of the view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdersSnapshot {
    /// Tuples applied so far
    pub tuples: u64,
    pub totals: BTreeMap<String, CustomerTotal>,
}

impl OrdersSnapshot {
    /// Sum of per-customer counts; equals `tuples` in any untorn snapshot
    pub fn counted(&self) -> u64 {
        self.totals.values().map(|t| t.count).sum()
    }
}

#[derive(Debug, Default)]
struct View {
    tuples: u64,
    totals: BTreeMap<String, CustomerTotal>,
    log: Vec<OrdersSnapshot>,
}

impl View {
    /// Apply one tuple; on overflow the view is left as it was
    fn apply(&mut self, order: &Order, log_count: u64) -> Result<(), ProgramError> {
        let current = self.totals.get(&order.customer).map_or(0, |t| t.total);
        let total = current
            .checked_add(order.amount)
            .ok_or_else(|| ProgramError::Overflow {
                customer: order.customer.clone(),
                tuple: self.tuples + 1,
            })?;

        let entry = self.totals.entry(order.customer.clone()).or_default();
        entry.total = total;
        entry.count += 1;
        self.tuples += 1;

        if log_count > 0 && self.tuples % log_count == 0 {
            let snap = self.snapshot();
            self.log.push(snap);
        }
        Ok(())
    }

    fn snapshot(&self) -> OrdersSnapshot {
        OrdersSnapshot {
            tuples: self.tuples,
            totals: self.totals.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    view: RwLock<View>,
    finished: AtomicBool,
    /// Error that stopped a background run
    failure: Mutex<Option<ProgramError>>,
}

/// Sets the finished flag when dropped, including on error and unwind
struct FinishedGuard<'a>(&'a AtomicBool);

impl Drop for FinishedGuard<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

fn process(
    shared: &Shared,
    stream: &[Order],
    iterations: u64,
    log_count: u64,
) -> Result<(), ProgramError> {
    let _finished = FinishedGuard(&shared.finished);
    for _ in 0..iterations {
        for order in stream {
            shared.view.write().apply(order, log_count)?;
        }
    }
    Ok(())
}

/// Orders aggregation program
pub struct OrdersProgram {
    args: OrdersArgs,
    fs: SharedFs,
    stream: Option<Arc<Vec<Order>>>,
    shared: Arc<Shared>,
    started: bool,
    worker: Option<JoinHandle<()>>,
}

impl OrdersProgram {
    pub fn args(&self) -> &OrdersArgs {
        &self.args
    }

    /// Copy of the log buffer recorded so far
    pub fn log_buffer(&self) -> Vec<OrdersSnapshot> {
        self.shared.view.read().log.clone()
    }
}

impl Program for OrdersProgram {
    type Snapshot = OrdersSnapshot;
    type Error = ProgramError;

    fn from_args(args: &[String], fs: SharedFs) -> Result<Self, ProgramError> {
        let args = OrdersArgs::parse_lenient(args)?;
        debug!("Orders program arguments: {:?}", args);

        Ok(OrdersProgram {
            args,
            fs,
            stream: None,
            shared: Arc::new(Shared::default()),
            started: false,
            worker: None,
        })
    }

    fn init(&mut self) -> Result<(), ProgramError> {
        let input = self.fs.read_to_string(&self.args.data)?;
        let orders = parse_orders(&input)?;
        info!("Loaded {} tuples from {}", orders.len(), self.args.data);

        self.stream = Some(Arc::new(orders));
        Ok(())
    }

    fn run(&mut self, blocking: bool) -> Result<(), ProgramError> {
        let stream = self.stream.clone().ok_or(ProgramError::NotInitialized)?;
        if self.started {
            return Err(ProgramError::AlreadyStarted);
        }
        self.started = true;

        let iterations = self.args.iterations;
        let log_count = self.args.log_count;

        if blocking {
            return process(&self.shared, &stream, iterations, log_count);
        }

        let shared = self.shared.clone();
        let worker = std::thread::Builder::new()
            .name("ivm-worker".to_string())
            .spawn(move || {
                if let Err(e) = process(&shared, &stream, iterations, log_count) {
                    warn!("Background run stopped: {}", e);
                    *shared.failure.lock() = Some(e);
                }
            })
            .map_err(ProgramError::Spawn)?;
        self.worker = Some(worker);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> OrdersSnapshot {
        self.shared.view.read().snapshot()
    }

    fn join(&mut self) -> Result<(), ProgramError> {
        if let Some(worker) = self.worker.take() {
            if let Err(payload) = worker.join() {
                std::panic::resume_unwind(payload);
            }
        }
        match self.shared.failure.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn print_log_buffer(&self, snapshot: &OrdersSnapshot, out: &mut dyn Write) -> io::Result<()> {
        for entry in self.log_buffer() {
            serialize::write_nvp_line(out, LOG_TAG, &entry)?;
        }
        serialize::write_nvp(out, SNAPSHOT_TAG, snapshot)
    }
}

impl Drop for OrdersProgram {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RamDiskConfig;
    use crate::fs::RamFs;

    const ORDERS: &str = "customer,amount\nalice,10\nbob,5\n# late order\nalice,-3\n\ncarol,7\n";

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn mounted(content: &str) -> SharedFs {
        let fs = RamFs::new(RamDiskConfig::new(512, 64)).unwrap();
        fs.write("/data/orders.csv", content.as_bytes(), 0o644).unwrap();
        Arc::new(fs)
    }

    #[test]
    fn test_parse_orders() {
        let orders = parse_orders(ORDERS).unwrap();
        assert_eq!(orders.len(), 4);
        assert_eq!(
            orders[2],
            Order {
                customer: "alice".into(),
                amount: -3
            }
        );
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = parse_orders("alice,10\nbob\n").unwrap_err();
        assert!(matches!(err, ProgramError::Parse { line: 2, .. }));

        let err = parse_orders("alice,ten\n").unwrap_err();
        assert!(matches!(err, ProgramError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_args_defaults_and_flags() {
        let args = OrdersArgs::parse_lenient(&argv(&["dbtoaster"])).unwrap();
        assert_eq!(args.iterations, 1);
        assert_eq!(args.log_count, 0);
        assert_eq!(args.data, "data/orders.csv");
        assert!(!args.async_mode);

        let args = OrdersArgs::parse_lenient(&argv(&[
            "dbtoaster",
            "--log-count=1",
            "--iterations",
            "1000",
            "--async",
        ]))
        .unwrap();
        assert_eq!(args.iterations, 1000);
        assert_eq!(args.log_count, 1);
        assert!(args.async_mode);
    }

    #[test]
    fn test_unknown_args_are_ignored() {
        let args = OrdersArgs::parse_lenient(&argv(&[
            "dbtoaster",
            "--verbose",
            "--iterations=2",
            "positional",
        ]))
        .unwrap();
        assert_eq!(args.iterations, 2);
    }

    #[test]
    fn test_bad_flag_value() {
        let err = OrdersArgs::parse_lenient(&argv(&["dbtoaster", "--iterations=many"])).unwrap_err();
        assert!(matches!(err, ProgramError::Args(_)));
    }

    #[test]
    fn test_blocking_run_aggregates() {
        let mut program =
            OrdersProgram::from_args(&argv(&["dbtoaster", "--iterations=2"]), mounted(ORDERS))
                .unwrap();
        program.init().unwrap();
        program.run(true).unwrap();

        assert!(program.is_finished());
        let snap = program.snapshot();
        assert_eq!(snap.tuples, 8);
        assert_eq!(snap.counted(), 8);
        assert_eq!(snap.totals["alice"], CustomerTotal { total: 14, count: 4 });
        assert_eq!(snap.totals["bob"], CustomerTotal { total: 10, count: 2 });
        assert_eq!(snap.totals["carol"], CustomerTotal { total: 14, count: 2 });
    }

    #[test]
    fn test_log_buffer_every_n_tuples() {
        let mut program =
            OrdersProgram::from_args(&argv(&["dbtoaster", "--log-count=2"]), mounted(ORDERS))
                .unwrap();
        program.init().unwrap();
        program.run(true).unwrap();

        let log = program.log_buffer();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].tuples, 2);
        assert_eq!(log[1].tuples, 4);

        let mut out = Vec::new();
        let snap = program.snapshot();
        program.print_log_buffer(&snap, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("<log>").count(), 2);
        assert_eq!(text.matches("<snap>").count(), 1);
        assert!(text.ends_with("</snap>"));
    }

    #[test]
    fn test_background_run_finishes() {
        let mut program =
            OrdersProgram::from_args(&argv(&["dbtoaster", "--iterations=50"]), mounted(ORDERS))
                .unwrap();
        program.init().unwrap();
        program.run(false).unwrap();

        while !program.is_finished() {
            let snap = program.snapshot();
            assert_eq!(snap.counted(), snap.tuples);
            std::thread::yield_now();
        }
        assert_eq!(program.snapshot().tuples, 200);
    }

    #[test]
    fn test_blocking_overflow_is_an_error() {
        let input = format!("alice,{}\nbob,1\n", i64::MAX);
        let mut program =
            OrdersProgram::from_args(&argv(&["dbtoaster", "--iterations=2"]), mounted(&input))
                .unwrap();
        program.init().unwrap();

        let err = program.run(true).unwrap_err();
        assert!(matches!(err, ProgramError::Overflow { ref customer, tuple: 3 } if customer == "alice"));
        assert!(program.is_finished());

        // The failing tuple is not applied
        let snap = program.snapshot();
        assert_eq!(snap.tuples, 2);
        assert_eq!(snap.totals["alice"], CustomerTotal { total: i64::MAX, count: 1 });
    }

    #[test]
    fn test_background_overflow_finishes_and_reports() {
        let input = format!("alice,{}\n", i64::MAX);
        let mut program =
            OrdersProgram::from_args(&argv(&["dbtoaster", "--iterations=5"]), mounted(&input))
                .unwrap();
        program.init().unwrap();
        program.run(false).unwrap();

        while !program.is_finished() {
            std::thread::yield_now();
        }
        assert!(matches!(program.join(), Err(ProgramError::Overflow { tuple: 2, .. })));
        assert_eq!(program.snapshot().tuples, 1);

        // The failure is reported once
        assert!(program.join().is_ok());
    }

    #[test]
    fn test_join_after_clean_background_run() {
        let mut program =
            OrdersProgram::from_args(&argv(&["dbtoaster", "--iterations=3"]), mounted(ORDERS))
                .unwrap();
        program.init().unwrap();
        program.run(false).unwrap();

        program.join().unwrap();
        assert!(program.is_finished());
        assert_eq!(program.snapshot().tuples, 12);
    }

    #[test]
    fn test_run_requires_init() {
        let mut program =
            OrdersProgram::from_args(&argv(&["dbtoaster"]), mounted(ORDERS)).unwrap();
        assert!(matches!(program.run(true), Err(ProgramError::NotInitialized)));
    }

    #[test]
    fn test_run_twice() {
        let mut program =
            OrdersProgram::from_args(&argv(&["dbtoaster"]), mounted(ORDERS)).unwrap();
        program.init().unwrap();
        program.run(true).unwrap();
        assert!(matches!(program.run(true), Err(ProgramError::AlreadyStarted)));
    }

    #[test]
    fn test_missing_input() {
        let mut program = OrdersProgram::from_args(
            &argv(&["dbtoaster", "--data=/data/missing.csv"]),
            mounted(ORDERS),
        )
        .unwrap();
        assert!(matches!(
            program.init(),
            Err(ProgramError::Storage(StorageError::NotFound(_)))
        ));
    }
}
