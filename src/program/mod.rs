//! Reference query programs
//!
//! [`OrdersProgram`] stands in for a generated incremental-view-maintenance
//! program so the binaries and tests have a real [`Program`](crate::harness::Program)
//! to drive.

pub mod orders;

pub use orders::{CustomerTotal, Order, OrdersArgs, OrdersProgram, OrdersSnapshot, ProgramError};
