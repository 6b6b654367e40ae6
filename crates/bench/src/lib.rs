//! Round-trip latency benchmark of worker threads contending on one
//! [`RendezvousChannel`](handoff_rendezvous::RendezvousChannel).
//!
//! This crate provides:
//! - **[`BenchDriver`]**: spawns the workers, runs every trial and joins them
//! - **[`ResultsTable`]**: the `workers x trials` latency samples, in microseconds
//! - **[`LatencySummary`]**: threshold counts and order statistics over a table
//! - **Reporting**: CSV export and the console [`PerformanceReport`]
//!
//! # Examples
//!
//! ```rust
//! use handoff_bench::{run_benchmark, BenchConfig, LatencySummary};
//!
//! let config = BenchConfig::new().workers(2).trials(10).payload_size(16).seed(7);
//! let outcome = run_benchmark(config).unwrap();
//!
//! assert_eq!(outcome.table().len(), 20);
//! let summary = LatencySummary::from_table(outcome.table(), &[5.0, 2.0, 1.0]);
//! assert_eq!(summary.samples, 20);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod payload;
pub mod report;
pub mod results;
pub mod summary;

pub use clock::{check_clock, ClockCheck, ClockError};
pub use config::{BenchConfig, ConfigError, ConfigResult, MAX_SAMPLES};
pub use driver::{run_benchmark, AbortHandle, BenchDriver, RunOutcome, WorkerStats};
pub use error::{BenchError, BenchResult};
pub use payload::{from_fn, FromFn, Payload, PayloadSource, UniformSource};
pub use report::{write_payload_csv, write_timing_csv, PerformanceReport, Reporter};
pub use results::{MissingSample, ResultsTable};
pub use summary::{LatencySummary, ThresholdCount};
