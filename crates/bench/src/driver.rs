//! Fork-join driver of the rendezvous round-trip benchmark.
//!
//! Every worker repeats the same trial: generate a payload, start the
//! clock, push the payload, pop *some* payload back, stop the clock. All
//! workers share one [`RendezvousChannel`], so a worker usually receives a
//! payload another worker pushed. A sample is therefore the round trip
//! through the shared point under N-way contention, not a point-to-point
//! latency between two fixed workers.
//!
//! Every pop is preceded by the same worker's push, so whenever a worker
//! waits at least one payload is pending or about to be: the protocol cannot
//! starve on its own. Runs are all-or-nothing; the first failure closes the
//! channel, the remaining workers unwind, and no table is produced.

use core::time::Duration;
use std::thread;
use std::time::Instant;

use handoff_rendezvous::{CancelToken, ChannelError, OccupancyProbe, RendezvousChannel};

use crate::clock::{check_clock, ClockCheck};
use crate::config::BenchConfig;
use crate::error::{BenchError, BenchResult};
use crate::payload::{Payload, PayloadSource, UniformSource};
use crate::results::{ResultsTable, TableBuffer};

const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Occupancy tracking runs inside the timed critical section, so it is only
/// installed when the config asks for it.
type SharedChannel = RendezvousChannel<Payload, Option<OccupancyProbe>>;

/// Traffic of a single worker over a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkerStats {
    pub worker: usize,
    pub pushes: u64,
    pub pops: u64,
    /// Last payload pushed, when payloads are retained
    pub last_sent: Option<Payload>,
    /// Last payload popped, when payloads are retained
    pub last_received: Option<Payload>,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    table: ResultsTable,
    workers: Vec<WorkerStats>,
    elapsed: Duration,
    pending_high_water: Option<usize>,
    clock: ClockCheck,
}

impl RunOutcome {
    #[must_use]
    pub const fn table(&self) -> &ResultsTable {
        &self.table
    }

    #[must_use]
    pub fn into_table(self) -> ResultsTable {
        self.table
    }

    #[must_use]
    pub fn workers(&self) -> &[WorkerStats] {
        &self.workers
    }

    /// Wall time from spawning the workers to joining the last one.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Most payloads ever pending at once, when occupancy was tracked.
    #[must_use]
    pub const fn pending_high_water(&self) -> Option<usize> {
        self.pending_high_water
    }

    #[must_use]
    pub const fn clock(&self) -> ClockCheck {
        self.clock
    }

    #[must_use]
    pub fn total_pushes(&self) -> u64 {
        self.workers.iter().map(|stats| stats.pushes).sum()
    }

    #[must_use]
    pub fn total_pops(&self) -> u64 {
        self.workers.iter().map(|stats| stats.pops).sum()
    }

    /// Round trips per second across all workers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.table.len() as f64 / secs
        } else {
            0.0
        }
    }
}

/// Aborts an in-flight run from any thread.
///
/// Aborting cancels the run's token and closes the channel, which releases
/// every blocked worker. The run then fails with [`BenchError::Cancelled`].
#[derive(Clone)]
pub struct AbortHandle {
    channel: SharedChannel,
    cancel: CancelToken,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.cancel.cancel();
        self.channel.close();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Aborts the run when a worker unwinds.
struct AbortOnPanic<'a>(&'a AbortHandle);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}

/// Runs the benchmark once for a validated configuration.
///
/// The table is sized `workers x trials` up front; [`run`](Self::run) and
/// [`run_with`](Self::run_with) consume the driver.
pub struct BenchDriver {
    config: BenchConfig,
    channel: SharedChannel,
    buffer: TableBuffer,
    cancel: CancelToken,
    clock: ClockCheck,
}

impl BenchDriver {
    /// Validates `config`, checks the clock and allocates the table.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] for an invalid configuration,
    /// [`BenchError::Clock`] if the monotonic clock does not advance and
    /// [`BenchError::Allocation`] if the table does not fit in memory.
    pub fn new(config: BenchConfig) -> BenchResult<Self> {
        config.validate()?;
        let clock = check_clock()?;
        let probe = config.get_track_occupancy().then(OccupancyProbe::new);
        let channel = RendezvousChannel::with_probe(config.get_capacity(), probe)?;
        let buffer = TableBuffer::allocate(config.get_workers(), config.get_trials())?;

        tracing::debug!(
            workers = config.get_workers(),
            trials = config.get_trials(),
            resolution = ?clock.resolution,
            "rendezvous driver ready"
        );

        Ok(Self {
            config,
            channel,
            buffer,
            cancel: CancelToken::new(),
            clock,
        })
    }

    #[must_use]
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            channel: self.channel.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Runs every worker with a [`UniformSource`] of its own.
    ///
    /// With a configured seed, worker `i` is seeded with `seed + i`.
    ///
    /// # Errors
    ///
    /// See [`run_with`](Self::run_with).
    pub fn run(self) -> BenchResult<RunOutcome> {
        let size = self.config.get_payload_size();
        match self.config.get_seed() {
            Some(seed) => self.run_with(move |worker| {
                UniformSource::new(size, seed.wrapping_add(worker as u64))
            }),
            None => self.run_with(move |_| UniformSource::from_entropy(size)),
        }
    }

    /// Runs every worker with the source `factory` builds for it.
    ///
    /// `factory` is called once per worker, on that worker's thread, and the
    /// worker owns the returned source for the whole run.
    ///
    /// # Errors
    ///
    /// Returns the first primary failure: a worker panic
    /// ([`BenchError::WorkerPanicked`]), a pop timeout, a thread that could
    /// not be spawned, or [`BenchError::Cancelled`] if the run was aborted
    /// through an [`AbortHandle`].
    pub fn run_with<S, F>(self, factory: F) -> BenchResult<RunOutcome>
    where
        F: Fn(usize) -> S + Sync,
        S: PayloadSource,
    {
        let Self {
            config,
            channel,
            mut buffer,
            cancel,
            clock,
        } = self;
        let abort = AbortHandle {
            channel: channel.clone(),
            cancel: cancel.clone(),
        };

        tracing::info!(
            workers = config.get_workers(),
            trials = config.get_trials(),
            payload_size = config.get_payload_size(),
            capacity = ?config.get_capacity(),
            "starting rendezvous run"
        );

        let started = Instant::now();
        let results: Vec<BenchResult<WorkerStats>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(config.get_workers());
            for (index, row) in buffer.rows_mut().into_iter().enumerate() {
                let worker = Worker {
                    index,
                    channel: &channel,
                    abort: &abort,
                    pop_timeout: config.get_pop_timeout(),
                    retain: config.get_retain_payloads(),
                };
                let factory = &factory;

                let spawned = thread::Builder::new()
                    .name(format!("handoff-worker-{index}"))
                    .spawn_scoped(scope, move || {
                        let _abort_on_panic = AbortOnPanic(worker.abort);
                        worker.run(factory(index), row)
                    });

                match spawned {
                    Ok(handle) => handles.push(Ok(handle)),
                    Err(err) => {
                        tracing::error!(worker = index, error = %err, "failed to spawn worker");
                        abort.abort();
                        handles.push(Err(BenchError::Spawn(err)));
                        break;
                    }
                }
            }

            handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|_| Err(BenchError::WorkerPanicked(index))),
                    Err(err) => Err(err),
                })
                .collect()
        });
        let elapsed = started.elapsed();

        let mut workers = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(stats) => workers.push(stats),
                Err(err) => failures.push(err),
            }
        }

        if !failures.is_empty() {
            let err = root_cause(failures, &cancel);
            tracing::error!(error = %err, "rendezvous run aborted");
            return Err(err);
        }

        let table = buffer.seal()?;
        let pending_high_water = channel.probe().as_ref().map(OccupancyProbe::high_water);
        let outcome = RunOutcome {
            table,
            workers,
            elapsed,
            pending_high_water,
            clock,
        };

        tracing::info!(
            elapsed = ?elapsed,
            pushes = outcome.total_pushes(),
            pops = outcome.total_pops(),
            pending_high_water = ?pending_high_water,
            "rendezvous run finished"
        );

        Ok(outcome)
    }
}

/// Picks the error that caused the abort over the ones it caused.
fn root_cause(failures: Vec<BenchError>, cancel: &CancelToken) -> BenchError {
    let mut secondary = None;
    for err in failures {
        if !err.is_secondary() {
            return err;
        }
        if secondary.is_none() {
            secondary = Some(err);
        }
    }
    if cancel.is_cancelled() {
        return BenchError::Cancelled;
    }
    secondary.unwrap_or(BenchError::Cancelled)
}

struct Worker<'a> {
    index: usize,
    channel: &'a SharedChannel,
    abort: &'a AbortHandle,
    pop_timeout: Option<Duration>,
    retain: bool,
}

impl Worker<'_> {
    fn run<S: PayloadSource>(&self, source: S, row: &mut [f64]) -> BenchResult<WorkerStats> {
        let result = self.trials(source, row);
        if let Err(err) = &result {
            if !err.is_secondary() {
                tracing::warn!(worker = self.index, error = %err, "worker failed, aborting run");
            }
            self.abort.abort();
        }
        result
    }

    fn trials<S: PayloadSource>(&self, mut source: S, row: &mut [f64]) -> BenchResult<WorkerStats> {
        tracing::debug!(worker = self.index, trials = row.len(), "worker started");

        let mut stats = WorkerStats {
            worker: self.index,
            ..WorkerStats::default()
        };

        for cell in row.iter_mut() {
            if self.abort.is_aborted() {
                return Err(BenchError::Cancelled);
            }

            let payload = source.next_payload();
            let sent = self.retain.then(|| payload.clone());
            let token = self.pop_token();

            let start = Instant::now();
            self.channel.push(payload).map_err(ChannelError::from)?;
            let received = self.channel.pop_blocking(&token)?;
            let elapsed = start.elapsed();

            *cell = elapsed.as_secs_f64() * MICROS_PER_SEC;
            stats.pushes += 1;
            stats.pops += 1;
            if self.retain {
                stats.last_sent = sent;
                stats.last_received = Some(received);
            }
        }

        tracing::debug!(worker = self.index, "worker finished");
        Ok(stats)
    }

    /// Untimed unless a pop timeout is configured; an abort still releases
    /// untimed waits by closing the channel.
    fn pop_token(&self) -> CancelToken {
        self.pop_timeout
            .map_or_else(CancelToken::never, |timeout| {
                self.abort.cancel.deadline_in(timeout)
            })
    }
}

/// Builds a driver for `config` and runs it with uniform random payloads.
///
/// # Errors
///
/// See [`BenchDriver::new`] and [`BenchDriver::run_with`].
pub fn run_benchmark(config: BenchConfig) -> BenchResult<RunOutcome> {
    BenchDriver::new(config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_prefers_primary_failures() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let failures = vec![
            BenchError::Channel(ChannelError::Closed),
            BenchError::WorkerPanicked(4),
            BenchError::Cancelled,
        ];
        assert!(matches!(
            root_cause(failures, &cancel),
            BenchError::WorkerPanicked(4)
        ));
    }

    #[test]
    fn root_cause_of_external_abort_is_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let failures = vec![BenchError::Channel(ChannelError::Closed)];
        assert!(root_cause(failures, &cancel).is_cancelled());
    }

    #[test]
    fn invalid_config_never_builds_a_driver() {
        assert!(matches!(
            BenchDriver::new(BenchConfig::new().workers(0)),
            Err(BenchError::Config(_))
        ));
    }
}
