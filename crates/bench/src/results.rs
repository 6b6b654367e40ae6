//! The results table: one latency sample per worker per trial.

use std::collections::TryReserveError;

/// Latency samples in microseconds, indexed by `[worker][trial]`.
///
/// Only a completed run produces a table, and it is immutable afterwards:
/// reading it any number of times yields the same values.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsTable {
    workers: usize,
    trials: usize,
    samples: Vec<f64>,
}

impl ResultsTable {
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub const fn trials(&self) -> usize {
        self.trials
    }

    /// Total number of samples, `workers * trials`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn get(&self, worker: usize, trial: usize) -> Option<f64> {
        if trial >= self.trials {
            return None;
        }
        self.row(worker).map(|row| row[trial])
    }

    /// Returns every sample recorded by `worker`, in trial order.
    #[must_use]
    pub fn row(&self, worker: usize) -> Option<&[f64]> {
        if worker >= self.workers {
            return None;
        }
        let start = worker * self.trials;
        Some(&self.samples[start..start + self.trials])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.workers).filter_map(|worker| self.row(worker))
    }

    /// Returns trial `trial`'s sample from each worker, in worker order.
    pub fn trial(&self, trial: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.workers).filter_map(move |worker| self.get(worker, trial))
    }

    /// All samples, worker-major.
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

/// Cell that no worker wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingSample {
    pub worker: usize,
    pub trial: usize,
}

/// The table's storage while a run is in flight.
///
/// Allocated once with its full size; every cell starts unwritten (NaN) and
/// must hold a non-negative sample before the buffer can be sealed.
#[derive(Debug)]
pub(crate) struct TableBuffer {
    workers: usize,
    trials: usize,
    samples: Vec<f64>,
}

impl TableBuffer {
    /// Reserves every cell up front.
    ///
    /// # Errors
    ///
    /// Fails instead of aborting when `workers * trials` samples cannot be
    /// allocated.
    pub(crate) fn allocate(workers: usize, trials: usize) -> Result<Self, TryReserveError> {
        let len = workers.checked_mul(trials).unwrap_or(usize::MAX);
        let mut samples = Vec::new();
        samples.try_reserve_exact(len)?;
        samples.resize(len, f64::NAN);
        Ok(Self {
            workers,
            trials,
            samples,
        })
    }

    /// Splits the buffer into one disjoint row per worker.
    pub(crate) fn rows_mut(&mut self) -> Vec<&mut [f64]> {
        if self.trials == 0 {
            return (0..self.workers).map(|_| <&mut [f64]>::default()).collect();
        }
        self.samples.chunks_mut(self.trials).collect()
    }

    /// Freezes the buffer into a [`ResultsTable`].
    ///
    /// # Errors
    ///
    /// Returns the first cell that holds no valid sample.
    pub(crate) fn seal(self) -> Result<ResultsTable, MissingSample> {
        if let Some(index) = self
            .samples
            .iter()
            .position(|sample| sample.is_nan() || *sample < 0.0)
        {
            return Err(MissingSample {
                worker: index / self.trials,
                trial: index % self.trials,
            });
        }
        Ok(ResultsTable {
            workers: self.workers,
            trials: self.trials,
            samples: self.samples,
        })
    }
}
