use std::collections::TryReserveError;

use derive_more::derive::From;
use handoff_rendezvous::ChannelError;

use crate::clock::ClockError;
use crate::config::ConfigError;
use crate::results::MissingSample;

#[derive(Debug, From)]
pub enum BenchError {
    Config(ConfigError),

    Channel(ChannelError),

    Clock(ClockError),

    Incomplete(MissingSample),

    /// The results table could not be allocated.
    Allocation(TryReserveError),

    #[from(ignore)]
    Spawn(std::io::Error),

    #[from(ignore)]
    WorkerPanicked(usize),

    #[from(ignore)]
    Cancelled,
}

impl BenchError {
    /// True for errors a worker sees only because another worker or the
    /// caller already aborted the run.
    #[must_use]
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            BenchError::Cancelled
                | BenchError::Channel(ChannelError::Closed | ChannelError::Cancelled)
        )
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BenchError::Cancelled)
    }
}

impl std::error::Error for BenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BenchError::Config(err) => Some(err),
            BenchError::Channel(err) => Some(err),
            BenchError::Clock(err) => Some(err),
            BenchError::Spawn(err) => Some(err),
            BenchError::Allocation(err) => Some(err),
            _ => None,
        }
    }
}

impl core::fmt::Display for BenchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BenchError::Config(err) => write!(f, "BenchError::Config({err})"),
            BenchError::Channel(err) => write!(f, "BenchError::Channel({err})"),
            BenchError::Clock(err) => write!(f, "BenchError::Clock({err})"),
            BenchError::Incomplete(missing) => write!(
                f,
                "BenchError::Incomplete(worker {} left trial {} unrecorded)",
                missing.worker, missing.trial
            ),
            BenchError::Allocation(err) => write!(f, "BenchError::Allocation({err})"),
            BenchError::Spawn(err) => write!(f, "BenchError::Spawn({err})"),
            BenchError::WorkerPanicked(worker) => {
                write!(f, "BenchError::WorkerPanicked(worker {worker})")
            }
            BenchError::Cancelled => write!(f, "BenchError::Cancelled"),
        }
    }
}

pub type BenchResult<T> = std::result::Result<T, BenchError>;
