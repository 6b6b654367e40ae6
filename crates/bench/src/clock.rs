//! Startup check of the monotonic clock used for latency samples.

use core::time::Duration;
use std::time::Instant;

use thiserror::Error;

/// [`MAX_CLOCK_READS`] bounds how many reads may return the same instant
/// before the clock is declared stalled.
pub const MAX_CLOCK_READS: usize = 1_000_000;

#[derive(Clone, Debug, Eq, PartialEq, Copy, Error)]
pub enum ClockError {
    #[error("the monotonic clock did not advance after {0} reads")]
    Stalled(usize),
}

/// What the startup check observed.
#[derive(Clone, Debug, Eq, PartialEq, Copy)]
pub struct ClockCheck {
    /// Smallest observed step between two distinct reads
    pub resolution: Duration,
    /// Reads needed to observe that step
    pub reads: usize,
}

/// Verifies [`Instant`] advances and measures its resolution.
///
/// # Errors
///
/// Returns [`ClockError::Stalled`] if the clock does not advance within
/// [`MAX_CLOCK_READS`] reads.
pub fn check_clock() -> Result<ClockCheck, ClockError> {
    check_with(Instant::now, MAX_CLOCK_READS)
}

pub(crate) fn check_with<F>(mut now: F, max_reads: usize) -> Result<ClockCheck, ClockError>
where
    F: FnMut() -> Instant,
{
    let start = now();
    for reads in 1..=max_reads {
        let current = now();
        if current > start {
            return Ok(ClockCheck {
                resolution: current - start,
                reads,
            });
        }
    }
    Err(ClockError::Stalled(max_reads))
}
