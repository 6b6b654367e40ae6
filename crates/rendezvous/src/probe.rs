//! Instrumentation hooks for the rendezvous critical section.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Observer of a [`crate::RendezvousChannel`]'s critical section.
///
/// Every hook runs while the channel's mutex is held; `on_unlock` runs
/// immediately before the lock is released (including before each
/// condition wait), `on_lock` immediately after it is (re)acquired.
pub trait ChannelProbe: Send + Sync {
    fn on_lock(&self) {}

    fn on_unlock(&self) {}

    /// Called after an item was added, with the new pending count.
    fn on_push(&self, _pending: usize) {}

    /// Called after an item was removed, with the new pending count.
    fn on_pop(&self, _pending: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProbe;

impl ChannelProbe for NoProbe {}

/// Forwards to the inner probe when present, so instrumentation can be
/// switched off at runtime for the cost of one branch per hook.
impl<P: ChannelProbe> ChannelProbe for Option<P> {
    fn on_lock(&self) {
        if let Some(probe) = self {
            probe.on_lock();
        }
    }

    fn on_unlock(&self) {
        if let Some(probe) = self {
            probe.on_unlock();
        }
    }

    fn on_push(&self, pending: usize) {
        if let Some(probe) = self {
            probe.on_push(pending);
        }
    }

    fn on_pop(&self, pending: usize) {
        if let Some(probe) = self {
            probe.on_pop(pending);
        }
    }
}

/// Point-in-time counters of an [`OccupancyProbe`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OccupancySnapshot {
    pub pushes: u64,
    pub pops: u64,
    pub high_water: usize,
    pub lock_entries: u64,
}

/// Counts traffic through the channel and checks its invariants.
///
/// Every hook does atomic read-modify-writes inside the critical section, so
/// it adds to any latency measured through the channel.
///
/// # Panics
///
/// The hooks panic if two threads are ever inside the critical section at
/// once, or if more items were popped than pushed.
#[derive(Debug, Default)]
pub struct OccupancyProbe {
    holders: AtomicUsize,
    pushes: AtomicU64,
    pops: AtomicU64,
    high_water: AtomicUsize,
    lock_entries: AtomicU64,
}

impl OccupancyProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn pops(&self) -> u64 {
        self.pops.load(Ordering::Acquire)
    }

    /// Largest pending count ever observed after a push.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn lock_entries(&self) -> u64 {
        self.lock_entries.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn snapshot(&self) -> OccupancySnapshot {
        OccupancySnapshot {
            pushes: self.pushes(),
            pops: self.pops(),
            high_water: self.high_water(),
            lock_entries: self.lock_entries(),
        }
    }
}

impl ChannelProbe for OccupancyProbe {
    fn on_lock(&self) {
        let previous = self.holders.fetch_add(1, Ordering::AcqRel);
        assert_eq!(
            previous, 0,
            "two threads inside the rendezvous critical section"
        );
        self.lock_entries.fetch_add(1, Ordering::Relaxed);
    }

    fn on_unlock(&self) {
        let previous = self.holders.fetch_sub(1, Ordering::AcqRel);
        assert_eq!(previous, 1, "rendezvous lock released without a holder");
    }

    fn on_push(&self, pending: usize) {
        self.pushes.fetch_add(1, Ordering::AcqRel);
        self.high_water.fetch_max(pending, Ordering::AcqRel);
    }

    fn on_pop(&self, _pending: usize) {
        let pops = self.pops.fetch_add(1, Ordering::AcqRel) + 1;
        let pushes = self.pushes.load(Ordering::Acquire);
        assert!(
            pops <= pushes,
            "popped {pops} items but only {pushes} were pushed"
        );
    }
}
