//! The shared rendezvous point.

use core::ops::{Deref, DerefMut};
use core::time::Duration;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::cancel::CancelToken;
use crate::error::{ChannelError, ChannelResult, PushError};
use crate::probe::{ChannelProbe, NoProbe};

/// A single hand-off point shared by every worker.
///
/// Any handle may [`push`](Self::push) an item and any handle may
/// [`pop_blocking`](Self::pop_blocking) *some* pending item. There is no
/// pairing between a push and the pop that eventually returns its item: a
/// worker may get back its own item or any other worker's. Items are handed
/// out first-in first-out, but callers should not rely on that.
///
/// Insertion, the emptiness check and removal all happen under one mutex;
/// waiters sleep on a condition variable whose predicate is "the pending set
/// is non-empty" and re-check it on every wake.
///
/// Cloning yields another handle to the same channel.
pub struct RendezvousChannel<T, P: ChannelProbe = NoProbe> {
    inner: Arc<Inner<T, P>>,
}

struct Inner<T, P> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
    probe: P,
}

struct State<T> {
    pending: VecDeque<T>,
    closed: bool,
}

/// Holds the channel lock and reports entry and exit to the probe.
///
/// `held` is declared first so it drops, and reports the exit, while the
/// guard still holds the lock.
struct Critical<'a, T, P: ChannelProbe> {
    held: Held<'a, P>,
    guard: MutexGuard<'a, State<T>>,
}

struct Held<'a, P: ChannelProbe>(&'a P);

impl<P: ChannelProbe> Drop for Held<'_, P> {
    fn drop(&mut self) {
        self.0.on_unlock();
    }
}

impl<'a, T, P: ChannelProbe> Critical<'a, T, P> {
    fn enter(inner: &'a Inner<T, P>) -> Self {
        // A panicking holder cannot leave the pending set half-updated.
        let guard = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::locked(&inner.probe, guard)
    }

    fn locked(probe: &'a P, guard: MutexGuard<'a, State<T>>) -> Self {
        probe.on_lock();
        Self {
            held: Held(probe),
            guard,
        }
    }

    fn wait(self, condvar: &Condvar, slice: Option<Duration>) -> Self {
        let Critical { held, guard } = self;
        let probe = held.0;
        drop(held);

        let guard = match slice {
            None => condvar.wait(guard).unwrap_or_else(PoisonError::into_inner),
            Some(slice) => condvar
                .wait_timeout(guard, slice)
                .map_or_else(|err| err.into_inner().0, |(guard, _)| guard),
        };
        Self::locked(probe, guard)
    }
}

impl<T, P: ChannelProbe> Deref for Critical<'_, T, P> {
    type Target = State<T>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T, P: ChannelProbe> DerefMut for Critical<'_, T, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<T, P: ChannelProbe> Clone for RendezvousChannel<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> RendezvousChannel<T> {
    /// Same as [`unbounded`](Self::unbounded).
    #[must_use]
    pub fn new() -> Self {
        Self::unbounded()
    }

    /// Creates a channel without a capacity limit.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::from_parts(None, NoProbe)
    }

    /// Creates a channel holding at most `capacity` pending items.
    ///
    /// [`push`](Self::push) blocks while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ZeroCapacity`] if `capacity` is zero.
    pub fn bounded(capacity: usize) -> ChannelResult<Self> {
        Self::with_probe(Some(capacity), NoProbe)
    }
}

impl<T> Default for RendezvousChannel<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T, P: ChannelProbe> RendezvousChannel<T, P> {
    /// Creates a channel reporting its critical section to `probe`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ZeroCapacity`] if `capacity` is `Some(0)`.
    pub fn with_probe(capacity: Option<usize>, probe: P) -> ChannelResult<Self> {
        if capacity == Some(0) {
            return Err(ChannelError::ZeroCapacity);
        }
        Ok(Self::from_parts(capacity, probe))
    }

    fn from_parts(capacity: Option<usize>, probe: P) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    pending: VecDeque::with_capacity(capacity.unwrap_or_default()),
                    closed: false,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
                probe,
            }),
        }
    }

    fn enter(&self) -> Critical<'_, T, P> {
        Critical::enter(&self.inner)
    }

    fn is_full(&self, state: &State<T>) -> bool {
        self.inner
            .capacity
            .is_some_and(|capacity| state.pending.len() >= capacity)
    }

    /// Deposits `item` and wakes one waiter.
    ///
    /// On an unbounded channel this never blocks beyond lock contention; on a
    /// bounded one it waits until there is room.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] with the item if the channel is closed.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut critical = self.enter();
        while !critical.closed && self.is_full(&critical) {
            critical = critical.wait(&self.inner.not_full, None);
        }
        if critical.closed {
            return Err(PushError::Closed(item));
        }
        self.insert(critical, item);
        Ok(())
    }

    /// Deposits `item` without waiting for room.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Full`] if a bounded channel is at capacity and
    /// [`PushError::Closed`] if the channel is closed.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let critical = self.enter();
        if critical.closed {
            return Err(PushError::Closed(item));
        }
        if self.is_full(&critical) {
            return Err(PushError::Full(item));
        }
        self.insert(critical, item);
        Ok(())
    }

    fn insert(&self, mut critical: Critical<'_, T, P>, item: T) {
        critical.pending.push_back(item);
        self.inner.probe.on_push(critical.pending.len());
        drop(critical);
        self.inner.not_empty.notify_one();
    }

    /// Removes and returns one pending item, waiting until one is pending.
    ///
    /// The returned item is not necessarily one this caller pushed. Pending
    /// items take priority over cancellation: the token is only consulted
    /// while the channel is empty.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Closed`] once the channel is closed and drained
    /// - [`ChannelError::Cancelled`] if `cancel` was cancelled
    /// - [`ChannelError::TimedOut`] if `cancel`'s deadline passed
    pub fn pop_blocking(&self, cancel: &CancelToken) -> ChannelResult<T> {
        let mut critical = self.enter();
        loop {
            if let Some(item) = self.remove(&mut critical) {
                drop(critical);
                self.item_taken();
                return Ok(item);
            }
            if critical.closed {
                return Err(ChannelError::Closed);
            }
            cancel.check()?;
            critical = critical.wait(&self.inner.not_empty, cancel.wait_slice());
        }
    }

    /// Removes and returns one pending item without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Empty`] if nothing is pending, or
    /// [`ChannelError::Closed`] if the channel is closed and drained.
    pub fn try_pop(&self) -> ChannelResult<T> {
        let mut critical = self.enter();
        match self.remove(&mut critical) {
            Some(item) => {
                drop(critical);
                self.item_taken();
                Ok(item)
            }
            None if critical.closed => Err(ChannelError::Closed),
            None => Err(ChannelError::Empty),
        }
    }

    fn remove(&self, critical: &mut Critical<'_, T, P>) -> Option<T> {
        let item = critical.pending.pop_front()?;
        self.inner.probe.on_pop(critical.pending.len());
        Some(item)
    }

    fn item_taken(&self) {
        if self.inner.capacity.is_some() {
            self.inner.not_full.notify_one();
        }
    }

    /// Closes the channel and wakes every waiter.
    ///
    /// Pending items can still be popped. Returns `true` if this call closed
    /// the channel, `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut critical = self.enter();
        if critical.closed {
            return false;
        }
        critical.closed = true;
        let pending = critical.pending.len();
        drop(critical);

        tracing::debug!(pending, "rendezvous channel closed");
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
        true
    }

    /// Wakes every waiter without changing the channel.
    ///
    /// Woken waiters re-check their predicate and go back to sleep, exactly
    /// as after a spurious wakeup.
    pub fn wake_all(&self) {
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.enter().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.enter().closed
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    #[must_use]
    pub fn probe(&self) -> &P {
        &self.inner.probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::OccupancyProbe;

    #[test]
    fn pop_returns_pushed_item() {
        let channel = RendezvousChannel::unbounded();
        channel.push(7_u32).unwrap();

        assert_eq!(channel.len(), 1);
        assert_eq!(channel.pop_blocking(&CancelToken::never()), Ok(7));
        assert!(channel.is_empty());
    }

    #[test]
    fn items_are_handed_out_in_arrival_order() {
        let channel = RendezvousChannel::unbounded();
        for item in 0..4 {
            channel.push(item).unwrap();
        }

        let drained: Vec<i32> = (0..4).map(|_| channel.try_pop().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert_eq!(channel.try_pop(), Err(ChannelError::Empty));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            RendezvousChannel::<u8>::bounded(0),
            Err(ChannelError::ZeroCapacity)
        ));
    }

    #[test]
    fn try_push_reports_full_and_returns_item() {
        let channel = RendezvousChannel::bounded(1).unwrap();
        channel.try_push("first").unwrap();

        let err = channel.try_push("second").unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), "second");
        assert_eq!(channel.capacity(), Some(1));
    }

    #[test]
    fn closed_channel_drains_then_reports_closed() {
        let channel = RendezvousChannel::unbounded();
        channel.push(1).unwrap();

        assert!(channel.close());
        assert!(!channel.close());
        assert!(channel.is_closed());

        assert_eq!(channel.push(2).unwrap_err().into_inner(), 2);
        assert_eq!(channel.pop_blocking(&CancelToken::never()), Ok(1));
        assert_eq!(
            channel.pop_blocking(&CancelToken::never()),
            Err(ChannelError::Closed)
        );
        assert_eq!(channel.try_pop(), Err(ChannelError::Closed));
    }

    #[test]
    fn cancelled_token_fails_only_when_empty() {
        let channel = RendezvousChannel::unbounded();
        let token = CancelToken::new();
        token.cancel();

        channel.push(5).unwrap();
        assert_eq!(channel.pop_blocking(&token), Ok(5));
        assert_eq!(channel.pop_blocking(&token), Err(ChannelError::Cancelled));
    }

    #[test]
    fn expired_token_times_out() {
        let channel = RendezvousChannel::<u8>::unbounded();
        let token = CancelToken::with_timeout(Duration::from_millis(5));

        assert_eq!(channel.pop_blocking(&token), Err(ChannelError::TimedOut));
    }

    #[test]
    fn probe_sees_every_entry_and_mutation() {
        let channel = RendezvousChannel::with_probe(None, OccupancyProbe::new()).unwrap();
        channel.push(1).unwrap();
        channel.push(2).unwrap();
        let _ = channel.try_pop().unwrap();

        let snapshot = channel.probe().snapshot();
        assert_eq!(snapshot.pushes, 2);
        assert_eq!(snapshot.pops, 1);
        assert_eq!(snapshot.high_water, 2);
        assert_eq!(snapshot.lock_entries, 3);
    }
}
