//! Cancellation and deadlines for blocking waits.

use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ChannelError, ChannelResult};

/// [`POLL_SLICE`] is the longest a cancellable wait sleeps on the condition
/// variable before re-checking its token.
pub const POLL_SLICE: Duration = Duration::from_millis(1);

/// A cheaply cloneable cancellation handle with an optional deadline.
///
/// Clones share the same cancellation flag, so cancelling any clone cancels
/// every wait using one of them. [`CancelToken::never`] carries neither a flag
/// nor a deadline and makes [`crate::RendezvousChannel::pop_blocking`] use a
/// plain, untimed condition wait.
///
/// ```
/// use handoff_rendezvous::CancelToken;
///
/// let token = CancelToken::new();
/// let clone = token.clone();
/// assert!(!token.is_cancelled());
///
/// clone.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that can never be cancelled and never expires.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            flag: None,
            deadline: None,
        }
    }

    /// A cancellable token without a deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
            deadline: None,
        }
    }

    /// A cancellable token that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_in(timeout)
    }

    /// A cancellable token that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
            deadline: Some(deadline),
        }
    }

    /// Returns a token sharing this token's cancellation flag but expiring
    /// `timeout` from now.
    ///
    /// A timeout too large to represent as an [`Instant`] means no deadline.
    #[must_use]
    pub fn deadline_in(&self, timeout: Duration) -> Self {
        Self {
            flag: self.flag.clone(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Cancels every wait using this token or one of its clones.
    ///
    /// Has no effect on a [`CancelToken::never`] token.
    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::Release);
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true if waits using this token must wake up to check it.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.flag.is_some() || self.deadline.is_some()
    }

    /// Fails with [`ChannelError::Cancelled`] or [`ChannelError::TimedOut`]
    /// once the token no longer allows waiting.
    pub(crate) fn check(&self) -> ChannelResult<()> {
        if self.is_cancelled() {
            return Err(ChannelError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ChannelError::TimedOut),
            _ => Ok(()),
        }
    }

    /// How long the next condition wait may sleep, `None` meaning untimed.
    pub(crate) fn wait_slice(&self) -> Option<Duration> {
        if !self.is_armed() {
            return None;
        }
        let slice = match self.deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(POLL_SLICE),
            None => POLL_SLICE,
        };
        Some(slice)
    }
}
