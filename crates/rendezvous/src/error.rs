use core::fmt;

use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq, Copy, Error)]
pub enum ChannelError {
    #[error("the rendezvous channel is closed")]
    Closed,

    #[error("the wait on the rendezvous channel was cancelled")]
    Cancelled,

    #[error("the wait deadline passed before an item was pending")]
    TimedOut,

    #[error("no item is pending in the rendezvous channel")]
    Empty,

    #[error("the rendezvous channel is at capacity")]
    Full,

    #[error("a bounded rendezvous channel needs a capacity of at least one")]
    ZeroCapacity,
}

impl ChannelError {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelError::Closed)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::TimedOut)
    }
}

pub type ChannelResult<T> = core::result::Result<T, ChannelError>;

/// [`PushError`] hands the rejected item back to the caller.
#[derive(Clone, PartialEq, Eq)]
pub enum PushError<T> {
    Full(T),
    Closed(T),
}

impl<T> PushError<T> {
    /// Returns the item that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, PushError::Closed(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.debug_tuple("Full").finish_non_exhaustive(),
            PushError::Closed(_) => f.debug_tuple("Closed").finish_non_exhaustive(),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => write!(f, "PushError::Full"),
            PushError::Closed(_) => write!(f, "PushError::Closed"),
        }
    }
}

impl<T> core::error::Error for PushError<T> {}

impl<T> From<PushError<T>> for ChannelError {
    fn from(value: PushError<T>) -> Self {
        match value {
            PushError::Full(_) => ChannelError::Full,
            PushError::Closed(_) => ChannelError::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_error_returns_the_item() {
        let err = PushError::Full(vec![1.0, 2.0]);
        assert!(err.is_full());
        assert!(!err.is_closed());
        assert_eq!(err.into_inner(), vec![1.0, 2.0]);
    }

    #[test]
    fn push_error_maps_onto_channel_error() {
        assert_eq!(ChannelError::from(PushError::Full(1)), ChannelError::Full);
        assert_eq!(ChannelError::from(PushError::Closed(1)), ChannelError::Closed);
        assert_eq!(format!("{:?}", PushError::Closed(3)), "Closed(..)");
    }
}
