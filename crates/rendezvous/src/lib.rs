//! A single shared hand-off point for worker threads.
//!
//! This crate provides:
//! - **[`RendezvousChannel`]**: a pending set guarded by one mutex and a
//!   wait/notify condition, where any worker may deposit an item and any
//!   worker may take *some* pending item back
//! - **[`CancelToken`]**: cancellation and deadlines threaded through
//!   [`RendezvousChannel::pop_blocking`]
//! - **Probes**: the [`ChannelProbe`] seam, called inside the critical section,
//!   with [`OccupancyProbe`] for occupancy and exclusion checks
//!
//! # Examples
//!
//! ```rust
//! use handoff_rendezvous::{CancelToken, RendezvousChannel};
//! use std::thread;
//!
//! let channel = RendezvousChannel::unbounded();
//!
//! let handles: Vec<_> = (0..4u32)
//!     .map(|worker| {
//!         let channel = channel.clone();
//!         thread::spawn(move || {
//!             channel.push(worker).unwrap();
//!             // not necessarily the value this worker just pushed
//!             channel.pop_blocking(&CancelToken::never()).unwrap()
//!         })
//!     })
//!     .collect();
//!
//! let mut received: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
//! received.sort_unstable();
//! assert_eq!(received, vec![0, 1, 2, 3]);
//! assert!(channel.is_empty());
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod channel;
pub mod error;
pub mod probe;

pub use cancel::{CancelToken, POLL_SLICE};
pub use channel::RendezvousChannel;
pub use error::{ChannelError, ChannelResult, PushError};
pub use probe::{ChannelProbe, NoProbe, OccupancyProbe, OccupancySnapshot};
