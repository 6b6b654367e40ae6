//! Multi-threaded behavior of the rendezvous channel.
//!
//! These tests drive the channel from many threads at once and rely on the
//! occupancy probe to catch overlapping critical sections and pops that were
//! never matched by a push.

use handoff_rendezvous::{CancelToken, ChannelError, OccupancyProbe, RendezvousChannel};
use ntest::timeout;
use tracing_test::traced_test;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
#[timeout(20000)]
fn test_push_then_pop_under_contention_keeps_exclusion() {
    let channel = RendezvousChannel::with_probe(None, OccupancyProbe::new()).unwrap();
    let num_threads = 8;
    let rounds = 2_000;

    let mut handles = vec![];
    for thread_id in 0..num_threads {
        let channel = channel.clone();
        handles.push(thread::spawn(move || {
            for round in 0..rounds {
                channel.push(thread_id * 1_000_000 + round).unwrap();
                let _ = channel.pop_blocking(&CancelToken::never()).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = channel.probe().snapshot();
    assert_eq!(snapshot.pushes, (num_threads * rounds) as u64);
    assert_eq!(snapshot.pops, snapshot.pushes);
    assert!(snapshot.high_water <= num_threads);
    assert!(channel.is_empty());
}

#[test]
#[timeout(20000)]
fn test_every_item_is_delivered_exactly_once() {
    let channel = RendezvousChannel::unbounded();
    let num_threads = 6;
    let rounds = 500;

    let mut handles = vec![];
    for thread_id in 0..num_threads {
        let channel = channel.clone();
        handles.push(thread::spawn(move || {
            let mut received = Vec::with_capacity(rounds);
            for round in 0..rounds {
                channel.push(thread_id * rounds + round).unwrap();
                received.push(channel.pop_blocking(&CancelToken::never()).unwrap());
            }
            received
        }));
    }

    let mut all: Vec<usize> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    all.sort_unstable();

    let expected: Vec<usize> = (0..num_threads * rounds).collect();
    assert_eq!(all, expected);
}

#[test]
#[timeout(10000)]
fn test_waiter_wakes_once_another_thread_pushes() {
    let channel = RendezvousChannel::unbounded();

    let waiter = {
        let channel = channel.clone();
        thread::spawn(move || channel.pop_blocking(&CancelToken::never()))
    };

    thread::sleep(Duration::from_millis(50));
    channel.push(42_u64).unwrap();

    assert_eq!(waiter.join().unwrap(), Ok(42));
}

#[test]
#[timeout(10000)]
fn test_spurious_wakeups_do_not_release_waiter() {
    let channel = RendezvousChannel::unbounded();
    let returned = Arc::new(AtomicBool::new(false));

    let waiter = {
        let channel = channel.clone();
        let returned = Arc::clone(&returned);
        thread::spawn(move || {
            let item = channel.pop_blocking(&CancelToken::never());
            returned.store(true, Ordering::Release);
            item
        })
    };

    for _ in 0..20 {
        thread::sleep(Duration::from_millis(2));
        channel.wake_all();
    }
    thread::sleep(Duration::from_millis(20));
    assert!(!returned.load(Ordering::Acquire));
    assert!(!waiter.is_finished());

    channel.push("payload").unwrap();
    assert_eq!(waiter.join().unwrap(), Ok("payload"));
}

#[test]
#[timeout(10000)]
fn test_cancel_releases_blocked_waiter() {
    let channel = RendezvousChannel::<Vec<f64>>::unbounded();
    let token = CancelToken::new();

    let waiter = {
        let channel = channel.clone();
        let token = token.clone();
        thread::spawn(move || channel.pop_blocking(&token))
    };

    thread::sleep(Duration::from_millis(30));
    token.cancel();

    assert_eq!(waiter.join().unwrap(), Err(ChannelError::Cancelled));
}

#[test]
#[timeout(10000)]
fn test_deadline_bounds_the_wait() {
    let channel = RendezvousChannel::<u8>::unbounded();
    let token = CancelToken::with_timeout(Duration::from_millis(40));

    let started = std::time::Instant::now();
    assert_eq!(channel.pop_blocking(&token), Err(ChannelError::TimedOut));
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[test]
#[timeout(10000)]
fn test_close_releases_all_waiters() {
    let channel = RendezvousChannel::<u32>::unbounded();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let channel = channel.clone();
            thread::spawn(move || channel.pop_blocking(&CancelToken::never()))
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    channel.close();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Err(ChannelError::Closed));
    }
}

#[test]
#[timeout(10000)]
fn test_bounded_push_waits_for_room() {
    let channel = RendezvousChannel::bounded(1).unwrap();
    channel.push(1_u8).unwrap();

    let producer = {
        let channel = channel.clone();
        thread::spawn(move || channel.push(2))
    };

    thread::sleep(Duration::from_millis(30));
    assert!(!producer.is_finished());
    assert_eq!(channel.len(), 1);

    assert_eq!(channel.pop_blocking(&CancelToken::never()), Ok(1));
    producer.join().unwrap().unwrap();
    assert_eq!(channel.pop_blocking(&CancelToken::never()), Ok(2));
}

#[test]
#[timeout(10000)]
fn test_close_rejects_blocked_producer() {
    let channel = RendezvousChannel::bounded(1).unwrap();
    channel.push(1_u8).unwrap();

    let producer = {
        let channel = channel.clone();
        thread::spawn(move || channel.push(2))
    };

    thread::sleep(Duration::from_millis(30));
    channel.close();

    let err = producer.join().unwrap().unwrap_err();
    assert!(err.is_closed());
    assert_eq!(err.into_inner(), 2);
}

#[test]
#[traced_test]
fn test_close_is_logged_once() {
    let channel = RendezvousChannel::<u8>::unbounded();
    channel.push(3).unwrap();

    assert!(channel.close());
    assert!(!channel.close());

    assert!(logs_contain("rendezvous channel closed"));
    assert!(logs_contain("pending=1"));
}
