//! Payloads exchanged through the rendezvous channel and their sources.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A fixed-length block of floating-point values.
///
/// Owned by the worker that generated it until pushed, by the channel while
/// pending, and by whichever worker popped it afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload(Vec<f64>);

impl Payload {
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for Payload {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Produces a fresh payload for every trial.
///
/// Each worker owns its source exclusively; sources are never shared
/// between threads.
pub trait PayloadSource {
    fn next_payload(&mut self) -> Payload;
}

/// Uniform `[0, 1)` values from a worker-owned [`ChaCha8Rng`].
#[derive(Debug, Clone)]
pub struct UniformSource {
    rng: ChaCha8Rng,
    size: usize,
}

impl UniformSource {
    /// Creates a reproducible source producing `size` values per payload.
    #[must_use]
    pub fn new(size: usize, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            size,
        }
    }

    /// Creates a source seeded from the thread-local entropy generator.
    #[must_use]
    pub fn from_entropy(size: usize) -> Self {
        let seed = rand::rng().next_u64();
        Self::new(size, seed)
    }

    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.size
    }
}

impl PayloadSource for UniformSource {
    fn next_payload(&mut self) -> Payload {
        let values = (0..self.size).map(|_| self.rng.random::<f64>()).collect();
        Payload(values)
    }
}

/// A [`PayloadSource`] backed by a closure, see [`from_fn`].
pub struct FromFn<F>(F);

/// Wraps `f` as a [`PayloadSource`].
///
/// ```
/// use handoff_bench::payload::{from_fn, Payload, PayloadSource};
///
/// let mut source = from_fn(|| Payload::new(vec![1.0; 4]));
/// assert_eq!(source.next_payload().as_slice(), &[1.0; 4]);
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut() -> Payload,
{
    FromFn(f)
}

impl<F> PayloadSource for FromFn<F>
where
    F: FnMut() -> Payload,
{
    fn next_payload(&mut self) -> Payload {
        (self.0)()
    }
}
