//! Per-run memoization of computed artifacts.
//!
//! A [`ComputedCache`] lives for exactly one audit run. Every derived value
//! (the task tree of a trace, the breakdown of an interaction, …) is requested
//! through it, keyed by a [`ComputationKey`]: the computation kind plus a
//! BLAKE3 fingerprint of its inputs.
//!
//! ## Guarantees
//!
//! * A computation runs at most once per key and cache instance.
//! * Requests arriving while the computation is running wait for it and get
//!   the same result, success or failure.
//! * Computations may request other computations through the [`Session`]
//!   they are handed. A request that would wait on a computation which is,
//!   directly or through other threads, waiting on the requester fails with
//!   [`CyclicComputation`] instead of deadlocking.

mod computation;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::Level;

use crate::core::{Blake3Hasher, Dynamic, Hash32};
use crate::error::{ComputeError, CyclicComputation};

pub use crate::cache::computation::Computation;

/// Identity of a computed artifact: what is computed, and from what.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputationKey {
    kind: &'static str,
    fingerprint: Hash32,
}

impl ComputationKey {
    pub fn new<I>(kind: &'static str, inputs: &I) -> Self
    where
        I: Hash + ?Sized,
    {
        let mut hasher = Blake3Hasher::default();
        kind.hash(&mut hasher);
        inputs.hash(&mut hasher);

        Self {
            kind,
            fingerprint: hasher.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn fingerprint(&self) -> Hash32 {
        self.fingerprint
    }
}

impl std::fmt::Display for ComputationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind, self.fingerprint.short())
    }
}

impl std::fmt::Debug for ComputationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

type Computed = Result<Dynamic, ComputeError>;

/// The eventual result of one key. Filled exactly once by the request that
/// created it; every other request waits on the condvar.
#[derive(Default)]
struct Slot {
    value: Mutex<Option<Computed>>,
    ready: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, Option<Computed>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_ready(&self) -> bool {
        self.lock().is_some()
    }

    fn fill(&self, result: Computed) {
        let mut value = self.lock();
        if value.is_none() {
            *value = Some(result);
            self.ready.notify_all();
        }
    }

    fn wait(&self) -> Computed {
        let mut value = self.lock();
        loop {
            if let Some(result) = value.as_ref() {
                return result.clone();
            }
            value = self.ready.wait(value).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Fails the slot if its computation unwinds, so waiters are released.
struct FillGuard<'s>(&'s Slot);

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.fill(Err(ComputeError::new(anyhow::anyhow!(
                "Computation panicked"
            ))));
        }
    }
}

#[derive(Default)]
struct State {
    slots: HashMap<ComputationKey, Arc<Slot>>,
    /// Keys each in-flight computation is waiting for, whether it computes
    /// them inline or blocks on another thread.
    waits: HashMap<ComputationKey, Vec<ComputationKey>>,
}

impl State {
    /// Follows `waits` from `from` and returns the keys leading to `to`,
    /// both ends included.
    fn wait_path(&self, from: ComputationKey, to: ComputationKey) -> Option<Vec<ComputationKey>> {
        let mut stack = vec![vec![from]];
        let mut seen = vec![from];

        while let Some(path) = stack.pop() {
            let last = path[path.len() - 1];
            if last == to {
                return Some(path);
            }

            for &next in self.waits.get(&last).into_iter().flatten() {
                if !seen.contains(&next) {
                    seen.push(next);
                    let mut longer = path.clone();
                    longer.push(next);
                    stack.push(longer);
                }
            }
        }

        None
    }

    fn stop_waiting(&mut self, from: ComputationKey, to: ComputationKey) {
        if let Some(edges) = self.waits.get_mut(&from) {
            if let Some(index) = edges.iter().position(|&key| key == to) {
                edges.swap_remove(index);
            }
            if edges.is_empty() {
                self.waits.remove(&from);
            }
        }
    }
}

/// Removes a waits-for edge once the request it belongs to is over.
struct WaitGuard<'c> {
    cache: &'c ComputedCache,
    from: ComputationKey,
    to: ComputationKey,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.cache.lock().stop_waiting(self.from, self.to);
    }
}

/// Hit and miss counters of a cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered with an existing or in-flight result.
    pub hits: usize,
    /// Requests that ran their computation.
    pub misses: usize,
}

/// Memoization layer shared by every audit of one run.
///
/// The map only guards the creation of slots and the waits-for relation;
/// the computation itself runs outside the lock, so unrelated keys never
/// wait on each other.
#[derive(Default)]
pub struct ComputedCache {
    state: Mutex<State>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ComputedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new request chain rooted at this cache.
    pub fn session(&self) -> Session<'_> {
        Session {
            cache: self,
            chain: Vec::new(),
        }
    }

    /// Requests a computed value; see [`Session::request`].
    pub fn request<I, T, F>(
        &self,
        kind: &'static str,
        inputs: &I,
        compute: F,
    ) -> Result<Arc<T>, ComputeError>
    where
        I: Hash + ?Sized,
        T: Send + Sync + 'static,
        F: FnOnce(&Session<'_>) -> anyhow::Result<T>,
    {
        self.session().request(kind, inputs, compute)
    }

    /// Requests the output of a typed [`Computation`].
    pub fn get<C: Computation>(&self, input: &C::Input) -> Result<Arc<C::Output>, ComputeError> {
        self.session().get::<C>(input)
    }

    /// Number of keys requested so far, finished or not.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Whether `key` has a finished result, successful or not.
    pub fn is_complete(&self, key: &ComputationKey) -> bool {
        self.lock().slots.get(key).is_some_and(|slot| slot.is_ready())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Every update leaves the state consistent, a poisoned lock is still
        // safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ComputedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedCache")
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A handle on the cache, carrying the chain of computations that led to the
/// current request.
///
/// Every computation receives a `Session` and should use it, not the cache
/// itself, for nested requests; otherwise cycles cannot be detected.
pub struct Session<'a> {
    cache: &'a ComputedCache,
    chain: Vec<ComputationKey>,
}

impl<'a> Session<'a> {
    pub fn cache(&self) -> &'a ComputedCache {
        self.cache
    }

    /// Keys currently being computed along this request chain, outermost
    /// first.
    pub fn chain(&self) -> &[ComputationKey] {
        &self.chain
    }

    /// Returns the value computed by `compute` for `(kind, inputs)`, running
    /// `compute` only if no other request for the same key ran it before.
    ///
    /// # Errors
    ///
    /// * The error of the computation, shared with every other requester.
    /// * [`CyclicComputation`] if the key is already being computed further
    ///   up this request chain, or if waiting for it would close a cycle of
    ///   computations waiting on each other across threads.
    /// * A type mismatch if the same kind was requested before with a
    ///   different output type.
    pub fn request<I, T, F>(
        &self,
        kind: &'static str,
        inputs: &I,
        compute: F,
    ) -> Result<Arc<T>, ComputeError>
    where
        I: Hash + ?Sized,
        T: Send + Sync + 'static,
        F: FnOnce(&Session<'a>) -> anyhow::Result<T>,
    {
        let key = ComputationKey::new(kind, inputs);

        if self.chain.contains(&key) {
            return Err(self.cycle(std::iter::once(key)).into());
        }

        let current = self.chain.last().copied();

        let (slot, owner) = {
            let mut state = self.cache.lock();

            let (slot, owner) = match state.slots.get(&key) {
                Some(slot) => (slot.clone(), false),
                None => {
                    let slot = Arc::new(Slot::default());
                    state.slots.insert(key, slot.clone());
                    (slot, true)
                }
            };

            if let Some(current) = current {
                let pending = !owner && !slot.is_ready();

                if let Some(path) = pending.then(|| state.wait_path(key, current)).flatten() {
                    tracing::warn!(%key, "Refusing to wait on a cyclic computation");
                    return Err(self.cycle(path.into_iter()).into());
                }

                state.waits.entry(current).or_default().push(key);
            }

            (slot, owner)
        };

        let _waiting = current.map(|from| WaitGuard {
            cache: self.cache,
            from,
            to: key,
        });

        if owner {
            self.cache.misses.fetch_add(1, Ordering::Relaxed);
            self.run(&slot, key, compute);
        } else {
            self.cache.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%key, "Computed artifact cache hit");
        }

        let output = slot.wait()?;

        output.downcast::<T>().map_err(|_| {
            ComputeError::new(anyhow::anyhow!(
                "Computation {key} was requested as {}, but holds another type",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Requests the output of a typed [`Computation`].
    pub fn get<C: Computation>(&self, input: &C::Input) -> Result<Arc<C::Output>, ComputeError> {
        self.request(C::NAME, input, |session| C::compute(session, input))
    }

    fn run<T, F>(&self, slot: &Slot, key: ComputationKey, compute: F)
    where
        T: Send + Sync + 'static,
        F: FnOnce(&Session<'a>) -> anyhow::Result<T>,
    {
        let _guard = FillGuard(slot);

        let span = tracing::span!(Level::DEBUG, "compute", key = %key);
        let _enter = span.enter();
        tracing::debug!("Computed artifact cache miss");

        let session = Session {
            cache: self.cache,
            chain: self.chain.iter().copied().chain(std::iter::once(key)).collect(),
        };

        let result = compute(&session)
            .map(|output| Arc::new(output) as Dynamic)
            .map_err(|err| ComputeError::from(err.context(format!("Computing {key} failed"))));

        slot.fill(result);
    }

    /// The cycle formed by this chain followed by `rest`.
    fn cycle(&self, rest: impl Iterator<Item = ComputationKey>) -> CyclicComputation {
        let chain = self
            .chain
            .iter()
            .copied()
            .chain(rest)
            .map(|key| key.to_string())
            .collect();

        CyclicComputation { chain }
    }
}
