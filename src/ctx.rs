//! Process-wide named locks, offered to handlers as an opt-in scoped
//! primitive (see SPEC_FULL.md §5 "Shared resources" and §9's
//! "process-wide shared lock array" design note).
//!
//! Grounded on `tremolo/lib/locks.py`'s `ServerLock`: a fixed-size array of
//! locks indexed by `hash(name) % len`, handed out via a callable that
//! returns a scoped guard. This crate's version swaps the original's
//! `ThreadPoolExecutor`-wrapped blocking lock for a plain
//! [`tokio::sync::Mutex`] array -- there is no blocking-call boundary to
//! cross here, since nothing in this crate's own request path needs these
//! locks; they exist purely for handlers that want to coordinate access to
//! some shared external resource (a cache, a counter, a file) without
//! blocking the worker loop.

use std::{hash::{Hash, Hasher}, time::Duration};
use tokio::{
    sync::{Mutex, MutexGuard},
    time::timeout,
};

/// A fixed-size array of named mutexes shared by every connection handled
/// by one [`Server`](crate::Server).
///
/// Construct once (it is cheap to keep behind an `Arc` alongside whatever
/// other shared state a [`Handler`](crate::Handler) carries) and pass a
/// name to [`acquire`](Self::acquire) at each call site that needs mutual
/// exclusion. Two calls with the same name contend for the same slot;
/// different names may land on the same slot too (the array is fixed-size
/// and the name space is unbounded), in which case they also contend --
/// same tradeoff as the source's `hash(name) % len`.
///
/// # Examples
/// ```
/// use maker_web::ctx::Locks;
/// use std::time::Duration;
///
/// # async fn run() {
/// let locks = Locks::new(16);
///
/// match locks.acquire("user:42", Duration::from_secs(1)).await {
///     Some(_guard) => { /* exclusive section */ }
///     None => { /* timed out; someone else is holding it */ }
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct Locks {
    slots: Vec<Mutex<()>>,
}

impl Locks {
    /// Creates a registry of `count` independent lock slots. `count` should
    /// be sized to the expected number of *concurrently contended* names,
    /// not the total number of distinct names that will ever be passed to
    /// [`acquire`](Self::acquire).
    ///
    /// # Panics
    /// Panics if `count` is `0`.
    #[inline]
    #[track_caller]
    pub fn new(count: usize) -> Self {
        assert!(count > 0, "Locks::new requires at least one slot");

        Self {
            slots: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Acquires the slot `name` hashes to, waiting up to `timeout` before
    /// giving up. Returns `None` on timeout rather than blocking forever --
    /// a held lock whose owner panicked or hung must not wedge every other
    /// caller of the same name indefinitely.
    pub async fn acquire(&self, name: impl Hash, duration: Duration) -> Option<MutexGuard<'_, ()>> {
        let slot = &self.slots[Self::slot_index(name, self.slots.len())];

        timeout(duration, slot.lock()).await.ok()
    }

    /// Acquires the slot `name` hashes to with no timeout.
    pub async fn acquire_forever(&self, name: impl Hash) -> MutexGuard<'_, ()> {
        self.slots[Self::slot_index(name, self.slots.len())].lock().await
    }

    #[inline]
    fn slot_index(name: impl Hash, len: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        name.hash(&mut hasher);
        (hasher.finish() % len as u64) as usize
    }
}
