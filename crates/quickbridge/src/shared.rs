//! Cross-runtime shared object cache
//!
//! Maps a logical name to a lazily-computed immutable value. The first
//! requester of a name runs the factory; every concurrent and later
//! requester for the same name receives the identical value by reference.
//! Unrelated names resolve independently, so one slow construction does
//! not serialize the rest.
//!
//! A failed factory is not cached: the entry is dropped, the error goes to
//! the caller whose factory failed, and the next requester for the name
//! retries from scratch. Waiters blocked on an in-flight construction
//! observe their own context's cancellation; abandoning a waiter leaves
//! the entry intact for everyone else.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::context::RunContext;
use crate::error::{BridgeError, BridgeResult};

/// A shared, immutable value. Stored by reference; all requesters of a
/// name see the same allocation.
pub type SharedValue = Arc<dyn Any + Send + Sync>;

enum EntryState {
    InProgress,
    Done(SharedValue),
    Failed,
}

struct Entry {
    state: Mutex<EntryState>,
    done: Condvar,
}

impl Entry {
    fn new() -> Self {
        Entry {
            state: Mutex::new(EntryState::InProgress),
            done: Condvar::new(),
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: Mutex<FxHashMap<String, Arc<Entry>>>,
}

/// Keyed single-flight store shared across runtimes.
///
/// Cloning shares the store. Values persist for the lifetime of the store,
/// typically one logical run.
#[derive(Clone, Default)]
pub struct SharedObjects {
    inner: Arc<Inner>,
}

impl SharedObjects {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resolved or in-flight names
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// True when no name has been requested yet
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Resolve `name`, running `factory` at most once per in-flight attempt.
    ///
    /// The first requester becomes the leader and runs the factory outside
    /// any map lock; concurrent requesters block until the leader resolves
    /// and then share its value. While blocked, a waiter returns
    /// [`BridgeError::Cancelled`] as soon as `run` is cancelled; the
    /// in-flight construction keeps running for the others.
    pub fn get_or_create<F>(&self, run: &RunContext, name: &str, factory: F) -> BridgeResult<SharedValue>
    where
        F: FnOnce() -> BridgeResult<SharedValue>,
    {
        let mut factory = Some(factory);
        loop {
            let (entry, leader) = {
                let mut entries = self.inner.entries.lock();
                match entries.get(name) {
                    Some(entry) => (entry.clone(), false),
                    None => {
                        let entry = Arc::new(Entry::new());
                        entries.insert(name.to_string(), entry.clone());
                        (entry, true)
                    }
                }
            };

            if leader {
                let factory = match factory.take() {
                    Some(f) => f,
                    None => {
                        return Err(BridgeError::Shared {
                            name: name.to_string(),
                            message: "construction already attempted".to_string(),
                        })
                    }
                };
                match factory() {
                    Ok(value) => {
                        *entry.state.lock() = EntryState::Done(value.clone());
                        entry.done.notify_all();
                        return Ok(value);
                    }
                    Err(e) => {
                        // Failures are not cached: drop the entry so the
                        // next requester retries, and wake waiters to
                        // re-race for leadership.
                        self.inner.entries.lock().remove(name);
                        *entry.state.lock() = EntryState::Failed;
                        entry.done.notify_all();
                        return Err(e);
                    }
                }
            }

            let mut state = entry.state.lock();
            loop {
                match &*state {
                    EntryState::Done(value) => return Ok(value.clone()),
                    EntryState::Failed => break,
                    EntryState::InProgress => {
                        if run.is_cancelled() {
                            return Err(BridgeError::Cancelled);
                        }
                        // Timed wait so waiter cancellation is observed
                        // even if the notify is missed.
                        let _ = entry.done.wait_for(&mut state, Duration::from_millis(20));
                    }
                }
            }
            // The in-flight construction failed; race for a fresh entry.
        }
    }
}

impl std::fmt::Debug for SharedObjects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedObjects")
            .field("names", &self.len())
            .finish()
    }
}

/// Shared state handed to every runtime participating in one logical run
#[derive(Clone, Debug, Default)]
pub struct InitEnvironment {
    /// The cross-runtime shared object store
    pub shared_objects: SharedObjects,
}

impl InitEnvironment {
    /// A fresh environment with an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

const INIT_ENV_KEY: &str = "quickbridge.init_env";

/// Attach an init environment to the context
pub fn with_init_env(ctx: &RunContext, env: Arc<InitEnvironment>) -> RunContext {
    ctx.with_value(INIT_ENV_KEY, env)
}

/// Retrieve the attached init environment, if any
pub fn init_env(ctx: &RunContext) -> Option<Arc<InitEnvironment>> {
    ctx.value_as::<Arc<InitEnvironment>>(INIT_ENV_KEY)
        .map(|rc| (*rc).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::thread;

    fn shared_vec(len: usize) -> SharedValue {
        Arc::new(vec![0u8; len])
    }

    #[test]
    fn test_factory_runs_exactly_once_under_contention() {
        const THREADS: usize = 8;
        let store = SharedObjects::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let mut handles = Vec::new();
        for _ in 0..THREADS {
            let store = store.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                let run = RunContext::background();
                store
                    .get_or_create(&run, "k", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(shared_vec(50))
                    })
                    .unwrap()
            }));
        }

        let values: Vec<SharedValue> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for value in &values[1..] {
            assert!(Arc::ptr_eq(&values[0], value));
        }
    }

    #[test]
    fn test_unrelated_names_resolve_independently() {
        let store = SharedObjects::new();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();

        let slow = {
            let store = store.clone();
            thread::spawn(move || {
                let run = RunContext::background();
                store.get_or_create(&run, "slow", move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(shared_vec(1))
                })
            })
        };

        started_rx.recv().unwrap();
        // "slow" is in flight; "fast" must not wait for it.
        let run = RunContext::background();
        let fast = store.get_or_create(&run, "fast", || Ok(shared_vec(2)));
        assert!(fast.is_ok());

        release_tx.send(()).unwrap();
        assert!(slow.join().unwrap().is_ok());
    }

    #[test]
    fn test_failure_is_not_cached() {
        let store = SharedObjects::new();
        let run = RunContext::background();

        let err = store
            .get_or_create(&run, "k", || Err(BridgeError::Message("boom".into())))
            .unwrap_err();
        assert!(err.to_string().contains("boom"));

        // The name is free again; the next requester's factory runs.
        let calls = AtomicUsize::new(0);
        let value = store
            .get_or_create(&run, "k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(shared_vec(3))
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(value.downcast_ref::<Vec<u8>>().is_some());

        // And the resolved value is now cached for everyone.
        let again = store
            .get_or_create(&run, "k", || {
                panic!("factory must not run for a resolved name")
            })
            .unwrap();
        assert!(Arc::ptr_eq(&value, &again));
    }

    #[test]
    fn test_waiter_cancellation_leaves_entry_intact() {
        let store = SharedObjects::new();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();

        let leader = {
            let store = store.clone();
            thread::spawn(move || {
                let run = RunContext::background();
                store.get_or_create(&run, "k", move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(shared_vec(4))
                })
            })
        };

        started_rx.recv().unwrap();

        // A waiter joins while the construction is in flight, then gets
        // cancelled. The construction itself must keep going.
        let waiter = {
            let store = store.clone();
            thread::spawn(move || {
                let (run, token) = RunContext::background().with_cancel();
                token.cancel();
                store.get_or_create(&run, "k", || {
                    panic!("a waiter must never run the factory")
                })
            })
        };
        let waited = waiter.join().unwrap();
        assert!(matches!(waited, Err(BridgeError::Cancelled)));

        release_tx.send(()).unwrap();
        let value = leader.join().unwrap().unwrap();

        // The abandoned wait did not corrupt the entry.
        let run = RunContext::background();
        let again = store
            .get_or_create(&run, "k", || {
                panic!("factory must not run for a resolved name")
            })
            .unwrap();
        assert!(Arc::ptr_eq(&value, &again));
    }

    #[test]
    fn test_init_env_roundtrip() {
        let env = Arc::new(InitEnvironment::new());
        let ctx = RunContext::background();
        assert!(init_env(&ctx).is_none());

        let ctx = with_init_env(&ctx, env.clone());
        let recovered = init_env(&ctx).unwrap();
        assert!(Arc::ptr_eq(&env, &recovered));
    }
}
