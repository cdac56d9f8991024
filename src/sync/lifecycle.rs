use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tracing::debug;

use super::error::SyncError;

/// Identity of a logical request, e.g. `fetchJobs:search=rust`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(operation: &str, discriminator: impl fmt::Display) -> Self {
        Self(format!("{operation}:{discriminator}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tri-state result of the latest request for a key. `Idle` means never issued.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Idle,
    Pending,
    Fulfilled(T),
    Rejected(SyncError),
}

impl<T> Outcome<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }
}

/// Which resolutions of the same key may settle the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Supersession {
    /// Only the most recently issued request settles; older arrivals are dropped.
    #[default]
    LatestIssued,
    /// Every arrival settles in finish order.
    LatestFinished,
}

/// Awaitable handle shared by every caller that joined the same request.
pub type InFlight<T> = Shared<BoxFuture<'static, Result<T, SyncError>>>;

/// Runs once for a resolution that is allowed to settle, before any caller wakes.
/// It runs under the lifecycle lock and must not call back into the same lifecycle.
pub type CommitHook<T> = Box<dyn FnOnce(&Result<T, SyncError>) + Send>;

struct Slot<T> {
    latest_issued: u64,
    outcome: Outcome<T>,
    in_flight: Option<(u64, InFlight<T>)>,
}

struct Registry<T> {
    next_sequence: u64,
    slots: HashMap<RequestKey, Slot<T>>,
}

/// De-duplicating, order-aware wrapper around asynchronous operations.
///
/// Issued work is spawned onto the runtime, so it runs to completion and settles
/// even when every caller drops its handle.
pub struct RequestLifecycle<T> {
    registry: Arc<Mutex<Registry<T>>>,
    supersession: Supersession,
}

impl<T> Clone for RequestLifecycle<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            supersession: self.supersession,
        }
    }
}

impl<T> Default for RequestLifecycle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(Supersession::default())
    }
}

impl<T> RequestLifecycle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(supersession: Supersession) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_sequence: 0,
                slots: HashMap::new(),
            })),
            supersession,
        }
    }

    /// Join the pending request for `key`, or issue `operation` if none is pending.
    pub fn execute<F, Fut>(&self, key: RequestKey, operation: F) -> InFlight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        self.issue(key, false, operation, None)
    }

    /// Like [`execute`](Self::execute), running `commit` when the request settles.
    pub fn execute_with<F, Fut>(
        &self,
        key: RequestKey,
        operation: F,
        commit: CommitHook<T>,
    ) -> InFlight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        self.issue(key, false, operation, Some(commit))
    }

    /// Always issue a fresh request. Any request already pending for `key` becomes
    /// stale under [`Supersession::LatestIssued`].
    pub fn reissue<F, Fut>(
        &self,
        key: RequestKey,
        operation: F,
        commit: Option<CommitHook<T>>,
    ) -> InFlight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        self.issue(key, true, operation, commit)
    }

    pub fn outcome(&self, key: &RequestKey) -> Outcome<T> {
        self.lock()
            .slots
            .get(key)
            .map_or(Outcome::Idle, |slot| slot.outcome.clone())
    }

    pub fn is_pending(&self, key: &RequestKey) -> bool {
        self.lock()
            .slots
            .get(key)
            .map_or(false, |slot| slot.in_flight.is_some())
    }

    fn lock(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue<F, Fut>(
        &self,
        key: RequestKey,
        force: bool,
        operation: F,
        commit: Option<CommitHook<T>>,
    ) -> InFlight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        let mut registry = self.lock();

        if !force {
            if let Some((sequence, pending)) = registry
                .slots
                .get(&key)
                .and_then(|slot| slot.in_flight.clone())
            {
                debug!(%key, sequence, "joining in-flight request");
                return pending;
            }
        }

        registry.next_sequence += 1;
        let sequence = registry.next_sequence;

        let (sender, receiver) = oneshot::channel();
        let handle: InFlight<T> = async move {
            receiver.await.unwrap_or_else(|_| {
                Err(SyncError::NetworkUnavailable(
                    "request task ended before settling".to_string(),
                ))
            })
        }
        .boxed()
        .shared();

        let slot = registry.slots.entry(key.clone()).or_insert_with(|| Slot {
            latest_issued: 0,
            outcome: Outcome::Idle,
            in_flight: None,
        });
        slot.latest_issued = sequence;
        slot.outcome = Outcome::Pending;
        slot.in_flight = Some((sequence, handle.clone()));
        drop(registry);

        debug!(%key, sequence, "issuing request");
        let work = operation();
        let registry = Arc::clone(&self.registry);
        let supersession = self.supersession;

        tokio::spawn(async move {
            let result = work.await;
            {
                let mut guard = registry.lock().unwrap_or_else(PoisonError::into_inner);
                if settle(&mut guard, &key, sequence, supersession, &result) {
                    if let Some(commit) = commit {
                        commit(&result);
                    }
                }
            }
            let _ = sender.send(result);
        });

        handle
    }
}

/// Record a resolution; returns whether it was allowed to settle the key.
fn settle<T: Clone>(
    registry: &mut Registry<T>,
    key: &RequestKey,
    sequence: u64,
    supersession: Supersession,
    result: &Result<T, SyncError>,
) -> bool {
    let Some(slot) = registry.slots.get_mut(key) else {
        return false;
    };

    let is_latest = slot.latest_issued == sequence;
    if matches!(&slot.in_flight, Some((pending, _)) if *pending == sequence) {
        slot.in_flight = None;
    }

    let current = is_latest || supersession == Supersession::LatestFinished;
    if !current {
        debug!(%key, sequence, latest = slot.latest_issued, "discarding stale response");
        return false;
    }

    slot.outcome = match result {
        Ok(value) => Outcome::Fulfilled(value.clone()),
        Err(err) => Outcome::Rejected(err.clone()),
    };
    debug!(%key, sequence, ok = result.is_ok(), "request settled");
    true
}
