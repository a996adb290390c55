//! Single-flight TTL cache.

use crate::error::CacheError;
use crate::scheduler::{ScheduledTask, Scheduler};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures_util::FutureExt;
use janus_core::{Promise, SharedPromise, Ttl};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Default time-to-live applied when no timeout function is configured.
pub const DEFAULT_TIMEOUT: Ttl = Ttl::from_secs(60);

/// Derives the time-to-live of a freshly computed value.
///
/// A failing timeout function evicts the value immediately.
pub type TimeoutFn<V> = Arc<dyn Fn(&V) -> anyhow::Result<Ttl> + Send + Sync + 'static>;

/// Concurrent single-flight cache with per-value TTL.
///
/// Cloning a `Cache` is cheap and yields a handle to the same entries.
/// Dropping the last handle cancels every pending eviction.
///
/// Keys must be `Debug` so lookups and evictions can be logged.
pub struct Cache<K: Eq + Hash, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

struct Inner<K: Eq + Hash, V, E> {
    name: String,
    entries: DashMap<K, Arc<Entry<V, E>>>,
    scheduler: Arc<dyn Scheduler>,
    policy: RwLock<Policy<V>>,
}

struct Policy<V> {
    default_timeout: TimeoutFn<V>,
    max_timeout: Option<Duration>,
}

/// One generation of a key. A new entry is created every time a key is
/// looked up while absent, and entries are compared by identity.
struct Entry<V, E> {
    value: SharedPromise<V, CacheError<E>>,
    timeout: TimeoutFn<V>,
    max_timeout: Option<Duration>,
    state: Mutex<EntryState>,
}

#[derive(Default)]
struct EntryState {
    settled: bool,
    eviction: Option<ScheduledTask>,
}

impl<K, V, E> Cache<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create a cache that schedules evictions on `scheduler`.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::named("default", scheduler)
    }

    /// Create a cache with a name used in logs and metrics.
    pub fn named(name: impl Into<String>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                entries: DashMap::new(),
                scheduler,
                policy: RwLock::new(Policy {
                    default_timeout: constant_timeout(DEFAULT_TIMEOUT),
                    max_timeout: None,
                }),
            }),
        }
    }

    /// Returns the cache name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the value for `key`, computing it with `factory` if absent.
    ///
    /// Concurrent lookups of an absent key share a single computation. The
    /// factory is called at most once per entry and only when the entry is
    /// created. The TTL of the value comes from the default timeout function.
    pub async fn get_value<F, Fut>(&self, key: K, factory: F) -> Result<V, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.lookup(key, factory, None).await
    }

    /// Like [`get_value`](Self::get_value), but derives the TTL of a newly
    /// created entry with `timeout` instead of the default timeout function.
    ///
    /// `timeout` is ignored when the lookup joins an existing entry.
    pub async fn get_value_with_ttl<F, Fut, T>(
        &self,
        key: K,
        factory: F,
        timeout: T,
    ) -> Result<V, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        T: Fn(&V) -> anyhow::Result<Ttl> + Send + Sync + 'static,
    {
        self.lookup(key, factory, Some(Arc::new(timeout))).await
    }

    /// Removes `key` and cancels its pending eviction.
    ///
    /// Returns `true` if an entry was removed. Waiters already joined to the
    /// removed entry still receive its outcome.
    pub fn evict(&self, key: &K) -> bool {
        match self.inner.entries.remove(key) {
            Some((_, entry)) => {
                entry.cancel_eviction();
                debug!(cache = %self.inner.name, key = ?key, "evicted entry");
                record_eviction(&self.inner.name, "explicit");
                true
            }
            None => false,
        }
    }

    /// Evicts every key present at the time of the call.
    pub fn clear(&self) {
        let keys: Vec<K> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in &keys {
            self.evict(key);
        }
    }

    /// Number of entries, including computations still in flight.
    pub fn size(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns `true` if an entry exists for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Uses the same TTL for every value created from now on.
    pub fn set_default_timeout(&self, ttl: Ttl) {
        self.inner.policy.write().default_timeout = constant_timeout(ttl);
    }

    /// Derives the TTL of every value created from now on with `timeout`.
    pub fn set_default_timeout_fn<T>(&self, timeout: T)
    where
        T: Fn(&V) -> anyhow::Result<Ttl> + Send + Sync + 'static,
    {
        self.inner.policy.write().default_timeout = Arc::new(timeout);
    }

    /// Caps the TTL of every value created from now on. `None` removes the cap.
    pub fn set_max_timeout(&self, max: Option<Duration>) {
        self.inner.policy.write().max_timeout = max;
    }

    /// Evicts everything and cancels every pending eviction.
    pub fn shutdown(&self) {
        let size = self.size();
        self.clear();
        debug!(cache = %self.inner.name, evicted = size, "cache shut down");
    }

    async fn lookup<F, Fut>(
        &self,
        key: K,
        factory: F,
        timeout: Option<TimeoutFn<V>>,
    ) -> Result<V, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let entry = self.entry_for(&key, factory, timeout);

        match entry.value.clone().await {
            Ok(value) => {
                self.settle(&key, &entry, &value);
                Ok(value)
            }
            Err(error) => {
                if self.inner.remove_if_current(&key, &entry) {
                    let reason = Reason(&error);
                    debug!(cache = %self.inner.name, key = ?key, error = %reason, "evicted failed entry");
                    record_eviction(&self.inner.name, "failed");
                }
                Err(error)
            }
        }
    }

    fn entry_for<F, Fut>(
        &self,
        key: &K,
        factory: F,
        timeout: Option<TimeoutFn<V>>,
    ) -> Arc<Entry<V, E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        match self.inner.entries.entry(key.clone()) {
            MapEntry::Occupied(occupied) => {
                record_lookup(&self.inner.name, "hit");
                Arc::clone(occupied.get())
            }
            MapEntry::Vacant(vacant) => {
                let (timeout, max_timeout) = {
                    let policy = self.inner.policy.read();
                    (
                        timeout.unwrap_or_else(|| Arc::clone(&policy.default_timeout)),
                        policy.max_timeout,
                    )
                };
                let entry = Arc::new(Entry::new(factory, timeout, max_timeout));
                vacant.insert(Arc::clone(&entry));
                record_lookup(&self.inner.name, "miss");
                entry
            }
        }
    }

    /// Applies the TTL policy exactly once per entry, on the first successful
    /// completion observed by any waiter.
    fn settle(&self, key: &K, entry: &Arc<Entry<V, E>>, value: &V) {
        let mut state = entry.state.lock();
        if state.settled {
            return;
        }
        state.settled = true;

        let ttl = match std::panic::catch_unwind(AssertUnwindSafe(|| (entry.timeout)(value))) {
            Ok(Ok(ttl)) => ttl,
            Ok(Err(error)) => {
                warn!(cache = %self.inner.name, key = ?key, error = %error, "timeout function failed, evicting value");
                Ttl::ZERO
            }
            Err(panic) => {
                let error = panic_reason(panic.as_ref()).unwrap_or("no message");
                warn!(cache = %self.inner.name, key = ?key, error = %error, "timeout function panicked, evicting value");
                Ttl::ZERO
            }
        };

        match ttl.cap(entry.max_timeout) {
            Ttl::Unlimited => {
                debug!(cache = %self.inner.name, key = ?key, "cached without expiry");
            }
            Ttl::Finite(delay) if delay.is_zero() => {
                if self.inner.remove_if_current(key, entry) {
                    record_eviction(&self.inner.name, "immediate");
                }
            }
            Ttl::Finite(delay) => {
                let task = self.inner.eviction_task(key.clone(), entry);
                let handle = self.inner.scheduler.schedule(task, delay);
                if self.inner.is_current(key, entry) {
                    debug!(cache = %self.inner.name, key = ?key, ttl_ms = delay.as_millis() as u64, "scheduled eviction");
                    state.eviction = Some(handle);
                } else {
                    handle.cancel();
                }
            }
        }
    }
}

impl<K, V, E> Inner<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn is_current(&self, key: &K, entry: &Arc<Entry<V, E>>) -> bool {
        self.entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current.value(), entry))
    }

    /// Removes `key` only while it still maps to `entry`.
    fn remove_if_current(&self, key: &K, entry: &Arc<Entry<V, E>>) -> bool {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    /// Builds the eviction task for one entry generation. The task holds weak
    /// references only and removes the key only if it still maps to that
    /// generation.
    fn eviction_task(self: &Arc<Self>, key: K, entry: &Arc<Entry<V, E>>) -> crate::Task {
        let inner: Weak<Self> = Arc::downgrade(self);
        let entry: Weak<Entry<V, E>> = Arc::downgrade(entry);
        Box::new(move || {
            let (Some(inner), Some(entry)) = (inner.upgrade(), entry.upgrade()) else {
                return;
            };
            if inner.remove_if_current(&key, &entry) {
                debug!(cache = %inner.name, key = ?key, "expired entry");
                record_eviction(&inner.name, "expired");
            }
        })
    }
}

impl<K: Eq + Hash, V, E> Drop for Inner<K, V, E> {
    fn drop(&mut self) {
        for entry in self.entries.iter() {
            entry.value().cancel_eviction();
        }
    }
}

impl<V, E> Entry<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn new<F, Fut>(factory: F, timeout: TimeoutFn<V>, max_timeout: Option<Duration>) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        // The factory is invoked on first poll, after the map lock is released.
        let computation = AssertUnwindSafe(async move { factory().await })
            .catch_unwind()
            .map(|outcome| match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(CacheError::Compute(Arc::new(error))),
                Err(panic) => Err(CacheError::Interrupted(panic_message(panic.as_ref()))),
            });

        Self {
            value: Promise::from_future(computation).shared(),
            timeout,
            max_timeout,
            state: Mutex::new(EntryState::default()),
        }
    }
}

impl<V, E> Entry<V, E> {
    fn cancel_eviction(&self) {
        if let Some(handle) = self.state.lock().eviction.take() {
            handle.cancel();
        }
    }
}

impl<K: Eq + Hash, V, E> Clone for Cache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> fmt::Debug for Cache<K, V, E>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("size", &self.inner.entries.len())
            .field("max_timeout", &self.inner.policy.read().max_timeout)
            .finish_non_exhaustive()
    }
}

/// Displays a cache error without requiring the factory error to be `Display`.
struct Reason<'a, E>(&'a CacheError<E>);

impl<E> fmt::Display for Reason<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            CacheError::Compute(_) => f.write_str("factory failed"),
            CacheError::Interrupted(reason) => write!(f, "interrupted: {reason}"),
        }
    }
}

fn constant_timeout<V: 'static>(ttl: Ttl) -> TimeoutFn<V> {
    Arc::new(move |_: &V| -> anyhow::Result<Ttl> { Ok(ttl) })
}

fn panic_reason(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    match panic_reason(payload) {
        Some(message) => format!("factory panicked: {message}"),
        None => "factory panicked".to_string(),
    }
}

fn record_lookup(cache: &str, outcome: &'static str) {
    metrics::counter!(
        "janus_cache_lookups_total",
        "cache" => cache.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

fn record_eviction(cache: &str, reason: &'static str) {
    metrics::counter!(
        "janus_cache_evictions_total",
        "cache" => cache.to_string(),
        "reason" => reason
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type TestCache = Cache<&'static str, u32, String>;

    fn cache_with(scheduler: &ManualScheduler) -> TestCache {
        Cache::named("test", Arc::new(scheduler.clone()))
    }

    #[tokio::test]
    async fn test_hit_returns_cached_value_without_recomputing() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .get_value("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.delays(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn test_finite_ttl_expires_through_scheduler() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);
        cache.set_default_timeout(Ttl::from_secs(5));

        cache.get_value("k", || async { Ok(1) }).await.unwrap();
        assert!(cache.contains_key(&"k"));

        scheduler.advance(Duration::from_secs(4));
        assert_eq!(cache.size(), 1);
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn test_per_call_timeout_overrides_default() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);

        cache
            .get_value_with_ttl("k", || async { Ok(250) }, |v: &u32| {
                Ok(Ttl::from_millis(u64::from(*v)))
            })
            .await
            .unwrap();

        assert_eq!(scheduler.delays(), vec![Duration::from_millis(250)]);
    }

    #[tokio::test]
    async fn test_timeout_function_failure_evicts_immediately() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);
        cache.set_default_timeout_fn(|_| Err(anyhow::anyhow!("no expiry information")));

        let value = cache.get_value("k", || async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);
        assert_eq!(cache.size(), 0);
        assert_eq!(scheduler.schedule_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_function_panic_evicts_immediately() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);

        let value = cache
            .get_value_with_ttl("k", || async { Ok(5) }, |_: &u32| -> anyhow::Result<Ttl> {
                panic!("ttl exploded")
            })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(cache.size(), 0);
        assert_eq!(scheduler.schedule_count(), 0);

        let value = cache.get_value("k", || async { Ok(6) }).await.unwrap();
        assert_eq!(value, 6);
        assert_eq!(scheduler.delays(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn test_evict_cancels_pending_eviction() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);

        cache.get_value("k", || async { Ok(1) }).await.unwrap();
        assert!(cache.evict(&"k"));
        assert!(!cache.evict(&"k"));

        assert!(scheduler.is_cancelled(0));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_evicts_everything() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);

        for key in ["a", "b", "c"] {
            cache.get_value(key, || async { Ok(0) }).await.unwrap();
        }
        assert_eq!(cache.size(), 3);

        cache.clear();
        assert_eq!(cache.size(), 0);
        assert!((0..3).all(|i| scheduler.is_cancelled(i)));
    }

    #[tokio::test]
    async fn test_factory_panic_is_reported_and_not_cached() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);

        let error = cache
            .get_value("k", || async {
                let exploded = true;
                if exploded {
                    panic!("backend exploded");
                }
                Ok(0)
            })
            .await
            .unwrap_err();
        assert!(error.is_interrupted());
        assert!(error.to_string().contains("backend exploded"));
        assert_eq!(cache.size(), 0);

        let value = cache.get_value("k", || async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_dropping_last_handle_cancels_evictions() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);
        cache.get_value("k", || async { Ok(1) }).await.unwrap();

        drop(cache);
        assert!(scheduler.is_cancelled(0));
    }

    #[tokio::test]
    async fn test_eviction_after_cache_dropped_is_harmless() {
        let scheduler = ManualScheduler::new();
        let cache = cache_with(&scheduler);
        cache.get_value("k", || async { Ok(1) }).await.unwrap();
        drop(cache);

        assert!(scheduler.fire(0));
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "factory panicked: static");
        assert_eq!(
            panic_message(&"owned".to_string()),
            "factory panicked: owned"
        );
        assert_eq!(panic_message(&42_u8), "factory panicked");
    }
}
