//! Cached resolution.
//!
//! A [`Resolver`] turns a key into a value asynchronously, usually by asking a
//! remote service. [`CachedResolver`] puts a single-flight [`Cache`] in front
//! of it: concurrent lookups of the same key share one resolution, and the
//! lifetime of a cached value is derived from the value itself through
//! [`Expiring`].
//!
//! | Resolution outcome          | TTL                                   |
//! |-----------------------------|---------------------------------------|
//! | value expiring in the future | time left until expiry               |
//! | value already expired       | zero, never cached                    |
//! | value that never expires    | unlimited, subject to the max timeout |
//! | error                       | not cached                            |

use chrono::{DateTime, Utc};
use janus_cache::{Cache, CacheError, Scheduler};
use janus_core::{Context, Promise, Ttl};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Resolves keys to values.
pub trait Resolver<K, V, E>: Send + Sync + 'static {
    /// Starts resolving `key`.
    fn resolve(&self, ctx: &Context, key: &K) -> Promise<V, E>;
}

impl<K, V, E, R> Resolver<K, V, E> for Arc<R>
where
    R: Resolver<K, V, E> + ?Sized,
{
    fn resolve(&self, ctx: &Context, key: &K) -> Promise<V, E> {
        (**self).resolve(ctx, key)
    }
}

/// A resolver backed by a closure.
///
/// Created with [`resolver_fn`].
pub struct FnResolver<F> {
    func: F,
}

/// Creates a resolver from a closure.
pub fn resolver_fn<K, V, E, F>(func: F) -> FnResolver<F>
where
    F: Fn(&Context, &K) -> Promise<V, E> + Send + Sync + 'static,
{
    FnResolver { func }
}

impl<K, V, E, F> Resolver<K, V, E> for FnResolver<F>
where
    F: Fn(&Context, &K) -> Promise<V, E> + Send + Sync + 'static,
{
    fn resolve(&self, ctx: &Context, key: &K) -> Promise<V, E> {
        (self.func)(ctx, key)
    }
}

/// When a resolved value stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The value stays valid forever.
    Never,
    /// The value is valid until the given instant.
    At(DateTime<Utc>),
}

/// A value with a domain-defined lifetime.
pub trait Expiring {
    /// Returns the expiry of this value.
    fn expiry(&self) -> Expiry;
}

/// Time left from `now` until `expiry`.
///
/// Anything at or before `now` yields [`Ttl::ZERO`].
pub fn ttl_until(expiry: &Expiry, now: DateTime<Utc>) -> Ttl {
    match expiry {
        Expiry::Never => Ttl::Unlimited,
        Expiry::At(at) => match (*at - now).to_std() {
            Ok(left) if !left.is_zero() => Ttl::Finite(left),
            _ => Ttl::ZERO,
        },
    }
}

/// A [`Resolver`] fronted by a single-flight TTL cache.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use janus_cache::ManualScheduler;
/// use janus_core::{Context, Promise};
/// use janus_middleware::stages::resolution::{resolver_fn, CachedResolver, Expiring, Expiry};
/// use std::sync::Arc;
///
/// #[derive(Clone)]
/// struct Grant(chrono::DateTime<Utc>);
///
/// impl Expiring for Grant {
///     fn expiry(&self) -> Expiry {
///         Expiry::At(self.0)
///     }
/// }
///
/// let resolver = CachedResolver::new(
///     resolver_fn(|_ctx: &Context, _key: &String| {
///         Promise::<Grant, String>::resolved(Grant(Utc::now() + Duration::minutes(5)))
///     }),
///     Arc::new(ManualScheduler::new()),
/// );
///
/// tokio_test::block_on(async {
///     resolver.resolve(&Context::root(), "abc".to_string()).await.unwrap();
/// });
/// assert_eq!(resolver.cache().size(), 1);
/// ```
pub struct CachedResolver<K: Eq + Hash, V, E> {
    resolver: Arc<dyn Resolver<K, V, E>>,
    cache: Cache<K, V, E>,
}

impl<K, V, E> CachedResolver<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Expiring + Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Fronts `resolver` with a new cache scheduling evictions on `scheduler`.
    pub fn new<R: Resolver<K, V, E>>(resolver: R, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_cache(resolver, Cache::named("resolution", scheduler))
    }

    /// Fronts `resolver` with an existing cache.
    ///
    /// The default timeout function of `cache` is replaced.
    pub fn with_cache<R: Resolver<K, V, E>>(resolver: R, cache: Cache<K, V, E>) -> Self {
        Self::with_clock(resolver, cache, Utc::now)
    }

    /// Like [`with_cache`](Self::with_cache), reading the current time from `now`.
    pub fn with_clock<R, N>(resolver: R, cache: Cache<K, V, E>, now: N) -> Self
    where
        R: Resolver<K, V, E>,
        N: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        cache.set_default_timeout_fn(move |value: &V| Ok(ttl_until(&value.expiry(), now())));
        Self {
            resolver: Arc::new(resolver),
            cache,
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Cache<K, V, E> {
        &self.cache
    }

    /// Resolves `key`, reusing a cached or in-flight resolution when there is one.
    ///
    /// The returned promise never completes if the wrapped resolver never
    /// does; callers that need a bound must add one.
    pub fn resolve(&self, ctx: &Context, key: K) -> Promise<V, CacheError<E>> {
        let resolver = Arc::clone(&self.resolver);
        let cache = self.cache.clone();
        let ctx = ctx.clone();

        Promise::from_future(async move {
            let lookup_key = key.clone();
            cache
                .get_value(lookup_key, move || resolver.resolve(&ctx, &key))
                .await
        })
    }
}

impl<K: Eq + Hash, V, E> Clone for CachedResolver<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            cache: self.cache.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use janus_cache::ManualScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Lease {
        owner: String,
        expiry: Expiry,
    }

    impl Expiring for Lease {
        fn expiry(&self) -> Expiry {
            self.expiry
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn leasing(
        calls: &Arc<AtomicUsize>,
        expiry: Expiry,
    ) -> impl Resolver<String, Lease, String> {
        let calls = Arc::clone(calls);
        resolver_fn(move |_ctx: &Context, key: &String| {
            calls.fetch_add(1, Ordering::SeqCst);
            Promise::<Lease, String>::resolved(Lease {
                owner: key.clone(),
                expiry,
            })
        })
    }

    fn resolver_with(
        resolver: impl Resolver<String, Lease, String>,
    ) -> (CachedResolver<String, Lease, String>, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let cache = Cache::named("leases", Arc::new(scheduler.clone()));
        (
            CachedResolver::with_clock(resolver, cache, fixed_now),
            scheduler,
        )
    }

    #[test]
    fn test_ttl_until() {
        let now = fixed_now();
        assert_eq!(ttl_until(&Expiry::Never, now), Ttl::Unlimited);
        assert_eq!(
            ttl_until(&Expiry::At(now + ChronoDuration::seconds(90)), now),
            Ttl::from_secs(90)
        );
        assert_eq!(ttl_until(&Expiry::At(now), now), Ttl::ZERO);
        assert_eq!(
            ttl_until(&Expiry::At(now - ChronoDuration::hours(1)), now),
            Ttl::ZERO
        );
    }

    #[tokio::test]
    async fn test_value_cached_until_its_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let expiry = Expiry::At(fixed_now() + ChronoDuration::seconds(45));
        let (resolver, scheduler) = resolver_with(leasing(&calls, expiry));

        for _ in 0..3 {
            let lease = resolver
                .resolve(&Context::root(), "alice".to_string())
                .await
                .unwrap();
            assert_eq!(lease.owner, "alice");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.delays(), vec![Duration::from_secs(45)]);

        scheduler.advance(Duration::from_secs(45));
        assert_eq!(resolver.cache().size(), 0);
    }

    #[tokio::test]
    async fn test_expired_value_is_never_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let expiry = Expiry::At(fixed_now() - ChronoDuration::seconds(1));
        let (resolver, scheduler) = resolver_with(leasing(&calls, expiry));

        resolver
            .resolve(&Context::root(), "bob".to_string())
            .await
            .unwrap();
        resolver
            .resolve(&Context::root(), "bob".to_string())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cache().size(), 0);
        assert_eq!(scheduler.schedule_count(), 0);
    }

    #[tokio::test]
    async fn test_never_expiring_value_respects_max_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (resolver, scheduler) = resolver_with(leasing(&calls, Expiry::Never));

        resolver
            .resolve(&Context::root(), "carol".to_string())
            .await
            .unwrap();
        assert_eq!(scheduler.schedule_count(), 0);

        resolver
            .cache()
            .set_max_timeout(Some(Duration::from_secs(300)));
        resolver
            .resolve(&Context::root(), "dave".to_string())
            .await
            .unwrap();
        assert_eq!(scheduler.delays(), vec![Duration::from_secs(300)]);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (resolver, _scheduler) = resolver_with(resolver_fn(
            move |_ctx: &Context, _key: &String| {
                counter.fetch_add(1, Ordering::SeqCst);
                Promise::<Lease, String>::rejected("directory offline".to_string())
            },
        ));

        for _ in 0..2 {
            let error = resolver
                .resolve(&Context::root(), "erin".to_string())
                .await
                .unwrap_err();
            assert_eq!(error.compute_error().map(String::as_str), Some("directory offline"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cache().size(), 0);
    }

    #[tokio::test]
    async fn test_resolver_sees_caller_context() {
        #[derive(Debug)]
        struct Tenant(&'static str);

        let (resolver, _scheduler) = resolver_with(resolver_fn(
            |ctx: &Context, key: &String| {
                let tenant = ctx.get::<Tenant>().map_or("none", |t| t.0);
                Promise::<Lease, String>::resolved(Lease {
                    owner: format!("{tenant}/{key}"),
                    expiry: Expiry::Never,
                })
            },
        ));

        let ctx = Context::root().with_value(Tenant("acme"));
        let lease = resolver.resolve(&ctx, "frank".to_string()).await.unwrap();
        assert_eq!(lease.owner, "acme/frank");
    }
}
