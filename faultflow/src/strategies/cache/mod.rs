//! Cache strategy: fingerprint keyed values with TTL and a pluggable
//! provider.

mod provider;

pub use provider::{CacheProvider, MemoryCache};

use super::{Next, Strategy};
use crate::context::ExecutionContext;
use crate::errors::{CacheError, FaultError};
use crate::outcome::Outcome;
use crate::utils::Timestamp;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Computes the cache key for an execution. Returning `None` bypasses
/// the cache for that call.
pub type KeyStrategy = Arc<dyn Fn(&ExecutionContext) -> Option<String> + Send + Sync>;

/// How long a produced value stays cached.
#[derive(Clone)]
pub enum Ttl<T> {
    /// A fixed duration from the time of the put.
    Relative(Duration),
    /// An absolute wall-clock expiry, converted to a remaining duration
    /// at put time.
    Absolute(Timestamp),
    /// Computed from the produced value. A zero duration suppresses the
    /// put.
    ForValue(Arc<dyn Fn(&T) -> Duration + Send + Sync>),
}

impl<T> Ttl<T> {
    fn resolve(&self, value: &T) -> Duration {
        match self {
            Self::Relative(duration) => *duration,
            Self::Absolute(expiry) => {
                let remaining = *expiry - chrono::Utc::now();
                remaining.to_std().unwrap_or(Duration::ZERO)
            }
            Self::ForValue(f) => f(value),
        }
    }
}

/// Hook invoked with the cache key.
pub type KeyHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Hook invoked with the cache key and the provider error.
pub type KeyErrorHook = Arc<dyn Fn(&str, &CacheError) + Send + Sync>;

/// Configuration for the cache strategy.
#[derive(Clone)]
pub struct CacheOptions<T> {
    /// The storage behind the strategy.
    pub provider: Arc<dyn CacheProvider<T>>,
    /// Time to live for produced values.
    pub ttl: Ttl<T>,
    /// Key derivation. Defaults to the context's operation key.
    pub key_strategy: Option<KeyStrategy>,
    /// Fired on a cache hit.
    pub on_hit: Option<KeyHook>,
    /// Fired on a cache miss, before the continuation runs.
    pub on_miss: Option<KeyHook>,
    /// Fired after a successful put.
    pub on_put: Option<KeyHook>,
    /// Fired when the provider's get fails. The call proceeds.
    pub on_get_error: Option<KeyErrorHook>,
    /// Fired when the provider's put fails. The call still succeeds.
    pub on_put_error: Option<KeyErrorHook>,
}

impl<T> CacheOptions<T> {
    /// Creates options over a provider with a relative TTL.
    #[must_use]
    pub fn new(provider: Arc<dyn CacheProvider<T>>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl: Ttl::Relative(ttl),
            key_strategy: None,
            on_hit: None,
            on_miss: None,
            on_put: None,
            on_get_error: None,
            on_put_error: None,
        }
    }

    /// Replaces the TTL policy.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Ttl<T>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets a custom key strategy.
    #[must_use]
    pub fn with_key_strategy<F>(mut self, strategy: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Option<String> + Send + Sync + 'static,
    {
        self.key_strategy = Some(Arc::new(strategy));
        self
    }

    /// Sets the hit hook.
    #[must_use]
    pub fn with_on_hit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_hit = Some(Arc::new(hook));
        self
    }

    /// Sets the miss hook.
    #[must_use]
    pub fn with_on_miss<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_miss = Some(Arc::new(hook));
        self
    }

    /// Sets the put hook.
    #[must_use]
    pub fn with_on_put<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_put = Some(Arc::new(hook));
        self
    }

    /// Sets the get-error hook.
    #[must_use]
    pub fn with_on_get_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &CacheError) + Send + Sync + 'static,
    {
        self.on_get_error = Some(Arc::new(hook));
        self
    }

    /// Sets the put-error hook.
    #[must_use]
    pub fn with_on_put_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &CacheError) + Send + Sync + 'static,
    {
        self.on_put_error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn validate(&self, _violations: &mut Vec<String>) {
        // Provider and TTL shapes are checked by construction.
    }
}

/// Serves cached values and stores fresh successes.
pub struct CacheStrategy<T> {
    options: CacheOptions<T>,
}

impl<T> CacheStrategy<T> {
    /// Creates a cache strategy.
    #[must_use]
    pub fn new(options: CacheOptions<T>) -> Self {
        Self { options }
    }

    fn key_for(&self, ctx: &ExecutionContext) -> Option<String> {
        match self.options.key_strategy {
            Some(ref strategy) => strategy(ctx),
            None => ctx.operation_key().map(str::to_string),
        }
    }
}

#[async_trait]
impl<T> Strategy<T> for CacheStrategy<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn execute(&self, ctx: Arc<ExecutionContext>, next: Next<T>) -> Outcome<T> {
        // No key: stay out of the way entirely.
        let Some(key) = self.key_for(&ctx) else {
            return next.run(ctx).await;
        };

        match self.options.provider.try_get(&key).await {
            Ok(Some(value)) => {
                // A hit still honors cancellation.
                if ctx.cancellation().is_cancelled() {
                    return Outcome::Exception(FaultError::canceled(
                        ctx.cancellation().reason(),
                    ));
                }
                if let Some(ref hook) = self.options.on_hit {
                    hook(&key);
                }
                ctx.try_emit_event("cache.hit", Some(serde_json::json!({ "key": key })));
                return Outcome::Result(value);
            }
            Ok(None) => {
                if let Some(ref hook) = self.options.on_miss {
                    hook(&key);
                }
                ctx.try_emit_event("cache.miss", Some(serde_json::json!({ "key": key })));
            }
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "cache get failed; proceeding");
                if let Some(ref hook) = self.options.on_get_error {
                    hook(&key, &error);
                }
            }
        }

        let outcome = next.run(ctx.clone()).await;

        if let Outcome::Result(ref value) = outcome {
            let ttl = self.options.ttl.resolve(value);
            if !ttl.is_zero() {
                match self.options.provider.put(&key, value.clone(), ttl).await {
                    Ok(()) => {
                        if let Some(ref hook) = self.options.on_put {
                            hook(&key);
                        }
                        ctx.try_emit_event(
                            "cache.put",
                            Some(serde_json::json!({
                                "key": key,
                                "ttl_ms": ttl.as_millis() as u64,
                            })),
                        );
                    }
                    Err(error) => {
                        tracing::warn!(key = %key, error = %error, "cache put failed; ignoring");
                        if let Some(ref hook) = self.options.on_put_error {
                            hook(&key, &error);
                        }
                    }
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{context_from, ContextOptions};
    use crate::strategies::Operation;
    use crate::testing::ScriptedOperation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn run_next<T: Clone + Send + Sync + 'static>(op: Operation<T>) -> Next<T> {
        Next::new(Arc::from(Vec::new().into_boxed_slice()), op)
    }

    struct FailingProvider;

    #[async_trait]
    impl CacheProvider<i32> for FailingProvider {
        async fn try_get(&self, _key: &str) -> Result<Option<i32>, CacheError> {
            Err(CacheError::new("get unavailable"))
        }

        async fn put(&self, _key: &str, _value: i32, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::new("put unavailable"))
        }
    }

    fn keyed() -> Arc<ExecutionContext> {
        context_from(ContextOptions::new().with_operation_key("K"))
    }

    #[tokio::test]
    async fn test_bypass_without_operation_key() {
        let cache = Arc::new(MemoryCache::new());
        let strategy =
            CacheStrategy::new(CacheOptions::new(cache.clone(), Duration::from_secs(60)));
        let op = ScriptedOperation::succeeding(1);

        for _ in 0..2 {
            let ctx = context_from(ContextOptions::new());
            let outcome = strategy.execute(ctx, run_next(op.operation())).await;
            assert_eq!(outcome.result(), Some(&1));
        }
        // Invoked every time; no provider interaction happened.
        assert_eq!(op.call_count(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_miss_then_hit_skips_operation() {
        let cache = Arc::new(MemoryCache::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let misses = Arc::new(AtomicUsize::new(0));
        let (h, m) = (hits.clone(), misses.clone());

        let strategy = CacheStrategy::new(
            CacheOptions::new(cache, Duration::from_secs(60))
                .with_on_hit(move |_| {
                    h.fetch_add(1, Ordering::SeqCst);
                })
                .with_on_miss(move |_| {
                    m.fetch_add(1, Ordering::SeqCst);
                }),
        );
        let op = ScriptedOperation::succeeding(7);

        let outcome = strategy.execute(keyed(), run_next(op.operation())).await;
        assert_eq!(outcome.result(), Some(&7));
        let outcome = strategy.execute(keyed(), run_next(op.operation())).await;
        assert_eq!(outcome.result(), Some(&7));

        assert_eq!(op.call_count(), 1);
        assert_eq!(misses.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let cache = Arc::new(MemoryCache::new());
        let strategy =
            CacheStrategy::new(CacheOptions::new(cache.clone(), Duration::from_secs(60)));
        let op = ScriptedOperation::<i32>::fail_times(1, 9);

        let outcome = strategy.execute(keyed(), run_next(op.operation())).await;
        assert!(outcome.is_exception());
        assert!(cache.is_empty());

        let outcome = strategy.execute(keyed(), run_next(op.operation())).await;
        assert_eq!(outcome.result(), Some(&9));
        assert_eq!(op.call_count(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_suppresses_put() {
        let cache = Arc::new(MemoryCache::new());
        let strategy = CacheStrategy::new(
            CacheOptions::new(cache.clone(), Duration::from_secs(60))
                .with_ttl(Ttl::ForValue(Arc::new(|_| Duration::ZERO))),
        );
        let op = ScriptedOperation::succeeding(1);

        let _ = strategy.execute(keyed(), run_next(op.operation())).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_default_value_cached_and_returned() {
        let cache = Arc::new(MemoryCache::new());
        let strategy =
            CacheStrategy::new(CacheOptions::new(cache, Duration::from_secs(60)));
        let op = ScriptedOperation::succeeding(0_i32);

        let _ = strategy.execute(keyed(), run_next(op.operation())).await;
        let outcome = strategy.execute(keyed(), run_next(op.operation())).await;
        assert_eq!(outcome.result(), Some(&0));
        assert_eq!(op.call_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_errors_isolated() {
        let get_errors = Arc::new(AtomicUsize::new(0));
        let put_errors = Arc::new(AtomicUsize::new(0));
        let (g, p) = (get_errors.clone(), put_errors.clone());

        let strategy = CacheStrategy::new(
            CacheOptions::new(Arc::new(FailingProvider), Duration::from_secs(60))
                .with_on_get_error(move |_, _| {
                    g.fetch_add(1, Ordering::SeqCst);
                })
                .with_on_put_error(move |_, _| {
                    p.fetch_add(1, Ordering::SeqCst);
                }),
        );
        let op = ScriptedOperation::succeeding(5);

        let outcome = strategy.execute(keyed(), run_next(op.operation())).await;
        assert_eq!(outcome.result(), Some(&5));
        assert_eq!(get_errors.load(Ordering::SeqCst), 1);
        assert_eq!(put_errors.load(Ordering::SeqCst), 1);
        assert_eq!(op.call_count(), 1);
    }

    #[tokio::test]
    async fn test_hit_honors_cancellation() {
        let cache = Arc::new(MemoryCache::new());
        cache.put("K", 3, Duration::from_secs(60)).await.unwrap();
        let strategy = CacheStrategy::new(CacheOptions::new(cache, Duration::from_secs(60)));

        let ctx = keyed();
        ctx.cancellation().cancel("gone");
        let op = ScriptedOperation::succeeding(3);
        let outcome = strategy.execute(ctx, run_next(op.operation())).await;
        assert!(matches!(
            outcome.exception(),
            Some(FaultError::OperationCanceled { .. })
        ));
        assert_eq!(op.call_count(), 0);
    }

    #[tokio::test]
    async fn test_custom_key_strategy() {
        let cache = Arc::new(MemoryCache::new());
        let strategy = CacheStrategy::new(
            CacheOptions::new(cache, Duration::from_secs(60)).with_key_strategy(|ctx| {
                ctx.operation_key()
                    .map(|key| crate::utils::fingerprint(&[key, "v1"]))
            }),
        );
        let op = ScriptedOperation::succeeding(4);

        let _ = strategy.execute(keyed(), run_next(op.operation())).await;
        let outcome = strategy.execute(keyed(), run_next(op.operation())).await;
        assert_eq!(outcome.result(), Some(&4));
        assert_eq!(op.call_count(), 1);
    }
}
