//! Memoizing cache for computed metrics.
//!
//! Sibling metrics computed for the same navigation often need the same
//! sub-results. [`ComputedMetricCache`] keys each result on the metric's
//! identity plus the context fields it declares, and computes each key at
//! most once.
//!
//! # Single flight
//!
//! Backed by `moka::future::Cache::try_get_with`: when several callers ask
//! for the same key concurrently, one runs the computation and the rest wait
//! for its result. Errors are handed to every waiter but are not cached, so a
//! later request retries.
//!
//! ```text
//! request(metric, ctx) ──► CacheKey::derive ──► hit ──► cached Metric
//!                                           └─► miss ──► compute() ──► store
//!                                           └─► in flight ──► wait for result
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use moka::future::Cache as MokaCache;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::config::EstimatorConfig;
use crate::context::NavigationContext;
use crate::error::MetricError;
use crate::metric::{compute, Metric, NavigationMetric};

/// Hex-encoded SHA-256 over a metric's identity and declared inputs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for computing `M` over `context`.
    ///
    /// Only the fields `M` declares contribute, so contexts differing in an
    /// undeclared field share a key. The concrete type of `M` is hashed next
    /// to its name: the same metric wired to different collaborators gets a
    /// separate key.
    pub fn derive<M: NavigationMetric>(context: &NavigationContext) -> Result<Self, MetricError> {
        let mut hasher = Sha256::new();
        hasher.update(M::NAME.as_bytes());
        hasher.update([0u8]);
        hasher.update(std::any::type_name::<M>().as_bytes());

        for field in M::DECLARED_INPUTS {
            let bytes = context.field_bytes(*field)?;
            // Length-prefix each part so adjacent fields cannot alias
            hasher.update([0u8]);
            hasher.update(field.name().as_bytes());
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }

        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hit/miss counters for the computed-metric cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered without running a computation (including requests
    /// that joined one already in flight).
    pub hits: u64,
    /// Requests that ran a computation.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of requests answered without computing, 0.0 when idle.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Keyed, single-flight cache of computed metrics.
pub struct ComputedMetricCache {
    cache: MokaCache<CacheKey, Metric>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ComputedMetricCache {
    /// Create a cache sized by `config`.
    pub fn new(config: &EstimatorConfig) -> Self {
        let mut builder = MokaCache::builder().max_capacity(config.cache_capacity);
        if let Some(ttl) = config.cache_ttl {
            builder = builder.time_to_live(ttl);
        }

        Self {
            cache: builder.build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Compute `metric` for `context` in the mode the context calls for,
    /// reusing a cached or in-flight result for the same key.
    pub async fn request<M: NavigationMetric>(
        &self,
        metric: &M,
        context: &NavigationContext,
    ) -> Result<Metric, MetricError> {
        let key = CacheKey::derive::<M>(context)?;
        let computed = AtomicBool::new(false);

        let result = self
            .cache
            .try_get_with(key.clone(), async {
                computed.store(true, Ordering::Relaxed);
                trace!(metric = M::NAME, key = %key, "Computing uncached metric");
                compute(metric, context).await
            })
            .await;

        if computed.load(Ordering::Relaxed) {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(metric = M::NAME, key = %key, "Metric cache hit");
        }

        result.map_err(|e| (*e).clone())
    }

    /// Cached result for a key, without computing.
    pub async fn get(&self, key: &CacheKey) -> Option<Metric> {
        self.cache.get(key).await
    }

    /// Number of cached results.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Current hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached result.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

impl Default for ComputedMetricCache {
    fn default() -> Self {
        Self::new(&EstimatorConfig::default())
    }
}
