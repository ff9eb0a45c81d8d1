//! Idempotent fetch-or-create resolution.
//!
//! One key in, one record out — always. Cache hits skip the network entirely,
//! throttled fetches retry with backoff, and failures come back as records
//! with `success = false` rather than as errors, so callers never crash on a
//! partial failure.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use glossgen_shared::{CachePolicy, ResourceRecord};
use glossgen_storage::Storage;

use crate::backoff::RetryConfig;
use crate::classify::is_rate_limited;
use crate::clients::Upstream;

/// How a resolved record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Returned from the cache; no network call was made.
    Cached,
    /// Fetched from the upstream on this call.
    Fetched,
    /// All attempts failed; the record carries the error message.
    Failed,
}

/// A resolve result: the record plus how it was produced.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub record: ResourceRecord,
    pub outcome: ResolveOutcome,
}

/// Resolves single keys through the persisted cache with bounded retries.
#[derive(Clone)]
pub struct Resolver {
    storage: Arc<Storage>,
    retry: RetryConfig,
    policy: CachePolicy,
}

impl Resolver {
    /// Create a resolver over `storage` with the given retry and cache policy.
    pub fn new(storage: Arc<Storage>, retry: RetryConfig, policy: CachePolicy) -> Self {
        Self {
            storage,
            retry,
            policy,
        }
    }

    /// Resolve one key through `upstream`.
    ///
    /// Never returns an error for network or throttling failures: the caller
    /// always receives a record with an explicit `success` flag. Each resolve
    /// that reaches the network issues exactly one upsert.
    #[instrument(skip_all, fields(kind = %upstream.kind(), key = %key))]
    pub async fn resolve(&self, upstream: &dyn Upstream, key: &str) -> Resolved {
        let kind = upstream.kind();

        // Cache lookup. Only successful records short-circuit — a stored
        // failure re-attempts the network call (no negative caching).
        if self.policy == CachePolicy::PreferCached {
            match self.storage.find_resource(kind, key).await {
                Ok(Some(record)) if record.success => {
                    debug!("cache hit");
                    return Resolved {
                        record,
                        outcome: ResolveOutcome::Cached,
                    };
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "cache lookup failed, fetching anyway"),
            }
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match upstream.fetch(key).await {
                Ok(payload) => {
                    let record = ResourceRecord::success(kind, key, payload);
                    return Resolved {
                        record: self.store(record).await,
                        outcome: ResolveOutcome::Fetched,
                    };
                }
                Err(e) if is_rate_limited(&e) && attempt + 1 < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    // Permanent failure, or retries exhausted.
                    let record = ResourceRecord::failure(kind, key, e.to_string());
                    return Resolved {
                        record: self.store(record).await,
                        outcome: ResolveOutcome::Failed,
                    };
                }
            }
        }
    }

    /// Persist a record, degrading to the in-memory copy if storage fails.
    async fn store(&self, record: ResourceRecord) -> ResourceRecord {
        if let Err(e) = self.storage.upsert_resource(&record).await {
            warn!(
                error = %e,
                key = %record.key,
                "failed to persist record, returning transient copy"
            );
        }
        record
    }
}
