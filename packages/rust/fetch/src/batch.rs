//! Batch resolution of many keys with partial-failure tolerance.
//!
//! The coordinator resolves every input key through [`Resolver`], either
//! strictly sequentially with a fixed pause between items or through
//! semaphore-bounded concurrent tasks. Individual item failures never abort
//! the batch; every key comes back tagged with a terminal state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, instrument};

use crate::clients::Upstream;
use crate::resolver::{Resolved, ResolveOutcome, Resolver};

/// Scheduling policy for a batch, selected by the caller.
#[derive(Debug, Clone, Copy)]
pub enum BatchMode {
    /// One in-flight item at a time with a fixed pause between items.
    Sequential { delay: Duration },
    /// Up to `workers` items in flight, each independently retried.
    Concurrent { workers: usize },
}

/// Terminal state of one batch item.
///
/// An item is conceptually pending until scheduled and in flight while
/// resolving; only the terminal states are observable in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Served from the cache without a network call.
    Cached,
    /// Fetched fresh on this batch.
    Succeeded,
    /// All attempts failed.
    Failed,
}

/// Result for a single key in a batch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub key: String,
    pub state: ItemState,
    pub payload: Option<String>,
    pub error: Option<String>,
}

/// Aggregate summary of a completed batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items fetched fresh on this batch.
    pub succeeded: usize,
    /// Items that failed after all attempts.
    pub failed: usize,
    /// Items served from the cache.
    pub cached: usize,
    /// Failing keys with their error messages.
    pub failures: Vec<(String, String)>,
}

impl BatchSummary {
    /// Items that resolved with a payload, fresh or cached.
    pub fn ok(&self) -> usize {
        self.succeeded + self.cached
    }
}

/// Full outcome of a batch: one item per input key, in input order.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub items: Vec<BatchItem>,
    pub summary: BatchSummary,
}

/// Resolves many independent keys without overwhelming the upstream.
pub struct BatchCoordinator {
    resolver: Resolver,
    mode: BatchMode,
}

impl BatchCoordinator {
    /// Create a coordinator with the given per-key resolver and scheduling mode.
    pub fn new(resolver: Resolver, mode: BatchMode) -> Self {
        Self { resolver, mode }
    }

    /// Resolve every key, returning one tagged result per input key plus an
    /// aggregate summary. Partial failure of individual items never aborts
    /// the batch.
    #[instrument(skip_all, fields(kind = %upstream.kind(), keys = keys.len()))]
    pub async fn run(&self, upstream: Arc<dyn Upstream>, keys: &[String]) -> BatchOutcome {
        let items = match self.mode {
            BatchMode::Sequential { delay } => self.run_sequential(upstream, keys, delay).await,
            BatchMode::Concurrent { workers } => {
                self.run_concurrent(upstream, keys, workers).await
            }
        };

        let summary = summarize(&items);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cached = summary.cached,
            "batch complete"
        );

        BatchOutcome { items, summary }
    }

    async fn run_sequential(
        &self,
        upstream: Arc<dyn Upstream>,
        keys: &[String],
        delay: Duration,
    ) -> Vec<BatchItem> {
        let mut items = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let resolved = self.resolver.resolve(upstream.as_ref(), key).await;
            items.push(item_from(key, resolved));
        }
        items
    }

    async fn run_concurrent(
        &self,
        upstream: Arc<dyn Upstream>,
        keys: &[String],
        workers: usize,
    ) -> Vec<BatchItem> {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut handles = Vec::with_capacity(keys.len());

        for key in keys {
            let sem = semaphore.clone();
            let resolver = self.resolver.clone();
            let upstream = upstream.clone();
            let key = key.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                let resolved = resolver.resolve(upstream.as_ref(), &key).await;
                item_from(&key, resolved)
            }));
        }

        // Collect in spawn order so results line up with input order.
        let mut items = Vec::with_capacity(keys.len());
        for (handle, key) in handles.into_iter().zip(keys) {
            match handle.await {
                Ok(item) => items.push(item),
                Err(e) => items.push(BatchItem {
                    key: key.clone(),
                    state: ItemState::Failed,
                    payload: None,
                    error: Some(format!("task failed: {e}")),
                }),
            }
        }
        items
    }
}

fn item_from(key: &str, resolved: Resolved) -> BatchItem {
    let state = match resolved.outcome {
        ResolveOutcome::Cached => ItemState::Cached,
        ResolveOutcome::Fetched => ItemState::Succeeded,
        ResolveOutcome::Failed => ItemState::Failed,
    };
    BatchItem {
        key: key.to_string(),
        state,
        payload: resolved.record.payload,
        error: resolved.record.error,
    }
}

fn summarize(items: &[BatchItem]) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for item in items {
        match item.state {
            ItemState::Cached => summary.cached += 1,
            ItemState::Succeeded => summary.succeeded += 1,
            ItemState::Failed => {
                summary.failed += 1;
                summary.failures.push((
                    item.key.clone(),
                    item.error.clone().unwrap_or_else(|| "unknown error".into()),
                ));
            }
        }
    }
    summary
}
