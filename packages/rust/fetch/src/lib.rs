//! Upstream fetch plumbing: backoff, rate-limit classification, cached
//! fetch-or-create resolution, and batch coordination.
//!
//! This crate provides:
//! - [`backoff`] — exponential backoff with jitter for throttled calls
//! - [`classify`] — retryable vs permanent error classification
//! - [`resolver`] — per-key fetch-or-create over the persisted cache
//! - [`batch`] — many-key resolution with bounded concurrency
//! - [`clients`] — the [`Upstream`] capability trait and its HTTP clients
//! - [`extract`] — scraped-page HTML → Markdown extraction

pub mod backoff;
pub mod batch;
pub mod classify;
pub mod clients;
pub mod extract;
pub mod resolver;

pub use backoff::RetryConfig;
pub use batch::{BatchCoordinator, BatchItem, BatchMode, BatchOutcome, BatchSummary, ItemState};
pub use classify::is_rate_limited;
pub use clients::{
    CompletionClient, CompletionConfig, ScrapeClient, ScrapeConfig, SearchClient, SearchConfig,
    SearchHit, Upstream, organic_results,
};
pub use extract::{ExtractedPage, page_to_markdown};
pub use resolver::{Resolved, ResolveOutcome, Resolver};
