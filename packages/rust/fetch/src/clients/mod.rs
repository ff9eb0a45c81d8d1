//! Upstream HTTP clients behind the narrow [`Upstream`] capability.
//!
//! The core retry/cache machinery only ever sees `fetch(key) -> payload`;
//! each client maps its transport and HTTP status errors into
//! [`GlossgenError::Upstream`] so throttling is visible structurally.

mod completion;
mod scrape;
mod search;

use async_trait::async_trait;

use glossgen_shared::{ResourceKind, Result};

pub use completion::{CompletionClient, CompletionConfig};
pub use scrape::{ScrapeClient, ScrapeConfig};
pub use search::{SearchClient, SearchConfig, SearchHit, organic_results};

/// User-Agent string for upstream requests.
pub(crate) const USER_AGENT: &str = concat!("glossgen/", env!("CARGO_PKG_VERSION"));

/// A narrow upstream capability: resolve a key to a payload.
///
/// Implementations may fail; a failure carrying HTTP status 429 (or a "429"
/// message) is retryable, everything else is permanent.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Storage discriminator for records produced by this upstream.
    fn kind(&self) -> ResourceKind;

    /// Resolve `key` to a payload.
    async fn fetch(&self, key: &str) -> Result<String>;
}
