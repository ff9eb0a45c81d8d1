//! Core domain types for glossgen runs and cached upstream resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::GlossgenError;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for workflow run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ResourceKind
// ---------------------------------------------------------------------------

/// Which upstream capability produced a cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Search API lookup, keyed by query string.
    Search,
    /// Fetched + extracted web page, keyed by URL.
    Scrape,
    /// LLM completion, keyed by prompt.
    Completion,
}

impl ResourceKind {
    /// Stable string used as the storage discriminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Scrape => "scrape",
            Self::Completion => "completion",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = GlossgenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "search" => Ok(Self::Search),
            "scrape" => Ok(Self::Scrape),
            "completion" => Ok(Self::Completion),
            other => Err(GlossgenError::validation(format!(
                "unknown resource kind: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// CachePolicy
// ---------------------------------------------------------------------------

/// Cache consultation policy, threaded explicitly through every layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Return a stored successful record without touching the network.
    #[default]
    PreferCached,
    /// Always re-fetch; the stored record is overwritten on completion.
    Revalidate,
}

// ---------------------------------------------------------------------------
// ResourceRecord
// ---------------------------------------------------------------------------

/// A cached upstream lookup. At most one stored row per (kind, key),
/// enforced by a uniqueness constraint on the key hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Unique record identifier (UUID v7).
    pub id: String,
    /// Upstream capability that produced the payload.
    pub kind: ResourceKind,
    /// Stable lookup key (query term, URL, or prompt).
    pub key: String,
    /// Fetched payload; `None` for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Whether the most recent fetch attempt succeeded.
    pub success: bool,
    /// Error message from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was last written.
    pub fetched_at: DateTime<Utc>,
}

impl ResourceRecord {
    /// Build a success record ready for upsert.
    pub fn success(kind: ResourceKind, key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            key: key.into(),
            payload: Some(payload.into()),
            success: true,
            error: None,
            fetched_at: Utc::now(),
        }
    }

    /// Build a failure record ready for upsert.
    pub fn failure(kind: ResourceKind, key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            key: key.into(),
            payload: None,
            success: false,
            error: Some(error.into()),
            fetched_at: Utc::now(),
        }
    }

    /// Hash identifying this record's storage row.
    pub fn key_hash(&self) -> String {
        resource_key_hash(self.kind, &self.key)
    }
}

/// SHA-256 hash over (kind, key) identifying a resource row.
///
/// The NUL separator keeps ("search", "ab") and ("search", "a") + "b"-style
/// collisions impossible across the kind/key boundary.
pub fn resource_key_hash(kind: ResourceKind, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// StepStatus
// ---------------------------------------------------------------------------

/// Lifecycle status shared by workflow runs and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StepStatus {
    /// Stable string used as the storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepStatus {
    type Err = GlossgenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(GlossgenError::validation(format!(
                "unknown step status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RunRecord / StepRecord
// ---------------------------------------------------------------------------

/// A workflow run: one glossary term moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier.
    pub id: RunId,
    /// The glossary term this run generates an entry for.
    pub term: String,
    /// Current run status.
    pub status: StepStatus,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run status last changed.
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// Create a fresh pending run for a term.
    pub fn new(term: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            term: term.into(),
            status: StepStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One persisted workflow step, unique per (run_id, name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Owning run.
    pub run_id: String,
    /// Step name (stable across invocations — resumption keys on it).
    pub name: String,
    /// Current step status.
    pub status: StepStatus,
    /// Step output, set when the step succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error message, set when the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the step record was last written.
    pub updated_at: DateTime<Utc>,
}
