//! Application configuration for glossgen.
//!
//! User config lives at `~/.glossgen/glossgen.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! API keys are never stored in the file: each upstream section names the
//! environment variable holding its key, and [`resolve_api_key`] reads it
//! once at startup into an explicit client config struct.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GlossgenError, Result};
use crate::types::CachePolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "glossgen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".glossgen";

// ---------------------------------------------------------------------------
// Config structs (matching glossgen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Search API settings.
    #[serde(default)]
    pub search: SearchSettings,

    /// Page scraping settings.
    #[serde(default)]
    pub scrape: ScrapeSettings,

    /// LLM completion settings.
    #[serde(default)]
    pub completion: CompletionSettings,

    /// Retry/backoff settings for rate-limited upstream calls.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for generated entries and the local database.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Worker count for bounded-concurrency batch resolution.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: u32,

    /// Pause between items in sequential batch mode.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Default cache policy for upstream lookups.
    #[serde(default)]
    pub cache_policy: CachePolicy,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            batch_concurrency: default_batch_concurrency(),
            batch_delay_ms: default_batch_delay_ms(),
            cache_policy: CachePolicy::default(),
        }
    }
}

fn default_output_dir() -> String {
    "~/glossgen-entries".into()
}
fn default_batch_concurrency() -> u32 {
    4
}
fn default_batch_delay_ms() -> u64 {
    200
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Search endpoint URL.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Results requested per query.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            endpoint: default_search_endpoint(),
            results_per_query: default_results_per_query(),
        }
    }
}

fn default_search_key_env() -> String {
    "SERPER_API_KEY".into()
}
fn default_search_endpoint() -> String {
    "https://google.serper.dev/search".into()
}
fn default_results_per_query() -> u32 {
    8
}

/// `[scrape]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSettings {
    /// Per-request timeout in seconds.
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Maximum research sources scraped per run.
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            max_sources: default_max_sources(),
        }
    }
}

fn default_scrape_timeout() -> u64 {
    30
}
fn default_max_sources() -> usize {
    6
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_completion_key_env")]
    pub api_key_env: String,

    /// Chat-completions endpoint URL.
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,

    /// Default model for drafting and evaluation.
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            api_key_env: default_completion_key_env(),
            endpoint: default_completion_endpoint(),
            default_model: default_model(),
        }
    }
}

fn default_completion_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_completion_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Base delay in ms; attempt n waits `base * 2^n` plus jitter.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Total attempts per key, including the first (so 3 means 2 retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_attempts() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.glossgen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GlossgenError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.glossgen/glossgen.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GlossgenError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| GlossgenError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GlossgenError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GlossgenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GlossgenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~` in a configured path against the user's home.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// API key resolution
// ---------------------------------------------------------------------------

/// Read an API key from the named environment variable.
///
/// A missing credential is an unrecoverable startup failure; the pipeline
/// must not begin work it cannot finish.
pub fn resolve_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(GlossgenError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every required API key env var is set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    resolve_api_key(&config.search.api_key_env)?;
    resolve_api_key(&config.completion.api_key_env)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("SERPER_API_KEY"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retry.max_attempts, 3);
        assert_eq!(parsed.retry.base_delay_ms, 500);
        assert_eq!(parsed.defaults.batch_concurrency, 4);
        assert_eq!(parsed.defaults.cache_policy, CachePolicy::PreferCached);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/entries"
cache_policy = "revalidate"

[completion]
default_model = "anthropic/claude-sonnet-4.5"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/tmp/entries");
        assert_eq!(config.defaults.cache_policy, CachePolicy::Revalidate);
        assert_eq!(config.completion.default_model, "anthropic/claude-sonnet-4.5");
        // Untouched sections keep their defaults.
        assert_eq!(config.search.results_per_query, 8);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn api_key_resolution_fails_when_unset() {
        // Use a unique env var name to avoid interfering with other tests
        let result = resolve_api_key("GLOSSGEN_TEST_NONEXISTENT_KEY_98765");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/data"), PathBuf::from("/var/data"));
        let expanded = expand_home("~/entries");
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
