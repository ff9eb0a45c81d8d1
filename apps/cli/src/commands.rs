//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use glossgen_fetch::{
    BatchMode, CompletionClient, CompletionConfig, RetryConfig, ScrapeClient, ScrapeConfig,
    SearchClient, SearchConfig,
};
use glossgen_pipeline::engine::{ProgressReporter, RunReport, run_workflow};
use glossgen_pipeline::entry::{EntryConfig, assemble_entry};
use glossgen_pipeline::glossary::{GlossaryDeps, glossary_workflow};
use glossgen_shared::{
    AppConfig, CachePolicy, RunRecord, StepStatus, expand_home, init_config, load_config,
    resolve_api_key, validate_api_keys,
};
use glossgen_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// glossgen — research, draft, and evaluate glossary entries.
#[derive(Parser)]
#[command(
    name = "glossgen",
    version,
    about = "Generate glossary entries through a cached, resumable research pipeline.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a glossary entry for a term.
    Generate {
        /// The term to research and draft.
        term: String,

        /// Output directory (defaults to the configured output_dir).
        #[arg(short, long)]
        out: Option<String>,

        /// Completion model override.
        #[arg(long)]
        model: Option<String>,

        /// Bypass the cache and re-fetch every upstream resource.
        #[arg(long)]
        revalidate: bool,

        /// Scrape research sources one at a time instead of concurrently.
        #[arg(long)]
        sequential: bool,
    },

    /// Resume a failed or interrupted run from its first incomplete step.
    Resume {
        /// Run ID to resume.
        run_id: String,

        /// Output directory (defaults to the configured output_dir).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// List all runs.
    Runs {
        /// Output directory (defaults to the configured output_dir).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Show a run's step-by-step status.
    Status {
        /// Run ID to inspect.
        run_id: String,

        /// Output directory (defaults to the configured output_dir).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "glossgen=info",
        1 => "glossgen=debug",
        _ => "glossgen=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            term,
            out,
            model,
            revalidate,
            sequential,
        } => cmd_generate(&term, out.as_deref(), model, revalidate, sequential).await,
        Command::Resume { run_id, out } => cmd_resume(&run_id, out.as_deref()).await,
        Command::Runs { out } => cmd_runs(out.as_deref()).await,
        Command::Status { run_id, out } => cmd_status(&run_id, out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Pipeline construction
// ---------------------------------------------------------------------------

fn resolve_output_root(config: &AppConfig, out: Option<&str>) -> PathBuf {
    match out {
        Some(p) => PathBuf::from(p),
        None => expand_home(&config.defaults.output_dir),
    }
}

fn db_path(output_root: &Path) -> PathBuf {
    output_root.join("glossgen.db")
}

/// Build the workflow dependencies over an open storage handle.
///
/// Returns the deps plus the resolved model ID (for the entry frontmatter).
fn build_deps(
    config: &AppConfig,
    storage: Arc<Storage>,
    model_override: Option<String>,
    revalidate: bool,
    sequential: bool,
) -> Result<(GlossaryDeps, String)> {
    let retry = RetryConfig::from(&config.retry);
    let policy = if revalidate {
        CachePolicy::Revalidate
    } else {
        config.defaults.cache_policy
    };
    let resolver = glossgen_fetch::Resolver::new(storage, retry, policy);

    let search_key = resolve_api_key(&config.search.api_key_env)?;
    let search = SearchClient::new(SearchConfig::from_settings(&config.search, search_key))?;

    let scrape = ScrapeClient::new(ScrapeConfig::from_settings(&config.scrape))?;

    let completion_key = resolve_api_key(&config.completion.api_key_env)?;
    let completion_config =
        CompletionConfig::from_settings(&config.completion, completion_key, model_override);
    let model = completion_config.model.clone();
    let completion = CompletionClient::new(completion_config)?;

    let batch_mode = if sequential {
        BatchMode::Sequential {
            delay: Duration::from_millis(config.defaults.batch_delay_ms),
        }
    } else {
        BatchMode::Concurrent {
            workers: config.defaults.batch_concurrency as usize,
        }
    };

    let deps = GlossaryDeps {
        resolver,
        search: Arc::new(search),
        scrape: Arc::new(scrape),
        completion: Arc::new(completion),
        batch_mode,
        max_sources: config.scrape.max_sources,
    };

    Ok((deps, model))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    term: &str,
    out: Option<&str>,
    model: Option<String>,
    revalidate: bool,
    sequential: bool,
) -> Result<()> {
    // Validate API keys before doing anything
    let config = load_config()?;
    validate_api_keys(&config)?;

    if term.trim().is_empty() {
        return Err(eyre!("term must not be empty"));
    }

    let output_root = resolve_output_root(&config, out);
    let storage = Arc::new(Storage::open(&db_path(&output_root)).await?);
    let (deps, model) = build_deps(&config, storage.clone(), model, revalidate, sequential)?;

    let run = RunRecord::new(term.trim());
    storage.insert_run(&run).await?;

    info!(run_id = %run.id, term, "starting generation run");

    let reporter = CliProgress::new();
    let steps = glossary_workflow(deps);
    let report = run_workflow(&storage, &run, &steps, &reporter).await?;

    finish_run(&output_root, &run, &report, &model)
}

async fn cmd_resume(run_id: &str, out: Option<&str>) -> Result<()> {
    let config = load_config()?;
    validate_api_keys(&config)?;

    let output_root = resolve_output_root(&config, out);
    let db = db_path(&output_root);
    if !db.exists() {
        return Err(eyre!("no database at '{}' — nothing to resume", db.display()));
    }

    let storage = Arc::new(Storage::open(&db).await?);
    let run = storage
        .get_run(run_id)
        .await?
        .ok_or_else(|| eyre!("unknown run: {run_id}"))?;

    if run.status == StepStatus::Succeeded {
        println!("Run {run_id} already completed successfully.");
        return Ok(());
    }

    let (deps, model) = build_deps(&config, storage.clone(), None, false, false)?;

    info!(run_id, term = %run.term, "resuming run");

    let reporter = CliProgress::new();
    let steps = glossary_workflow(deps);
    let report = run_workflow(&storage, &run, &steps, &reporter).await?;

    finish_run(&output_root, &run, &report, &model)
}

/// Print the run summary; assemble the entry on success.
fn finish_run(
    output_root: &Path,
    run: &RunRecord,
    report: &RunReport,
    model: &str,
) -> Result<()> {
    match report.status {
        StepStatus::Succeeded => {
            let entry_config = EntryConfig {
                output_root: output_root.to_path_buf(),
                term: run.term.clone(),
                model: model.to_string(),
                run_id: report.run_id.clone(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
            };
            let result = assemble_entry(&entry_config, &report.outputs)?;

            println!();
            println!("  Entry generated successfully!");
            println!("  Term:    {}", run.term);
            println!("  Run:     {}", report.run_id);
            println!("  Steps:   {} executed, {} skipped", report.steps_executed, report.steps_skipped);
            println!("  Path:    {}", result.entry_path.display());
            println!();
            Ok(())
        }
        _ => {
            let (step, error) = report
                .failure
                .clone()
                .unwrap_or_else(|| ("unknown".into(), "unknown error".into()));

            println!();
            println!("  Run failed at step '{step}': {error}");
            println!("  Completed steps are cached; resume with:");
            println!("    glossgen resume {}", report.run_id);
            println!();
            Err(eyre!("run {} failed at step '{step}'", report.run_id))
        }
    }
}

async fn cmd_runs(out: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let output_root = resolve_output_root(&config, out);
    let db = db_path(&output_root);
    if !db.exists() {
        println!("No runs yet (no database at '{}').", db.display());
        return Ok(());
    }

    let storage = Storage::open_readonly(&db).await?;
    let runs = storage.list_runs().await?;

    if runs.is_empty() {
        println!("No runs yet.");
        return Ok(());
    }

    println!("{:<38} {:<10} {:<20} TERM", "RUN", "STATUS", "UPDATED");
    for run in runs {
        println!(
            "{:<38} {:<10} {:<20} {}",
            run.id,
            run.status,
            run.updated_at.format("%Y-%m-%d %H:%M:%S"),
            run.term,
        );
    }
    Ok(())
}

async fn cmd_status(run_id: &str, out: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let output_root = resolve_output_root(&config, out);
    let db = db_path(&output_root);
    if !db.exists() {
        return Err(eyre!("no database at '{}'", db.display()));
    }

    let storage = Storage::open_readonly(&db).await?;
    let run = storage
        .get_run(run_id)
        .await?
        .ok_or_else(|| eyre!("unknown run: {run_id}"))?;

    println!("Run:     {}", run.id);
    println!("Term:    {}", run.term);
    println!("Status:  {}", run.status);
    println!("Created: {}", run.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!();

    let steps = storage.list_steps(run_id).await?;
    if steps.is_empty() {
        println!("No steps recorded yet.");
        return Ok(());
    }

    for step in steps {
        match (&step.status, &step.error) {
            (StepStatus::Failed, Some(error)) => {
                println!("  {:<20} {:<10} {error}", step.name, step.status)
            }
            _ => println!("  {:<20} {}", step.name, step.status),
        }
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn step_started(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {name}"));
    }

    fn step_skipped(&self, name: &str) {
        self.spinner
            .set_message(format!("{name}: already complete, skipping"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
