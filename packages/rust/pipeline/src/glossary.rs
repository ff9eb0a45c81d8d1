//! The glossary-entry workflow: concrete steps wiring search, scrape, and
//! completion upstreams through the cached resolver.
//!
//! Step order: keyword research → technical research → outline → draft →
//! evaluate. Each step's output is persisted by the engine, so a run that
//! fails mid-pipeline resumes without repeating paid upstream calls.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use glossgen_fetch::{
    BatchCoordinator, BatchMode, BatchSummary, Resolved, Resolver, SearchHit, Upstream,
    organic_results,
};
use glossgen_shared::{GlossgenError, Result};

use crate::engine::{StepContext, WorkflowStep};

/// Step names; resumption and output lookups key on these.
pub const KEYWORD_RESEARCH: &str = "keyword_research";
pub const TECHNICAL_RESEARCH: &str = "technical_research";
pub const OUTLINE: &str = "outline";
pub const DRAFT: &str = "draft";
pub const EVALUATE: &str = "evaluate";

/// Cap per-document research content carried into step outputs and prompts.
const MAX_DOC_CHARS: usize = 8_000;

// ---------------------------------------------------------------------------
// Step outputs
// ---------------------------------------------------------------------------

/// Output of keyword research: the sources worth scraping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub sources: Vec<SearchHit>,
}

/// One scraped research document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchDoc {
    pub url: String,
    pub content: String,
}

/// Output of technical research: scraped documents plus the batch summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchNotes {
    pub documents: Vec<ResearchDoc>,
    pub summary: BatchSummary,
}

/// Output of the evaluate step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    /// "approved" or "needs_revision".
    pub verdict: String,
    /// Reviewer notes, verbatim.
    pub notes: String,
}

// ---------------------------------------------------------------------------
// Dependencies and workflow construction
// ---------------------------------------------------------------------------

/// Shared handles for the glossary workflow steps.
#[derive(Clone)]
pub struct GlossaryDeps {
    /// Cached fetch-or-create resolver (retry + cache policy inside).
    pub resolver: Resolver,
    /// Search upstream for keyword research.
    pub search: Arc<dyn Upstream>,
    /// Scrape upstream for technical research.
    pub scrape: Arc<dyn Upstream>,
    /// Completion upstream for outline/draft/evaluate.
    pub completion: Arc<dyn Upstream>,
    /// Scheduling mode for the research batch.
    pub batch_mode: BatchMode,
    /// Maximum research sources scraped per run.
    pub max_sources: usize,
}

/// Build the ordered glossary workflow.
pub fn glossary_workflow(deps: GlossaryDeps) -> Vec<Box<dyn WorkflowStep>> {
    vec![
        Box::new(KeywordResearchStep { deps: deps.clone() }),
        Box::new(TechnicalResearchStep { deps: deps.clone() }),
        Box::new(OutlineStep { deps: deps.clone() }),
        Box::new(DraftStep { deps: deps.clone() }),
        Box::new(EvaluateStep { deps }),
    ]
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Unwrap a resolve into its payload, turning a failure record into a step error.
fn require_payload(resolved: Resolved, what: &str) -> Result<String> {
    match resolved.record.payload {
        Some(payload) if resolved.record.success => Ok(payload),
        _ => Err(GlossgenError::Workflow(format!(
            "{what} failed: {}",
            resolved.record.error.as_deref().unwrap_or("no payload")
        ))),
    }
}

/// Parse a previous step's JSON output from the context.
fn parse_output<T: DeserializeOwned>(ctx: &StepContext<'_>, step: &str) -> Result<T> {
    let raw = ctx.outputs.get(step).ok_or_else(|| {
        GlossgenError::Workflow(format!("missing output from step {step}"))
    })?;
    serde_json::from_str(raw)
        .map_err(|e| GlossgenError::parse(format!("step {step} output: {e}")))
}

/// Fetch a plain-text output of a previous step.
fn text_output<'a>(ctx: &'a StepContext<'_>, step: &str) -> Result<&'a str> {
    ctx.outputs
        .get(step)
        .map(String::as_str)
        .ok_or_else(|| GlossgenError::Workflow(format!("missing output from step {step}")))
}

/// Truncate content to approximately `max_chars`, respecting char boundaries.
fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        return content.to_string();
    }
    let mut end = max_chars;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n\n[... content truncated ...]", &content[..end])
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Search the term and pick the sources worth scraping.
struct KeywordResearchStep {
    deps: GlossaryDeps,
}

#[async_trait]
impl WorkflowStep for KeywordResearchStep {
    fn name(&self) -> &'static str {
        KEYWORD_RESEARCH
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<String> {
        let resolved = self
            .deps
            .resolver
            .resolve(self.deps.search.as_ref(), ctx.term)
            .await;
        let payload = require_payload(resolved, "keyword research")?;

        let hits = organic_results(&payload)?;
        if hits.is_empty() {
            return Err(GlossgenError::Workflow(format!(
                "search returned no sources for {:?}",
                ctx.term
            )));
        }

        let sources: Vec<SearchHit> = hits.into_iter().take(self.deps.max_sources).collect();
        info!(sources = sources.len(), "keyword research complete");

        let plan = ResearchPlan { sources };
        serde_json::to_string(&plan).map_err(|e| GlossgenError::parse(e.to_string()))
    }
}

/// Batch-scrape the planned sources. Partial failures are tolerated as long
/// as at least one document comes back.
struct TechnicalResearchStep {
    deps: GlossaryDeps,
}

#[async_trait]
impl WorkflowStep for TechnicalResearchStep {
    fn name(&self) -> &'static str {
        TECHNICAL_RESEARCH
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<String> {
        let plan: ResearchPlan = parse_output(ctx, KEYWORD_RESEARCH)?;
        let keys: Vec<String> = plan.sources.iter().map(|h| h.link.clone()).collect();

        let coordinator =
            BatchCoordinator::new(self.deps.resolver.clone(), self.deps.batch_mode);
        let outcome = coordinator.run(self.deps.scrape.clone(), &keys).await;

        let documents: Vec<ResearchDoc> = outcome
            .items
            .into_iter()
            .filter_map(|item| {
                item.payload.map(|content| ResearchDoc {
                    url: item.key,
                    content: truncate_content(&content, MAX_DOC_CHARS),
                })
            })
            .collect();

        if documents.is_empty() {
            return Err(GlossgenError::Workflow(format!(
                "no research sources could be fetched ({} failed)",
                outcome.summary.failed
            )));
        }

        info!(
            documents = documents.len(),
            failed = outcome.summary.failed,
            "technical research complete"
        );

        let notes = ResearchNotes {
            documents,
            summary: outcome.summary,
        };
        serde_json::to_string(&notes).map_err(|e| GlossgenError::parse(e.to_string()))
    }
}

/// Generate an outline from the research notes.
struct OutlineStep {
    deps: GlossaryDeps,
}

#[async_trait]
impl WorkflowStep for OutlineStep {
    fn name(&self) -> &'static str {
        OUTLINE
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<String> {
        let notes: ResearchNotes = parse_output(ctx, TECHNICAL_RESEARCH)?;
        let prompt = outline_prompt(ctx.term, &notes);

        let resolved = self
            .deps
            .resolver
            .resolve(self.deps.completion.as_ref(), &prompt)
            .await;
        require_payload(resolved, "outline generation")
    }
}

/// Draft the entry from the outline and research notes.
struct DraftStep {
    deps: GlossaryDeps,
}

#[async_trait]
impl WorkflowStep for DraftStep {
    fn name(&self) -> &'static str {
        DRAFT
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<String> {
        let outline = text_output(ctx, OUTLINE)?;
        let notes: ResearchNotes = parse_output(ctx, TECHNICAL_RESEARCH)?;
        let prompt = draft_prompt(ctx.term, outline, &notes);

        let resolved = self
            .deps
            .resolver
            .resolve(self.deps.completion.as_ref(), &prompt)
            .await;
        require_payload(resolved, "drafting")
    }
}

/// Review the draft and record a verdict. The verdict is advisory output;
/// only a completion failure fails the step.
struct EvaluateStep {
    deps: GlossaryDeps,
}

#[async_trait]
impl WorkflowStep for EvaluateStep {
    fn name(&self) -> &'static str {
        EVALUATE
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<String> {
        let draft = text_output(ctx, DRAFT)?;
        let prompt = evaluate_prompt(ctx.term, draft);

        let resolved = self
            .deps
            .resolver
            .resolve(self.deps.completion.as_ref(), &prompt)
            .await;
        let text = require_payload(resolved, "evaluation")?;

        let evaluation = parse_evaluation(&text);
        serde_json::to_string(&evaluation).map_err(|e| GlossgenError::parse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn outline_prompt(term: &str, notes: &ResearchNotes) -> String {
    let mut prompt = format!(
        "You are writing a technical glossary entry for \"{term}\".\n\n\
         Research notes follow. Produce a numbered outline for the entry: \
         a one-sentence definition, how it works, when to use it, and common \
         pitfalls. Outline only, no prose.\n\n"
    );
    for doc in &notes.documents {
        prompt.push_str(&format!(
            "Source: {}\n{}\n\n",
            doc.url,
            truncate_content(&doc.content, 4_000)
        ));
    }
    prompt
}

fn draft_prompt(term: &str, outline: &str, notes: &ResearchNotes) -> String {
    let mut prompt = format!(
        "Write a complete glossary entry for \"{term}\" in Markdown, following \
         this outline:\n\n{outline}\n\n\
         Ground every claim in the research notes below. Plain, precise \
         language; no marketing tone.\n\n"
    );
    for doc in &notes.documents {
        prompt.push_str(&format!(
            "Source: {}\n{}\n\n",
            doc.url,
            truncate_content(&doc.content, 4_000)
        ));
    }
    prompt
}

fn evaluate_prompt(term: &str, draft: &str) -> String {
    format!(
        "Review this glossary entry for \"{term}\". If it is accurate, \
         complete, and clearly written, reply APPROVED on the first line. \
         Otherwise list the specific problems, one per line.\n\n{draft}"
    )
}

/// Parse the reviewer's reply into a structured verdict.
fn parse_evaluation(text: &str) -> Evaluation {
    let trimmed = text.trim();
    let approved = trimmed
        .lines()
        .next()
        .map(|line| line.trim().eq_ignore_ascii_case("approved"))
        .unwrap_or(false);

    Evaluation {
        verdict: if approved { "approved" } else { "needs_revision" }.to_string(),
        notes: trimmed.to_string(),
    }
}
