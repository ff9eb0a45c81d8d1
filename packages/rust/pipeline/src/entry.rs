//! Glossary entry assembly: writes the final entry directory to disk.
//!
//! Layout:
//! ```text
//! <output_root>/<slug>/
//! ├── entry.md    (frontmatter + draft body)
//! └── run.json    (run metadata, sources, evaluation verdict)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use glossgen_shared::{GlossgenError, Result};

use crate::glossary::{self, Evaluation, ResearchNotes};

/// Configuration for entry assembly.
#[derive(Debug, Clone)]
pub struct EntryConfig {
    /// Root directory for generated entries.
    pub output_root: PathBuf,
    /// The glossary term.
    pub term: String,
    /// Model used for drafting.
    pub model: String,
    /// Owning workflow run.
    pub run_id: String,
    /// Tool version string.
    pub tool_version: String,
}

/// Output from a successful entry assembly.
#[derive(Debug, Clone)]
pub struct EntryResult {
    /// Path to the written `entry.md`.
    pub entry_path: PathBuf,
    /// Slug derived from the term.
    pub slug: String,
}

/// Convert a term to a filesystem-safe slug.
pub fn slugify(term: &str) -> String {
    let mut slug = String::new();
    let mut prev_dash = false;
    for c in term.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash && !slug.is_empty() {
            slug.push('-');
            prev_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() { "entry".into() } else { slug }
}

/// Assemble the entry directory from the workflow's step outputs.
#[instrument(skip_all, fields(term = %config.term))]
pub fn assemble_entry(
    config: &EntryConfig,
    outputs: &HashMap<String, String>,
) -> Result<EntryResult> {
    let draft = outputs
        .get(glossary::DRAFT)
        .ok_or_else(|| GlossgenError::Workflow("missing draft output".into()))?;

    let sources: Vec<String> = outputs
        .get(glossary::TECHNICAL_RESEARCH)
        .and_then(|raw| serde_json::from_str::<ResearchNotes>(raw).ok())
        .map(|notes| notes.documents.into_iter().map(|d| d.url).collect())
        .unwrap_or_default();

    let evaluation: Option<Evaluation> = outputs
        .get(glossary::EVALUATE)
        .and_then(|raw| serde_json::from_str(raw).ok());

    let slug = slugify(&config.term);
    let dir = config.output_root.join(&slug);
    std::fs::create_dir_all(&dir).map_err(|e| GlossgenError::io(&dir, e))?;

    let generated_at = Utc::now().to_rfc3339();

    // entry.md: YAML frontmatter + draft body
    let mut frontmatter = format!(
        "---\nterm: \"{}\"\nslug: {slug}\ngenerated_at: {generated_at}\nmodel: {}\n",
        config.term, config.model
    );
    if !sources.is_empty() {
        frontmatter.push_str("sources:\n");
        for url in &sources {
            frontmatter.push_str(&format!("  - {url}\n"));
        }
    }
    frontmatter.push_str("---\n\n");

    let entry_path = dir.join("entry.md");
    std::fs::write(&entry_path, format!("{frontmatter}{}\n", draft.trim_end()))
        .map_err(|e| GlossgenError::io(&entry_path, e))?;

    // run.json: machine-readable run metadata
    let summary = serde_json::json!({
        "run_id": config.run_id,
        "term": config.term,
        "slug": slug,
        "model": config.model,
        "tool_version": config.tool_version,
        "generated_at": generated_at,
        "sources": sources,
        "evaluation": evaluation,
    });
    write_json(&dir.join("run.json"), &summary)?;

    info!(path = %entry_path.display(), "entry assembled");

    Ok(EntryResult { entry_path, slug })
}

/// Write a value as pretty-printed JSON.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| GlossgenError::validation(format!("serialize {}: {e}", path.display())))?;
    std::fs::write(path, json).map_err(|e| GlossgenError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn slugify_terms() {
        assert_eq!(slugify("Write-Ahead Log"), "write-ahead-log");
        assert_eq!(slugify("CAP theorem"), "cap-theorem");
        assert_eq!(slugify("  gRPC!  "), "grpc");
        assert_eq!(slugify("???"), "entry");
    }

    fn test_outputs() -> HashMap<String, String> {
        let mut outputs = HashMap::new();
        outputs.insert(
            glossary::DRAFT.to_string(),
            "# Write-Ahead Log\n\nA WAL records changes before applying them.".to_string(),
        );
        outputs.insert(
            glossary::TECHNICAL_RESEARCH.to_string(),
            serde_json::json!({
                "documents": [{"url": "https://a.dev/wal", "content": "..."}],
                "summary": {"succeeded": 1, "failed": 0, "cached": 0, "failures": []}
            })
            .to_string(),
        );
        outputs.insert(
            glossary::EVALUATE.to_string(),
            serde_json::json!({"verdict": "approved", "notes": "APPROVED"}).to_string(),
        );
        outputs
    }

    fn test_config() -> EntryConfig {
        EntryConfig {
            output_root: std::env::temp_dir().join(format!("glossgen_entry_{}", Uuid::now_v7())),
            term: "Write-Ahead Log".into(),
            model: "test/model-1".into(),
            run_id: "run-1".into(),
            tool_version: "0.1.0".into(),
        }
    }

    #[test]
    fn assemble_writes_entry_and_summary() {
        let config = test_config();
        let result = assemble_entry(&config, &test_outputs()).expect("assemble");

        assert_eq!(result.slug, "write-ahead-log");
        let entry = std::fs::read_to_string(&result.entry_path).unwrap();
        assert!(entry.starts_with("---\n"));
        assert!(entry.contains("term: \"Write-Ahead Log\""));
        assert!(entry.contains("model: test/model-1"));
        assert!(entry.contains("  - https://a.dev/wal"));
        assert!(entry.contains("A WAL records changes"));

        let run_json = std::fs::read_to_string(
            config.output_root.join("write-ahead-log").join("run.json"),
        )
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&run_json).unwrap();
        assert_eq!(parsed["term"], "Write-Ahead Log");
        assert_eq!(parsed["evaluation"]["verdict"], "approved");

        let _ = std::fs::remove_dir_all(&config.output_root);
    }

    #[test]
    fn missing_draft_is_an_error() {
        let config = test_config();
        let outputs = HashMap::new();
        let err = assemble_entry(&config, &outputs).unwrap_err();
        assert!(err.to_string().contains("missing draft"));
    }
}
