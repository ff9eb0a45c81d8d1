//! Workflow orchestration and glossary-entry generation for glossgen.
//!
//! This crate ties the fetch layer together into an end-to-end, resumable
//! pipeline: an ordered list of persisted-status steps ([`engine`]), the
//! concrete glossary steps ([`glossary`]), and final entry assembly
//! ([`entry`]).

pub mod engine;
pub mod entry;
pub mod glossary;

pub use engine::{
    ProgressReporter, RunReport, SilentProgress, StepContext, WorkflowStep, run_workflow,
};
pub use entry::{EntryConfig, EntryResult, assemble_entry, slugify};
pub use glossary::{GlossaryDeps, glossary_workflow};
