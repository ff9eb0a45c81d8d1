//! Workflow engine: ordered steps with persisted status and resumption.
//!
//! Each step's status lives in the `steps` table keyed by (run_id, name).
//! Re-invoking a run skips steps already `succeeded` and loads their stored
//! outputs, so a crashed or failed run continues from the first incomplete
//! step instead of starting over.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use glossgen_shared::{Result, RunRecord, StepStatus};
use glossgen_storage::Storage;

// ---------------------------------------------------------------------------
// Step trait
// ---------------------------------------------------------------------------

/// Execution context handed to each step.
pub struct StepContext<'a> {
    /// The term this run generates an entry for.
    pub term: &'a str,
    /// Outputs of previously completed steps, keyed by step name.
    pub outputs: &'a HashMap<String, String>,
}

/// One unit of resumable work.
#[async_trait]
pub trait WorkflowStep: Send + Sync {
    /// Stable step name; resumption keys on it.
    fn name(&self) -> &'static str;

    /// Execute the step, returning its output for persistence.
    async fn run(&self, ctx: &StepContext<'_>) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting workflow status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a step begins executing.
    fn step_started(&self, name: &str, current: usize, total: usize);
    /// Called when a step is skipped because it already succeeded.
    fn step_skipped(&self, name: &str);
    /// Called when the workflow invocation completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn step_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn step_skipped(&self, _name: &str) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Summary of one engine invocation.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The run this report belongs to.
    pub run_id: String,
    /// Final run status: `Succeeded` or `Failed`.
    pub status: StepStatus,
    /// Steps executed on this invocation.
    pub steps_executed: usize,
    /// Steps skipped because a previous invocation completed them.
    pub steps_skipped: usize,
    /// Name and error of the failing step, if any.
    pub failure: Option<(String, String)>,
    /// All step outputs (stored + fresh), keyed by step name.
    pub outputs: HashMap<String, String>,
}

/// Run (or resume) a workflow against an existing run record.
///
/// A failed step marks the run `failed` and stops; the failure is carried in
/// the report rather than an error so the caller can print it and offer
/// resumption. Engine errors (storage unavailable) do propagate.
#[instrument(skip_all, fields(run_id = %run.id, term = %run.term))]
pub async fn run_workflow(
    storage: &Arc<Storage>,
    run: &RunRecord,
    steps: &[Box<dyn WorkflowStep>],
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let run_id = run.id.to_string();
    storage.update_run_status(&run_id, StepStatus::Running).await?;

    let mut outputs: HashMap<String, String> = HashMap::new();
    let mut executed = 0;
    let mut skipped = 0;
    let total = steps.len();

    for (i, step) in steps.iter().enumerate() {
        let name = step.name();

        // Resumption: completed steps are not re-executed.
        if let Some(stored) = storage.get_step(&run_id, name).await? {
            if stored.status == StepStatus::Succeeded {
                if let Some(output) = stored.output {
                    outputs.insert(name.to_string(), output);
                }
                skipped += 1;
                progress.step_skipped(name);
                continue;
            }
        }

        progress.step_started(name, i + 1, total);
        storage
            .upsert_step(&run_id, name, StepStatus::Running, None, None)
            .await?;

        let ctx = StepContext {
            term: &run.term,
            outputs: &outputs,
        };

        match step.run(&ctx).await {
            Ok(output) => {
                storage
                    .upsert_step(&run_id, name, StepStatus::Succeeded, Some(&output), None)
                    .await?;
                outputs.insert(name.to_string(), output);
                executed += 1;
            }
            Err(e) => {
                let message = e.to_string();
                warn!(step = name, error = %message, "step failed, halting run");
                storage
                    .upsert_step(&run_id, name, StepStatus::Failed, None, Some(&message))
                    .await?;
                storage.update_run_status(&run_id, StepStatus::Failed).await?;

                let report = RunReport {
                    run_id,
                    status: StepStatus::Failed,
                    steps_executed: executed,
                    steps_skipped: skipped,
                    failure: Some((name.to_string(), message)),
                    outputs,
                };
                progress.done(&report);
                return Ok(report);
            }
        }
    }

    storage
        .update_run_status(&run_id, StepStatus::Succeeded)
        .await?;

    let report = RunReport {
        run_id,
        status: StepStatus::Succeeded,
        steps_executed: executed,
        steps_skipped: skipped,
        failure: None,
        outputs,
    };

    info!(executed, skipped, "workflow complete");
    progress.done(&report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use uuid::Uuid;

    use glossgen_shared::GlossgenError;

    /// Step that counts executions and returns a fixed output.
    struct CountingStep {
        name: &'static str,
        output: &'static str,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WorkflowStep for CountingStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _ctx: &StepContext<'_>) -> Result<String> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.to_string())
        }
    }

    /// Step that fails until `healthy` flips to true.
    struct FlakyStep {
        name: &'static str,
        healthy: Arc<AtomicBool>,
    }

    #[async_trait]
    impl WorkflowStep for FlakyStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _ctx: &StepContext<'_>) -> Result<String> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok("recovered".into())
            } else {
                Err(GlossgenError::upstream(Some(500), "upstream down"))
            }
        }
    }

    /// Step that echoes a previous step's output from the context.
    struct EchoStep {
        name: &'static str,
        reads: &'static str,
    }

    #[async_trait]
    impl WorkflowStep for EchoStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, ctx: &StepContext<'_>) -> Result<String> {
            let upstream = ctx
                .outputs
                .get(self.reads)
                .ok_or_else(|| GlossgenError::Workflow(format!("missing {}", self.reads)))?;
            Ok(format!("saw: {upstream}"))
        }
    }

    async fn test_run(term: &str) -> (Arc<Storage>, RunRecord) {
        let tmp = std::env::temp_dir().join(format!("glossgen_engine_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));
        let run = RunRecord::new(term);
        storage.insert_run(&run).await.expect("insert run");
        (storage, run)
    }

    #[tokio::test]
    async fn all_steps_execute_in_order() {
        let (storage, run) = test_run("merkle tree").await;
        let runs = Arc::new(AtomicUsize::new(0));

        let steps: Vec<Box<dyn WorkflowStep>> = vec![
            Box::new(CountingStep {
                name: "first",
                output: "one",
                runs: runs.clone(),
            }),
            Box::new(EchoStep {
                name: "second",
                reads: "first",
            }),
        ];

        let report = run_workflow(&storage, &run, &steps, &SilentProgress)
            .await
            .expect("run");

        assert_eq!(report.status, StepStatus::Succeeded);
        assert_eq!(report.steps_executed, 2);
        assert_eq!(report.steps_skipped, 0);
        assert_eq!(report.outputs.get("second").unwrap(), "saw: one");

        // Run and step statuses are persisted.
        let stored = storage.get_run(&report.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, StepStatus::Succeeded);
        let steps = storage.list_steps(&report.run_id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| s.status == StepStatus::Succeeded));
    }

    #[tokio::test]
    async fn failed_step_halts_run_and_persists_failure() {
        let (storage, run) = test_run("lsm tree").await;
        let runs = Arc::new(AtomicUsize::new(0));
        let never_runs = Arc::new(AtomicUsize::new(0));

        let steps: Vec<Box<dyn WorkflowStep>> = vec![
            Box::new(CountingStep {
                name: "ok",
                output: "fine",
                runs: runs.clone(),
            }),
            Box::new(FlakyStep {
                name: "broken",
                healthy: Arc::new(AtomicBool::new(false)),
            }),
            Box::new(CountingStep {
                name: "after",
                output: "unreached",
                runs: never_runs.clone(),
            }),
        ];

        let report = run_workflow(&storage, &run, &steps, &SilentProgress)
            .await
            .expect("run");

        assert_eq!(report.status, StepStatus::Failed);
        let (failed_name, error) = report.failure.expect("failure recorded");
        assert_eq!(failed_name, "broken");
        assert!(error.contains("upstream down"));
        assert_eq!(never_runs.load(Ordering::SeqCst), 0);

        let stored = storage.get_run(&report.run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, StepStatus::Failed);
        let step = storage
            .get_step(&report.run_id, "broken")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert!(step.error.unwrap().contains("upstream down"));
    }

    #[tokio::test]
    async fn resume_skips_succeeded_steps() {
        let (storage, run) = test_run("hinted handoff").await;
        let first_runs = Arc::new(AtomicUsize::new(0));
        let healthy = Arc::new(AtomicBool::new(false));

        let steps: Vec<Box<dyn WorkflowStep>> = vec![
            Box::new(CountingStep {
                name: "research",
                output: "notes",
                runs: first_runs.clone(),
            }),
            Box::new(FlakyStep {
                name: "draft",
                healthy: healthy.clone(),
            }),
        ];

        // First invocation: research succeeds, draft fails.
        let report = run_workflow(&storage, &run, &steps, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.status, StepStatus::Failed);
        assert_eq!(first_runs.load(Ordering::SeqCst), 1);

        // Second invocation: research is skipped, draft recovers, and the
        // skipped step's output is still visible to later steps.
        healthy.store(true, Ordering::SeqCst);
        let report = run_workflow(&storage, &run, &steps, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.status, StepStatus::Succeeded);
        assert_eq!(report.steps_skipped, 1);
        assert_eq!(report.steps_executed, 1);
        assert_eq!(first_runs.load(Ordering::SeqCst), 1, "research not re-run");
        assert_eq!(report.outputs.get("research").unwrap(), "notes");
    }
}
