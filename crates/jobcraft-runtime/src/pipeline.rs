//! Pipeline runner.
//!
//! A pipeline is an ordered list of job and sub-pipeline entries. The runner
//! first expands the whole tree through the catalog, validating every job and
//! rejecting cycles, and only then runs the entries one after another.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jobcraft_catalog::Catalog;
use jobcraft_config::{JobDef, PipelineDef, PipelineEntry};
use jobcraft_store::{RunRecord, RunStatus};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::PipelineError;
use crate::events::ExecutionEvent;
use crate::executor::Executor;

/// Outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
  pub pipeline_id: String,
  pub status: RunStatus,
  /// Results of the entries that ran, in order.
  pub entries: Vec<EntryResult>,
  /// Labels (`job:<id>` / `pipeline:<id>`) of entries that never ran.
  pub skipped: Vec<String>,
}

/// Outcome of one pipeline entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryResult {
  Job(RunRecord),
  Pipeline(PipelineResult),
}

impl EntryResult {
  pub fn status(&self) -> RunStatus {
    match self {
      EntryResult::Job(record) => record.status,
      EntryResult::Pipeline(result) => result.status,
    }
  }

  pub fn label(&self) -> String {
    match self {
      EntryResult::Job(record) => format!("job:{}", record.job_id),
      EntryResult::Pipeline(result) => format!("pipeline:{}", result.pipeline_id),
    }
  }
}

/// A pipeline with every entry looked up and validated.
struct Plan {
  def: PipelineDef,
  entries: Vec<PlannedEntry>,
}

struct PlannedEntry {
  label: String,
  payload: Option<Value>,
  target: Target,
}

enum Target {
  Job(JobDef),
  Pipeline(Plan),
}

type PlanFuture<'a> = Pin<Box<dyn Future<Output = Result<Plan, PipelineError>> + Send + 'a>>;
type ResultFuture<'a> =
  Pin<Box<dyn Future<Output = Result<PipelineResult, PipelineError>> + Send + 'a>>;

/// Runs pipelines with an executor, resolving entries through a catalog.
pub struct PipelineRunner {
  executor: Arc<Executor>,
  catalog: Arc<dyn Catalog>,
}

impl PipelineRunner {
  pub fn new(executor: Arc<Executor>, catalog: Arc<dyn Catalog>) -> Self {
    Self { executor, catalog }
  }

  /// Look a pipeline up in the catalog and run it.
  pub async fn run_by_id(
    &self,
    pipeline_id: &str,
    payload: Value,
    cancel: CancellationToken,
  ) -> Result<PipelineResult, PipelineError> {
    let def = self.catalog.pipeline(pipeline_id).await?;
    self.run(&def, payload, cancel).await
  }

  /// Expand and run a pipeline.
  ///
  /// Expansion errors (cycles, depth, missing or invalid definitions) are
  /// returned before any job runs.
  #[instrument(
    name = "run_pipeline",
    skip(self, def, payload, cancel),
    fields(pipeline_id = %def.pipeline_id)
  )]
  pub async fn run(
    &self,
    def: &PipelineDef,
    payload: Value,
    cancel: CancellationToken,
  ) -> Result<PipelineResult, PipelineError> {
    let plan = self.expand(def.clone(), Vec::new()).await?;
    self.execute(&plan, payload, &cancel).await
  }

  /// Expand a pipeline without running it.
  pub async fn validate(&self, def: &PipelineDef) -> Result<(), PipelineError> {
    self.expand(def.clone(), Vec::new()).await.map(|_| ())
  }

  fn expand<'a>(&'a self, def: PipelineDef, mut chain: Vec<String>) -> PlanFuture<'a> {
    Box::pin(async move {
      check_nesting(&def.pipeline_id, &chain, self.executor.config().max_depth)?;
      chain.push(def.pipeline_id.clone());

      let mut entries = Vec::with_capacity(def.entries.len());
      for entry in &def.entries {
        let target = match entry {
          PipelineEntry::Job { job, .. } => {
            let job_def = self.catalog.job(job).await?;
            self
              .executor
              .compiler()
              .validate(&job_def)
              .map_err(|source| PipelineError::Compile {
                pipeline_id: def.pipeline_id.clone(),
                job_id: job.clone(),
                source,
              })?;
            Target::Job(job_def)
          }
          PipelineEntry::Pipeline { pipeline, .. } => {
            // checked before the lookup so a cycle never depends on catalog contents
            check_nesting(pipeline, &chain, self.executor.config().max_depth)?;
            let sub = self.catalog.pipeline(pipeline).await?;
            Target::Pipeline(self.expand(sub, chain.clone()).await?)
          }
        };
        entries.push(PlannedEntry {
          label: entry.label(),
          payload: entry.payload().cloned(),
          target,
        });
      }

      Ok(Plan { def, entries })
    })
  }

  fn execute<'a>(
    &'a self,
    plan: &'a Plan,
    payload: Value,
    cancel: &'a CancellationToken,
  ) -> ResultFuture<'a> {
    Box::pin(async move {
      let pipeline_id = plan.def.pipeline_id.clone();
      let stop_on_failure = plan.def.stop_on_failure;
      let notifier = self.executor.notifier();

      info!(
        pipeline_id = %pipeline_id,
        entries = plan.entries.len(),
        stop_on_failure = stop_on_failure,
        "pipeline_started"
      );
      notifier.notify(ExecutionEvent::PipelineStarted {
        pipeline_id: pipeline_id.clone(),
      });

      let mut entries = Vec::with_capacity(plan.entries.len());
      let mut skipped = Vec::new();
      let mut any_failed = false;
      let mut cancelled = false;

      for (index, entry) in plan.entries.iter().enumerate() {
        if cancel.is_cancelled() {
          cancelled = true;
          skipped.extend(plan.entries[index..].iter().map(|e| e.label.clone()));
          break;
        }

        let entry_payload = entry.payload.clone().unwrap_or_else(|| payload.clone());
        let result = match &entry.target {
          Target::Job(def) => {
            EntryResult::Job(self.executor.run_job(def, entry_payload, cancel.clone()).await?)
          }
          Target::Pipeline(sub) => {
            EntryResult::Pipeline(self.execute(sub, entry_payload, cancel).await?)
          }
        };

        let status = result.status();
        entries.push(result);
        let rest = || plan.entries[index + 1..].iter().map(|e| e.label.clone());

        match status {
          RunStatus::Failed => {
            any_failed = true;
            if stop_on_failure {
              warn!(entry = %entry.label, "entry failed, skipping remaining entries");
              skipped.extend(rest());
              break;
            }
            warn!(entry = %entry.label, "entry failed, continuing");
          }
          RunStatus::Cancelled => {
            cancelled = true;
            skipped.extend(rest());
            break;
          }
          RunStatus::Success | RunStatus::Partial => {}
        }
      }

      let status = if cancelled {
        RunStatus::Cancelled
      } else if any_failed && stop_on_failure {
        RunStatus::Failed
      } else if any_failed {
        RunStatus::Partial
      } else {
        RunStatus::Success
      };

      if status == RunStatus::Failed {
        error!(pipeline_id = %pipeline_id, skipped = skipped.len(), "pipeline_finished");
      } else {
        info!(pipeline_id = %pipeline_id, status = %status, skipped = skipped.len(), "pipeline_finished");
      }
      notifier.notify(ExecutionEvent::PipelineFinished {
        pipeline_id: pipeline_id.clone(),
        status,
      });

      Ok(PipelineResult {
        pipeline_id,
        status,
        entries,
        skipped,
      })
    })
  }
}

/// Reject `pipeline_id` if it is already being expanded or the chain is full.
fn check_nesting(pipeline_id: &str, chain: &[String], max_depth: usize) -> Result<(), PipelineError> {
  if chain.iter().any(|id| id == pipeline_id) {
    let mut cycle = chain.to_vec();
    cycle.push(pipeline_id.to_string());
    return Err(PipelineError::Cyclic { chain: cycle });
  }
  if chain.len() >= max_depth {
    return Err(PipelineError::DepthExceeded {
      pipeline_id: pipeline_id.to_string(),
      max_depth,
    });
  }
  Ok(())
}
