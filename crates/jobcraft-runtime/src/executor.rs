//! Job executor.
//!
//! The [`Executor`] runs a compiled job one step at a time. For each step it
//! resolves params, derives the idempotency key, writes the manifest,
//! dispatches, and records the outcome. Every run ends with a [`RunRecord`]
//! in the run store, including failed and cancelled runs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use jobcraft_compiler::{CompileError, Compiler, StandardCompiler};
use jobcraft_config::JobDef;
use jobcraft_job::{JobInstance, Op, StepInstance};
use jobcraft_store::{
  RunRecord, RunStatus, RunStore, StepFailure, StepManifest, StepOutput, StepState, StoreError,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::callable::{Callable, CallableRegistry};
use crate::config::ExecutorConfig;
use crate::error::{ExecutionError, HandlerError, StepError};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::handler::{DispatchContext, Handler, HandlerBackend, HandlerRegistry};
use crate::idempotency::idempotency_key;
use crate::input::{ResolutionContext, resolve_template};
use crate::native;
use crate::storage::{StorageBackend, StorageOperation};

type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<RunRecord, ExecutionError>> + Send + 'a>>;

/// The chain of jobs that led to a run, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
  jobs: Vec<String>,
  parent_run_id: Option<String>,
}

impl Lineage {
  /// Lineage of a top-level run.
  pub fn root(job_id: impl Into<String>) -> Self {
    Self {
      jobs: vec![job_id.into()],
      parent_run_id: None,
    }
  }

  /// Lineage of a run started by a step of run `parent_run_id`.
  pub fn child(&self, job_id: impl Into<String>, parent_run_id: impl Into<String>) -> Self {
    let mut jobs = self.jobs.clone();
    jobs.push(job_id.into());
    Self {
      jobs,
      parent_run_id: Some(parent_run_id.into()),
    }
  }

  pub fn jobs(&self) -> &[String] {
    &self.jobs
  }

  /// Number of jobs in the chain; 1 for a top-level run.
  pub fn depth(&self) -> usize {
    self.jobs.len()
  }

  pub fn contains(&self, job_id: &str) -> bool {
    self.jobs.iter().any(|j| j == job_id)
  }

  pub fn parent_run_id(&self) -> Option<&str> {
    self.parent_run_id.as_deref()
  }
}

/// Runs compiled jobs against a set of handlers and a run store.
pub struct Executor {
  compiler: Arc<dyn Compiler>,
  handlers: HandlerRegistry,
  callables: CallableRegistry,
  storage: Option<Arc<dyn StorageBackend>>,
  store: Arc<dyn RunStore>,
  notifier: Arc<dyn ExecutionNotifier>,
  config: ExecutorConfig,
}

/// Builder for [`Executor`].
pub struct ExecutorBuilder {
  compiler: Arc<dyn Compiler>,
  handlers: HandlerRegistry,
  callables: CallableRegistry,
  storage: Option<Arc<dyn StorageBackend>>,
  store: Arc<dyn RunStore>,
  notifier: Arc<dyn ExecutionNotifier>,
  config: ExecutorConfig,
}

impl ExecutorBuilder {
  fn new(store: Arc<dyn RunStore>) -> Self {
    Self {
      compiler: Arc::new(StandardCompiler::new()),
      handlers: HandlerRegistry::new(),
      callables: CallableRegistry::new(),
      storage: None,
      store,
      notifier: Arc::new(NoopNotifier),
      config: ExecutorConfig::default(),
    }
  }

  pub fn compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
    self.compiler = compiler;
    self
  }

  /// Register the handler for a backend; a later call for the same backend wins.
  pub fn handler(mut self, backend: HandlerBackend, handler: Arc<dyn Handler>) -> Self {
    self.handlers.register(backend, handler);
    self
  }

  pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
    self.handlers = handlers;
    self
  }

  pub fn callable(mut self, name: impl Into<String>, callable: impl Callable + 'static) -> Self {
    self.callables.register(name, callable);
    self
  }

  /// Register a closure as a callable.
  pub fn callable_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
  where
    F: Fn(&Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
  {
    self.callables.register_fn(name, f);
    self
  }

  pub fn callables(mut self, callables: CallableRegistry) -> Self {
    self.callables = callables;
    self
  }

  pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
    self.storage = Some(storage);
    self
  }

  pub fn notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn config(mut self, config: ExecutorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Executor {
    Executor {
      compiler: self.compiler,
      handlers: self.handlers,
      callables: self.callables,
      storage: self.storage,
      store: self.store,
      notifier: self.notifier,
      config: self.config,
    }
  }
}

impl Executor {
  pub fn builder(store: Arc<dyn RunStore>) -> ExecutorBuilder {
    ExecutorBuilder::new(store)
  }

  pub fn config(&self) -> &ExecutorConfig {
    &self.config
  }

  pub fn compiler(&self) -> &dyn Compiler {
    self.compiler.as_ref()
  }

  pub fn store(&self) -> &Arc<dyn RunStore> {
    &self.store
  }

  pub fn notifier(&self) -> &Arc<dyn ExecutionNotifier> {
    &self.notifier
  }

  /// Compile a definition for one run.
  pub fn compile(&self, def: &JobDef, payload: Value) -> Result<JobInstance, CompileError> {
    self.compiler.compile(def, payload)
  }

  /// Compile and run a job.
  ///
  /// Compile errors are returned before anything is written. Once the job
  /// compiles, the result is always a [`RunRecord`] unless the run store
  /// itself fails.
  pub async fn run_job(
    &self,
    def: &JobDef,
    payload: Value,
    cancel: CancellationToken,
  ) -> Result<RunRecord, ExecutionError> {
    let instance = self.compile(def, payload)?;
    self.execute(instance, cancel).await
  }

  /// Run an already compiled job as a top-level run.
  pub async fn execute(
    &self,
    instance: JobInstance,
    cancel: CancellationToken,
  ) -> Result<RunRecord, ExecutionError> {
    let lineage = Lineage::root(&instance.job_id);
    self.execute_inner(instance, lineage, &cancel).await
  }

  /// Run a job on behalf of a step that is being dispatched.
  ///
  /// The child run gets its own run id, records the dispatching run as its
  /// parent and shares the parent's cancellation token.
  pub async fn run_child(
    &self,
    def: &JobDef,
    payload: Value,
    ctx: &DispatchContext<'_>,
  ) -> Result<RunRecord, ExecutionError> {
    let instance = self.compile(def, payload)?;
    let lineage = ctx.lineage.child(&instance.job_id, ctx.run_id);
    self.execute_inner(instance, lineage, ctx.cancel).await
  }

  fn execute_inner<'a>(
    &'a self,
    instance: JobInstance,
    lineage: Lineage,
    cancel: &'a CancellationToken,
  ) -> RunFuture<'a> {
    Box::pin(async move {
      let run_id = uuid::Uuid::new_v4().to_string();
      let span = info_span!(
        "run_job",
        run_id = %run_id,
        job_id = %instance.job_id,
        depth = lineage.depth()
      );
      self
        .run_steps(run_id, instance, lineage, cancel)
        .instrument(span)
        .await
    })
  }

  async fn run_steps(
    &self,
    run_id: String,
    instance: JobInstance,
    lineage: Lineage,
    cancel: &CancellationToken,
  ) -> Result<RunRecord, ExecutionError> {
    let JobInstance {
      job_id,
      steps: instances,
      payload,
      ..
    } = instance;
    let started_at = Utc::now();

    info!(
      run_id = %run_id,
      job_id = %job_id,
      parent_run_id = ?lineage.parent_run_id(),
      steps = instances.len(),
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      job_id: job_id.clone(),
    });

    let mut outputs: IndexMap<String, Value> = IndexMap::new();
    let mut steps = Vec::with_capacity(instances.len());
    let mut status = RunStatus::Success;
    let mut failure = None;

    for (seq, step) in instances.iter().enumerate() {
      if cancel.is_cancelled() {
        warn!(run_id = %run_id, next_step = %step.step_id, "run cancelled between steps");
        status = RunStatus::Cancelled;
        break;
      }

      steps.push(step.step_id.clone());
      let result = self
        .run_step(&run_id, seq as u32, step, &payload, &outputs, &lineage, cancel)
        .await?;

      match result {
        Ok(output) => {
          outputs.insert(step.step_id.clone(), output);
        }
        Err(error) => {
          let step_failure = StepFailure::new(&step.step_id, error.kind(), error.to_string());
          if continues_after(step, &error) {
            outputs.insert(step.step_id.clone(), step_failure.marker());
            status = RunStatus::Partial;
          } else {
            status = match error {
              StepError::Cancelled => RunStatus::Cancelled,
              _ => RunStatus::Failed,
            };
            failure = Some(step_failure);
            break;
          }
        }
      }
    }

    let record = RunRecord {
      run_id,
      job_id,
      parent_run_id: lineage.parent_run_id().map(str::to_string),
      status,
      payload,
      outputs,
      steps,
      failure,
      started_at,
      completed_at: Utc::now(),
    };
    self.store.record_run(&record).await?;

    match record.status {
      RunStatus::Success | RunStatus::Partial => {
        info!(run_id = %record.run_id, status = %record.status, "run_finished");
      }
      RunStatus::Failed => {
        error!(
          run_id = %record.run_id,
          status = %record.status,
          failed_step = ?record.failure.as_ref().map(|f| &f.step_id),
          "run_finished"
        );
      }
      RunStatus::Cancelled => {
        warn!(run_id = %record.run_id, status = %record.status, "run_finished");
      }
    }
    self.notifier.notify(ExecutionEvent::RunFinished {
      run_id: record.run_id.clone(),
      job_id: record.job_id.clone(),
      status: record.status,
    });

    Ok(record)
  }

  /// Drive one step through its states and record the outcome.
  ///
  /// The outer error is a run store failure; the inner one is the step's own.
  #[allow(clippy::too_many_arguments)]
  #[instrument(
    name = "step",
    skip_all,
    fields(run_id = %run_id, step_id = %step.step_id, op = %step.op)
  )]
  async fn run_step(
    &self,
    run_id: &str,
    seq: u32,
    step: &StepInstance,
    payload: &Value,
    outputs: &IndexMap<String, Value>,
    lineage: &Lineage,
    cancel: &CancellationToken,
  ) -> Result<Result<Value, StepError>, StoreError> {
    let mut state = StepState::Pending;
    self.notifier.notify(ExecutionEvent::StepStarted {
      run_id: run_id.to_string(),
      step_id: step.step_id.clone(),
      op: step.op.name(),
    });

    advance(&mut state, StepState::Resolving);
    let ctx = ResolutionContext::new(payload, outputs);
    let params = match resolve_template(&step.step_id, &step.template, &ctx) {
      Ok(params) => params,
      Err(e) => {
        // nothing was resolved, so there is no manifest to write
        advance(&mut state, StepState::Failed);
        return self.finish_step(run_id, seq, step, state, Err(e.into()), 0).await;
      }
    };

    let manifest = StepManifest {
      run_id: run_id.to_string(),
      step_id: step.step_id.clone(),
      seq,
      op: step.op.clone(),
      idempotency_key: idempotency_key(&step.op, &params),
      params,
      created_at: Utc::now(),
    };
    self.store.record_manifest(&manifest).await?;
    debug!(idempotency_key = %manifest.idempotency_key, "manifest recorded");

    advance(&mut state, StepState::Dispatched);
    let max_attempts = step.max_attempts.unwrap_or(self.config.max_attempts).max(1);
    let (result, attempts) = self
      .dispatch_with_retry(&manifest, max_attempts, lineage, cancel)
      .await;

    // A failure once the run is cancelled is the cancellation, e.g. a nested
    // job.run that stopped early.
    let result = match result {
      Err(e) if cancel.is_cancelled() && e != StepError::Cancelled => {
        debug!(error = %e, "step failed after cancellation");
        Err(StepError::Cancelled)
      }
      other => other,
    };

    let terminal = if result.is_ok() {
      StepState::Succeeded
    } else {
      StepState::Failed
    };
    advance(&mut state, terminal);
    self
      .finish_step(run_id, seq, step, state, result, attempts)
      .await
  }

  async fn finish_step(
    &self,
    run_id: &str,
    seq: u32,
    step: &StepInstance,
    state: StepState,
    result: Result<Value, StepError>,
    attempts: u32,
  ) -> Result<Result<Value, StepError>, StoreError> {
    let output = StepOutput {
      run_id: run_id.to_string(),
      step_id: step.step_id.clone(),
      seq,
      state,
      output: result.as_ref().ok().cloned(),
      error: result
        .as_ref()
        .err()
        .map(|e| StepFailure::new(&step.step_id, e.kind(), e.to_string())),
      attempts,
      recorded_at: Utc::now(),
    };
    self.store.record_output(&output).await?;

    match &result {
      Ok(_) => {
        info!(attempts = attempts, "step_succeeded");
        self.notifier.notify(ExecutionEvent::StepSucceeded {
          run_id: run_id.to_string(),
          step_id: step.step_id.clone(),
          attempts,
        });
      }
      Err(e) => {
        let continued = continues_after(step, e);
        if continued {
          warn!(kind = %e.kind(), error = %e, "step_failed, continuing");
        } else {
          error!(kind = %e.kind(), error = %e, "step_failed");
        }
        self.notifier.notify(ExecutionEvent::StepFailed {
          run_id: run_id.to_string(),
          step_id: step.step_id.clone(),
          kind: e.kind(),
          message: e.to_string(),
          continued,
        });
      }
    }

    Ok(result)
  }

  /// Dispatch, retrying handler failures up to `max_attempts` in total.
  ///
  /// `job.run` is dispatched once: each attempt would start a new nested run
  /// and repeat its side effects.
  async fn dispatch_with_retry(
    &self,
    manifest: &StepManifest,
    max_attempts: u32,
    lineage: &Lineage,
    cancel: &CancellationToken,
  ) -> (Result<Value, StepError>, u32) {
    let max_attempts = if retryable(&manifest.op) { max_attempts } else { 1 };
    let mut attempt = 0;
    loop {
      attempt += 1;
      match self.dispatch(manifest, lineage, cancel).await {
        Err(StepError::Handler(e)) if attempt < max_attempts => {
          warn!(attempt = attempt, max_attempts = max_attempts, error = %e, "attempt failed, retrying");
          let backoff = Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(attempt as u64));
          tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => return (Err(StepError::Cancelled), attempt),
          }
        }
        result => return (result, attempt),
      }
    }
  }

  async fn dispatch(
    &self,
    manifest: &StepManifest,
    lineage: &Lineage,
    cancel: &CancellationToken,
  ) -> Result<Value, StepError> {
    match &manifest.op {
      Op::Call => native::call(&self.callables, &manifest.params),
      Op::PlanBuild => Ok(native::plan_build(&manifest.params)?),
      Op::StoracleQuery => {
        native::storacle(
          self.storage.as_deref(),
          StorageOperation::Query,
          &manifest.params,
        )
        .await
      }
      Op::StoracleSubmit => {
        native::storacle(
          self.storage.as_deref(),
          StorageOperation::Submit,
          &manifest.params,
        )
        .await
      }
      Op::Compute(_) | Op::JobRun => {
        let ctx = DispatchContext {
          executor: self,
          run_id: &manifest.run_id,
          lineage,
          cancel,
        };
        self.handlers.dispatch(manifest, &ctx).await
      }
    }
  }
}

/// Whether the run goes on after `step` failed with `error`.
///
/// Dispatch errors and cancellation stop the run whatever the step says.
fn continues_after(step: &StepInstance, error: &StepError) -> bool {
  step.continue_on_error && matches!(error, StepError::Resolution(_) | StepError::Handler(_))
}

/// Whether a handler failure of `op` may be retried.
fn retryable(op: &Op) -> bool {
  !matches!(op, Op::JobRun)
}

fn advance(state: &mut StepState, next: StepState) {
  debug_assert!(
    state.can_transition(next),
    "illegal step transition {:?} -> {:?}",
    state,
    next
  );
  *state = next;
}
