//! The `job.run` handler.

use std::sync::Arc;

use async_trait::async_trait;
use jobcraft_catalog::Catalog;
use jobcraft_store::{RunStatus, StepManifest};
use serde_json::{Value, json};
use tracing::info;

use crate::error::HandlerError;
use crate::handler::{DispatchContext, Handler};

/// Runs the job named by `params.job_id` as a nested run.
///
/// The nested job is looked up in the catalog and gets `params.payload`
/// (default `{}`) as its payload. The step output is
/// `{"run_id", "status", "outputs"}` of the nested run.
pub struct JobRunHandler {
  catalog: Arc<dyn Catalog>,
}

impl JobRunHandler {
  pub fn new(catalog: Arc<dyn Catalog>) -> Self {
    Self { catalog }
  }
}

#[async_trait]
impl Handler for JobRunHandler {
  async fn handle(
    &self,
    manifest: &StepManifest,
    ctx: &DispatchContext<'_>,
  ) -> Result<Value, HandlerError> {
    let job_id = manifest
      .params
      .get("job_id")
      .and_then(Value::as_str)
      .filter(|id| !id.is_empty())
      .ok_or_else(|| HandlerError::new("job.run requires a string 'job_id' parameter"))?;

    if ctx.lineage.contains(job_id) {
      return Err(HandlerError::new(format!(
        "cyclic job reference: {} -> {}",
        ctx.lineage.jobs().join(" -> "),
        job_id
      )));
    }

    let max_depth = ctx.executor.config().max_depth;
    if ctx.lineage.depth() >= max_depth {
      return Err(HandlerError::new(format!(
        "job '{}' would exceed the maximum nesting depth of {}",
        job_id, max_depth
      )));
    }

    let def = self
      .catalog
      .job(job_id)
      .await
      .map_err(|e| HandlerError::new(e.to_string()))?;
    let payload = manifest
      .params
      .get("payload")
      .cloned()
      .unwrap_or_else(|| json!({}));

    info!(parent_run_id = %ctx.run_id, job_id = %job_id, "starting nested run");
    let record = ctx
      .executor
      .run_child(&def, payload, ctx)
      .await
      .map_err(|e| HandlerError::new(format!("nested job '{}': {}", job_id, e)))?;

    match record.status {
      RunStatus::Failed | RunStatus::Cancelled => {
        let detail = record
          .failure
          .as_ref()
          .map(|f| format!(" at step '{}' ({}): {}", f.step_id, f.kind, f.message))
          .unwrap_or_default();
        Err(HandlerError::new(format!(
          "nested run {} of job '{}' ended {}{}",
          record.run_id, job_id, record.status, detail
        )))
      }
      RunStatus::Success | RunStatus::Partial => Ok(json!({
        "run_id": record.run_id,
        "status": record.status,
        "outputs": record.outputs,
      })),
    }
  }
}
