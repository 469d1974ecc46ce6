use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{RunRecord, RunStore, StepManifest, StepOutput, StoreError};

/// In-process store, used by tests and one-shot runs that need no history.
#[derive(Debug, Default)]
pub struct MemoryStore {
  inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
  manifests: Vec<StepManifest>,
  outputs: Vec<StepOutput>,
  runs: Vec<RunRecord>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RunStore for MemoryStore {
  async fn record_manifest(&self, manifest: &StepManifest) -> Result<(), StoreError> {
    let mut inner = self.inner.write();
    if inner
      .manifests
      .iter()
      .any(|m| m.run_id == manifest.run_id && m.step_id == manifest.step_id)
    {
      return Err(StoreError::AlreadyExists(format!(
        "manifest {}/{}",
        manifest.run_id, manifest.step_id
      )));
    }
    inner.manifests.push(manifest.clone());
    Ok(())
  }

  async fn record_output(&self, output: &StepOutput) -> Result<(), StoreError> {
    let mut inner = self.inner.write();
    if inner
      .outputs
      .iter()
      .any(|o| o.run_id == output.run_id && o.step_id == output.step_id)
    {
      return Err(StoreError::AlreadyExists(format!(
        "output {}/{}",
        output.run_id, output.step_id
      )));
    }
    inner.outputs.push(output.clone());
    Ok(())
  }

  async fn record_run(&self, record: &RunRecord) -> Result<(), StoreError> {
    let mut inner = self.inner.write();
    if inner.runs.iter().any(|r| r.run_id == record.run_id) {
      return Err(StoreError::AlreadyExists(format!("run {}", record.run_id)));
    }
    inner.runs.push(record.clone());
    Ok(())
  }

  async fn get_manifest(&self, run_id: &str, step_id: &str) -> Result<StepManifest, StoreError> {
    self
      .inner
      .read()
      .manifests
      .iter()
      .find(|m| m.run_id == run_id && m.step_id == step_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("manifest {run_id}/{step_id}")))
  }

  async fn get_output(&self, run_id: &str, step_id: &str) -> Result<StepOutput, StoreError> {
    self
      .inner
      .read()
      .outputs
      .iter()
      .find(|o| o.run_id == run_id && o.step_id == step_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("output {run_id}/{step_id}")))
  }

  async fn get_run(&self, run_id: &str) -> Result<RunRecord, StoreError> {
    self
      .inner
      .read()
      .runs
      .iter()
      .find(|r| r.run_id == run_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("run {run_id}")))
  }

  async fn list_manifests(&self, run_id: &str) -> Result<Vec<StepManifest>, StoreError> {
    let mut manifests: Vec<_> = self
      .inner
      .read()
      .manifests
      .iter()
      .filter(|m| m.run_id == run_id)
      .cloned()
      .collect();
    manifests.sort_by_key(|m| m.seq);
    Ok(manifests)
  }

  async fn list_outputs(&self, run_id: &str) -> Result<Vec<StepOutput>, StoreError> {
    let mut outputs: Vec<_> = self
      .inner
      .read()
      .outputs
      .iter()
      .filter(|o| o.run_id == run_id)
      .cloned()
      .collect();
    outputs.sort_by_key(|o| o.seq);
    Ok(outputs)
  }

  async fn list_runs(&self, job_id: &str) -> Result<Vec<RunRecord>, StoreError> {
    Ok(
      self
        .inner
        .read()
        .runs
        .iter()
        .rev()
        .filter(|r| r.job_id == job_id)
        .cloned()
        .collect(),
    )
  }

  async fn find_manifests_by_key(&self, key: &str) -> Result<Vec<StepManifest>, StoreError> {
    Ok(
      self
        .inner
        .read()
        .manifests
        .iter()
        .filter(|m| m.idempotency_key == key)
        .cloned()
        .collect(),
    )
  }
}
