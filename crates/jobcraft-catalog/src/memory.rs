use std::collections::HashMap;

use async_trait::async_trait;
use jobcraft_config::{JobDef, PipelineDef};
use parking_lot::RwLock;

use crate::{Catalog, CatalogError};

/// Catalog of definitions registered in code.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
  jobs: RwLock<HashMap<String, JobDef>>,
  pipelines: RwLock<HashMap<String, PipelineDef>>,
}

impl MemoryCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a job under its `job_id`, replacing any previous definition.
  pub fn insert_job(&self, job: JobDef) {
    self.jobs.write().insert(job.job_id.clone(), job);
  }

  /// Register a pipeline under its `pipeline_id`, replacing any previous definition.
  pub fn insert_pipeline(&self, pipeline: PipelineDef) {
    self
      .pipelines
      .write()
      .insert(pipeline.pipeline_id.clone(), pipeline);
  }

  pub fn with_job(self, job: JobDef) -> Self {
    self.insert_job(job);
    self
  }

  pub fn with_pipeline(self, pipeline: PipelineDef) -> Self {
    self.insert_pipeline(pipeline);
    self
  }
}

#[async_trait]
impl Catalog for MemoryCatalog {
  async fn job(&self, job_id: &str) -> Result<JobDef, CatalogError> {
    self
      .jobs
      .read()
      .get(job_id)
      .cloned()
      .ok_or_else(|| CatalogError::JobNotFound {
        job_id: job_id.to_string(),
      })
  }

  async fn pipeline(&self, pipeline_id: &str) -> Result<PipelineDef, CatalogError> {
    self
      .pipelines
      .read()
      .get(pipeline_id)
      .cloned()
      .ok_or_else(|| CatalogError::PipelineNotFound {
        pipeline_id: pipeline_id.to_string(),
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use jobcraft_config::StepDef;

  #[tokio::test]
  async fn test_lookup_registered_job() {
    let catalog = MemoryCatalog::new().with_job(JobDef::new(
      "j1",
      vec![StepDef::new("a", "compute.double", serde_json::json!({}))],
    ));

    assert_eq!(catalog.job("j1").await.unwrap().steps.len(), 1);
    assert!(matches!(
      catalog.job("j2").await,
      Err(CatalogError::JobNotFound { .. })
    ));
    assert!(matches!(
      catalog.pipeline("j1").await,
      Err(CatalogError::PipelineNotFound { .. })
    ));
  }
}
