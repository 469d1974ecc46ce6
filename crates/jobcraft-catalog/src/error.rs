use std::path::PathBuf;

use jobcraft_config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
  #[error("job '{job_id}' not found in catalog")]
  JobNotFound { job_id: String },

  #[error("pipeline '{pipeline_id}' not found in catalog")]
  PipelineNotFound { pipeline_id: String },

  #[error("definition at {path} declares id '{found}', expected '{expected}'")]
  IdMismatch {
    path: PathBuf,
    expected: String,
    found: String,
  },

  #[error("invalid catalog id '{id}'")]
  InvalidId { id: String },

  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Config(#[from] ConfigError),
}
