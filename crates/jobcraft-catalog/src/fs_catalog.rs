use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jobcraft_config::{DefinitionFormat, JobDef, PipelineDef, parse_job, parse_pipeline};
use tokio::fs;
use tracing::debug;

use crate::{Catalog, CatalogError};

/// Filesystem-based catalog.
///
/// Definitions are stored one per file, named after their id:
/// ```text
/// {root}/
/// ├── jobs/
/// │   ├── ingest.yaml
/// │   └── score.json
/// └── pipelines/
///     └── nightly.yaml
/// ```
///
/// For an id, `.json` is probed first, then `.yaml`, then `.yml`.
pub struct FsCatalog {
  root: PathBuf,
}

impl FsCatalog {
  /// Create a new filesystem catalog at the given root path.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Get the root directory of the catalog.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Find the definition file for `id` under `{root}/{kind}`.
  async fn locate(&self, kind: &str, id: &str) -> Result<Option<(PathBuf, DefinitionFormat)>, CatalogError> {
    // Ids become file names; anything that could leave the directory is refused.
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
      return Err(CatalogError::InvalidId { id: id.to_string() });
    }

    let dir = self.root.join(kind);
    for ext in DefinitionFormat::extensions() {
      let path = dir.join(format!("{id}.{ext}"));
      let exists = fs::try_exists(&path).await.map_err(|source| CatalogError::Io {
        path: path.clone(),
        source,
      })?;
      if exists && let Some(format) = DefinitionFormat::from_path(&path) {
        return Ok(Some((path, format)));
      }
    }
    Ok(None)
  }

  async fn read(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path)
      .await
      .map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
      })
  }
}

#[async_trait]
impl Catalog for FsCatalog {
  async fn job(&self, job_id: &str) -> Result<JobDef, CatalogError> {
    let Some((path, format)) = self.locate("jobs", job_id).await? else {
      return Err(CatalogError::JobNotFound {
        job_id: job_id.to_string(),
      });
    };

    debug!(job_id = %job_id, path = %path.display(), "loading job from catalog");
    let job = parse_job(&Self::read(&path).await?, format)?;
    if job.job_id != job_id {
      return Err(CatalogError::IdMismatch {
        path,
        expected: job_id.to_string(),
        found: job.job_id,
      });
    }
    Ok(job)
  }

  async fn pipeline(&self, pipeline_id: &str) -> Result<PipelineDef, CatalogError> {
    let Some((path, format)) = self.locate("pipelines", pipeline_id).await? else {
      return Err(CatalogError::PipelineNotFound {
        pipeline_id: pipeline_id.to_string(),
      });
    };

    debug!(pipeline_id = %pipeline_id, path = %path.display(), "loading pipeline from catalog");
    let pipeline = parse_pipeline(&Self::read(&path).await?, format)?;
    if pipeline.pipeline_id != pipeline_id {
      return Err(CatalogError::IdMismatch {
        path,
        expected: pipeline_id.to_string(),
        found: pipeline.pipeline_id,
      });
    }
    Ok(pipeline)
  }
}
