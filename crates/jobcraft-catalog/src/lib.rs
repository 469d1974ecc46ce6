//! Jobcraft Catalog
//!
//! Definitions referenced by id, by `job.run` steps and by pipeline entries,
//! are looked up through a [`Catalog`]. Two implementations are provided:
//!
//! - [`MemoryCatalog`] holds definitions registered in code
//! - [`FsCatalog`] reads `jobs/<id>.*` and `pipelines/<id>.*` under a root

mod error;
mod fs_catalog;
mod memory;

pub use error::CatalogError;
pub use fs_catalog::FsCatalog;
pub use memory::MemoryCatalog;

use async_trait::async_trait;
use jobcraft_config::{JobDef, PipelineDef};

/// Source of job and pipeline definitions.
#[async_trait]
pub trait Catalog: Send + Sync {
  /// Look up a job definition by id.
  async fn job(&self, job_id: &str) -> Result<JobDef, CatalogError>;

  /// Look up a pipeline definition by id.
  async fn pipeline(&self, pipeline_id: &str) -> Result<PipelineDef, CatalogError>;
}
