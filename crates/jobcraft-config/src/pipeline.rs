use serde::{Deserialize, Serialize};

/// An ordered sequence of job and sub-pipeline executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
  pub pipeline_id: String,
  /// When true (the default), the first failed entry skips every later entry.
  #[serde(default = "default_stop_on_failure")]
  pub stop_on_failure: bool,
  #[serde(default)]
  pub entries: Vec<PipelineEntry>,
}

/// A single pipeline entry: either a job or a nested pipeline, referenced by id.
///
/// ```yaml
/// entries:
///   - job: ingest
///   - pipeline: scoring
///     payload: { cohort: "a" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineEntry {
  Job {
    job: String,
    /// Replaces the pipeline's payload for this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
  },
  Pipeline {
    pipeline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
  },
}

impl PipelineEntry {
  /// A job entry that inherits the pipeline payload.
  pub fn job(job_id: impl Into<String>) -> Self {
    PipelineEntry::Job {
      job: job_id.into(),
      payload: None,
    }
  }

  /// A sub-pipeline entry that inherits the pipeline payload.
  pub fn pipeline(pipeline_id: impl Into<String>) -> Self {
    PipelineEntry::Pipeline {
      pipeline: pipeline_id.into(),
      payload: None,
    }
  }

  /// Human-readable label, e.g. `job:ingest` or `pipeline:nightly`.
  pub fn label(&self) -> String {
    match self {
      PipelineEntry::Job { job, .. } => format!("job:{}", job),
      PipelineEntry::Pipeline { pipeline, .. } => format!("pipeline:{}", pipeline),
    }
  }

  /// Payload override for this entry, if any.
  pub fn payload(&self) -> Option<&serde_json::Value> {
    match self {
      PipelineEntry::Job { payload, .. } | PipelineEntry::Pipeline { payload, .. } => {
        payload.as_ref()
      }
    }
  }
}

impl PipelineDef {
  pub fn new(pipeline_id: impl Into<String>, entries: Vec<PipelineEntry>) -> Self {
    Self {
      pipeline_id: pipeline_id.into(),
      stop_on_failure: true,
      entries,
    }
  }
}

fn default_stop_on_failure() -> bool {
  true
}
