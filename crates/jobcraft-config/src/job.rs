use serde::{Deserialize, Serialize};

/// Schema version assumed when a definition does not declare one.
pub const DEFAULT_VERSION: &str = "2.0";

/// A declarative job definition.
///
/// Job definitions are immutable once loaded. The compiler validates them and
/// produces a `JobInstance` for each invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDef {
  pub job_id: String,
  #[serde(default = "default_version")]
  pub version: String,
  #[serde(default)]
  pub steps: Vec<StepDef>,
}

/// One named step of a job.
///
/// `params` is an arbitrary nested document whose string leaves may contain
/// references such as `@run.fetch.rows[0]` or `@payload.patient_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  pub step_id: String,
  pub op: String,
  #[serde(default = "empty_params")]
  pub params: serde_json::Value,
  #[serde(default)]
  pub continue_on_error: bool,
  /// Overrides the executor's configured attempt budget for this step.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_attempts: Option<u32>,
}

impl StepDef {
  /// Create a step with default policy (fail the run on error, no attempt override).
  pub fn new(step_id: impl Into<String>, op: impl Into<String>, params: serde_json::Value) -> Self {
    Self {
      step_id: step_id.into(),
      op: op.into(),
      params,
      continue_on_error: false,
      max_attempts: None,
    }
  }

  /// Builder-style toggle for `continue_on_error`.
  pub fn continue_on_error(mut self, value: bool) -> Self {
    self.continue_on_error = value;
    self
  }
}

impl JobDef {
  /// Create a job definition at the default schema version.
  pub fn new(job_id: impl Into<String>, steps: Vec<StepDef>) -> Self {
    Self {
      job_id: job_id.into(),
      version: default_version(),
      steps,
    }
  }
}

fn default_version() -> String {
  DEFAULT_VERSION.to_string()
}

fn empty_params() -> serde_json::Value {
  serde_json::Value::Object(serde_json::Map::new())
}
