use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use jobcraft_job::Op;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStatus {
  /// Every step succeeded.
  Success,
  /// A step failed without `continue_on_error`.
  Failed,
  /// At least one `continue_on_error` step failed, the rest ran.
  Partial,
  /// The run stopped on a cancellation signal.
  Cancelled,
}

impl RunStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunStatus::Success => "success",
      RunStatus::Failed => "failed",
      RunStatus::Partial => "partial",
      RunStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Lifecycle state of a single step.
///
/// `Pending -> Resolving -> Dispatched -> Succeeded | Failed`, with
/// `Resolving -> Failed` when a reference cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepState {
  Pending,
  Resolving,
  Dispatched,
  Succeeded,
  Failed,
}

impl StepState {
  /// Whether `self -> next` is a legal transition.
  pub fn can_transition(self, next: StepState) -> bool {
    matches!(
      (self, next),
      (StepState::Pending, StepState::Resolving)
        | (StepState::Resolving, StepState::Dispatched)
        | (StepState::Resolving, StepState::Failed)
        | (StepState::Dispatched, StepState::Succeeded)
        | (StepState::Dispatched, StepState::Failed)
    )
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, StepState::Succeeded | StepState::Failed)
  }
}

/// Category of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// A parameter reference could not be resolved.
  Resolution,
  /// No handler could take the op.
  Dispatch,
  /// The handler ran and reported an error.
  Handler,
  /// The step was interrupted by cancellation.
  Cancelled,
}

impl ErrorKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorKind::Resolution => "resolution",
      ErrorKind::Dispatch => "dispatch",
      ErrorKind::Handler => "handler",
      ErrorKind::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A step failure as it appears in run records and step outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
  pub step_id: String,
  pub kind: ErrorKind,
  pub message: String,
}

impl StepFailure {
  pub fn new(step_id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      step_id: step_id.into(),
      kind,
      message: message.into(),
    }
  }

  /// The marker stored in place of the output of a failed
  /// `continue_on_error` step.
  pub fn marker(&self) -> Value {
    serde_json::json!({
      "error": {
        "kind": self.kind.as_str(),
        "message": self.message,
      }
    })
  }
}

/// Durable record of what a step was about to do, written before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepManifest {
  pub run_id: String,
  pub step_id: String,
  /// Zero-based position of the step in its job.
  pub seq: u32,
  pub op: Op,
  /// Fully resolved parameters; contains no references.
  pub params: Value,
  pub idempotency_key: String,
  pub created_at: DateTime<Utc>,
}

/// Recorded outcome of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
  pub run_id: String,
  pub step_id: String,
  pub seq: u32,
  pub state: StepState,
  pub output: Option<Value>,
  pub error: Option<StepFailure>,
  /// Number of dispatch attempts; zero when resolution failed.
  pub attempts: u32,
  pub recorded_at: DateTime<Utc>,
}

/// Final record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
  pub run_id: String,
  pub job_id: String,
  /// Run that started this one through `job.run`, if any.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_run_id: Option<String>,
  pub status: RunStatus,
  pub payload: Value,
  /// Step id to output (or error marker), in execution order.
  pub outputs: IndexMap<String, Value>,
  /// Ids of the steps that were started, in execution order.
  pub steps: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure: Option<StepFailure>,
  pub started_at: DateTime<Utc>,
  pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_step_state_transitions() {
    assert!(StepState::Pending.can_transition(StepState::Resolving));
    assert!(StepState::Resolving.can_transition(StepState::Failed));
    assert!(StepState::Dispatched.can_transition(StepState::Succeeded));
    assert!(!StepState::Pending.can_transition(StepState::Dispatched));
    assert!(!StepState::Succeeded.can_transition(StepState::Failed));
    assert!(StepState::Failed.is_terminal());
    assert!(!StepState::Dispatched.is_terminal());
  }

  #[test]
  fn test_failure_marker_shape() {
    let failure = StepFailure::new("b", ErrorKind::Handler, "boom");
    assert_eq!(
      failure.marker(),
      serde_json::json!({"error": {"kind": "handler", "message": "boom"}})
    );
  }

  #[test]
  fn test_status_serializes_snake_case() {
    assert_eq!(
      serde_json::to_value(RunStatus::Cancelled).unwrap(),
      serde_json::json!("cancelled")
    );
    assert_eq!(RunStatus::Partial.to_string(), "partial");
  }
}
