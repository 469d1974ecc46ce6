use thiserror::Error;

/// Errors that can occur while compiling a job definition.
///
/// Compilation never partially succeeds: any of these means no step runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
  /// The job has an empty `job_id`.
  #[error("job_id must not be empty")]
  EmptyJobId,

  /// The schema version is not understood.
  #[error("unsupported schema version '{version}' for job '{job_id}'")]
  UnsupportedVersion { job_id: String, version: String },

  /// A step has an empty `step_id`.
  #[error("step at position {index} has an empty step_id")]
  EmptyStepId { index: usize },

  /// A step id that a reference could not name.
  #[error("step id '{step_id}' must not contain '.', '[' or ']'")]
  InvalidStepId { step_id: String },

  /// Duplicate step ID.
  #[error("duplicate step id: {step_id}")]
  DuplicateStepId { step_id: String },

  /// The op is not part of the op taxonomy.
  #[error("unknown op '{op}' on step '{step_id}'")]
  UnknownOp { step_id: String, op: String },

  /// A reference string does not follow the reference grammar.
  #[error("malformed reference '{reference}' on step '{step_id}': {message}")]
  MalformedReference {
    step_id: String,
    reference: String,
    message: String,
  },

  /// A step references its own output.
  #[error("step '{step_id}' references its own output in '{reference}'")]
  SelfReference { step_id: String, reference: String },

  /// A step references a step that only runs after it.
  #[error("step '{step_id}' references later step '{target}' in '{reference}'")]
  ForwardReference {
    step_id: String,
    target: String,
    reference: String,
  },

  /// A step references a step id that does not exist in the job.
  #[error("step '{step_id}' references unknown step '{target}' in '{reference}'")]
  UnknownStep {
    step_id: String,
    target: String,
    reference: String,
  },

  /// Params do not have the shape the op requires.
  #[error("invalid params on step '{step_id}': {message}")]
  InvalidParams { step_id: String, message: String },
}

impl CompileError {
  /// The step the error belongs to, when it is step-scoped.
  pub fn step_id(&self) -> Option<&str> {
    match self {
      CompileError::EmptyJobId
      | CompileError::UnsupportedVersion { .. }
      | CompileError::EmptyStepId { .. } => None,
      CompileError::InvalidStepId { step_id }
      | CompileError::DuplicateStepId { step_id }
      | CompileError::UnknownOp { step_id, .. }
      | CompileError::MalformedReference { step_id, .. }
      | CompileError::SelfReference { step_id, .. }
      | CompileError::ForwardReference { step_id, .. }
      | CompileError::UnknownStep { step_id, .. }
      | CompileError::InvalidParams { step_id, .. } => Some(step_id),
    }
  }
}
