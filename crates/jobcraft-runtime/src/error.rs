//! Runtime error types.

use jobcraft_catalog::CatalogError;
use jobcraft_compiler::CompileError;
use jobcraft_job::Backend;
use jobcraft_store::{ErrorKind, StoreError};

/// A step parameter that could not be resolved against the run context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
  /// The reference root is neither `run` nor `payload`.
  #[error("step '{step_id}': unknown reference root '{root}' in '{reference}'")]
  UnknownRoot {
    step_id: String,
    reference: String,
    root: String,
  },

  /// The reference string does not follow the reference grammar.
  #[error("step '{step_id}': malformed reference '{reference}': {message}")]
  Malformed {
    step_id: String,
    reference: String,
    message: String,
  },

  /// The referenced step has no recorded output in this run.
  #[error("step '{step_id}': '{reference}' refers to step '{target}' which has no output")]
  UnresolvedStep {
    step_id: String,
    reference: String,
    target: String,
  },

  /// A path segment does not exist on the referenced value.
  #[error("step '{step_id}': path '{segment}' not found while resolving '{reference}'")]
  PathNotFound {
    step_id: String,
    reference: String,
    segment: String,
  },

  /// A list index is out of bounds.
  #[error("step '{step_id}': index {index} out of bounds (len {len}) in '{reference}'")]
  Index {
    step_id: String,
    reference: String,
    index: usize,
    len: usize,
  },
}

impl ResolutionError {
  /// The offending reference string.
  pub fn reference(&self) -> &str {
    match self {
      ResolutionError::UnknownRoot { reference, .. }
      | ResolutionError::Malformed { reference, .. }
      | ResolutionError::UnresolvedStep { reference, .. }
      | ResolutionError::PathNotFound { reference, .. }
      | ResolutionError::Index { reference, .. } => reference,
    }
  }
}

/// The deployment cannot route an op. Never retried, never continued past.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
  #[error("no handler registered for backend '{backend}'")]
  UnregisteredBackend { backend: Backend },

  #[error("no callable registered under '{name}'")]
  UnknownCallable { name: String },

  #[error("no storage backend configured for '{op}'")]
  NoStorageBackend { op: String },
}

/// A handler or collaborator reported a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
  pub message: String,
}

impl HandlerError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// Why a single step did not produce an output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
  #[error(transparent)]
  Resolution(#[from] ResolutionError),

  #[error(transparent)]
  Dispatch(#[from] DispatchError),

  #[error(transparent)]
  Handler(#[from] HandlerError),

  #[error("step cancelled")]
  Cancelled,
}

impl StepError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      StepError::Resolution(_) => ErrorKind::Resolution,
      StepError::Dispatch(_) => ErrorKind::Dispatch,
      StepError::Handler(_) => ErrorKind::Handler,
      StepError::Cancelled => ErrorKind::Cancelled,
    }
  }
}

/// Errors that prevent a run from producing a RunRecord.
///
/// Step failures are not errors at this level; they end up in the record.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  #[error(transparent)]
  Compile(#[from] CompileError),

  #[error("run store error: {0}")]
  Store(#[from] StoreError),
}

/// Errors raised by the pipeline runner.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  /// A pipeline appears in its own ancestry.
  #[error("cyclic pipeline: {}", .chain.join(" -> "))]
  Cyclic { chain: Vec<String> },

  #[error("pipeline '{pipeline_id}' exceeds the maximum nesting depth of {max_depth}")]
  DepthExceeded {
    pipeline_id: String,
    max_depth: usize,
  },

  #[error("job '{job_id}' in pipeline '{pipeline_id}' does not compile: {source}")]
  Compile {
    pipeline_id: String,
    job_id: String,
    #[source]
    source: CompileError,
  },

  #[error(transparent)]
  Catalog(#[from] CatalogError),

  #[error(transparent)]
  Execution(#[from] ExecutionError),
}
