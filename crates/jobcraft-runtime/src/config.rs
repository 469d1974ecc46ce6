use serde::{Deserialize, Serialize};

/// Default nesting limit for `job.run` chains and sub-pipelines.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Executor settings, built by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
  /// Dispatch attempts per step when the step does not override it.
  /// Only handler failures are retried, and `job.run` steps never are.
  pub max_attempts: u32,
  /// Delay before retry `n` is `retry_backoff_ms * n`.
  pub retry_backoff_ms: u64,
  /// Maximum nesting of `job.run` chains and sub-pipelines.
  pub max_depth: usize,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      max_attempts: 1,
      retry_backoff_ms: 0,
      max_depth: DEFAULT_MAX_DEPTH,
    }
  }
}

impl ExecutorConfig {
  pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts;
    self
  }

  pub fn with_retry_backoff_ms(mut self, retry_backoff_ms: u64) -> Self {
    self.retry_backoff_ms = retry_backoff_ms;
    self
  }

  pub fn with_max_depth(mut self, max_depth: usize) -> Self {
    self.max_depth = max_depth;
    self
  }
}
