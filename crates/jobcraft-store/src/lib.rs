//! Jobcraft Store
//!
//! This crate provides the run store trait and implementations. The store is
//! the durable audit trail of every job execution:
//!
//! - A [`StepManifest`] per dispatched step, written before the dispatch
//! - A [`StepOutput`] per finished step, successful or not
//! - A [`RunRecord`] per finished run
//!
//! The store is append-only. Manifests and outputs are addressed by
//! `(run_id, step_id)` and run records by `run_id`; writing the same address
//! twice fails with [`StoreError::AlreadyExists`] instead of overwriting.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{ErrorKind, RunRecord, RunStatus, StepFailure, StepManifest, StepOutput, StepState};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// The address was already written; records are never overwritten.
  #[error("already recorded: {0}")]
  AlreadyExists(String),

  /// A stored row could not be turned back into a record.
  #[error("corrupt record: {0}")]
  Corrupt(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Schema migration failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Storage trait for run manifests, outputs and records.
#[async_trait]
pub trait RunStore: Send + Sync {
  /// Append the manifest of a step about to be dispatched.
  async fn record_manifest(&self, manifest: &StepManifest) -> Result<(), StoreError>;

  /// Append the outcome of a step.
  async fn record_output(&self, output: &StepOutput) -> Result<(), StoreError>;

  /// Append the final record of a run.
  async fn record_run(&self, record: &RunRecord) -> Result<(), StoreError>;

  /// Get the manifest of one step.
  async fn get_manifest(&self, run_id: &str, step_id: &str) -> Result<StepManifest, StoreError>;

  /// Get the recorded outcome of one step.
  async fn get_output(&self, run_id: &str, step_id: &str) -> Result<StepOutput, StoreError>;

  /// Get a run record by ID.
  async fn get_run(&self, run_id: &str) -> Result<RunRecord, StoreError>;

  /// List the manifests of a run in execution order.
  async fn list_manifests(&self, run_id: &str) -> Result<Vec<StepManifest>, StoreError>;

  /// List the step outcomes of a run in execution order.
  async fn list_outputs(&self, run_id: &str) -> Result<Vec<StepOutput>, StoreError>;

  /// List run records for a job, most recent first.
  async fn list_runs(&self, job_id: &str) -> Result<Vec<RunRecord>, StoreError>;

  /// Every manifest carrying the given idempotency key, oldest first.
  async fn find_manifests_by_key(&self, key: &str) -> Result<Vec<StepManifest>, StoreError>;
}
