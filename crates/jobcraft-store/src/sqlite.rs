use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobcraft_job::Op;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

use crate::{
  RunRecord, RunStore, StepFailure, StepManifest, StepOutput, StepState, StoreError,
};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct ManifestRow {
  run_id: String,
  step_id: String,
  seq: u32,
  op: String,
  params: Json<Value>,
  idempotency_key: String,
  created_at: DateTime<Utc>,
}

impl TryFrom<ManifestRow> for StepManifest {
  type Error = StoreError;

  fn try_from(row: ManifestRow) -> Result<Self, Self::Error> {
    let op = Op::from_str(&row.op).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(StepManifest {
      run_id: row.run_id,
      step_id: row.step_id,
      seq: row.seq,
      op,
      params: row.params.0,
      idempotency_key: row.idempotency_key,
      created_at: row.created_at,
    })
  }
}

#[derive(FromRow)]
struct OutputRow {
  run_id: String,
  step_id: String,
  seq: u32,
  state: StepState,
  output: Option<Json<Value>>,
  error: Option<Json<StepFailure>>,
  attempts: u32,
  recorded_at: DateTime<Utc>,
}

impl From<OutputRow> for StepOutput {
  fn from(row: OutputRow) -> Self {
    StepOutput {
      run_id: row.run_id,
      step_id: row.step_id,
      seq: row.seq,
      state: row.state,
      output: row.output.map(|o| o.0),
      error: row.error.map(|e| e.0),
      attempts: row.attempts,
      recorded_at: row.recorded_at,
    }
  }
}

const SELECT_MANIFEST: &str = r#"
  SELECT run_id, step_id, seq, op, params, idempotency_key, created_at
  FROM step_manifests
"#;

const SELECT_OUTPUT: &str = r#"
  SELECT run_id, step_id, seq, state, output, error, attempts, recorded_at
  FROM step_outputs
"#;

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) a database file and run migrations.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::new()
      .filename(path.as_ref())
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Open a private in-memory database and run migrations.
  pub async fn in_memory() -> Result<Self, StoreError> {
    // Every connection to `sqlite::memory:` is its own database.
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!().run(&self.pool).await?;
    Ok(())
  }
}

fn insert_error(err: sqlx::Error, what: String) -> StoreError {
  match &err {
    sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists(what),
    _ => StoreError::Database(err),
  }
}

#[async_trait]
impl RunStore for SqliteStore {
  async fn record_manifest(&self, manifest: &StepManifest) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO step_manifests (run_id, step_id, seq, op, params, idempotency_key, created_at)
      VALUES (?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&manifest.run_id)
    .bind(&manifest.step_id)
    .bind(manifest.seq)
    .bind(manifest.op.name())
    .bind(Json(&manifest.params))
    .bind(&manifest.idempotency_key)
    .bind(manifest.created_at)
    .execute(&self.pool)
    .await
    .map_err(|e| insert_error(e, format!("manifest {}/{}", manifest.run_id, manifest.step_id)))?;

    Ok(())
  }

  async fn record_output(&self, output: &StepOutput) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO step_outputs (run_id, step_id, seq, state, output, error, attempts, recorded_at)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&output.run_id)
    .bind(&output.step_id)
    .bind(output.seq)
    .bind(output.state)
    .bind(output.output.as_ref().map(Json))
    .bind(output.error.as_ref().map(Json))
    .bind(output.attempts)
    .bind(output.recorded_at)
    .execute(&self.pool)
    .await
    .map_err(|e| insert_error(e, format!("output {}/{}", output.run_id, output.step_id)))?;

    Ok(())
  }

  async fn record_run(&self, record: &RunRecord) -> Result<(), StoreError> {
    // The record is kept whole so output order survives the round trip.
    let body = serde_json::to_string(record)?;
    sqlx::query(
      r#"
      INSERT INTO runs (run_id, job_id, status, record, completed_at)
      VALUES (?, ?, ?, ?, ?)
      "#,
    )
    .bind(&record.run_id)
    .bind(&record.job_id)
    .bind(record.status)
    .bind(body)
    .bind(record.completed_at)
    .execute(&self.pool)
    .await
    .map_err(|e| insert_error(e, format!("run {}", record.run_id)))?;

    Ok(())
  }

  async fn get_manifest(&self, run_id: &str, step_id: &str) -> Result<StepManifest, StoreError> {
    let row: Option<ManifestRow> =
      sqlx::query_as(&format!("{SELECT_MANIFEST} WHERE run_id = ? AND step_id = ?"))
        .bind(run_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

    row
      .ok_or_else(|| StoreError::NotFound(format!("manifest {run_id}/{step_id}")))?
      .try_into()
  }

  async fn get_output(&self, run_id: &str, step_id: &str) -> Result<StepOutput, StoreError> {
    let row: Option<OutputRow> =
      sqlx::query_as(&format!("{SELECT_OUTPUT} WHERE run_id = ? AND step_id = ?"))
        .bind(run_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

    row
      .map(StepOutput::from)
      .ok_or_else(|| StoreError::NotFound(format!("output {run_id}/{step_id}")))
  }

  async fn get_run(&self, run_id: &str) -> Result<RunRecord, StoreError> {
    let body: Option<String> = sqlx::query_scalar("SELECT record FROM runs WHERE run_id = ?")
      .bind(run_id)
      .fetch_optional(&self.pool)
      .await?;

    let body = body.ok_or_else(|| StoreError::NotFound(format!("run {run_id}")))?;
    Ok(serde_json::from_str(&body)?)
  }

  async fn list_manifests(&self, run_id: &str) -> Result<Vec<StepManifest>, StoreError> {
    let rows: Vec<ManifestRow> =
      sqlx::query_as(&format!("{SELECT_MANIFEST} WHERE run_id = ? ORDER BY seq"))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

    rows.into_iter().map(StepManifest::try_from).collect()
  }

  async fn list_outputs(&self, run_id: &str) -> Result<Vec<StepOutput>, StoreError> {
    let rows: Vec<OutputRow> =
      sqlx::query_as(&format!("{SELECT_OUTPUT} WHERE run_id = ? ORDER BY seq"))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

    Ok(rows.into_iter().map(StepOutput::from).collect())
  }

  async fn list_runs(&self, job_id: &str) -> Result<Vec<RunRecord>, StoreError> {
    let bodies: Vec<String> = sqlx::query_scalar(
      r#"
      SELECT record FROM runs
      WHERE job_id = ?
      ORDER BY completed_at DESC, rowid DESC
      "#,
    )
    .bind(job_id)
    .fetch_all(&self.pool)
    .await?;

    bodies
      .iter()
      .map(|body| serde_json::from_str(body).map_err(StoreError::from))
      .collect()
  }

  async fn find_manifests_by_key(&self, key: &str) -> Result<Vec<StepManifest>, StoreError> {
    let rows: Vec<ManifestRow> = sqlx::query_as(&format!(
      "{SELECT_MANIFEST} WHERE idempotency_key = ? ORDER BY created_at, rowid"
    ))
    .bind(key)
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(StepManifest::try_from).collect()
  }
}
