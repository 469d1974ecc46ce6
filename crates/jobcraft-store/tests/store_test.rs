use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use jobcraft_job::Op;
use jobcraft_store::{
  ErrorKind, MemoryStore, RunRecord, RunStatus, RunStore, SqliteStore, StepFailure, StepManifest,
  StepOutput, StepState, StoreError,
};
use serde_json::json;

fn at(minute: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2026, 1, 1, 12, minute, 0).unwrap()
}

fn manifest(run_id: &str, step_id: &str, seq: u32, key: &str) -> StepManifest {
  StepManifest {
    run_id: run_id.to_string(),
    step_id: step_id.to_string(),
    seq,
    op: Op::Compute("double".to_string()),
    params: json!({"value": 5}),
    idempotency_key: key.to_string(),
    created_at: at(seq),
  }
}

fn output(run_id: &str, step_id: &str, seq: u32) -> StepOutput {
  StepOutput {
    run_id: run_id.to_string(),
    step_id: step_id.to_string(),
    seq,
    state: StepState::Succeeded,
    output: Some(json!({"value": 10})),
    error: None,
    attempts: 1,
    recorded_at: at(seq),
  }
}

fn run(run_id: &str, job_id: &str, minute: u32) -> RunRecord {
  let mut outputs = IndexMap::new();
  outputs.insert("z".to_string(), json!({"value": 1}));
  outputs.insert("a".to_string(), json!({"value": 2}));
  RunRecord {
    run_id: run_id.to_string(),
    job_id: job_id.to_string(),
    parent_run_id: None,
    status: RunStatus::Success,
    payload: json!({}),
    outputs,
    steps: vec!["z".to_string(), "a".to_string()],
    failure: None,
    started_at: at(minute),
    completed_at: at(minute),
  }
}

async fn exercise_manifests(store: &dyn RunStore) {
  store.record_manifest(&manifest("r1", "b", 1, "k2")).await.unwrap();
  store.record_manifest(&manifest("r1", "a", 0, "k1")).await.unwrap();
  store.record_manifest(&manifest("r2", "a", 0, "k1")).await.unwrap();

  let listed = store.list_manifests("r1").await.unwrap();
  let ids: Vec<_> = listed.iter().map(|m| m.step_id.as_str()).collect();
  assert_eq!(ids, vec!["a", "b"]);

  let fetched = store.get_manifest("r1", "a").await.unwrap();
  assert_eq!(fetched, manifest("r1", "a", 0, "k1"));

  let same_key = store.find_manifests_by_key("k1").await.unwrap();
  let runs: Vec<_> = same_key.iter().map(|m| m.run_id.as_str()).collect();
  assert_eq!(runs, vec!["r1", "r2"]);

  let dup = store.record_manifest(&manifest("r1", "a", 0, "other")).await;
  assert!(matches!(dup, Err(StoreError::AlreadyExists(_))));
  assert_eq!(store.get_manifest("r1", "a").await.unwrap().idempotency_key, "k1");

  assert!(matches!(
    store.get_manifest("r1", "missing").await,
    Err(StoreError::NotFound(_))
  ));
}

async fn exercise_outputs(store: &dyn RunStore) {
  store.record_output(&output("r1", "a", 0)).await.unwrap();

  let failed = StepOutput {
    state: StepState::Failed,
    output: None,
    error: Some(StepFailure::new("b", ErrorKind::Resolution, "no output")),
    attempts: 0,
    ..output("r1", "b", 1)
  };
  store.record_output(&failed).await.unwrap();

  let listed = store.list_outputs("r1").await.unwrap();
  assert_eq!(listed.len(), 2);
  assert_eq!(listed[1], failed);
  assert_eq!(store.get_output("r1", "a").await.unwrap(), output("r1", "a", 0));

  let dup = store.record_output(&output("r1", "a", 0)).await;
  assert!(matches!(dup, Err(StoreError::AlreadyExists(_))));
}

async fn exercise_runs(store: &dyn RunStore) {
  store.record_run(&run("r1", "j1", 0)).await.unwrap();
  store.record_run(&run("r2", "j1", 5)).await.unwrap();
  store.record_run(&run("r3", "j2", 9)).await.unwrap();

  let fetched = store.get_run("r1").await.unwrap();
  let order: Vec<_> = fetched.outputs.keys().map(String::as_str).collect();
  assert_eq!(order, vec!["z", "a"]);
  assert_eq!(fetched, run("r1", "j1", 0));

  let listed = store.list_runs("j1").await.unwrap();
  let ids: Vec<_> = listed.iter().map(|r| r.run_id.as_str()).collect();
  assert_eq!(ids, vec!["r2", "r1"]);

  let dup = store.record_run(&run("r1", "j1", 0)).await;
  assert!(matches!(dup, Err(StoreError::AlreadyExists(_))));
  assert!(matches!(store.get_run("nope").await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_memory_store() {
  let store = MemoryStore::new();
  exercise_manifests(&store).await;
  exercise_outputs(&store).await;
  exercise_runs(&store).await;
}

#[tokio::test]
async fn test_sqlite_store() {
  let store = SqliteStore::in_memory().await.unwrap();
  exercise_manifests(&store).await;
  exercise_outputs(&store).await;
  exercise_runs(&store).await;
}

#[tokio::test]
async fn test_sqlite_store_persists_across_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("runs.db");

  {
    let store = SqliteStore::open(&path).await.unwrap();
    store.record_run(&run("r1", "j1", 0)).await.unwrap();
  }

  let store = SqliteStore::open(&path).await.unwrap();
  assert_eq!(store.get_run("r1").await.unwrap().job_id, "j1");
}
